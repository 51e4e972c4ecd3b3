//! Research documents and the URL-keyed collections they merge into.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A single research document returned by a search provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Canonical URL, used as the identity key when merging collections.
    pub url: String,
    pub title: String,
    pub content: String,
    /// Provider or site name the document came from.
    #[serde(default)]
    pub source: String,
    /// Relevance score assigned by the search provider.
    #[serde(default)]
    pub score: f64,
    /// The query that surfaced this document.
    #[serde(default)]
    pub query: String,
}

impl Document {
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            source: String::new(),
            score: 0.0,
            query: String::new(),
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }
}

/// A document collection with union-by-URL merge semantics.
///
/// Inserting a document whose URL is already present keeps whichever copy
/// has the higher score; on a score tie the earliest-seen entry is kept.
/// Merging the same set twice is therefore a no-op, which lets the barrier
/// merge tolerate re-delivered updates.
///
/// # Examples
///
/// ```
/// use prospector::document::{Document, DocumentSet};
///
/// let mut set = DocumentSet::default();
/// set.insert(Document::new("https://a.example", "first", "...").with_score(0.4));
/// set.insert(Document::new("https://a.example", "better", "...").with_score(0.9));
/// set.insert(Document::new("https://b.example", "other", "...").with_score(0.5));
///
/// assert_eq!(set.len(), 2);
/// assert_eq!(set.get("https://a.example").unwrap().title, "better");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(into = "Vec<Document>", from = "Vec<Document>")]
pub struct DocumentSet {
    by_url: FxHashMap<String, Document>,
}

impl DocumentSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one document under the merge policy.
    ///
    /// Returns `true` when the document was stored (new URL or strictly
    /// higher score than the existing entry).
    pub fn insert(&mut self, doc: Document) -> bool {
        match self.by_url.get(&doc.url) {
            Some(existing) if existing.score >= doc.score => false,
            _ => {
                self.by_url.insert(doc.url.clone(), doc);
                true
            }
        }
    }

    /// Union another collection into this one, document by document.
    pub fn merge(&mut self, other: &DocumentSet) {
        for doc in other.by_url.values() {
            self.insert(doc.clone());
        }
    }

    #[must_use]
    pub fn get(&self, url: &str) -> Option<&Document> {
        self.by_url.get(url)
    }

    #[must_use]
    pub fn contains(&self, url: &str) -> bool {
        self.by_url.contains_key(url)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Documents in deterministic order: score descending, then URL.
    #[must_use]
    pub fn ranked(&self) -> Vec<&Document> {
        let mut docs: Vec<&Document> = self.by_url.values().collect();
        docs.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.url.cmp(&b.url))
        });
        docs
    }

    /// URLs in deterministic (lexicographic) order.
    #[must_use]
    pub fn urls(&self) -> Vec<&str> {
        let mut urls: Vec<&str> = self.by_url.keys().map(String::as_str).collect();
        urls.sort_unstable();
        urls
    }

    /// A copy containing only the `n` highest-ranked documents.
    #[must_use]
    pub fn top(&self, n: usize) -> DocumentSet {
        let mut out = DocumentSet::new();
        for doc in self.ranked().into_iter().take(n) {
            out.insert(doc.clone());
        }
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.by_url.values()
    }
}

impl From<Vec<Document>> for DocumentSet {
    fn from(docs: Vec<Document>) -> Self {
        let mut set = DocumentSet::new();
        for doc in docs {
            set.insert(doc);
        }
        set
    }
}

impl From<DocumentSet> for Vec<Document> {
    fn from(set: DocumentSet) -> Self {
        set.ranked().into_iter().cloned().collect()
    }
}

impl FromIterator<Document> for DocumentSet {
    fn from_iter<I: IntoIterator<Item = Document>>(iter: I) -> Self {
        let mut set = DocumentSet::new();
        for doc in iter {
            set.insert(doc);
        }
        set
    }
}

use serde::{Deserialize, Serialize};

/// A message in the pipeline's running log, containing a role and text content.
///
/// Messages record the narrative of a run: stage announcements, provider
/// summaries, and diagnostics worth keeping alongside the analysis state.
/// Each message has a role (typically "system", "assistant", or "user") and
/// text content.
///
/// # Examples
///
/// ```
/// use prospector::message::Message;
///
/// let msg = Message::system("grounding complete: 3 background documents");
/// assert!(msg.has_role(Message::SYSTEM));
///
/// let json = serde_json::to_string(&msg).unwrap();
/// let parsed: Message = serde_json::from_str(&json).unwrap();
/// assert_eq!(msg, parsed);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message sender (e.g., "user", "assistant", "system").
    ///
    /// Use the constants on [`Message`] for standardized values.
    pub role: String,
    /// The text content of the message.
    pub content: String,
}

impl Message {
    /// Caller-supplied input role.
    pub const USER: &'static str = "user";
    /// Provider/LLM output role.
    pub const ASSISTANT: &'static str = "assistant";
    /// Pipeline stage announcement role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    /// Creates a user message with the specified content.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message with the specified content.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message with the specified content.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Returns true if this message has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

//! Static graph definition, validation, and topological wave layering.
//!
//! A graph is assembled with [`GraphBuilder`]: each node declares a unique
//! name, the names of its upstream dependencies, and a body implementing
//! [`Node`]. [`GraphBuilder::compile`] validates the structure and computes
//! the wave schedule once, up front; scheduling at run time is then a
//! straight walk over the precomputed waves.
//!
//! # Wave layering
//!
//! Wave 0 is the entry node (the single node with no dependencies). Wave k
//! contains every unscheduled node whose dependencies all sit in waves
//! `0..k`. Within a wave, node order is lexicographic so the layering — and
//! everything downstream of it — is deterministic.
//!
//! # Examples
//!
//! ```
//! use prospector::graph::GraphBuilder;
//! use prospector::node::{Node, NodeContext, NodeError};
//! use prospector::state::{StateSnapshot, StateUpdate};
//! use async_trait::async_trait;
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl Node for Noop {
//!     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<StateUpdate, NodeError> {
//!         Ok(StateUpdate::new())
//!     }
//! }
//!
//! let graph = GraphBuilder::new()
//!     .add_node("fetch", [] as [&str; 0], Noop)
//!     .add_node("left", ["fetch"], Noop)
//!     .add_node("right", ["fetch"], Noop)
//!     .add_node("join", ["left", "right"], Noop)
//!     .compile()
//!     .unwrap();
//!
//! assert_eq!(graph.waves().len(), 3);
//! assert_eq!(graph.waves()[1], vec!["left".to_string(), "right".to_string()]);
//! assert_eq!(graph.terminal(), "join");
//! ```

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::node::Node;

/// One node declaration: name, upstream dependency names, and body.
#[derive(Clone)]
pub struct NodeSpec {
    pub name: String,
    pub dependencies: Vec<String>,
    pub body: Arc<dyn Node>,
}

/// Structural problems detected at graph construction.
///
/// All of these are fatal and unrecoverable by retry; the graph must be
/// re-declared.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphDefinitionError {
    #[error("duplicate node name: {name}")]
    #[diagnostic(
        code(prospector::graph::duplicate_node),
        help("Every node in a graph must have a unique name.")
    )]
    DuplicateNode { name: String },

    #[error("node {node} depends on unknown node {dependency}")]
    #[diagnostic(code(prospector::graph::unknown_dependency))]
    UnknownDependency { node: String, dependency: String },

    #[error("graph has no entry node (every node declares dependencies)")]
    #[diagnostic(
        code(prospector::graph::no_entry),
        help("Exactly one node must declare an empty dependency set.")
    )]
    NoEntry,

    #[error("graph has multiple entry nodes: {names:?}")]
    #[diagnostic(
        code(prospector::graph::multiple_entries),
        help("Exactly one node may declare an empty dependency set.")
    )]
    MultipleEntries { names: Vec<String> },

    #[error("dependency cycle involving: {members:?}")]
    #[diagnostic(
        code(prospector::graph::cycle),
        help("The dependency relation must be acyclic.")
    )]
    Cycle { members: Vec<String> },

    #[error("terminal join point is ambiguous; nodes without dependents: {sinks:?}")]
    #[diagnostic(
        code(prospector::graph::ambiguous_terminal),
        help(
            "Exactly one node may be a sink; its transitive dependencies must cover every other node."
        )
    )]
    AmbiguousTerminal { sinks: Vec<String> },

    #[error("graph is empty")]
    #[diagnostic(code(prospector::graph::empty))]
    Empty,
}

/// Builder for a static analysis graph.
#[derive(Default)]
pub struct GraphBuilder {
    specs: Vec<NodeSpec>,
}

impl GraphBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with its upstream dependency names.
    #[must_use]
    pub fn add_node<N, D, S>(self, name: impl Into<String>, dependencies: D, body: N) -> Self
    where
        N: Node + 'static,
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_shared_node(name, dependencies, Arc::new(body))
    }

    /// Register a node whose body is already shared.
    #[must_use]
    pub fn add_shared_node<D, S>(
        mut self,
        name: impl Into<String>,
        dependencies: D,
        body: Arc<dyn Node>,
    ) -> Self
    where
        D: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.specs.push(NodeSpec {
            name: name.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
            body,
        });
        self
    }

    /// Validate the declared structure and compute the wave schedule.
    pub fn compile(self) -> Result<GraphDefinition, GraphDefinitionError> {
        if self.specs.is_empty() {
            return Err(GraphDefinitionError::Empty);
        }

        let mut bodies: FxHashMap<String, Arc<dyn Node>> = FxHashMap::default();
        let mut dependencies: FxHashMap<String, Vec<String>> = FxHashMap::default();
        for spec in &self.specs {
            if bodies.contains_key(&spec.name) {
                return Err(GraphDefinitionError::DuplicateNode {
                    name: spec.name.clone(),
                });
            }
            bodies.insert(spec.name.clone(), spec.body.clone());
            dependencies.insert(spec.name.clone(), spec.dependencies.clone());
        }

        for spec in &self.specs {
            for dep in &spec.dependencies {
                if !bodies.contains_key(dep) {
                    return Err(GraphDefinitionError::UnknownDependency {
                        node: spec.name.clone(),
                        dependency: dep.clone(),
                    });
                }
                if dep == &spec.name {
                    return Err(GraphDefinitionError::Cycle {
                        members: vec![spec.name.clone()],
                    });
                }
            }
        }

        let mut entries: Vec<String> = self
            .specs
            .iter()
            .filter(|s| s.dependencies.is_empty())
            .map(|s| s.name.clone())
            .collect();
        entries.sort_unstable();
        let entry = match entries.len() {
            0 => return Err(GraphDefinitionError::NoEntry),
            1 => entries.remove(0),
            _ => return Err(GraphDefinitionError::MultipleEntries { names: entries }),
        };

        let waves = layer_waves(&dependencies)?;

        let mut has_dependent: FxHashSet<&str> = FxHashSet::default();
        for deps in dependencies.values() {
            for dep in deps {
                has_dependent.insert(dep.as_str());
            }
        }
        let mut sinks: Vec<String> = dependencies
            .keys()
            .filter(|name| !has_dependent.contains(name.as_str()))
            .cloned()
            .collect();
        sinks.sort_unstable();
        // In an acyclic graph every path ends at a sink, so a unique sink is
        // exactly the join point whose dependency closure covers all nodes.
        let terminal = match sinks.len() {
            1 => sinks.remove(0),
            _ => return Err(GraphDefinitionError::AmbiguousTerminal { sinks }),
        };

        Ok(GraphDefinition {
            bodies,
            dependencies,
            waves,
            entry,
            terminal,
        })
    }
}

/// Kahn-style layering: peel off all zero-in-degree nodes as one wave,
/// repeat. Leftover nodes after a stalled pass are cycle members.
fn layer_waves(
    dependencies: &FxHashMap<String, Vec<String>>,
) -> Result<Vec<Vec<String>>, GraphDefinitionError> {
    let mut remaining: FxHashMap<&str, FxHashSet<&str>> = dependencies
        .iter()
        .map(|(name, deps)| {
            (
                name.as_str(),
                deps.iter().map(String::as_str).collect::<FxHashSet<_>>(),
            )
        })
        .collect();

    let mut waves: Vec<Vec<String>> = Vec::new();
    let mut scheduled: FxHashSet<&str> = FxHashSet::default();

    while !remaining.is_empty() {
        let mut ready: Vec<&str> = remaining
            .iter()
            .filter(|(_, deps)| deps.iter().all(|d| scheduled.contains(d)))
            .map(|(name, _)| *name)
            .collect();
        if ready.is_empty() {
            let mut members: Vec<String> = remaining.keys().map(|s| (*s).to_string()).collect();
            members.sort_unstable();
            return Err(GraphDefinitionError::Cycle { members });
        }
        ready.sort_unstable();
        for name in &ready {
            remaining.remove(name);
            scheduled.insert(name);
        }
        waves.push(ready.into_iter().map(str::to_string).collect());
    }

    Ok(waves)
}

/// A validated graph with its precomputed wave schedule.
pub struct GraphDefinition {
    bodies: FxHashMap<String, Arc<dyn Node>>,
    dependencies: FxHashMap<String, Vec<String>>,
    waves: Vec<Vec<String>>,
    entry: String,
    terminal: String,
}

// Bodies are trait objects, so render them by name.
impl fmt::Debug for GraphDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphDefinition")
            .field("nodes", &self.node_names())
            .field("waves", &self.waves)
            .field("entry", &self.entry)
            .field("terminal", &self.terminal)
            .finish()
    }
}

impl GraphDefinition {
    /// Wave schedule: each inner vec is one concurrently executed wave,
    /// lexicographically ordered.
    #[must_use]
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    #[must_use]
    pub fn terminal(&self) -> &str {
        &self.terminal
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.bodies.len()
    }

    /// Declared dependency names for a node.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.dependencies.get(name).map(Vec::as_slice)
    }

    /// Body registered under a node name.
    #[must_use]
    pub fn body(&self, name: &str) -> Option<Arc<dyn Node>> {
        self.bodies.get(name).cloned()
    }

    /// All node names, lexicographically ordered.
    #[must_use]
    pub fn node_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.bodies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

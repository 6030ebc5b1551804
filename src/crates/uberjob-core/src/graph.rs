//! Core graph data structures: nodes, edges, and scopes
//!
//! A plan is a directed multigraph. Nodes are deferred calls or literal values;
//! edges run from producer to consumer and say *how* the produced value is
//! consumed: as a positional argument, as a keyword argument, or not at all
//! (a pure ordering dependency). Parallel edges between the same pair are
//! allowed - the same producer can be both positional argument 0 and keyword
//! `a` of one call.
//!
//! Node identity is handle-based: a [`NodeRef`] is an arena index plus the id of
//! the plan that owns it, so handles from different plans never compare equal and
//! cross-plan misuse is caught at construction time.

use crate::call::CallFn;
use crate::trace::SymbolicTrace;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

pub(crate) type PlanGraph = StableDiGraph<NodeData, EdgeKind>;

static NEXT_PLAN_ID: AtomicU64 = AtomicU64::new(0);

/// Process-unique identifier of a plan, embedded in every node handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PlanId(u64);

impl PlanId {
    pub(crate) fn next() -> Self {
        Self(NEXT_PLAN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Opaque handle to a node of a specific plan.
///
/// Two handles compare equal only when they name the same node of the same
/// plan; node contents never participate in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub(crate) plan: PlanId,
    pub(crate) index: NodeIndex,
}

impl NodeRef {
    /// A small integer id for diagnostics and rendering.
    pub fn id(&self) -> usize {
        self.index.index()
    }
}

/// The two node variants of a plan.
#[derive(Clone)]
pub enum NodeKind {
    /// An opaque value, available without any execution.
    Literal(Value),
    /// A deferred call; argument values arrive through incoming edges.
    Call(CallFn),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            NodeKind::Call(func) => f.debug_tuple("Call").field(&func.name()).finish(),
        }
    }
}

/// The three edge variants, all directed producer -> consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// The producer is the `index`-th positional argument of the consumer.
    Positional(usize),
    /// The producer is the keyword argument `name` of the consumer.
    Keyword(String),
    /// The producer must complete before the consumer starts; no value flows.
    Dependency,
}

impl EdgeKind {
    /// Whether the edge delivers a value to the consumer.
    pub fn carries_value(&self) -> bool {
        !matches!(self, EdgeKind::Dependency)
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Positional(index) => write!(f, "arg {index}"),
            EdgeKind::Keyword(name) => write!(f, "kw {name}"),
            EdgeKind::Dependency => write!(f, "dep"),
        }
    }
}

/// An ordered tuple of tags grouping nodes in progress and render output.
///
/// Scopes are metadata only; they never affect scheduling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Scope(Vec<String>);

impl Scope {
    pub(crate) fn from_tags(tags: Vec<String>) -> Self {
        Self(tags)
    }

    /// This scope extended with one more tag.
    pub(crate) fn child(&self, tag: &str) -> Self {
        let mut tags = self.0.clone();
        tags.push(tag.to_string());
        Self(tags)
    }

    pub fn tags(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The scope truncated to at most `level` tags, for rendering.
    pub fn truncated(&self, level: usize) -> Self {
        Self(self.0.iter().take(level).cloned().collect())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        write!(f, "{}", self.0.join("/"))
    }
}

/// Payload of a logical plan node.
#[derive(Debug, Clone)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub scope: Scope,
    pub trace: SymbolicTrace,
}

impl NodeData {
    pub(crate) fn display_name(&self) -> String {
        match &self.kind {
            NodeKind::Literal(_) => "literal".to_string(),
            NodeKind::Call(func) => func.name().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_display_and_truncation() {
        let scope = Scope::from_tags(vec!["stage".into(), "load".into(), "csv".into()]);
        assert_eq!(scope.to_string(), "stage/load/csv");
        assert_eq!(scope.truncated(2).to_string(), "stage/load");
        assert_eq!(Scope::default().to_string(), "<root>");
    }

    #[test]
    fn dependency_edges_carry_no_value() {
        assert!(EdgeKind::Positional(0).carries_value());
        assert!(EdgeKind::Keyword("a".into()).carries_value());
        assert!(!EdgeKind::Dependency.carries_value());
    }

    #[test]
    fn plan_ids_are_unique() {
        assert_ne!(PlanId::next(), PlanId::next());
    }
}

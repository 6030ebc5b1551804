//! Progress observation - the contract the scheduler emits through
//!
//! A [`Progress`] observer receives lifecycle callbacks for every node the
//! scheduler admits. Callbacks may arrive from any worker, so implementations
//! must be thread-safe; all methods default to no-ops, so an observer
//! implements only what it cares about. Multiple observers compose - the run
//! options hold a list and the scheduler fans every event out to all of them.
//!
//! Grouping is by *scope*, not node identity: the scheduler refcounts the
//! scopes of admitted nodes and surrounds each group with
//! `scope_entered`/`scope_exited`. Concrete progress UIs live outside the core;
//! [`TracingProgress`] is provided for structured-log visibility.

use crate::error::UberjobError;
use crate::graph::Scope;

/// Identity of a node as seen by observers.
#[derive(Debug, Clone)]
pub struct NodeMeta {
    /// Display name: the callable's fully-qualified name, or `literal`,
    /// `write`, `read`.
    pub name: String,
    /// The node's scope, the progress grouping key.
    pub scope: Scope,
    /// Small integer id, unique within one run.
    pub id: usize,
}

/// Observer of scheduler lifecycle events.
///
/// All callbacks must be thread-safe and cheap; slow observers slow the run.
#[allow(unused_variables)]
pub trait Progress: Send + Sync {
    /// The first node of `scope` was admitted.
    fn scope_entered(&self, scope: &Scope) {}

    /// The last node of `scope` reached a terminal state.
    fn scope_exited(&self, scope: &Scope) {}

    /// The node was admitted to the run.
    fn scheduled(&self, node: &NodeMeta) {}

    /// A worker began evaluating the node.
    fn started(&self, node: &NodeMeta) {}

    /// The node produced a value.
    fn succeeded(&self, node: &NodeMeta) {}

    /// The node failed after exhausting any retry attempts.
    fn failed(&self, node: &NodeMeta, error: &UberjobError) {}

    /// An attempt failed and the worker is about to retry.
    fn retrying(&self, node: &NodeMeta, attempt: usize) {}
}

/// Progress observer that forwards every event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl Progress for TracingProgress {
    fn scope_entered(&self, scope: &Scope) {
        tracing::debug!(scope = %scope, "scope entered");
    }

    fn scope_exited(&self, scope: &Scope) {
        tracing::debug!(scope = %scope, "scope exited");
    }

    fn scheduled(&self, node: &NodeMeta) {
        tracing::debug!(node = %node.name, id = node.id, "node scheduled");
    }

    fn started(&self, node: &NodeMeta) {
        tracing::debug!(node = %node.name, id = node.id, "node started");
    }

    fn succeeded(&self, node: &NodeMeta) {
        tracing::debug!(node = %node.name, id = node.id, "node succeeded");
    }

    fn failed(&self, node: &NodeMeta, error: &UberjobError) {
        tracing::error!(node = %node.name, id = node.id, error = %error, "node failed");
    }

    fn retrying(&self, node: &NodeMeta, attempt: usize) {
        tracing::warn!(node = %node.name, id = node.id, attempt, "node retrying");
    }
}

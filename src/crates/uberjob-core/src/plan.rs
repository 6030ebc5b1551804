//! Plan builder - symbolic call graphs under construction
//!
//! A [`Plan`] is a mutable multidigraph of deferred calls and literal values,
//! built single-threaded by user code and treated as read-only once it is run or
//! rendered. The builder operations are:
//!
//! - [`lit`](Plan::lit) - add a literal value
//! - [`call`](Plan::call) / [`call_kw`](Plan::call_kw) - add a deferred call;
//!   argument binding against the callable's signature is validated *eagerly*,
//!   so a plan that builds without error never fails at run time on shape
//! - [`add_dependency`](Plan::add_dependency) - pure ordering edge between two
//!   existing nodes
//! - [`gather`](Plan::gather) - fold a structured value containing nodes into a
//!   single node (see [`crate::gather`])
//! - [`scoped`](Plan::scoped) - run a closure with an extra scope tag pushed;
//!   the tag pops on every exit path of the closure
//!
//! # Examples
//!
//! ```rust,ignore
//! use uberjob_core::{CallFn, Plan, Signature};
//! use serde_json::json;
//!
//! let add = CallFn::from_sync("demo::add", Signature::positional(["x", "y"]), |inv| {
//!     let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
//!     let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
//!     Ok(json!(x + y))
//! });
//!
//! let mut plan = Plan::new();
//! let (x, y) = plan.scoped("inputs", |plan| {
//!     (plan.lit(1), plan.lit(2))
//! });
//! let z = plan.call(&add, [x.into(), y.into()])?;
//! ```
//!
//! Cycles can only be introduced through `add_dependency`; they are tolerated
//! during construction and rejected when the plan is run.

use crate::call::CallFn;
use crate::error::{Result, UberjobError};
use crate::gather;
use crate::gather::Symbolic;
use crate::graph::{EdgeKind, NodeData, NodeKind, NodeRef, PlanGraph, PlanId, Scope};
use crate::trace::SymbolicTrace;
use serde_json::Value;

/// A symbolic call graph under construction.
pub struct Plan {
    pub(crate) id: PlanId,
    pub(crate) graph: PlanGraph,
    scope_stack: Vec<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self {
            id: PlanId::next(),
            graph: PlanGraph::default(),
            scope_stack: Vec::new(),
        }
    }

    /// Add a literal value node.
    pub fn lit(&mut self, value: impl Into<Value>) -> NodeRef {
        let index = self.graph.add_node(NodeData {
            kind: NodeKind::Literal(value.into()),
            scope: self.current_scope(),
            trace: SymbolicTrace::capture(),
        });
        NodeRef {
            plan: self.id,
            index,
        }
    }

    /// Add a deferred call with positional arguments only.
    pub fn call<I>(&mut self, func: &CallFn, args: I) -> Result<NodeRef>
    where
        I: IntoIterator<Item = Symbolic>,
    {
        self.call_kw(func, args, std::iter::empty::<(String, Symbolic)>())
    }

    /// Add a deferred call with positional and keyword arguments.
    ///
    /// Arguments are gathered, so containers holding nodes are accepted
    /// anywhere a plain value is.
    pub fn call_kw<A, K, KW>(&mut self, func: &CallFn, args: A, kwargs: KW) -> Result<NodeRef>
    where
        A: IntoIterator<Item = Symbolic>,
        K: Into<String>,
        KW: IntoIterator<Item = (K, Symbolic)>,
    {
        let args: Vec<Symbolic> = args.into_iter().collect();
        let kwargs: Vec<(String, Symbolic)> = kwargs
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        let keyword_names: Vec<&str> = kwargs.iter().map(|(name, _)| name.as_str()).collect();
        func.signature()
            .bind(args.len(), &keyword_names)
            .map_err(|reason| UberjobError::signature_mismatch(func.name(), reason))?;

        let mut arg_nodes = Vec::with_capacity(args.len());
        for arg in args {
            arg_nodes.push(self.gather(arg)?);
        }
        let mut kwarg_nodes = Vec::with_capacity(kwargs.len());
        for (name, value) in kwargs {
            let node = self.gather(value)?;
            kwarg_nodes.push((name, node));
        }

        Ok(self.add_call_node(func.clone(), arg_nodes, kwarg_nodes))
    }

    /// Add a pure ordering edge: `source` completes before `target` starts.
    pub fn add_dependency(&mut self, source: NodeRef, target: NodeRef) -> Result<()> {
        self.check_owned(source)?;
        self.check_owned(target)?;
        self.graph
            .add_edge(source.index, target.index, EdgeKind::Dependency);
        Ok(())
    }

    /// Fold a structured value into a single node.
    ///
    /// Existing nodes pass through; node-free structures collapse to literals;
    /// containers holding nodes become reconstructor calls over their gathered
    /// children.
    pub fn gather(&mut self, value: impl Into<Symbolic>) -> Result<NodeRef> {
        match value.into() {
            Symbolic::Node(node) => {
                self.check_owned(node)?;
                Ok(node)
            }
            Symbolic::Value(value) => Ok(self.lit(value)),
            structure if !structure.contains_node() => {
                let value = structure.into_value()?;
                Ok(self.lit(value))
            }
            Symbolic::Seq(children) => self.gather_container(gather::seq_fn(), children),
            Symbolic::Tuple(children) => self.gather_container(gather::tuple_fn(), children),
            Symbolic::Set(children) => self.gather_container(gather::set_fn(), children),
            Symbolic::Map(pairs) => {
                let mut children = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in pairs {
                    children.push(key);
                    children.push(value);
                }
                self.gather_container(gather::map_fn(), children)
            }
        }
    }

    /// Run `body` with `tag` pushed onto the scope stack.
    ///
    /// Nodes created inside the closure carry the extended scope; the tag is
    /// popped when the closure returns.
    pub fn scoped<R>(&mut self, tag: impl Into<String>, body: impl FnOnce(&mut Self) -> R) -> R {
        self.scope_stack.push(tag.into());
        let result = body(self);
        self.scope_stack.pop();
        result
    }

    /// Number of nodes in the plan.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Handles of every node, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeRef> + '_ {
        self.graph.node_indices().map(|index| NodeRef {
            plan: self.id,
            index,
        })
    }

    /// The kind of a node, when it belongs to this plan.
    pub fn kind(&self, node: NodeRef) -> Option<&NodeKind> {
        if node.plan != self.id {
            return None;
        }
        self.graph.node_weight(node.index).map(|data| &data.kind)
    }

    /// The scope of a node, when it belongs to this plan.
    pub fn scope(&self, node: NodeRef) -> Option<&Scope> {
        if node.plan != self.id {
            return None;
        }
        self.graph.node_weight(node.index).map(|data| &data.scope)
    }

    fn current_scope(&self) -> Scope {
        Scope::from_tags(self.scope_stack.clone())
    }

    fn check_owned(&self, node: NodeRef) -> Result<()> {
        if node.plan != self.id || self.graph.node_weight(node.index).is_none() {
            return Err(UberjobError::ForeignNode);
        }
        Ok(())
    }

    fn gather_container(&mut self, func: CallFn, children: Vec<Symbolic>) -> Result<NodeRef> {
        let mut nodes = Vec::with_capacity(children.len());
        for child in children {
            nodes.push(self.gather(child)?);
        }
        Ok(self.add_call_node(func, nodes, Vec::new()))
    }

    /// Add a call node with pre-gathered arguments. The callable's name is
    /// appended to the node's scope for observer grouping.
    pub(crate) fn add_call_node(
        &mut self,
        func: CallFn,
        args: Vec<NodeRef>,
        kwargs: Vec<(String, NodeRef)>,
    ) -> NodeRef {
        let scope = self.current_scope().child(func.name());
        let index = self.graph.add_node(NodeData {
            kind: NodeKind::Call(func),
            scope,
            trace: SymbolicTrace::capture(),
        });
        for (position, arg) in args.iter().enumerate() {
            self.graph
                .add_edge(arg.index, index, EdgeKind::Positional(position));
        }
        for (name, node) in kwargs {
            self.graph
                .add_edge(node.index, index, EdgeKind::Keyword(name));
        }
        NodeRef {
            plan: self.id,
            index,
        }
    }
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::Signature;
    use petgraph::Direction;
    use serde_json::json;

    fn add_fn() -> CallFn {
        CallFn::from_sync("test::add", Signature::positional(["x", "y"]), |inv| {
            let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
            let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
            Ok(json!(x + y))
        })
    }

    #[test]
    fn literals_carry_the_current_scope() {
        let mut plan = Plan::new();
        let outside = plan.lit(1);
        let inside = plan.scoped("stage", |plan| plan.lit(2));

        assert!(plan.scope(outside).unwrap().is_empty());
        assert_eq!(plan.scope(inside).unwrap().tags(), ["stage"]);
        // The tag popped when the closure returned.
        let after = plan.lit(3);
        assert!(plan.scope(after).unwrap().is_empty());
    }

    #[test]
    fn call_appends_the_function_name_to_the_scope() {
        let mut plan = Plan::new();
        let node = plan
            .scoped("stage", |plan| plan.call(&add_fn(), [1.into(), 2.into()]))
            .unwrap();
        assert_eq!(plan.scope(node).unwrap().tags(), ["stage", "test::add"]);
    }

    #[test]
    fn call_wires_positional_and_keyword_edges() {
        let mut plan = Plan::new();
        let x = plan.lit(1);
        let node = plan
            .call_kw(&add_fn(), [Symbolic::from(x)], [("y", Symbolic::from(2))])
            .unwrap();

        let incoming: Vec<EdgeKind> = plan
            .graph
            .edges_directed(node.index, Direction::Incoming)
            .map(|edge| edge.weight().clone())
            .collect();
        assert_eq!(incoming.len(), 2);
        assert!(incoming.contains(&EdgeKind::Positional(0)));
        assert!(incoming.contains(&EdgeKind::Keyword("y".to_string())));
    }

    #[test]
    fn the_same_node_can_bind_twice() {
        let sig = Signature::positional(["x", "y"]);
        let echo = CallFn::from_sync("test::echo", sig, |inv| Ok(json!(inv.args)));

        let mut plan = Plan::new();
        let x = plan.lit(1);
        let node = plan
            .call_kw(&echo, [Symbolic::from(x)], [("y", Symbolic::from(x))])
            .unwrap();

        let incoming = plan
            .graph
            .edges_directed(node.index, Direction::Incoming)
            .count();
        assert_eq!(incoming, 2);
    }

    #[test]
    fn signature_mismatch_is_eager() {
        let mut plan = Plan::new();
        let error = plan.call(&add_fn(), [1.into()]).unwrap_err();
        assert!(matches!(error, UberjobError::SignatureMismatch { .. }));
        // Binding is checked before any argument is gathered.
        assert_eq!(plan.node_count(), 0);
    }

    #[test]
    fn cross_plan_nodes_are_rejected() {
        let mut plan_a = Plan::new();
        let mut plan_b = Plan::new();
        let a = plan_a.lit(1);
        let b = plan_b.lit(2);

        assert!(matches!(
            plan_a.add_dependency(a, b),
            Err(UberjobError::ForeignNode)
        ));
        assert!(matches!(
            plan_a.call(&add_fn(), [b.into(), 2.into()]),
            Err(UberjobError::ForeignNode)
        ));
    }

    #[test]
    fn gather_returns_existing_nodes_unchanged() {
        let mut plan = Plan::new();
        let x = plan.lit(1);
        assert_eq!(plan.gather(x).unwrap(), x);
        assert_eq!(plan.node_count(), 1);
    }

    #[test]
    fn gather_collapses_node_free_structures() {
        let mut plan = Plan::new();
        let node = plan
            .gather(Symbolic::Seq(vec![1.into(), 2.into()]))
            .unwrap();
        assert!(matches!(
            plan.kind(node),
            Some(NodeKind::Literal(value)) if *value == json!([1, 2])
        ));
        assert_eq!(plan.node_count(), 1);
    }

    #[test]
    fn gather_builds_reconstructor_calls_around_nodes() {
        let mut plan = Plan::new();
        let x = plan.lit(1);
        let node = plan
            .gather(Symbolic::Seq(vec![x.into(), 2.into()]))
            .unwrap();

        assert!(matches!(
            plan.kind(node),
            Some(NodeKind::Call(func)) if func.name().ends_with("::seq")
        ));
        let incoming = plan
            .graph
            .edges_directed(node.index, Direction::Incoming)
            .count();
        assert_eq!(incoming, 2);
    }

    #[test]
    fn gather_interleaves_map_keys_and_values() {
        let mut plan = Plan::new();
        let v = plan.lit(10);
        let node = plan
            .gather(Symbolic::Map(vec![("total".into(), v.into())]))
            .unwrap();

        assert!(matches!(
            plan.kind(node),
            Some(NodeKind::Call(func)) if func.name().ends_with("::map")
        ));
        let incoming = plan
            .graph
            .edges_directed(node.index, Direction::Incoming)
            .count();
        assert_eq!(incoming, 2);
    }

    #[test]
    fn dependencies_may_form_cycles_during_construction() {
        let mut plan = Plan::new();
        let a = plan.lit(1);
        let b = plan.lit(2);
        plan.add_dependency(a, b).unwrap();
        plan.add_dependency(b, a).unwrap();
        // Rejection happens at run time, not here.
        assert_eq!(plan.node_count(), 2);
    }
}

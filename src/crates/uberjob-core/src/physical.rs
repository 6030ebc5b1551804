//! Physical-plan transformer
//!
//! Rewrites the user's *logical* plan into the *physical* plan the scheduler
//! executes, using the registry bindings:
//!
//! 1. the logical graph is copied node for node, keeping a logical-to-physical
//!    map for diagnostics;
//! 2. every stored node gains a write-then-read pair: a write call taking the
//!    producer as its single positional argument, and a read call depending on
//!    the write; every consumer of the producer is re-pointed at the read, so
//!    downstream observes exactly what the store round-trips;
//! 3. every sourced placeholder becomes a read call, retaining any dependency
//!    edges the user attached;
//! 4. when an output is requested, nodes not backward-reachable from it are
//!    pruned;
//! 5. a directed cycle anywhere in the result (dependency edges included) is an
//!    error.

use crate::error::{Result, UberjobError};
use crate::call::CallFn;
use crate::graph::{EdgeKind, NodeKind, NodeRef, Scope};
use crate::plan::Plan;
use crate::registry::{Binding, Registry};
use crate::trace::SymbolicTrace;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};
use petgraph::Direction;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uberjob_stores::ValueStore;

pub(crate) type PhysGraph = StableDiGraph<PhysNode, EdgeKind>;

/// What a physical node does when evaluated.
#[derive(Debug, Clone)]
pub(crate) enum PhysKind {
    Literal(Value),
    Call(CallFn),
    Write(Arc<dyn ValueStore>),
    Read(Arc<dyn ValueStore>),
}

/// Payload of a physical node.
#[derive(Debug, Clone)]
pub(crate) struct PhysNode {
    pub kind: PhysKind,
    pub scope: Scope,
    pub trace: SymbolicTrace,
    pub logical: Option<NodeRef>,
    pub name: String,
}

/// Physical image of one logical node.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Image {
    Plain(NodeIndex),
    Stored { write: NodeIndex, read: NodeIndex },
}

impl Image {
    /// The node consumers of the logical original should attach to.
    pub(crate) fn consumer_side(&self) -> NodeIndex {
        match self {
            Image::Plain(index) => *index,
            Image::Stored { read, .. } => *read,
        }
    }
}

/// The executable graph derived from a plan, a registry, and a requested output.
#[derive(Debug)]
pub struct PhysicalPlan {
    pub(crate) graph: PhysGraph,
    pub(crate) images: HashMap<NodeRef, Image>,
    pub(crate) output: Option<NodeIndex>,
}

impl PhysicalPlan {
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Display names of every node, for inspection after a dry run.
    pub fn node_names(&self) -> Vec<String> {
        self.graph
            .node_indices()
            .map(|index| self.graph[index].name.clone())
            .collect()
    }

    /// Number of user call nodes (literals, writes, and reads excluded).
    pub fn call_count(&self) -> usize {
        self.count(|kind| matches!(kind, PhysKind::Call(_)))
    }

    /// Number of store write nodes.
    pub fn write_count(&self) -> usize {
        self.count(|kind| matches!(kind, PhysKind::Write(_)))
    }

    /// Number of store read nodes.
    pub fn read_count(&self) -> usize {
        self.count(|kind| matches!(kind, PhysKind::Read(_)))
    }

    fn count(&self, predicate: impl Fn(&PhysKind) -> bool) -> usize {
        self.graph
            .node_indices()
            .filter(|index| predicate(&self.graph[*index].kind))
            .count()
    }

    /// Drop every node that cannot reach one of `roots` (the roots included).
    pub(crate) fn prune_to(&mut self, roots: &[NodeIndex]) {
        let mut keep: HashSet<NodeIndex> = HashSet::new();
        let mut stack: Vec<NodeIndex> = roots
            .iter()
            .copied()
            .filter(|index| self.graph.contains_node(*index))
            .collect();
        while let Some(index) = stack.pop() {
            if !keep.insert(index) {
                continue;
            }
            for edge in self.graph.edges_directed(index, Direction::Incoming) {
                stack.push(edge.source());
            }
        }
        let doomed: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|index| !keep.contains(index))
            .collect();
        for index in doomed {
            self.graph.remove_node(index);
        }
    }

    /// Fail if the graph has a directed cycle, naming one member.
    pub(crate) fn check_acyclic(&self) -> Result<()> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => {
                let node = self
                    .graph
                    .node_weight(cycle.node_id())
                    .map(|data| data.name.clone())
                    .unwrap_or_else(|| "<unknown>".to_string());
                Err(UberjobError::CycleDetected { node })
            }
        }
    }

    /// Topological order of the current graph. Only valid after
    /// [`check_acyclic`](Self::check_acyclic) has passed.
    pub(crate) fn topo_order(&self) -> Vec<NodeIndex> {
        petgraph::algo::toposort(&self.graph, None).unwrap_or_default()
    }
}

/// Build the physical plan for `plan` under `registry`, pruned to `output`.
pub(crate) fn build_physical(
    plan: &Plan,
    registry: Option<&Registry>,
    output: Option<NodeRef>,
) -> Result<PhysicalPlan> {
    if let Some(node) = output {
        if node.plan != plan.id || plan.graph.node_weight(node.index).is_none() {
            return Err(UberjobError::UnknownOutput);
        }
    }

    let mut graph = PhysGraph::default();
    let mut images: HashMap<NodeRef, Image> = HashMap::new();

    for index in plan.graph.node_indices() {
        let logical = NodeRef {
            plan: plan.id,
            index,
        };
        let data = &plan.graph[index];
        let kind = match &data.kind {
            NodeKind::Literal(value) => PhysKind::Literal(value.clone()),
            NodeKind::Call(func) => PhysKind::Call(func.clone()),
        };
        let physical = graph.add_node(PhysNode {
            kind,
            scope: data.scope.clone(),
            trace: data.trace.clone(),
            logical: Some(logical),
            name: data.display_name(),
        });
        images.insert(logical, Image::Plain(physical));
    }

    for edge in plan.graph.edge_references() {
        let source = images[&NodeRef {
            plan: plan.id,
            index: edge.source(),
        }]
        .consumer_side();
        let target = images[&NodeRef {
            plan: plan.id,
            index: edge.target(),
        }]
        .consumer_side();
        graph.add_edge(source, target, edge.weight().clone());
    }

    if let Some(registry) = registry {
        for (logical, binding) in registry.bindings() {
            if logical.plan != plan.id {
                return Err(UberjobError::ForeignNode);
            }
            let image = images[&logical].consumer_side();
            match binding {
                Binding::Stored(store) => {
                    let scope = graph[image].scope.clone();
                    let trace = graph[image].trace.clone();

                    let outgoing: Vec<(petgraph::stable_graph::EdgeIndex, NodeIndex, EdgeKind)> =
                        graph
                            .edges_directed(image, Direction::Outgoing)
                            .map(|edge| (edge.id(), edge.target(), edge.weight().clone()))
                            .collect();

                    let write = graph.add_node(PhysNode {
                        kind: PhysKind::Write(store.clone()),
                        scope: scope.clone(),
                        trace: trace.clone(),
                        logical: Some(logical),
                        name: "write".to_string(),
                    });
                    graph.add_edge(image, write, EdgeKind::Positional(0));

                    let read = graph.add_node(PhysNode {
                        kind: PhysKind::Read(store.clone()),
                        scope,
                        trace,
                        logical: Some(logical),
                        name: "read".to_string(),
                    });
                    graph.add_edge(write, read, EdgeKind::Dependency);

                    for (edge_id, target, kind) in outgoing {
                        graph.remove_edge(edge_id);
                        graph.add_edge(read, target, kind);
                    }

                    images.insert(logical, Image::Stored { write, read });
                }
                Binding::Sourced(store) => {
                    let node = &mut graph[image];
                    node.kind = PhysKind::Read(store.clone());
                    node.name = "read".to_string();
                }
            }
        }
    }

    let output_index = output.map(|node| images[&node].consumer_side());
    let mut physical = PhysicalPlan {
        graph,
        images,
        output: output_index,
    };

    if let Some(root) = output_index {
        physical.prune_to(&[root]);
    }
    physical.check_acyclic()?;
    Ok(physical)
}

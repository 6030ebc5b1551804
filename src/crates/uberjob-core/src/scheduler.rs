//! Parallel execution of the physical plan.
//!
//! A single coordinator owns all mutable state - the ready queue, per-node
//! states, result slots - and dispatches node evaluations into a worker pool
//! bounded by `max_workers`. Workers share nothing: argument values are cloned
//! out of the result slots before dispatch, and each result slot is written
//! exactly once. Any edge establishes happens-before between producer and
//! consumer; independent nodes run in no particular order.
//!
//! Failure handling: a failed node's successors are recursively skipped, other
//! branches continue, and once recorded errors exceed the limit no new nodes
//! are admitted while in-flight work runs to completion. The first recorded
//! error - first in coordinator arrival order - is what the caller sees,
//! wrapped with the failing node's identity and symbolic traceback; observers
//! see them all.

use crate::call::Invocation;
use crate::error::{CallError, Result, UberjobError};
use crate::executor::{execute_with_retry, WorkUnit};
use crate::graph::{EdgeKind, Scope};
use crate::physical::{PhysGraph, PhysKind, PhysicalPlan};
use crate::progress::{NodeMeta, Progress};
use crate::run::RunOptions;
use futures::FutureExt;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|workers| workers.get())
        .unwrap_or(4)
}

struct Coordinator {
    graph: PhysGraph,
    output: Option<NodeIndex>,
    metas: HashMap<NodeIndex, Arc<NodeMeta>>,
    state: HashMap<NodeIndex, NodeState>,
    remaining: HashMap<NodeIndex, usize>,
    consumers: HashMap<NodeIndex, usize>,
    results: HashMap<NodeIndex, Value>,
    ready: VecDeque<NodeIndex>,
    errors: Vec<(NodeIndex, UberjobError)>,
    scope_counts: HashMap<Scope, usize>,
    observers: Vec<Arc<dyn Progress>>,
}

impl Coordinator {
    fn new(plan: PhysicalPlan, observers: Vec<Arc<dyn Progress>>) -> Self {
        let PhysicalPlan { graph, output, .. } = plan;
        let mut coordinator = Self {
            metas: HashMap::with_capacity(graph.node_count()),
            state: HashMap::with_capacity(graph.node_count()),
            remaining: HashMap::with_capacity(graph.node_count()),
            consumers: HashMap::with_capacity(graph.node_count()),
            results: HashMap::new(),
            ready: VecDeque::new(),
            errors: Vec::new(),
            scope_counts: HashMap::new(),
            observers,
            graph,
            output,
        };
        coordinator.admit_all();
        coordinator
    }

    fn admit_all(&mut self) {
        for index in self.graph.node_indices().collect::<Vec<_>>() {
            let node = &self.graph[index];
            let meta = Arc::new(NodeMeta {
                name: node.name.clone(),
                scope: node.scope.clone(),
                id: index.index(),
            });

            let incoming = self
                .graph
                .edges_directed(index, Direction::Incoming)
                .count();
            let mut outgoing_values = self
                .graph
                .edges_directed(index, Direction::Outgoing)
                .filter(|edge| edge.weight().carries_value())
                .count();
            if self.output == Some(index) {
                outgoing_values += 1;
            }

            self.remaining.insert(index, incoming);
            self.consumers.insert(index, outgoing_values);
            if incoming == 0 {
                self.state.insert(index, NodeState::Ready);
                self.ready.push_back(index);
            } else {
                self.state.insert(index, NodeState::Pending);
            }

            self.enter_scope(meta.scope.clone());
            for observer in &self.observers {
                observer.scheduled(&meta);
            }
            self.metas.insert(index, meta);
        }
    }

    fn enter_scope(&mut self, scope: Scope) {
        let count = self.scope_counts.entry(scope.clone()).or_insert(0);
        if *count == 0 {
            for observer in &self.observers {
                observer.scope_entered(&scope);
            }
        }
        *count += 1;
    }

    fn exit_scope(&mut self, scope: &Scope) {
        let emptied = match self.scope_counts.get_mut(scope) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => false,
        };
        if emptied {
            self.scope_counts.remove(scope);
            for observer in &self.observers {
                observer.scope_exited(scope);
            }
        }
    }

    /// Clone the node's argument values out of the result slots and release
    /// slots whose last consumer this was.
    fn collect_invocation(&mut self, index: NodeIndex) -> Result<Invocation> {
        let mut positional: BTreeMap<usize, Value> = BTreeMap::new();
        let mut kwargs: HashMap<String, Value> = HashMap::new();
        let mut sources: Vec<NodeIndex> = Vec::new();

        for edge in self.graph.edges_directed(index, Direction::Incoming) {
            let source = edge.source();
            match edge.weight() {
                EdgeKind::Positional(position) => {
                    let value = self
                        .results
                        .get(&source)
                        .cloned()
                        .ok_or_else(|| UberjobError::execution("missing upstream result"))?;
                    positional.insert(*position, value);
                    sources.push(source);
                }
                EdgeKind::Keyword(name) => {
                    let value = self
                        .results
                        .get(&source)
                        .cloned()
                        .ok_or_else(|| UberjobError::execution("missing upstream result"))?;
                    kwargs.insert(name.clone(), value);
                    sources.push(source);
                }
                EdgeKind::Dependency => {}
            }
        }

        for source in sources {
            if let Some(count) = self.consumers.get_mut(&source) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    self.results.remove(&source);
                }
            }
        }

        Ok(Invocation {
            args: positional.into_values().collect(),
            kwargs,
        })
    }

    fn build_work(&mut self, index: NodeIndex) -> Result<WorkUnit> {
        let work: WorkUnit = match self.graph[index].kind.clone() {
            PhysKind::Literal(value) => Arc::new(move || {
                let value = value.clone();
                Box::pin(async move { Ok(value) })
            }),
            PhysKind::Call(func) => {
                let invocation = self.collect_invocation(index)?;
                Arc::new(move || func.invoke(invocation.clone()))
            }
            PhysKind::Write(store) => {
                let invocation = self.collect_invocation(index)?;
                let value = invocation
                    .args
                    .into_iter()
                    .next()
                    .ok_or_else(|| UberjobError::execution("write node has no input value"))?;
                Arc::new(move || {
                    let store = store.clone();
                    let value = value.clone();
                    Box::pin(async move {
                        store.write(&value).await?;
                        Ok(Value::Null)
                    })
                })
            }
            PhysKind::Read(store) => Arc::new(move || {
                let store = store.clone();
                Box::pin(async move { Ok(store.read().await?) })
            }),
        };
        Ok(work)
    }

    fn on_success(&mut self, index: NodeIndex, value: Value, halted: bool) {
        self.state.insert(index, NodeState::Succeeded);
        let meta = self.metas[&index].clone();
        for observer in &self.observers {
            observer.succeeded(&meta);
        }
        self.exit_scope(&meta.scope);

        if self.consumers.get(&index).copied().unwrap_or(0) > 0 {
            self.results.insert(index, value);
        }

        let successors: Vec<NodeIndex> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .map(|edge| edge.target())
            .collect();
        for target in successors {
            if self.state.get(&target) != Some(&NodeState::Pending) {
                continue;
            }
            if let Some(count) = self.remaining.get_mut(&target) {
                *count -= 1;
                if *count == 0 && !halted {
                    self.state.insert(target, NodeState::Ready);
                    self.ready.push_back(target);
                }
            }
        }
    }

    fn on_failure(&mut self, index: NodeIndex, error: UberjobError) {
        self.state.insert(index, NodeState::Failed);
        let meta = self.metas[&index].clone();
        for observer in &self.observers {
            observer.failed(&meta, &error);
        }
        self.exit_scope(&meta.scope);
        self.errors.push((index, error));
        self.skip_downstream(index);
    }

    fn skip_downstream(&mut self, failed: NodeIndex) {
        let mut stack: Vec<NodeIndex> = self
            .graph
            .edges_directed(failed, Direction::Outgoing)
            .map(|edge| edge.target())
            .collect();
        while let Some(index) = stack.pop() {
            match self.state.get(&index) {
                Some(NodeState::Pending) | Some(NodeState::Ready) => {}
                _ => continue,
            }
            self.state.insert(index, NodeState::Skipped);
            let scope = self.metas[&index].scope.clone();
            self.exit_scope(&scope);
            stack.extend(
                self.graph
                    .edges_directed(index, Direction::Outgoing)
                    .map(|edge| edge.target()),
            );
        }
    }

    /// Mark nodes never admitted after a halt as skipped, for scope accounting.
    fn skip_leftovers(&mut self) {
        let leftovers: Vec<NodeIndex> = self
            .state
            .iter()
            .filter(|(_, state)| matches!(state, NodeState::Pending | NodeState::Ready))
            .map(|(index, _)| *index)
            .collect();
        for index in leftovers {
            self.state.insert(index, NodeState::Skipped);
            let scope = self.metas[&index].scope.clone();
            self.exit_scope(&scope);
        }
    }

    fn first_error(&mut self) -> Option<UberjobError> {
        if self.errors.is_empty() {
            return None;
        }
        let (index, error) = self.errors.remove(0);
        let meta = &self.metas[&index];
        let trace = self
            .graph
            .node_weight(index)
            .map(|node| node.trace.clone())
            .unwrap_or_default();
        Some(UberjobError::from(Box::new(CallError {
            node: meta.name.clone(),
            scope: meta.scope.clone(),
            trace,
            source: Box::new(error),
        })))
    }
}

/// Execute a physical plan and return the requested output's value.
pub(crate) async fn execute(plan: PhysicalPlan, options: &RunOptions) -> Result<Option<Value>> {
    let max_workers = options.max_workers.unwrap_or_else(default_workers).max(1);
    let retry = options.retry.clone();
    let mut coordinator = Coordinator::new(plan, options.progress.clone());
    let mut running: JoinSet<(NodeIndex, Result<Value>)> = JoinSet::new();
    let mut halted = false;

    tracing::debug!(
        nodes = coordinator.graph.node_count(),
        max_workers,
        "starting plan execution"
    );

    loop {
        while running.len() < max_workers && !halted {
            let Some(index) = coordinator.ready.pop_front() else {
                break;
            };
            if coordinator.state.get(&index) != Some(&NodeState::Ready) {
                continue;
            }

            let work = coordinator.build_work(index)?;
            coordinator.state.insert(index, NodeState::Running);
            let meta = coordinator.metas[&index].clone();
            for observer in &coordinator.observers {
                observer.started(&meta);
            }

            let observers = coordinator.observers.clone();
            let retry = retry.clone();
            running.spawn(async move {
                let outcome =
                    AssertUnwindSafe(execute_with_retry(&work, retry.as_ref(), &meta, &observers))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(UberjobError::execution("node evaluation panicked"))
                        });
                (index, outcome)
            });
        }

        if running.is_empty() {
            break;
        }
        let Some(joined) = running.join_next().await else {
            break;
        };
        let Ok((index, outcome)) = joined else {
            continue;
        };

        match outcome {
            Ok(value) => coordinator.on_success(index, value, halted),
            Err(error) => {
                coordinator.on_failure(index, error);
                if let Some(limit) = options.max_errors {
                    if coordinator.errors.len() > limit && !halted {
                        halted = true;
                        tracing::warn!(
                            errors = coordinator.errors.len(),
                            limit,
                            "error limit exceeded, finishing in-flight work only"
                        );
                    }
                }
            }
        }
    }

    coordinator.skip_leftovers();

    if let Some(error) = coordinator.first_error() {
        return Err(error);
    }
    Ok(coordinator
        .output
        .and_then(|index| coordinator.results.remove(&index)))
}

//! Staleness analysis over the physical plan
//!
//! Decides, immediately before scheduling, which stored values can be reused.
//! Every read node's store is asked for its modified time (concurrently); times
//! then propagate along the dependency DAG in topological order, with read nodes
//! opaque and literal/call nodes transparent. A read is *fresh* when its own
//! value exists (and is not older than `fresh_time`) and no read reachable as a
//! dependency ancestor is newer - equal timestamps count as fresh, and times in
//! the future are trusted.
//!
//! Fresh reads are rewritten instead of executed upstream: the paired write is
//! elided, the read loses its incoming edges, and the graph is re-pruned so
//! producers that only fed elided writes do not run. Stale reads keep their
//! incoming edges, which is what forces the paired write (or, for sourced
//! reads, any preparatory dependency) to run first.

use crate::error::Result;
use crate::physical::{PhysKind, PhysicalPlan};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use petgraph::stable_graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::sync::Arc;
use uberjob_stores::ValueStore;

/// The newest store time visible through a node's ancestors.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Upstream {
    /// No stored ancestor at all.
    None,
    /// Newest ancestor store time.
    Time(DateTime<Utc>),
    /// Some ancestor store is absent, so everything downstream is stale.
    Missing,
}

impl Upstream {
    fn merge(self, other: Upstream) -> Upstream {
        match (self, other) {
            (Upstream::Missing, _) | (_, Upstream::Missing) => Upstream::Missing,
            (Upstream::Time(a), Upstream::Time(b)) => Upstream::Time(a.max(b)),
            (Upstream::Time(t), Upstream::None) | (Upstream::None, Upstream::Time(t)) => {
                Upstream::Time(t)
            }
            (Upstream::None, Upstream::None) => Upstream::None,
        }
    }

    fn from_leaf(time: Option<DateTime<Utc>>) -> Upstream {
        match time {
            Some(time) => Upstream::Time(time),
            None => Upstream::Missing,
        }
    }
}

/// Apply staleness rewrites to `plan` in place.
pub(crate) async fn apply(
    plan: &mut PhysicalPlan,
    fresh_time: Option<DateTime<Utc>>,
) -> Result<()> {
    let reads: Vec<(NodeIndex, Arc<dyn ValueStore>)> = plan
        .graph
        .node_indices()
        .filter_map(|index| match &plan.graph[index].kind {
            PhysKind::Read(store) => Some((index, store.clone())),
            _ => None,
        })
        .collect();
    if reads.is_empty() {
        return Ok(());
    }

    let times = try_join_all(reads.iter().map(|(_, store)| store.get_modified_time())).await?;
    let mtimes: HashMap<NodeIndex, Option<DateTime<Utc>>> = reads
        .iter()
        .zip(times)
        .map(|((index, _), time)| {
            let time = match fresh_time {
                Some(cutoff) => time.filter(|time| *time >= cutoff),
                None => time,
            };
            (*index, time)
        })
        .collect();

    // Newest store time among each node's dependency ancestors, reads opaque.
    let mut upstream: HashMap<NodeIndex, Upstream> = HashMap::new();
    for index in plan.topo_order() {
        let mut acc = Upstream::None;
        for edge in plan.graph.edges_directed(index, Direction::Incoming) {
            let pred = edge.source();
            let contribution = if mtimes.contains_key(&pred) {
                Upstream::from_leaf(mtimes[&pred])
            } else {
                upstream.get(&pred).copied().unwrap_or(Upstream::None)
            };
            acc = acc.merge(contribution);
        }
        upstream.insert(index, acc);
    }

    let fresh: Vec<NodeIndex> = reads
        .iter()
        .filter_map(|(index, _)| {
            let own = mtimes[index]?;
            let usable = match upstream.get(index).copied().unwrap_or(Upstream::None) {
                Upstream::Missing => false,
                Upstream::Time(newest) => newest <= own,
                Upstream::None => true,
            };
            usable.then_some(*index)
        })
        .collect();
    if fresh.is_empty() {
        return Ok(());
    }
    tracing::debug!(fresh = fresh.len(), reads = reads.len(), "reusing stored values");

    // Retention roots for the re-prune: the requested output, or the sinks the
    // plan had before any elision.
    let roots: Vec<NodeIndex> = match plan.output {
        Some(output) => vec![output],
        None => plan
            .graph
            .node_indices()
            .filter(|index| {
                plan.graph
                    .edges_directed(*index, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .collect(),
    };

    for read in fresh.iter().copied() {
        let incoming: Vec<(petgraph::stable_graph::EdgeIndex, NodeIndex)> = plan
            .graph
            .edges_directed(read, Direction::Incoming)
            .map(|edge| (edge.id(), edge.source()))
            .collect();
        for (edge, pred) in incoming {
            if matches!(plan.graph[pred].kind, PhysKind::Write(_)) {
                plan.graph.remove_node(pred);
            } else {
                plan.graph.remove_edge(edge);
            }
        }
    }

    plan.prune_to(&roots);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallFn;
    use crate::physical::build_physical;
    use crate::plan::Plan;
    use crate::registry::Registry;
    use crate::signature::Signature;
    use chrono::TimeZone;
    use serde_json::json;
    use uberjob_stores::InMemoryStore;

    fn add_fn() -> CallFn {
        CallFn::from_sync("test::add", Signature::positional(["x", "y"]), |inv| {
            let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
            let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
            Ok(json!(x + y))
        })
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    async fn filled(value: i64, stamp: DateTime<Utc>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.write(&json!(value)).await.unwrap();
        store.set_modified_time(stamp);
        store
    }

    #[tokio::test]
    async fn fresh_pairs_lose_their_writes_and_inputs() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let z = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        registry
            .add(z, filled(3, at(100)).await)
            .unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, None).await.unwrap();

        // Only the read survives: no write, no call, no literals.
        assert_eq!(physical.write_count(), 0);
        assert_eq!(physical.call_count(), 0);
        assert_eq!(physical.read_count(), 1);
        assert_eq!(physical.node_count(), 1);
    }

    #[tokio::test]
    async fn absent_stores_leave_the_pair_in_place() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let z = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        registry.add(z, Arc::new(InMemoryStore::new())).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, None).await.unwrap();

        assert_eq!(physical.write_count(), 1);
        assert_eq!(physical.call_count(), 1);
    }

    #[tokio::test]
    async fn newer_upstream_marks_the_consumer_stale() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        let z = plan.call(&add_fn(), [x.into(), 1.into()]).unwrap();
        registry.add(x, filled(3, at(200)).await).unwrap();
        registry.add(z, filled(4, at(100)).await).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, None).await.unwrap();

        // x is fresh and reused; z is older than x, so its pair reruns.
        assert_eq!(physical.write_count(), 1);
        assert_eq!(physical.call_count(), 1);
        assert_eq!(physical.read_count(), 2);
    }

    #[tokio::test]
    async fn equal_timestamps_count_as_fresh() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        let z = plan.call(&add_fn(), [x.into(), 1.into()]).unwrap();
        registry.add(x, filled(3, at(100)).await).unwrap();
        registry.add(z, filled(4, at(100)).await).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, None).await.unwrap();

        assert_eq!(physical.write_count(), 0);
        assert_eq!(physical.call_count(), 0);
        assert_eq!(physical.read_count(), 1);
    }

    #[tokio::test]
    async fn missing_upstream_store_poisons_downstream() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let x = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        let z = plan.call(&add_fn(), [x.into(), 1.into()]).unwrap();
        registry.add(x, Arc::new(InMemoryStore::new())).unwrap();
        registry.add(z, filled(4, at(100)).await).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, None).await.unwrap();

        // Both pairs rebuild.
        assert_eq!(physical.write_count(), 2);
        assert_eq!(physical.call_count(), 2);
    }

    #[tokio::test]
    async fn fresh_time_discards_older_values() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let z = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        registry.add(z, filled(3, at(100)).await).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, Some(at(150))).await.unwrap();

        assert_eq!(physical.write_count(), 1);
        assert_eq!(physical.call_count(), 1);
    }

    #[tokio::test]
    async fn future_timestamps_are_trusted() {
        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let z = plan.call(&add_fn(), [1.into(), 2.into()]).unwrap();
        registry.add(z, filled(3, at(100)).await).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(z)).unwrap();
        apply(&mut physical, Some(at(100))).await.unwrap();

        assert_eq!(physical.write_count(), 0);
        assert_eq!(physical.read_count(), 1);
    }

    #[tokio::test]
    async fn sourced_reads_drop_dependencies_when_fresh() {
        let copies = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = copies.clone();
        let copy = CallFn::from_sync("test::copy", Signature::new(), move |_inv| {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(json!(null))
        });

        let mut plan = Plan::new();
        let mut registry = Registry::new();
        let prepare = plan.call(&copy, []).unwrap();
        let source = registry
            .source(&mut plan, filled(5, at(100)).await)
            .unwrap();
        plan.add_dependency(prepare, source).unwrap();
        let out = plan.call(&add_fn(), [source.into(), 1.into()]).unwrap();

        let mut physical = build_physical(&plan, Some(&registry), Some(out)).unwrap();
        apply(&mut physical, None).await.unwrap();

        // The preparatory call is pruned away; only read, literal, add remain.
        assert_eq!(physical.call_count(), 1);
        assert_eq!(physical.read_count(), 1);
    }
}

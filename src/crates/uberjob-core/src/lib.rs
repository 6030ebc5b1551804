//! # uberjob-core - Symbolic Call Graphs with Incremental Parallel Execution
//!
//! **Build and run symbolic call graphs** - construct a [`Plan`] of deferred
//! calls and literal values, optionally bind nodes to persistent stores through
//! a [`Registry`], and [`run`] it: only what the requested output needs is
//! executed, fresh stored values are read back instead of recomputed, and
//! everything else runs in parallel with retry and bounded error tolerance.
//!
//! ## Overview
//!
//! `uberjob-core` provides:
//!
//! - **Symbolic plans** - Deferred calls wired by positional, keyword, and pure
//!   dependency edges, with eager signature validation
//! - **Gather** - Structured values containing nodes fold into a single node
//! - **Registry-driven rewriting** - Stored nodes become write-then-read pairs;
//!   sourced nodes become reads
//! - **Staleness analysis** - Store timestamps decide what must re-execute
//! - **Parallel scheduling** - Worker pool with retry, error aggregation,
//!   cooperative cancellation, and progress observation
//! - **Symbolic tracebacks** - Execution errors point back at the
//!   plan-construction site of the failing node
//!
//! ## Data Flow
//!
//! ```text
//! user code ──> Plan (+ Registry) ──> physical plan ──> staleness ──> scheduler ──> value
//!               lit/call/gather       write/read pairs   fresh reads    worker pool
//!               add_dependency        pruning, cycles    elide writes   retry, errors
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use serde_json::json;
//! use uberjob_core::{run, CallFn, Plan, Registry, RunOptions, Signature};
//! use uberjob_stores::JsonFileStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> uberjob_core::Result<()> {
//!     let add = CallFn::from_sync("demo::add", Signature::positional(["x", "y"]), |inv| {
//!         let x = inv.param(0, "x")?.as_i64().unwrap_or_default();
//!         let y = inv.param(1, "y")?.as_i64().unwrap_or_default();
//!         Ok(json!(x + y))
//!     });
//!
//!     let mut plan = Plan::new();
//!     let mut registry = Registry::new();
//!
//!     let x = plan.call(&add, [1.into(), 2.into()])?;
//!     registry.add(x, Arc::new(JsonFileStore::new("out/x.json")))?;
//!     let z = plan.call(&add, [x.into(), 10.into()])?;
//!
//!     // First run computes and stores; later runs reuse x from disk.
//!     let value = run(&mut plan, Some(&registry), Some(z.into()), RunOptions::new()).await?;
//!     assert_eq!(value, Some(json!(13)));
//!     Ok(())
//! }
//! ```
//!
//! ## Error Model
//!
//! Construction and transform errors surface synchronously. During execution,
//! a failed node skips its successors while independent branches continue;
//! once errors exceed the configured limit no new work starts. The caller
//! receives exactly the first recorded error as a [`CallError`]; progress
//! observers receive every error.

pub mod call;
pub mod error;
pub mod gather;
pub mod graph;
pub mod physical;
pub mod plan;
pub mod progress;
pub mod registry;
pub mod render;
pub mod retry;
pub mod run;
pub mod signature;
pub mod trace;

mod executor;
mod scheduler;
mod staleness;

pub use call::{CallFn, Invocation};
pub use error::{CallError, Result, UberjobError};
pub use gather::Symbolic;
pub use graph::{EdgeKind, NodeKind, NodeRef, Scope};
pub use physical::PhysicalPlan;
pub use plan::Plan;
pub use progress::{NodeMeta, Progress, TracingProgress};
pub use registry::Registry;
pub use render::{render_physical, render_plan, RenderFormat, RenderOptions};
pub use retry::RetryPolicy;
pub use run::{dry_run, run, RunOptions};
pub use signature::Signature;
pub use trace::{max_frames, set_max_frames, SymbolicTrace};

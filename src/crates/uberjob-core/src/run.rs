//! Run entry points
//!
//! [`run`] is the front door of the engine: gather the requested output against
//! the plan, rewrite the logical plan into a physical one using the registry,
//! decide what is stale, and execute the rest in parallel. [`dry_run`] stops
//! after the rewrite and returns the pruned physical plan without touching any
//! store, which is the cheap way to inspect what a real run *would* do.
//!
//! # Examples
//!
//! ```rust,ignore
//! use uberjob_core::{run, Plan, Registry, RunOptions};
//!
//! let value = run(
//!     &mut plan,
//!     Some(&registry),
//!     Some(output.into()),
//!     RunOptions::new().with_max_workers(8),
//! )
//! .await?;
//! ```

use crate::error::Result;
use crate::gather::Symbolic;
use crate::graph::NodeRef;
use crate::physical::{build_physical, PhysicalPlan};
use crate::plan::Plan;
use crate::progress::Progress;
use crate::registry::Registry;
use crate::retry::RetryPolicy;
use crate::{scheduler, staleness};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

/// Tunables for one run.
#[derive(Clone)]
pub struct RunOptions {
    pub(crate) max_workers: Option<usize>,
    pub(crate) max_errors: Option<usize>,
    pub(crate) retry: Option<RetryPolicy>,
    pub(crate) progress: Vec<Arc<dyn Progress>>,
    pub(crate) fresh_time: Option<DateTime<Utc>>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RunOptions {
    /// Defaults: worker count from the machine, error limit 1, no retry, no
    /// observers, no freshness cutoff.
    pub fn new() -> Self {
        Self {
            max_workers: None,
            max_errors: Some(1),
            retry: None,
            progress: Vec::new(),
            fresh_time: None,
        }
    }

    /// Bound the worker pool size.
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    /// Stop admitting new nodes once this many errors have been recorded.
    pub fn with_max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = Some(max_errors);
        self
    }

    /// Never stop admitting nodes because of errors.
    pub fn with_unlimited_errors(mut self) -> Self {
        self.max_errors = None;
        self
    }

    /// Retry every node evaluation under this policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Add a progress observer; observers compose.
    pub fn with_progress(mut self, observer: Arc<dyn Progress>) -> Self {
        self.progress.push(observer);
        self
    }

    /// Treat stored values older than this as absent.
    pub fn with_fresh_time(mut self, fresh_time: DateTime<Utc>) -> Self {
        self.fresh_time = Some(fresh_time);
        self
    }
}

fn gather_output(plan: &mut Plan, output: Option<Symbolic>) -> Result<Option<NodeRef>> {
    output.map(|symbolic| plan.gather(symbolic)).transpose()
}

/// Run `plan`, materializing the requested output.
///
/// Executes only what the output needs: stored nodes whose values are fresh
/// under `registry` are read back instead of recomputed. Returns the output's
/// value, or `None` when no output was requested.
pub async fn run(
    plan: &mut Plan,
    registry: Option<&Registry>,
    output: Option<Symbolic>,
    options: RunOptions,
) -> Result<Option<Value>> {
    let output = gather_output(plan, output)?;
    let mut physical = build_physical(plan, registry, output)?;
    staleness::apply(&mut physical, options.fresh_time).await?;
    scheduler::execute(physical, &options).await
}

/// Build and return the pruned physical plan without executing it.
///
/// No store is touched, so staleness rewrites are not applied; the result is
/// what a run would execute if every stored value were absent.
pub fn dry_run(
    plan: &mut Plan,
    registry: Option<&Registry>,
    output: Option<Symbolic>,
) -> Result<PhysicalPlan> {
    let output = gather_output(plan, output)?;
    build_physical(plan, registry, output)
}

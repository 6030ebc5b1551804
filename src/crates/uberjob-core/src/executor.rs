//! Node evaluation with retry logic.

use crate::error::Result;
use crate::progress::{NodeMeta, Progress};
use crate::retry::RetryPolicy;
use futures::future::BoxFuture;
use serde_json::Value;
use std::sync::Arc;

/// A re-invocable unit of work: one node evaluation per call.
pub(crate) type WorkUnit = Arc<dyn Fn() -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Evaluate a node, re-attempting for as long as `policy` keeps scheduling
/// backoffs. Observers see `retrying` between attempts; only the failure of
/// the final attempt escapes.
pub(crate) async fn execute_with_retry(
    work: &WorkUnit,
    policy: Option<&RetryPolicy>,
    meta: &NodeMeta,
    observers: &[Arc<dyn Progress>],
) -> Result<Value> {
    let mut attempt = 1;
    loop {
        tracing::debug!(node = %meta.name, attempt, "evaluating node");

        let error = match work().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(node = %meta.name, attempt, "node succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let Some(delay) = policy.and_then(|policy| policy.backoff_after(attempt)) else {
            if attempt > 1 {
                tracing::error!(
                    node = %meta.name,
                    attempt,
                    error = %error,
                    "node failed after all attempts"
                );
            }
            return Err(error);
        };

        tracing::warn!(
            node = %meta.name,
            attempt,
            delay_ms = delay.as_millis(),
            error = %error,
            "node failed, retrying after delay"
        );
        for observer in observers {
            observer.retrying(meta, attempt);
        }
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

//! Concurrent dispatch of a probing operation across many targets.

use crate::ProbeError;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

/// Runs `probe` against every target concurrently, one task per target.
///
/// Returns once every task has finished. `results[i]` always belongs to
/// `targets[i]` regardless of completion order; each task writes only its
/// own slot. Per-target failures are expected to be folded into `T` by the
/// probe itself, so the only error here is a task that panicked.
pub async fn run_all<T, F, Fut>(targets: Vec<String>, probe: F) -> Result<Vec<T>, ProbeError>
where
    T: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = T> + Send + 'static,
{
    let probe = Arc::new(probe);
    let mut slots: Vec<Option<T>> = Vec::with_capacity(targets.len());
    let mut tasks = JoinSet::new();

    debug!(targets = targets.len(), "Dispatching probes");
    for (index, target) in targets.into_iter().enumerate() {
        slots.push(None);
        let probe = Arc::clone(&probe);
        tasks.spawn(async move {
            trace!(index, target = %target, "Probe task started");
            (index, (*probe)(target).await)
        });
    }

    // Drain every task even after a failure; dropping the set would abort
    // the siblings still running.
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                trace!(index, "Probe task finished");
                slots[index] = Some(result);
            }
            Err(e) => {
                warn!(error = %e, "Probe task failed");
                if failure.is_none() {
                    failure = Some(ProbeError::Internal(format!("probe task failed: {}", e)));
                }
            }
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| ProbeError::Internal(format!("no result for target {}", index)))
        })
        .collect()
}

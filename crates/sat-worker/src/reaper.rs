//! Recovery sweep for runs stuck in `Processing` (supplementary: spec.md
//! leaves retry/dead-letter policy as an open question). Not wired into
//! [`crate::worker::Worker::run_forever`] — reachable only from an operator
//! tool (`sat-cli reaper sweep`).

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use sat_core::{Broker, RunStatus, Store};
use std::sync::Arc;
use tracing::{info, warn};

pub struct SweepReport {
    pub swept: Vec<i64>,
}

/// Finds runs in `Processing` whose `started_at` is older than `max_age`,
/// marks them `Failed` in the Store, and removes them from the Broker's
/// processing list. Does not requeue — spec.md does not specify a retry
/// policy, so re-dispatch is left to the operator.
pub async fn sweep_stale_processing(
    store: &Arc<dyn Store>,
    broker: &Arc<dyn Broker>,
    max_age: ChronoDuration,
) -> Result<SweepReport> {
    let cutoff: DateTime<Utc> = Utc::now() - max_age;
    let stale = store.list_stale_processing_runs(cutoff).await?;

    let mut swept = Vec::new();
    for run in stale {
        if run.status != RunStatus::Processing {
            continue;
        }
        match store
            .update_run_status(run.id, RunStatus::Failed)
            .await
        {
            Ok(()) => {
                if let Err(e) = broker.fail(run.id, "stale processing sweep").await {
                    warn!(run_id = run.id, error = %e, "reaper: broker cleanup failed (non-fatal)");
                }
                info!(run_id = run.id, "reaper: marked stale run Failed");
                swept.push(run.id);
            }
            Err(e) => {
                warn!(run_id = run.id, error = %e, "reaper: failed to transition stale run");
            }
        }
    }

    Ok(SweepReport { swept })
}

//! The narrow interface `sat-core` needs from a transient work queue with
//! claim/ack semantics.
//!
//! Implemented by `sat-broker` (Redis) in production and by
//! `sat-testkit`'s `FakeBroker` in tests.

use crate::types::JobPayload;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Broker: Send + Sync {
    /// Sets payload (TTL'd) and metadata, then right-pushes `run_id` onto
    /// the pending list, all in a single atomic batch.
    async fn enqueue(&self, run_id: i64, payload: &JobPayload) -> Result<()>;

    /// Blocks up to `timeout_s` for a job, atomically moving it from pending
    /// to processing. Returns `None` on timeout or on a poison entry
    /// (unparseable run id / missing or invalid payload — removed from
    /// processing before returning).
    async fn claim(&self, timeout_s: u64) -> Result<Option<(i64, JobPayload)>>;

    /// Removes `run_id` from processing and deletes its payload/metadata.
    /// Errors here are the caller's to log and swallow — the Store already
    /// recorded the terminal outcome.
    async fn ack(&self, run_id: i64) -> Result<()>;

    /// Removes `run_id` from processing and records `reason` in its
    /// metadata, without requeuing. Last-resort cleanup when the Store
    /// write itself failed.
    async fn fail(&self, run_id: i64, reason: &str) -> Result<()>;
}

//! The narrow interface `sat-core` needs from a relational store of record.
//!
//! Implemented by `sat-store` (Postgres/sqlx) in production and by
//! `sat-testkit`'s `FakeStore` in tests. Kept as a trait object seam
//! (mirroring the teacher's `BrokerGateway<B: BrokerAdapter>` pattern) so the
//! submission service and worker never depend on a concrete backend.

use crate::types::{Formula, Run, RunStatus, SolveResult};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Store: Send + Sync {
    /// Upsert keyed by `hash`; on conflict, returns the existing id without
    /// mutating the row (formulas are never updated after creation).
    async fn get_or_create_formula(
        &self,
        normalized_input: &str,
        hash: &str,
        notation: &str,
    ) -> Result<i64>;

    /// Inserts a new Run in status `Created`, returning its id.
    async fn create_run(&self, formula_id: i64, mode: crate::types::SolverMode, timeout_s: i64) -> Result<i64>;

    /// Writes `status`. Stamps `started_at`/`finished_at` idempotently (only
    /// while still null) exactly when `status` first becomes `Processing` or
    /// terminal, respectively.
    async fn update_run_status(&self, run_id: i64, status: RunStatus) -> Result<()>;

    async fn get_status_by_run_id(&self, run_id: i64) -> Result<Option<RunStatus>>;
    async fn get_run_by_id(&self, run_id: i64) -> Result<Option<Run>>;
    async fn get_formula_by_id(&self, formula_id: i64) -> Result<Option<Formula>>;
    async fn get_result_by_run_id(&self, run_id: i64) -> Result<Option<SolveResult>>;

    /// Idempotent insert keyed by `run_id`; a second insert for the same run
    /// is a no-op.
    async fn insert_result(&self, result: &SolveResult) -> Result<()>;

    /// Any run for `formula_id` in `{Created, Queued, Processing}`.
    async fn get_active_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>>;

    /// The most recent `Completed` run for `formula_id`.
    async fn get_completed_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>>;

    /// Runs stuck in `Processing` with no corresponding Broker heartbeat
    /// recently — feeds the opt-in recovery sweep (spec §9). Not called by
    /// the default worker loop.
    async fn list_stale_processing_runs(&self, older_than: chrono::DateTime<chrono::Utc>) -> Result<Vec<Run>>;
}

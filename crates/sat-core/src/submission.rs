//! The submission service (spec §4.4): normalize, dedupe, enqueue, project
//! status/result back to callers. No HTTP here — these are the plain Rust
//! calls an adapter layer would wrap.

use crate::broker::Broker;
use crate::error::ServiceError;
use crate::store::Store;
use crate::types::{JobPayload, RunStatus, SolveResult, SolverMode};
use sat_normalizer::normalize_and_hash;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// `{msg, formula, formula_id, run_id, status}` per spec §6.
#[derive(Debug, Clone, Serialize)]
pub struct SubmitResponse {
    pub msg: String,
    pub formula: String,
    pub formula_id: i64,
    pub run_id: i64,
    pub status: RunStatus,
}

/// `{msg, run_id, status}` per spec §6.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub msg: String,
    pub run_id: i64,
    pub status: RunStatus,
}

/// `{msg, status, run_id, formula_id, formula, result, assignment, runtime}` per spec §6.
#[derive(Debug, Clone, Serialize)]
pub struct ResultResponse {
    pub msg: String,
    pub status: RunStatus,
    pub run_id: i64,
    pub formula_id: i64,
    pub formula: String,
    pub result: crate::types::SolveDecision,
    pub assignment: Option<crate::types::Assignment>,
    pub runtime: f64,
}

/// Dedupes formulas, coalesces concurrent in-flight submissions, and
/// dispatches new work onto the Broker.
///
/// Generic over the Store/Broker trait objects (mirroring the teacher's
/// `BrokerGateway<B: BrokerAdapter>`), so tests can substitute
/// `sat-testkit`'s in-memory fakes for Postgres/Redis.
pub struct SubmissionService {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
}

impl SubmissionService {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> Self {
        Self { store, broker }
    }

    /// Steps 1-8 of spec §4.4, including the documented step 6/7 race: the
    /// Run is visible in `Created` before it is enqueued, so a concurrent
    /// submission of the same formula may coalesce on it at step 4. This is
    /// acceptable — the coalescing caller gets back the same run id that
    /// will shortly be queued or marked failed.
    pub async fn submit(
        &self,
        raw_formula: &str,
        notation: &str,
        mode: &str,
    ) -> Result<SubmitResponse, ServiceError> {
        let normalized = normalize_and_hash(raw_formula, notation)
            .map_err(|e| ServiceError::InvalidFormula(e.to_string()))?;

        let mode = SolverMode::parse(mode)
            .ok_or_else(|| ServiceError::InvalidFormula(format!("unsupported mode: {mode}")))?;

        let formula_id = self
            .store
            .get_or_create_formula(&normalized.normalized_input, &normalized.hash, normalized.notation.as_str())
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        // Cache-before-active is deliberate: a completed result is preferred
        // over an in-flight retry.
        if let Some((run_id, _status)) = self
            .store
            .get_completed_run(formula_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
        {
            return Ok(SubmitResponse {
                msg: "cached result found".to_string(),
                formula: normalized.normalized_input,
                formula_id,
                run_id,
                status: RunStatus::Completed,
            });
        }

        if let Some((run_id, status)) = self
            .store
            .get_active_run(formula_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
        {
            return Ok(SubmitResponse {
                msg: "already pending".to_string(),
                formula: normalized.normalized_input,
                formula_id,
                run_id,
                status,
            });
        }

        let timeout_s = mode.default_timeout_s();

        let run_id = self
            .store
            .create_run(formula_id, mode, timeout_s)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let payload = JobPayload {
            formula: normalized.normalized_input.clone(),
            run_id,
            formula_id,
            mode,
            timeout_s,
        };

        if let Err(e) = self.broker.enqueue(run_id, &payload).await {
            warn!(run_id, error = %e, "broker enqueue failed, marking run failed");
            // Left behind deliberately so the submission is auditable.
            let _ = self.store.update_run_status(run_id, RunStatus::Failed).await;
            return Err(ServiceError::BrokerUnavailable(e.to_string()));
        }

        self.store
            .update_run_status(run_id, RunStatus::Queued)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        info!(run_id, formula_id, "submission queued");

        Ok(SubmitResponse {
            msg: "queued".to_string(),
            formula: normalized.normalized_input,
            formula_id,
            run_id,
            status: RunStatus::Queued,
        })
    }

    pub async fn get_status(&self, run_id: i64) -> Result<StatusResponse, ServiceError> {
        let status = self
            .store
            .get_status_by_run_id(run_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("run {run_id}")))?;

        Ok(StatusResponse {
            msg: "ok".to_string(),
            run_id,
            status,
        })
    }

    pub async fn get_result(&self, run_id: i64) -> Result<ResultResponse, ServiceError> {
        let run = self
            .store
            .get_run_by_id(run_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("run {run_id}")))?;

        if !run.status.is_terminal() {
            return Err(ServiceError::ResultNotReady {
                status: run.status.to_string(),
            });
        }

        let result: SolveResult = self
            .store
            .get_result_by_run_id(run_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("result for run {run_id}")))?;

        let formula = self
            .store
            .get_formula_by_id(run.formula_id)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .ok_or_else(|| ServiceError::NotFound(format!("formula {}", run.formula_id)))?;

        Ok(ResultResponse {
            msg: "ok".to_string(),
            status: run.status,
            run_id,
            formula_id: run.formula_id,
            formula: formula.normalized_input,
            result: result.result,
            assignment: result.assignment,
            runtime: result.runtime_s,
        })
    }
}

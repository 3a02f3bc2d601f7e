//! The main worker loop: claim -> mark Processing -> invoke solver -> commit
//! result and status -> ack. Mirrors a Python reference `Worker._process_job`
//! closely, including its fallback-to-`fail()` behavior when the Store write
//! itself breaks after the solver has already run.

use crate::solver::{self, SolverRunError};
use sat_core::{Broker, JobPayload, SolveDecision, SolveResult, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub struct WorkerConfig {
    pub poll_timeout_s: u64,
    pub solver_path_fast: String,
}

pub struct Worker {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>, broker: Arc<dyn Broker>, config: WorkerConfig) -> Self {
        Self { store, broker, config }
    }

    /// Runs until `running` is cleared. Sampled once per loop iteration
    /// (after any in-flight job finishes), not mid-job — a job is never
    /// interrupted part-way through.
    pub async fn run_forever(&self, running: Arc<AtomicBool>) {
        info!("worker starting");
        while running.load(Ordering::SeqCst) {
            let job = match self.broker.claim(self.config.poll_timeout_s).await {
                Ok(job) => job,
                Err(e) => {
                    error!(error = %e, "queue claim failed");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };

            let (run_id, payload) = match job {
                Some(j) => j,
                None => continue,
            };

            self.process_job(run_id, payload).await;
        }
        info!("worker shutting down cleanly");
    }

    #[instrument(skip(self, payload), fields(run_id, formula_id = payload.formula_id))]
    async fn process_job(&self, run_id: i64, payload: JobPayload) {
        if let Err(e) = self
            .store
            .update_run_status(run_id, sat_core::RunStatus::Processing)
            .await
        {
            error!(run_id, error = %e, "failed to mark run Processing, cleaning up via broker.fail");
            let _ = self.broker.fail(run_id, &e.to_string()).await;
            return;
        }

        // The run's own timeout_s (set at submission time, spec §4.4 step 5)
        // is the bound that actually applies, not the mode's default — a
        // per-run override must be honored even though the two coincide
        // under default configuration.
        let timeout = Duration::from_secs(payload.timeout_s.max(0) as u64);

        match solver::run_solver(&self.config.solver_path_fast, &payload.formula, timeout).await {
            Ok(output) => self.handle_solver_output(run_id, output).await,
            Err(SolverRunError::Timeout) => {
                warn!(run_id, "solver timed out after {:?}", timeout);
                self.finish(
                    run_id,
                    SolveResult {
                        run_id,
                        result: SolveDecision::Timeout,
                        assignment: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        error_type: Some("TIMEOUT".to_string()),
                        error_message: Some(format!(
                            "solver execution timed out after {}s",
                            timeout.as_secs()
                        )),
                        runtime_s: timeout.as_secs_f64(),
                    },
                    sat_core::RunStatus::Timeout,
                )
                .await;
            }
            Err(SolverRunError::BinaryNotFound(e)) => {
                error!(run_id, error = %e, "solver binary not found");
                self.finish(
                    run_id,
                    SolveResult {
                        run_id,
                        result: SolveDecision::Error,
                        assignment: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        error_type: Some("BINARY_NOT_FOUND".to_string()),
                        error_message: Some("solver binary not available".to_string()),
                        runtime_s: 0.0,
                    },
                    sat_core::RunStatus::Failed,
                )
                .await;
            }
            Err(SolverRunError::Io(e)) => {
                error!(run_id, error = %e, "solver execution failed");
                self.finish(
                    run_id,
                    SolveResult {
                        run_id,
                        result: SolveDecision::Error,
                        assignment: None,
                        stdout: String::new(),
                        stderr: String::new(),
                        error_type: Some("EXECUTION_ERROR".to_string()),
                        error_message: Some(e.to_string()),
                        runtime_s: 0.0,
                    },
                    sat_core::RunStatus::Failed,
                )
                .await;
            }
        }
    }

    async fn handle_solver_output(&self, run_id: i64, output: solver::SolverOutput) {
        let result = match output.exit_code {
            Some(solver::EXIT_PARSE_ERROR) => SolveResult {
                run_id,
                result: SolveDecision::Error,
                assignment: None,
                stdout: output.stdout,
                stderr: output.stderr.clone(),
                error_type: Some("PARSE_ERROR".to_string()),
                error_message: Some(if output.stderr.is_empty() {
                    "formula parsing failed".to_string()
                } else {
                    output.stderr
                }),
                runtime_s: output.runtime_s,
            },
            Some(solver::EXIT_SAT) | Some(solver::EXIT_UNSAT) => {
                let (decision, assignment) = solver::parse_solver_output(&output.stdout);
                SolveResult {
                    run_id,
                    result: if decision == "SAT" {
                        SolveDecision::Sat
                    } else {
                        SolveDecision::Unsat
                    },
                    assignment,
                    stdout: output.stdout,
                    stderr: output.stderr,
                    error_type: None,
                    error_message: None,
                    runtime_s: output.runtime_s,
                }
            }
            other => SolveResult {
                run_id,
                result: SolveDecision::Error,
                assignment: None,
                stdout: output.stdout,
                stderr: output.stderr,
                error_type: Some("UNEXPECTED_RC".to_string()),
                error_message: Some(format!("unexpected solver return code {other:?}")),
                runtime_s: output.runtime_s,
            },
        };

        let status = match result.result {
            SolveDecision::Sat | SolveDecision::Unsat => sat_core::RunStatus::Completed,
            SolveDecision::Error => sat_core::RunStatus::Failed,
            SolveDecision::Timeout => sat_core::RunStatus::Timeout,
        };

        self.finish(run_id, result, status).await;
    }

    /// Writes the result, updates status, then acks the broker. If the
    /// Store write fails after the solver already ran, falls back to
    /// `Broker::fail` so the job does not linger in the processing list
    /// forever — matching a Python reference worker's nested-except cleanup.
    async fn finish(&self, run_id: i64, result: SolveResult, status: sat_core::RunStatus) {
        if let Err(e) = self.store.insert_result(&result).await {
            error!(run_id, error = %e, "failed to record result");
            let _ = self.broker.fail(run_id, &e.to_string()).await;
            return;
        }
        if let Err(e) = self.store.update_run_status(run_id, status).await {
            error!(run_id, error = %e, "failed to update run status after result write");
            let _ = self.broker.fail(run_id, &e.to_string()).await;
            return;
        }
        if let Err(e) = self.broker.ack(run_id).await {
            warn!(run_id, error = %e, "broker ack failed (job already completed in Store)");
        }
        info!(run_id, status = %status, "run finished");
    }
}

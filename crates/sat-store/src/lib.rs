//! Postgres-backed `Store` implementation. Postgres is the source of truth
//! (spec.md §4.4): the broker's queue is advisory, this crate is not.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sat_core::{Formula, Run, RunStatus, SolveDecision, SolveResult, SolverMode, Store};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::{error, info};

pub const ENV_DB_URL: &str = "SAT_DATABASE_URL";

/// Connect to Postgres using `SAT_DATABASE_URL`, mirroring `mqk-db`'s
/// `connect_from_env`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, pool_max: u32) -> Result<PgPool> {
    match PgPoolOptions::new().max_connections(pool_max).connect(url).await {
        Ok(pool) => {
            info!(pool_max, "connected to Postgres");
            Ok(pool)
        }
        Err(e) => {
            error!(error = %e, "failed to connect to Postgres");
            Err(e).context("failed to connect to Postgres")
        }
    }
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    if let Err(e) = sqlx::migrate!("./migrations").run(pool).await {
        error!(error = %e, "db migrate failed");
        return Err(e).context("db migrate failed");
    }
    info!("db migrations applied");
    Ok(())
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_run(row: &sqlx::postgres::PgRow) -> Result<Run> {
    let status_raw: String = row.try_get("status")?;
    let mode_raw: String = row.try_get("mode")?;
    Ok(Run {
        id: row.try_get("id")?,
        formula_id: row.try_get("formula_id")?,
        status: RunStatus::parse(&status_raw)
            .with_context(|| format!("unrecognized run status in DB: {status_raw}"))?,
        timeout_s: row.try_get("timeout_s")?,
        mode: SolverMode::parse(&mode_raw)
            .with_context(|| format!("unrecognized solver mode in DB: {mode_raw}"))?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn get_or_create_formula(
        &self,
        normalized_input: &str,
        hash: &str,
        notation: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO formulas (normalized_input, hash, notation)
            VALUES ($1, $2, $3)
            ON CONFLICT (hash) DO UPDATE SET hash = EXCLUDED.hash
            RETURNING id
            "#,
        )
        .bind(normalized_input)
        .bind(hash)
        .bind(notation)
        .fetch_one(&self.pool)
        .await
        .context("get_or_create_formula failed")?;
        Ok(row.try_get("id")?)
    }

    async fn create_run(&self, formula_id: i64, mode: SolverMode, timeout_s: i64) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO runs (formula_id, status, timeout_s, mode)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(formula_id)
        .bind(RunStatus::Created.as_str())
        .bind(timeout_s)
        .bind(mode.as_str())
        .fetch_one(&self.pool)
        .await
        .context("create_run failed")?;
        Ok(row.try_get("id")?)
    }

    async fn update_run_status(&self, run_id: i64, status: RunStatus) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin tx failed")?;

        let row = sqlx::query("SELECT status FROM runs WHERE id = $1 FOR UPDATE")
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await
            .context("select run status failed")?
            .with_context(|| format!("run {run_id} not found"))?;
        let current_raw: String = row.try_get("status")?;
        let current = RunStatus::parse(&current_raw)
            .with_context(|| format!("unrecognized run status in DB: {current_raw}"))?;
        current.validate_transition(status)?;

        sqlx::query(
            r#"
            UPDATE runs SET
                status = $1,
                started_at = CASE WHEN $1 = 'PROCESSING' AND started_at IS NULL THEN now() ELSE started_at END,
                finished_at = CASE WHEN $2 AND finished_at IS NULL THEN now() ELSE finished_at END
            WHERE id = $3
            "#,
        )
        .bind(status.as_str())
        .bind(status.is_terminal())
        .bind(run_id)
        .execute(&mut *tx)
        .await
        .context("update_run_status failed")?;

        tx.commit().await.context("commit tx failed")?;
        Ok(())
    }

    async fn get_status_by_run_id(&self, run_id: i64) -> Result<Option<RunStatus>> {
        let row = sqlx::query("SELECT status FROM runs WHERE id = $1")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .context("get_status_by_run_id failed")?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("status")?;
                Ok(Some(RunStatus::parse(&raw).with_context(|| {
                    format!("unrecognized run status in DB: {raw}")
                })?))
            }
            None => Ok(None),
        }
    }

    async fn get_run_by_id(&self, run_id: i64) -> Result<Option<Run>> {
        let row = sqlx::query(
            "SELECT id, formula_id, status, timeout_s, mode, created_at, started_at, finished_at
             FROM runs WHERE id = $1",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_run_by_id failed")?;
        row.as_ref().map(row_to_run).transpose()
    }

    async fn get_formula_by_id(&self, formula_id: i64) -> Result<Option<Formula>> {
        let row = sqlx::query("SELECT id, normalized_input, hash, notation FROM formulas WHERE id = $1")
            .bind(formula_id)
            .fetch_optional(&self.pool)
            .await
            .context("get_formula_by_id failed")?;
        Ok(match row {
            Some(row) => Some(Formula {
                id: row.try_get("id")?,
                normalized_input: row.try_get("normalized_input")?,
                hash: row.try_get("hash")?,
                notation: row.try_get("notation")?,
            }),
            None => None,
        })
    }

    async fn get_result_by_run_id(&self, run_id: i64) -> Result<Option<SolveResult>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, result, assignment, stdout, stderr, error_type, error_message, runtime_s
            FROM results WHERE run_id = $1
            "#,
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_result_by_run_id failed")?;
        Ok(match row {
            Some(row) => {
                let result_raw: String = row.try_get("result")?;
                let assignment_json: Option<serde_json::Value> = row.try_get("assignment")?;
                Some(SolveResult {
                    run_id: row.try_get("run_id")?,
                    result: parse_decision(&result_raw)?,
                    assignment: assignment_json
                        .map(serde_json::from_value)
                        .transpose()
                        .context("failed to deserialize assignment JSON")?,
                    stdout: row.try_get("stdout")?,
                    stderr: row.try_get("stderr")?,
                    error_type: row.try_get("error_type")?,
                    error_message: row.try_get("error_message")?,
                    runtime_s: row.try_get("runtime_s")?,
                })
            }
            None => None,
        })
    }

    async fn insert_result(&self, result: &SolveResult) -> Result<()> {
        let assignment_json = result
            .assignment
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .context("failed to serialize assignment")?;
        sqlx::query(
            r#"
            INSERT INTO results
                (run_id, result, assignment, stdout, stderr, error_type, error_message, runtime_s)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(result.run_id)
        .bind(result.result.as_str())
        .bind(assignment_json)
        .bind(&result.stdout)
        .bind(&result.stderr)
        .bind(&result.error_type)
        .bind(&result.error_message)
        .bind(result.runtime_s)
        .execute(&self.pool)
        .await
        .context("insert_result failed")?;
        Ok(())
    }

    async fn get_active_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>> {
        let row = sqlx::query(
            r#"
            SELECT id, status FROM runs
            WHERE formula_id = $1 AND status IN ('CREATED', 'QUEUED', 'PROCESSING')
            ORDER BY id DESC LIMIT 1
            "#,
        )
        .bind(formula_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_active_run failed")?;
        to_id_status(row)
    }

    async fn get_completed_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>> {
        let row = sqlx::query(
            r#"
            SELECT id, status FROM runs
            WHERE formula_id = $1 AND status = 'COMPLETED'
            ORDER BY id DESC LIMIT 1
            "#,
        )
        .bind(formula_id)
        .fetch_optional(&self.pool)
        .await
        .context("get_completed_run failed")?;
        to_id_status(row)
    }

    async fn list_stale_processing_runs(&self, older_than: DateTime<Utc>) -> Result<Vec<Run>> {
        let rows = sqlx::query(
            r#"
            SELECT id, formula_id, status, timeout_s, mode, created_at, started_at, finished_at
            FROM runs
            WHERE status = 'PROCESSING' AND started_at IS NOT NULL AND started_at < $1
            "#,
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await
        .context("list_stale_processing_runs failed")?;
        rows.iter().map(row_to_run).collect()
    }
}

fn to_id_status(row: Option<sqlx::postgres::PgRow>) -> Result<Option<(i64, RunStatus)>> {
    match row {
        Some(row) => {
            let id: i64 = row.try_get("id")?;
            let raw: String = row.try_get("status")?;
            let status = RunStatus::parse(&raw)
                .with_context(|| format!("unrecognized run status in DB: {raw}"))?;
            Ok(Some((id, status)))
        }
        None => Ok(None),
    }
}

fn parse_decision(raw: &str) -> Result<SolveDecision> {
    match raw {
        "SAT" => Ok(SolveDecision::Sat),
        "UNSAT" => Ok(SolveDecision::Unsat),
        "ERROR" => Ok(SolveDecision::Error),
        "TIMEOUT" => Ok(SolveDecision::Timeout),
        other => anyhow::bail!("unrecognized solve decision in DB: {other}"),
    }
}

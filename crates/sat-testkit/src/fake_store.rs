use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sat_core::{Formula, Run, RunStatus, SolveResult, SolverMode, Store};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    formulas_by_hash: HashMap<String, i64>,
    formulas: HashMap<i64, Formula>,
    runs: HashMap<i64, Run>,
    results: HashMap<i64, SolveResult>,
    next_formula_id: i64,
    next_run_id: i64,
}

/// Deterministic, single-process stand-in for `sat-store`'s Postgres-backed
/// implementation. Monotonic ids, no network I/O.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for FakeStore {
    async fn get_or_create_formula(
        &self,
        normalized_input: &str,
        hash: &str,
        notation: &str,
    ) -> Result<i64> {
        let mut st = self.state.lock().unwrap();
        if let Some(&id) = st.formulas_by_hash.get(hash) {
            return Ok(id);
        }
        st.next_formula_id += 1;
        let id = st.next_formula_id;
        st.formulas_by_hash.insert(hash.to_string(), id);
        st.formulas.insert(
            id,
            Formula {
                id,
                normalized_input: normalized_input.to_string(),
                hash: hash.to_string(),
                notation: notation.to_string(),
            },
        );
        Ok(id)
    }

    async fn create_run(&self, formula_id: i64, mode: SolverMode, timeout_s: i64) -> Result<i64> {
        let mut st = self.state.lock().unwrap();
        st.next_run_id += 1;
        let id = st.next_run_id;
        st.runs.insert(
            id,
            Run {
                id,
                formula_id,
                status: RunStatus::Created,
                timeout_s,
                mode,
                created_at: Utc::now(),
                started_at: None,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn update_run_status(&self, run_id: i64, status: RunStatus) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        let run = st
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| anyhow::anyhow!("run {run_id} not found"))?;
        run.status.validate_transition(status)?;
        run.status = status;
        if status == RunStatus::Processing && run.started_at.is_none() {
            run.started_at = Some(Utc::now());
        }
        if status.is_terminal() && run.finished_at.is_none() {
            run.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_status_by_run_id(&self, run_id: i64) -> Result<Option<RunStatus>> {
        Ok(self.state.lock().unwrap().runs.get(&run_id).map(|r| r.status))
    }

    async fn get_run_by_id(&self, run_id: i64) -> Result<Option<Run>> {
        Ok(self.state.lock().unwrap().runs.get(&run_id).cloned())
    }

    async fn get_formula_by_id(&self, formula_id: i64) -> Result<Option<Formula>> {
        Ok(self.state.lock().unwrap().formulas.get(&formula_id).cloned())
    }

    async fn get_result_by_run_id(&self, run_id: i64) -> Result<Option<SolveResult>> {
        Ok(self.state.lock().unwrap().results.get(&run_id).cloned())
    }

    async fn insert_result(&self, result: &SolveResult) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.results.entry(result.run_id).or_insert_with(|| result.clone());
        Ok(())
    }

    async fn get_active_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .runs
            .values()
            .filter(|r| r.formula_id == formula_id && r.status.is_active())
            .map(|r| (r.id, r.status))
            .next())
    }

    async fn get_completed_run(&self, formula_id: i64) -> Result<Option<(i64, RunStatus)>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .runs
            .values()
            .filter(|r| r.formula_id == formula_id && r.status == RunStatus::Completed)
            .max_by_key(|r| r.id)
            .map(|r| (r.id, r.status)))
    }

    async fn list_stale_processing_runs(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Run>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .runs
            .values()
            .filter(|r| r.status == RunStatus::Processing)
            .filter(|r| r.started_at.map(|t| t < older_than).unwrap_or(false))
            .cloned()
            .collect())
    }
}

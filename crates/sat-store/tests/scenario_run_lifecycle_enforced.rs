use sat_core::{RunStatus, SolverMode, Store};

#[tokio::test]
async fn run_lifecycle_rejects_backward_transitions() -> anyhow::Result<()> {
    let url = match std::env::var(sat_store::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", sat_store::ENV_DB_URL);
            return Ok(());
        }
    };

    let pool = sat_store::connect(&url, 2).await?;
    sat_store::migrate(&pool).await?;
    let store = sat_store::PgStore::new(pool);

    let formula_id = store
        .get_or_create_formula("P Q ||", "hash-lifecycle-1", "RPN")
        .await?;
    let run_id = store.create_run(formula_id, SolverMode::Rpn, 10).await?;

    store.update_run_status(run_id, RunStatus::Queued).await?;
    store.update_run_status(run_id, RunStatus::Processing).await?;
    store.update_run_status(run_id, RunStatus::Completed).await?;

    let err = store
        .update_run_status(run_id, RunStatus::Processing)
        .await
        .unwrap_err();
    assert!(format!("{err}").contains("illegal run status transition"));

    let run = store.get_run_by_id(run_id).await?.expect("run exists");
    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.started_at.is_some());
    assert!(run.finished_at.is_some());

    Ok(())
}

#[tokio::test]
async fn only_one_active_run_per_formula() -> anyhow::Result<()> {
    let url = match std::env::var(sat_store::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: {} not set", sat_store::ENV_DB_URL);
            return Ok(());
        }
    };

    let pool = sat_store::connect(&url, 2).await?;
    sat_store::migrate(&pool).await?;
    let store = sat_store::PgStore::new(pool);

    let formula_id = store
        .get_or_create_formula("P Q =>", "hash-lifecycle-2", "RPN")
        .await?;
    let run1 = store.create_run(formula_id, SolverMode::Rpn, 10).await?;

    let err = store.create_run(formula_id, SolverMode::Rpn, 10).await.unwrap_err();
    let msg = format!("{err}").to_lowercase();
    assert!(
        msg.contains("uq_runs_formula_active") || msg.contains("duplicate") || msg.contains("unique"),
        "expected unique active-run constraint violation, got: {msg}"
    );

    store.update_run_status(run1, RunStatus::Queued).await?;
    store.update_run_status(run1, RunStatus::Processing).await?;
    store.update_run_status(run1, RunStatus::Completed).await?;

    let run2 = store.create_run(formula_id, SolverMode::Rpn, 10).await?;
    assert_ne!(run1, run2);

    Ok(())
}

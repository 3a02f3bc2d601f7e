use sat_core::{RunStatus, SolverMode, Store};

#[tokio::test]
async fn formula_dedup_by_hash() -> anyhow::Result<()> {
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

    let id1 = store
        .get_or_create_formula("P Q &&", "hash-dedup-1", "RPN")
        .await?;
    let id2 = store
        .get_or_create_formula("P Q &&", "hash-dedup-1", "RPN")
        .await?;
    assert_eq!(id1, id2, "same hash must return the same formula id");

    let run_id = store.create_run(id1, SolverMode::Rpn, 10).await?;
    let status = store.get_status_by_run_id(run_id).await?;
    assert_eq!(status, Some(RunStatus::Created));

    Ok(())
}

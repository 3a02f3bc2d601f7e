use sat_broker::RedisBroker;
use sat_core::{Broker, JobPayload, SolverMode};

fn test_redis_url() -> Option<String> {
    std::env::var("SAT_TEST_REDIS_URL").ok()
}

#[tokio::test]
async fn claim_then_ack_round_trip() -> anyhow::Result<()> {
    let url = match test_redis_url() {
        Some(u) => u,
        None => {
            eprintln!("SKIP: SAT_TEST_REDIS_URL not set");
            return Ok(());
        }
    };

    let broker = RedisBroker::connect(&url, 4, 3600).await?;
    let run_id = 900_001_i64;
    let payload = JobPayload {
        formula: "P Q &&".to_string(),
        run_id,
        formula_id: 1,
        mode: SolverMode::Rpn,
        timeout_s: 10,
    };

    broker.enqueue(run_id, &payload).await?;
    let claimed = broker.claim(2).await?.expect("job should be claimable");
    assert_eq!(claimed.0, run_id);
    assert_eq!(claimed.1.formula, payload.formula);

    broker.ack(run_id).await?;
    Ok(())
}

#[tokio::test]
async fn claim_times_out_on_empty_queue() -> anyhow::Result<()> {
    let url = match test_redis_url() {
        Some(u) => u,
        None => {
            eprintln!("SKIP: SAT_TEST_REDIS_URL not set");
            return Ok(());
        }
    };

    let broker = RedisBroker::connect(&url, 4, 3600).await?;
    let claimed = broker.claim(1).await?;
    assert!(claimed.is_none());
    Ok(())
}

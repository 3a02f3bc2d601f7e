//! Scenario tests for `SubmissionService` (spec §8's S1/S3/S4/S7 and
//! quantified invariants 1 and 5), run against the in-memory
//! `FakeStore`/`FakeBroker` doubles rather than live Postgres/Redis.

use anyhow::Result;
use async_trait::async_trait;
use sat_core::{Broker, JobPayload, RunStatus, ServiceError, Store, SubmissionService};
use sat_testkit::{FakeBroker, FakeStore};
use std::sync::Arc;

/// A `Broker` whose `enqueue` always fails, for exercising the
/// broker-down-at-enqueue path (S7) without touching Redis.
struct AlwaysFailsBroker;

#[async_trait]
impl Broker for AlwaysFailsBroker {
    async fn enqueue(&self, _run_id: i64, _payload: &JobPayload) -> Result<()> {
        anyhow::bail!("connection refused")
    }

    async fn claim(&self, _timeout_s: u64) -> Result<Option<(i64, JobPayload)>> {
        Ok(None)
    }

    async fn ack(&self, _run_id: i64) -> Result<()> {
        Ok(())
    }

    async fn fail(&self, _run_id: i64, _reason: &str) -> Result<()> {
        Ok(())
    }
}

fn service(store: Arc<dyn Store>, broker: Arc<dyn Broker>) -> SubmissionService {
    SubmissionService::new(store, broker)
}

#[tokio::test]
async fn fresh_submission_queues_a_new_run() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store, broker);

    let resp = svc.submit("A B &&", "RPN", "RPN").await.unwrap();
    assert_eq!(resp.status, RunStatus::Queued);
    assert_eq!(resp.msg, "queued");
    assert_eq!(resp.formula, "A B &&");
}

#[tokio::test]
async fn identical_formulas_resolve_to_the_same_formula_id() {
    // Invariant 1: for all accepted submissions with identical
    // (notation, normalized_input), the resulting formula_id is identical.
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store, broker);

    let a = svc.submit("A   B &&", "RPN", "RPN").await.unwrap();
    // A distinct formula first, to rule out "always returns the same id".
    let _b = svc.submit("A B ||", "RPN", "RPN").await.unwrap();

    // Coalesces onto the first run (still active), but must report the same
    // formula_id as the original whitespace-variant submission.
    let c = svc.submit("A B &&", "RPN", "RPN").await.unwrap();
    assert_eq!(a.formula_id, c.formula_id);
}

#[tokio::test]
async fn s3_cache_hit_returns_prior_completed_run() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store.clone(), broker);

    let first = svc.submit("A B &&", "RPN", "RPN").await.unwrap();
    store
        .update_run_status(first.run_id, RunStatus::Processing)
        .await
        .unwrap();
    store
        .update_run_status(first.run_id, RunStatus::Completed)
        .await
        .unwrap();

    let second = svc.submit("A B &&", "RPN", "RPN").await.unwrap();
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.msg, "cached result found");
}

#[tokio::test]
async fn s4_in_flight_coalesce_returns_same_run_id() {
    // Invariant 5: for two submissions of the same formula arriving while no
    // completed run exists, at most one new run row is created.
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store.clone(), broker);

    let first = svc.submit("A A ! &&", "RPN", "RPN").await.unwrap();
    assert_eq!(first.status, RunStatus::Queued);

    let second = svc.submit("A A ! &&", "RPN", "RPN").await.unwrap();
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.msg, "already pending");

    let third = svc.submit("A A ! &&", "RPN", "RPN").await.unwrap();
    assert_eq!(third.run_id, first.run_id);
}

#[tokio::test]
async fn s7_broker_down_marks_run_failed_and_surfaces_503() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(AlwaysFailsBroker);
    let svc = service(store.clone(), broker);

    let err = svc.submit("A B &&", "RPN", "RPN").await.unwrap_err();
    match &err {
        ServiceError::BrokerUnavailable(_) => {}
        other => panic!("expected BrokerUnavailable, got {other:?}"),
    }
    assert_eq!(err.status_hint(), 503);

    // The run row is left behind, in Failed, so the submission is auditable.
    let normalized = sat_normalizer::normalize_and_hash("A B &&", "RPN").unwrap();
    let formula_id = store
        .get_or_create_formula(&normalized.normalized_input, &normalized.hash, "RPN")
        .await
        .unwrap();
    let active = store.get_active_run(formula_id).await.unwrap();
    assert!(active.is_none(), "a failed run must not look active");
}

#[tokio::test]
async fn get_status_and_get_result_reject_unknown_run_ids() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store, broker);

    assert!(matches!(
        svc.get_status(999).await,
        Err(ServiceError::NotFound(_))
    ));
    assert!(matches!(
        svc.get_result(999).await,
        Err(ServiceError::NotFound(_))
    ));
}

#[tokio::test]
async fn get_result_on_non_terminal_run_is_result_not_ready() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store, broker);

    let resp = svc.submit("A B &&", "RPN", "RPN").await.unwrap();
    let err = svc.get_result(resp.run_id).await.unwrap_err();
    match err {
        ServiceError::ResultNotReady { status } => assert_eq!(status, "QUEUED"),
        other => panic!("expected ResultNotReady, got {other:?}"),
    }
}

#[tokio::test]
async fn boundary_rejections_surface_as_invalid_formula() {
    let store: Arc<dyn Store> = Arc::new(FakeStore::new());
    let broker: Arc<dyn Broker> = Arc::new(FakeBroker::new());
    let svc = service(store, broker);

    for (raw, notation) in [
        ("", "RPN"),
        ("   ", "RPN"),
        ("A @ B", "RPN"),
        ("A B &&", "CNF"),
    ] {
        let err = svc.submit(raw, notation, "RPN").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidFormula(_)));
        assert_eq!(err.status_hint(), 400);
    }
}

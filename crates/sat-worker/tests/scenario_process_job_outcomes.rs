use sat_core::{Broker, JobPayload, RunStatus, SolverMode, Store};
use sat_testkit::{FakeBroker, FakeStore};
use sat_worker::{Worker, WorkerConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

async fn run_one(solver_path: &str, formula_id: i64) -> (Arc<FakeStore>, i64) {
    let store = Arc::new(FakeStore::new());
    let broker = Arc::new(FakeBroker::new());

    let dyn_store: Arc<dyn Store> = store.clone();
    let dyn_broker: Arc<dyn Broker> = broker.clone();

    // timeout_s is what the worker actually bounds the solver by (it comes
    // from the job payload, not WorkerConfig), so keep it short here too.
    let run_id = store.create_run(formula_id, SolverMode::Rpn, 2).await.unwrap();
    let payload = JobPayload {
        formula: "P Q &&".to_string(),
        run_id,
        formula_id,
        mode: SolverMode::Rpn,
        timeout_s: 2,
    };
    broker.enqueue(run_id, &payload).await.unwrap();
    store.update_run_status(run_id, RunStatus::Queued).await.unwrap();

    let worker = Worker::new(
        dyn_store,
        dyn_broker,
        WorkerConfig {
            poll_timeout_s: 1,
            solver_path_fast: solver_path.to_string(),
        },
    );

    // Single-iteration run: stop the loop flag after the first job.
    let running = Arc::new(AtomicBool::new(true));
    let running_stopper = running.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        running_stopper.store(false, Ordering::SeqCst);
    });
    worker.run_forever(running).await;

    (store, run_id)
}

#[tokio::test]
async fn sat_solver_marks_run_completed() {
    let (store, run_id) = run_one(&fixture("fake_solver_sat.sh"), 1).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Completed));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.result, sat_core::SolveDecision::Sat);
    let assignment = result.assignment.unwrap();
    assert_eq!(assignment.get("P"), Some(&true));
    assert_eq!(assignment.get("Q"), Some(&false));
}

#[tokio::test]
async fn unsat_solver_marks_run_completed_with_no_assignment() {
    let (store, run_id) = run_one(&fixture("fake_solver_unsat.sh"), 2).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Completed));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.result, sat_core::SolveDecision::Unsat);
    assert!(result.assignment.is_none());
}

#[tokio::test]
async fn missing_binary_marks_run_failed() {
    let (store, run_id) = run_one("/no/such/solver/binary", 3).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Failed));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.error_type.as_deref(), Some("BINARY_NOT_FOUND"));
}

#[tokio::test]
async fn solver_hang_marks_run_timeout() {
    let (store, run_id) = run_one(&fixture("fake_solver_hang.sh"), 4).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Timeout));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.result, sat_core::SolveDecision::Timeout);
    assert_eq!(result.error_type.as_deref(), Some("TIMEOUT"));
}

#[tokio::test]
async fn parse_error_exit_code_marks_run_failed() {
    let (store, run_id) = run_one(&fixture("fake_solver_parse_error.sh"), 5).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Failed));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.result, sat_core::SolveDecision::Error);
    assert_eq!(result.error_type.as_deref(), Some("PARSE_ERROR"));
    assert!(result.error_message.as_deref().unwrap().contains("parse error at token 2"));
}

#[tokio::test]
async fn unexpected_exit_code_marks_run_failed() {
    let (store, run_id) = run_one(&fixture("fake_solver_bad_rc.sh"), 6).await;
    let status = store.get_status_by_run_id(run_id).await.unwrap();
    assert_eq!(status, Some(RunStatus::Failed));
    let result = store.get_result_by_run_id(run_id).await.unwrap().unwrap();
    assert_eq!(result.result, sat_core::SolveDecision::Error);
    assert_eq!(result.error_type.as_deref(), Some("UNEXPECTED_RC"));
}

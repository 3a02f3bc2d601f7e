use anyhow::Result;
use async_trait::async_trait;
use sat_core::{Broker, JobMeta, JobPayload};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    pending: VecDeque<i64>,
    processing: Vec<i64>,
    payloads: HashMap<i64, JobPayload>,
    meta: HashMap<i64, JobMeta>,
}

/// In-memory stand-in for `sat-broker`'s Redis-backed implementation.
/// `claim` polls rather than blocking on a real BRPOPLPUSH, which is fine
/// for deterministic, short-lived scenario tests.
#[derive(Default)]
pub struct FakeBroker {
    state: Mutex<State>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    pub fn processing_len(&self) -> usize {
        self.state.lock().unwrap().processing.len()
    }
}

#[async_trait]
impl Broker for FakeBroker {
    async fn enqueue(&self, run_id: i64, payload: &JobPayload) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.payloads.insert(run_id, payload.clone());
        st.meta.insert(
            run_id,
            JobMeta {
                attempts: 0,
                created_at: 0,
                last_claimed_at: 0,
                failed_at: None,
                last_error: None,
            },
        );
        st.pending.push_back(run_id);
        Ok(())
    }

    async fn claim(&self, timeout_s: u64) -> Result<Option<(i64, JobPayload)>> {
        let deadline = Instant::now() + Duration::from_secs(timeout_s);
        loop {
            {
                let mut st = self.state.lock().unwrap();
                if let Some(run_id) = st.pending.pop_front() {
                    st.processing.push(run_id);
                    let payload = st.payloads.get(&run_id).cloned();
                    match payload {
                        Some(payload) => {
                            if let Some(meta) = st.meta.get_mut(&run_id) {
                                meta.attempts += 1;
                                meta.last_claimed_at = 1;
                            }
                            return Ok(Some((run_id, payload)));
                        }
                        None => {
                            st.processing.retain(|&id| id != run_id);
                            return Ok(None);
                        }
                    }
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    async fn ack(&self, run_id: i64) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.processing.retain(|&id| id != run_id);
        st.payloads.remove(&run_id);
        st.meta.remove(&run_id);
        Ok(())
    }

    async fn fail(&self, run_id: i64, reason: &str) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.processing.retain(|&id| id != run_id);
        if let Some(meta) = st.meta.get_mut(&run_id) {
            meta.failed_at = Some(1);
            meta.last_error = Some(reason.to_string());
        }
        Ok(())
    }
}

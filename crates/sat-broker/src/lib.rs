//! Redis-backed `Broker`. Key layout and claim/ack/fail semantics mirror a
//! Python reference implementation's `QueueService` closely: three lists
//! (`q:pending` -> `q:processing` -> `q:dead`) plus per-job
//! `job:{run_id}:{payload,meta,status}` keys, BRPOPLPUSH for claim.
//!
//! Store is authoritative for Run status; this crate only ever advises.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sat_core::{Broker, JobPayload};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{error, warn};

const PENDING_QUEUE: &str = "q:pending";
const PROCESSING_QUEUE: &str = "q:processing";
const DEAD_QUEUE: &str = "q:dead";

fn payload_key(run_id: i64) -> String {
    format!("job:{run_id}:payload")
}
fn meta_key(run_id: i64) -> String {
    format!("job:{run_id}:meta")
}
fn status_key(run_id: i64) -> String {
    format!("job:{run_id}:status")
}

/// A `ConnectionManager` (already auto-reconnecting and safe to clone/share)
/// wrapped by a semaphore capping concurrent in-flight command batches at
/// `REDIS_POOL_MAX_CONN` — a hand-rolled pool-by-semaphore rather than a
/// third-party pooling crate.
#[derive(Clone)]
pub struct BrokerPool {
    conn: ConnectionManager,
    limit: Arc<Semaphore>,
}

/// A connection checked out of the [`BrokerPool`]. Holds the semaphore
/// permit for as long as the connection itself is alive, so the bound on
/// `REDIS_POOL_MAX_CONN` actually applies to the in-flight command batch,
/// not just the moment of acquisition.
pub struct PooledConnection {
    conn: ConnectionManager,
    _permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = ConnectionManager;
    fn deref(&self) -> &ConnectionManager {
        &self.conn
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut ConnectionManager {
        &mut self.conn
    }
}

impl BrokerPool {
    pub async fn connect(url: &str, pool_max: u32) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis URL")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self {
            conn,
            limit: Arc::new(Semaphore::new(pool_max.max(1) as usize)),
        })
    }

    async fn acquire(&self) -> Result<PooledConnection> {
        let permit = self
            .limit
            .clone()
            .acquire_owned()
            .await
            .context("broker pool semaphore closed")?;
        // ConnectionManager clones are cheap (shared multiplexed socket); the
        // permit held inside `PooledConnection` is what actually bounds
        // concurrent in-flight command batches.
        Ok(PooledConnection {
            conn: self.conn.clone(),
            _permit: permit,
        })
    }
}

pub struct RedisBroker {
    pool: BrokerPool,
    job_ttl_s: u64,
}

impl RedisBroker {
    pub fn new(pool: BrokerPool, job_ttl_s: u64) -> Self {
        Self { pool, job_ttl_s }
    }

    pub async fn connect(url: &str, pool_max: u32, job_ttl_s: u64) -> Result<Self> {
        Ok(Self::new(BrokerPool::connect(url, pool_max).await?, job_ttl_s))
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn enqueue(&self, run_id: i64, payload: &JobPayload) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let payload_json = serde_json::to_string(payload).context("serialize job payload")?;
        let now = now_unix();

        redis::pipe()
            .atomic()
            .set_ex(payload_key(run_id), payload_json, self.job_ttl_s)
            .hset(meta_key(run_id), "attempts", 0)
            .hset(meta_key(run_id), "created_at", now)
            .hset(meta_key(run_id), "last_claimed_at", 0)
            .set_ex(status_key(run_id), "QUEUED", self.job_ttl_s)
            .rpush(PENDING_QUEUE, run_id)
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("enqueue pipeline failed")?;
        Ok(())
    }

    async fn claim(&self, timeout_s: u64) -> Result<Option<(i64, JobPayload)>> {
        let mut conn = self.pool.acquire().await?;

        let run_id_str: Option<String> = conn
            .brpoplpush(PENDING_QUEUE, PROCESSING_QUEUE, timeout_s as usize)
            .await
            .context("BRPOPLPUSH failed")?;

        let run_id_str = match run_id_str {
            Some(s) => s,
            None => return Ok(None),
        };

        let run_id: i64 = match run_id_str.parse() {
            Ok(id) => id,
            Err(_) => {
                error!(raw = %run_id_str, "claimed non-integer run_id from redis");
                let _: Result<i64, _> = conn.lrem(PROCESSING_QUEUE, 1, &run_id_str).await;
                return Ok(None);
            }
        };

        let payload_json: Option<String> = conn
            .get(payload_key(run_id))
            .await
            .context("GET payload failed")?;
        let payload_json = match payload_json {
            Some(p) => p,
            None => {
                error!(run_id, "payload missing for claimed run_id");
                let _: Result<i64, _> = conn.lrem(PROCESSING_QUEUE, 1, run_id).await;
                return Ok(None);
            }
        };

        let payload: JobPayload = match serde_json::from_str(&payload_json) {
            Ok(p) => p,
            Err(e) => {
                error!(run_id, error = %e, "invalid job payload JSON");
                let _: Result<i64, _> = conn.lrem(PROCESSING_QUEUE, 1, run_id).await;
                return Ok(None);
            }
        };

        let now = now_unix();
        if let Err(e) = redis::pipe()
            .atomic()
            .hset(meta_key(run_id), "last_claimed_at", now)
            .hincr(meta_key(run_id), "attempts", 1)
            .query_async::<_, ()>(&mut *conn)
            .await
        {
            // Metadata failure must not break job processing.
            warn!(run_id, error = %e, "failed to update claim metadata (non-fatal)");
        }

        Ok(Some((run_id, payload)))
    }

    async fn ack(&self, run_id: i64) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        redis::pipe()
            .atomic()
            .lrem(PROCESSING_QUEUE, 1, run_id)
            .del(payload_key(run_id))
            .del(meta_key(run_id))
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("ack pipeline failed")?;
        Ok(())
    }

    async fn fail(&self, run_id: i64, reason: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        let now = now_unix();
        redis::pipe()
            .atomic()
            .lrem(PROCESSING_QUEUE, 1, run_id)
            .hset(meta_key(run_id), "failed_at", now)
            .hset(meta_key(run_id), "last_error", reason)
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("fail pipeline failed")?;
        Ok(())
    }
}

impl RedisBroker {
    /// Moves `run_id` from processing to the dead queue. Not part of the
    /// `Broker` trait — spec.md leaves dead-letter policy unspecified, so
    /// this is reachable only from the opt-in reaper / CLI, not the default
    /// worker loop.
    pub async fn deadletter(&self, run_id: i64, reason: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        redis::pipe()
            .atomic()
            .lrem(PROCESSING_QUEUE, 1, run_id)
            .rpush(DEAD_QUEUE, run_id)
            .hset(meta_key(run_id), "failed_at", now_unix())
            .hset(meta_key(run_id), "last_error", reason)
            .query_async::<_, ()>(&mut *conn)
            .await
            .context("deadletter pipeline failed")?;
        Ok(())
    }

    pub async fn pending_len(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let len: i64 = conn.llen(PENDING_QUEUE).await.context("LLEN pending failed")?;
        Ok(len)
    }

    pub async fn processing_len(&self) -> Result<i64> {
        let mut conn = self.pool.acquire().await?;
        let len: i64 = conn
            .llen(PROCESSING_QUEUE)
            .await
            .context("LLEN processing failed")?;
        Ok(len)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

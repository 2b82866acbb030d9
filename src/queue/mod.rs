//! Redis-backed job queue.
//!
//! The API enqueues, the worker claims. Layout in Redis: a pending list of
//! job IDs plus one hash per job carrying the payload and status. Finished
//! job hashes expire after [`RESULT_TTL_SECS`].

use std::sync::Arc;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

mod job;

pub use job::{Job, JobKind};

/// Key prefix for queue data in Redis.
const KEY_PREFIX: &str = "bestie:queue:";
/// Queue name, shared between API and worker.
pub const QUEUE_NAME: &str = "bestie_queue";
/// How long finished job metadata survives.
pub const RESULT_TTL_SECS: i64 = 500;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("malformed job payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Handle on the shared job queue. Cheap to clone; the connection manager
/// multiplexes and reconnects underneath.
#[derive(Clone)]
pub struct TaskQueue {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
}

impl TaskQueue {
    /// Parse the URL without touching the network. The connection is
    /// established on first use and shared from then on.
    pub fn open(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
        })
    }

    /// Open and verify connectivity in one step.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let queue = Self::open(redis_url)?;
        queue.ping().await?;
        Ok(queue)
    }

    async fn conn(&self) -> Result<ConnectionManager, QueueError> {
        let conn = self
            .conn
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(conn.clone())
    }

    fn pending_key() -> String {
        format!("{}pending", KEY_PREFIX)
    }

    fn job_key(id: &str) -> String {
        format!("{}job:{}", KEY_PREFIX, id)
    }

    /// Round-trip to Redis. Lets callers fail fast at boot.
    pub async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Push a job and return its ID.
    pub async fn enqueue(&self, kind: JobKind) -> Result<String, QueueError> {
        let mut conn = self.conn().await?;
        let id = Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&kind)?;

        redis::pipe()
            .hset(Self::job_key(&id), "payload", payload)
            .hset(Self::job_key(&id), "status", "queued")
            .hset(Self::job_key(&id), "enqueued_at", Utc::now().to_rfc3339())
            .hset(
                Self::job_key(&id),
                "timeout_secs",
                kind.timeout_secs().to_string(),
            )
            .rpush(Self::pending_key(), &id)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(id)
    }

    /// Pop the next job, marking it running. `None` when the queue is empty
    /// or the popped ID's hash already expired.
    pub async fn claim(&self) -> Result<Option<Job>, QueueError> {
        let mut conn = self.conn().await?;
        let id: Option<String> = conn.lpop(Self::pending_key(), None).await?;
        let Some(id) = id else {
            return Ok(None);
        };

        let payload: Option<String> = conn.hget(Self::job_key(&id), "payload").await?;
        let Some(payload) = payload else {
            return Ok(None);
        };
        let kind: JobKind = serde_json::from_str(&payload)?;

        redis::pipe()
            .hset(Self::job_key(&id), "status", "running")
            .hset(Self::job_key(&id), "started_at", Utc::now().to_rfc3339())
            .query_async::<()>(&mut conn)
            .await?;

        Ok(Some(Job { id, kind }))
    }

    /// Mark a job done. The hash lingers for `RESULT_TTL_SECS` so it can be
    /// inspected, then drops out.
    pub async fn complete(&self, id: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .hset(Self::job_key(id), "status", "done")
            .hset(Self::job_key(id), "finished_at", Utc::now().to_rfc3339())
            .expire(Self::job_key(id), RESULT_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Mark a job failed, keeping the error on the hash.
    pub async fn fail(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .hset(Self::job_key(id), "status", "failed")
            .hset(Self::job_key(id), "error", error)
            .hset(Self::job_key(id), "finished_at", Utc::now().to_rfc3339())
            .expire(Self::job_key(id), RESULT_TTL_SECS)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// How many jobs are waiting.
    pub async fn depth(&self) -> Result<usize, QueueError> {
        let mut conn = self.conn().await?;
        let len: usize = conn.llen(Self::pending_key()).await?;
        Ok(len)
    }

    /// First `n` pending job IDs, for the debug probe.
    pub async fn sample_ids(&self, n: isize) -> Result<Vec<String>, QueueError> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn
            .lrange(Self::pending_key(), 0, n.saturating_sub(1))
            .await?;
        Ok(ids)
    }

    /// Worker liveness key, refreshed on each heartbeat tick.
    pub async fn heartbeat(&self, pid: u32, interval_secs: u64) -> Result<(), QueueError> {
        let mut conn = self.conn().await?;
        let key = format!("bestie:worker:hb:{}", pid);
        conn.set_ex::<_, _, ()>(key, Utc::now().timestamp().to_string(), interval_secs * 3)
            .await?;
        Ok(())
    }
}

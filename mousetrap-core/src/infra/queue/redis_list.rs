use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use mousetrap_contracts::{BackendError, MessageQueue, Result};
use mousetrap_model::{ReceiptHandle, ReceivedMessage};
use redis::aio::ConnectionManager;
use tracing::{debug, info, warn};

const DEFAULT_HEARTBEAT_TTL: Duration = Duration::from_secs(60);
const SCAN_COUNT: usize = 100;

/// Reliable queue over Redis lists, one processing list per worker.
///
/// Producers `LPUSH` onto `<name>`. `receive` moves each message onto
/// `<name>:processing:<worker>` with `LMOVE`, and `delete` removes it from
/// there. Every receive refreshes `<name>:heartbeat:<worker>`, which expires
/// after the heartbeat TTL. A processing list whose heartbeat has expired
/// belongs to a stopped worker; [`MessageQueue::recover_abandoned`] moves its
/// messages back to `<name>`. Live workers' lists are never touched.
#[derive(Clone)]
pub struct RedisQueue {
    conn: ConnectionManager,
    worker_id: String,
    pending_key: String,
    processing_key: String,
    heartbeat_key: String,
    heartbeat_ttl: Duration,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("connection", &"ConnectionManager")
            .field("worker_id", &self.worker_id)
            .field("pending_key", &self.pending_key)
            .field("processing_key", &self.processing_key)
            .field("heartbeat_ttl", &self.heartbeat_ttl)
            .finish()
    }
}

fn map_redis(context: &str, err: redis::RedisError) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(format!("{context}: {err}"))
    } else {
        BackendError::Unavailable(format!("{context}: {err}"))
    }
}

fn processing_key(name: &str, worker_id: &str) -> String {
    format!("{name}:processing:{worker_id}")
}

fn heartbeat_key(name: &str, worker_id: &str) -> String {
    format!("{name}:heartbeat:{worker_id}")
}

/// Escape glob metacharacters so a queue name matches literally in `SCAN
/// MATCH`.
fn escape_glob(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Worker id encoded in a processing key, if `key` is one for `name`.
fn processing_owner<'a>(name: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(name)?
        .strip_prefix(":processing:")
        .filter(|owner| !owner.is_empty())
}

impl RedisQueue {
    pub async fn connect(
        redis_url: &str,
        name: &str,
        worker_id: &str,
    ) -> Result<Self> {
        info!(
            "Connecting to Redis queue {} at {} as worker {}",
            name, redis_url, worker_id
        );

        let client = redis::Client::open(redis_url).map_err(|e| {
            BackendError::Misconfigured(format!(
                "Failed to create Redis client: {e}"
            ))
        })?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| map_redis("Failed to connect to Redis", e))?;

        info!("Successfully connected to Redis queue");
        Ok(Self::from_connection(conn, name, worker_id))
    }

    pub fn from_connection(
        conn: ConnectionManager,
        name: &str,
        worker_id: &str,
    ) -> Self {
        Self {
            conn,
            worker_id: worker_id.to_string(),
            pending_key: name.to_string(),
            processing_key: processing_key(name, worker_id),
            heartbeat_key: heartbeat_key(name, worker_id),
            heartbeat_ttl: DEFAULT_HEARTBEAT_TTL,
        }
    }

    pub fn with_heartbeat_ttl(mut self, ttl: Duration) -> Self {
        self.heartbeat_ttl = ttl.max(Duration::from_millis(1));
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    pub async fn push(&self, body: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("LPUSH")
            .arg(&self.pending_key)
            .arg(body)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis("Redis LPUSH failed", e))?;
        Ok(())
    }

    /// Mark this worker alive for one heartbeat TTL.
    pub async fn heartbeat(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let ttl_ms = u64::try_from(self.heartbeat_ttl.as_millis()).unwrap_or(u64::MAX);
        redis::cmd("SET")
            .arg(&self.heartbeat_key)
            .arg(&self.worker_id)
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| map_redis("Redis heartbeat failed", e))
    }

    /// Move what this worker's own processing list still holds back to the
    /// main list. Run once at startup, before the first receive: anything
    /// there was left by a previous run under the same worker id.
    pub async fn requeue_own(&self) -> Result<usize> {
        let moved = self.drain(&self.processing_key).await?;
        if moved > 0 {
            warn!(
                target: "mousetrap::queue",
                moved,
                queue = %self.pending_key,
                worker = %self.worker_id,
                "requeued messages left by a previous run"
            );
        }
        Ok(moved)
    }

    async fn drain(&self, from: &str) -> Result<usize> {
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let body = redis::cmd("LMOVE")
                .arg(from)
                .arg(&self.pending_key)
                .arg("RIGHT")
                .arg("RIGHT")
                .query_async::<Option<String>>(&mut conn)
                .await
                .map_err(|e| map_redis("Redis LMOVE (requeue) failed", e))?;
            if body.is_none() {
                break;
            }
            moved += 1;
        }
        Ok(moved)
    }

    async fn processing_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let pattern = format!("{}:processing:*", escape_glob(&self.pending_key));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();
        loop {
            let (next, batch) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async::<(u64, Vec<String>)>(&mut conn)
                .await
                .map_err(|e| map_redis("Redis SCAN failed", e))?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    async fn is_alive(&self, worker_id: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists = redis::cmd("EXISTS")
            .arg(heartbeat_key(&self.pending_key, worker_id))
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis("Redis EXISTS failed", e))?;
        Ok(exists > 0)
    }
}

#[async_trait]
impl MessageQueue for RedisQueue {
    async fn receive(&self, max: usize) -> Result<Vec<ReceivedMessage>> {
        self.heartbeat().await?;

        let mut conn = self.conn.clone();
        let mut out = Vec::new();
        while out.len() < max {
            let body = redis::cmd("LMOVE")
                .arg(&self.pending_key)
                .arg(&self.processing_key)
                .arg("RIGHT")
                .arg("LEFT")
                .query_async::<Option<String>>(&mut conn)
                .await
                .map_err(|e| map_redis("Redis LMOVE failed", e))?;
            let Some(body) = body else {
                break;
            };
            out.push(ReceivedMessage {
                handle: ReceiptHandle(body.clone()),
                body,
            });
        }
        Ok(out)
    }

    async fn delete(&self, handle: &ReceiptHandle) -> Result<()> {
        let mut conn = self.conn.clone();
        let removed = redis::cmd("LREM")
            .arg(&self.processing_key)
            .arg(1)
            .arg(&handle.0)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| map_redis("Redis LREM failed", e))?;
        if removed == 0 {
            return Err(BackendError::NotFound(format!(
                "message not in {}",
                self.processing_key
            )));
        }
        Ok(())
    }

    async fn recover_abandoned(&self) -> Result<usize> {
        self.heartbeat().await?;

        let mut moved = 0;
        for key in self.processing_keys().await? {
            let Some(owner) = processing_owner(&self.pending_key, &key) else {
                continue;
            };
            if owner == self.worker_id || self.is_alive(owner).await? {
                continue;
            }
            let drained = self.drain(&key).await?;
            if drained > 0 {
                warn!(
                    target: "mousetrap::queue",
                    moved = drained,
                    queue = %self.pending_key,
                    worker = %owner,
                    "requeued messages held by a stopped worker"
                );
            } else {
                debug!(target: "mousetrap::queue", worker = %owner, "abandoned processing list already empty");
            }
            moved += drained;
        }
        Ok(moved)
    }
}

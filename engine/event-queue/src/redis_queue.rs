//! Redis list backend
//!
//! Enqueue is `LPUSH` and dequeue is `BRPOP` on the same key, which makes the
//! list FIFO for a single producer and hands each item to exactly one of any
//! number of competing consumers.

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::{QueueClient, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Queue client backed by a Redis list
///
/// The connection is opened on first use and dropped after any
/// [`QueueError::Unavailable`], so the next call reconnects. A process started
/// while Redis is down reports `Unavailable` per call instead of failing at boot.
///
/// `BRPOP` occupies the multiplexed connection while it waits. Consumers
/// should own a dedicated `RedisQueue` rather than share the producers' one.
pub struct RedisQueue {
    client: Client,
    queue_name: String,
    connect_timeout: Duration,
    connection: Mutex<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    /// Create a new queue client; no connection is made yet
    pub fn new(config: &QueueConfig) -> Result<Self> {
        config.validate().map_err(QueueError::Config)?;
        let client = Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            queue_name: config.name.clone(),
            connect_timeout: config.connect_timeout(),
            connection: Mutex::new(None),
        })
    }

    /// The slot lock is only held to read or store the connection, never across
    /// the dial, so concurrent callers each fail after one `connect_timeout`.
    async fn connection(&self) -> Result<MultiplexedConnection> {
        if let Some(conn) = self.connection.lock().await.as_ref() {
            return Ok(conn.clone());
        }

        debug!(queue = %self.queue_name, "Opening Redis connection");
        let conn = tokio::time::timeout(
            self.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| {
            QueueError::Unavailable(format!("connect timed out after {:?}", self.connect_timeout))
        })?
        .map_err(QueueError::from)
        .map_err(|e| {
            warn!(queue = %self.queue_name, "Could not connect to Redis: {}", e);
            e
        })?;

        // A concurrent dial may have stored its connection first; keep that one.
        let mut slot = self.connection.lock().await;
        Ok(slot.get_or_insert(conn).clone())
    }

    /// Forget a connection that failed so the next call dials again
    async fn on_error(&self, err: redis::RedisError) -> QueueError {
        let err = QueueError::from(err);
        if err.is_unavailable() {
            self.connection.lock().await.take();
        }
        err
    }
}

/// `BRPOP` takes whole seconds on older servers and treats 0 as "forever".
fn brpop_timeout_secs(timeout: Duration) -> u64 {
    let secs = timeout.as_secs() + u64::from(timeout.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn enqueue(&self, payload: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let depth: u64 = match conn.lpush(&self.queue_name, payload).await {
            Ok(depth) => depth,
            Err(e) => return Err(self.on_error(e).await),
        };
        debug!(queue = %self.queue_name, depth, "Enqueued item");
        Ok(())
    }

    async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        let popped: Option<(String, String)> = match redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(brpop_timeout_secs(timeout))
            .query_async(&mut conn)
            .await
        {
            Ok(popped) => popped,
            Err(e) => return Err(self.on_error(e).await),
        };
        Ok(popped.map(|(_key, payload)| payload))
    }

    async fn depth(&self) -> Result<u64> {
        let mut conn = self.connection().await?;
        match conn.llen(&self.queue_name).await {
            Ok(len) => Ok(len),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        match pong {
            Ok(_) => Ok(()),
            Err(e) => Err(self.on_error(e).await),
        }
    }

    fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

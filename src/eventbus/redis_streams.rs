//! Redis Streams realization of the `EventBus` trait (§6), built on the
//! project's existing connection-management idiom (`cache::redis_client`):
//! a lazily-connected `ConnectionManager` behind a retry wrapper, with
//! reconnect-on-error between attempts.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::streams::{StreamRangeReply, StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::RwLock;

use super::event::Event;
use super::{EventBus, EventBusError, Message};

#[derive(Debug, Clone)]
pub struct RedisStreamsConfig {
    pub url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Approximate cap passed to `XADD ... MAXLEN ~ N`, bounding retention
    /// without the cost of an exact trim on every append.
    pub approx_maxlen: usize,
}

impl Default for RedisStreamsConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_retries: 3,
            retry_delay_ms: 100,
            approx_maxlen: 10_000,
        }
    }
}

/// A process-wide Redis Streams client. Cheap to clone: the inner
/// connection manager is multiplexed, and consumer tasks each hold their
/// own clone so a blocking read never head-of-line-blocks writers (§5
/// Shared resources).
#[derive(Clone)]
pub struct RedisStreamsEventBus {
    config: RedisStreamsConfig,
    connection: Arc<RwLock<Option<ConnectionManager>>>,
    client: Client,
}

impl RedisStreamsEventBus {
    pub async fn new(config: RedisStreamsConfig) -> Result<Self, EventBusError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| EventBusError::Transport(e.to_string()))?;
        let bus = Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            client,
        };
        bus.ensure_connected()
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;
        Ok(bus)
    }

    async fn ensure_connected(&self) -> Result<(), RedisError> {
        let mut conn = self.connection.write().await;
        if conn.is_none() {
            tracing::info!(url = %self.config.url, "connecting to redis streams backend");
            let manager = ConnectionManager::new(self.client.clone()).await?;
            *conn = Some(manager);
        }
        Ok(())
    }

    async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        self.ensure_connected().await?;
        let conn = self.connection.read().await;
        conn.clone()
            .ok_or_else(|| RedisError::from((redis::ErrorKind::IoError, "connection not available")))
    }

    async fn with_retry<F, Fut, T>(&self, mut operation: F) -> Result<T, RedisError>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: std::future::Future<Output = Result<T, RedisError>>,
    {
        let mut last_error = None;
        for attempt in 0..self.config.max_retries {
            match self.get_connection().await {
                Ok(conn) => match operation(conn).await {
                    Ok(result) => return Ok(result),
                    Err(e) => {
                        tracing::warn!(attempt = attempt + 1, error = %e, "redis streams operation failed");
                        last_error = Some(e);
                        if attempt < self.config.max_retries - 1 {
                            *self.connection.write().await = None;
                            tokio::time::sleep(Duration::from_millis(
                                self.config.retry_delay_ms * (attempt as u64 + 1),
                            ))
                            .await;
                        }
                    }
                },
                Err(e) => {
                    tracing::warn!(attempt = attempt + 1, error = %e, "redis streams connect failed");
                    last_error = Some(e);
                    if attempt < self.config.max_retries - 1 {
                        tokio::time::sleep(Duration::from_millis(
                            self.config.retry_delay_ms * (attempt as u64 + 1),
                        ))
                        .await;
                    }
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| RedisError::from((redis::ErrorKind::IoError, "max retries exceeded"))))
    }
}

fn encode_event(event: &Event) -> Result<(String, String), EventBusError> {
    let value = serde_json::to_value(event)?;
    let type_name = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let data = value.get("data").cloned().unwrap_or(serde_json::Value::Null);
    Ok((type_name, serde_json::to_string(&data)?))
}

fn decode_event(type_name: &str, data_json: &str) -> Result<Event, EventBusError> {
    let data: serde_json::Value = serde_json::from_str(data_json)?;
    let wrapped = serde_json::json!({ "type": type_name, "data": data });
    Ok(serde_json::from_value(wrapped)?)
}

impl EventBus for RedisStreamsEventBus {
    async fn append(&self, stream: &str, event: &Event) -> Result<String, EventBusError> {
        let (type_name, data_json) = encode_event(event)?;
        let timestamp = chrono::Utc::now().timestamp_millis();
        let maxlen = self.config.approx_maxlen;
        let stream = stream.to_string();

        self.with_retry(|mut conn| {
            let stream = stream.clone();
            let type_name = type_name.clone();
            let data_json = data_json.clone();
            async move {
                redis::cmd("XADD")
                    .arg(&stream)
                    .arg("MAXLEN")
                    .arg("~")
                    .arg(maxlen)
                    .arg("*")
                    .arg("type")
                    .arg(&type_name)
                    .arg("timestamp")
                    .arg(timestamp)
                    .arg("data")
                    .arg(&data_json)
                    .query_async(&mut conn)
                    .await
            }
        })
        .await
        .map_err(|e| EventBusError::Transport(e.to_string()))
    }

    async fn ensure_group(&self, stream: &str, group: &str, start_id: &str) -> Result<(), EventBusError> {
        let stream = stream.to_string();
        let group = group.to_string();
        let start_id = start_id.to_string();

        self.with_retry(|mut conn| {
            let stream = stream.clone();
            let group = group.clone();
            let start_id = start_id.clone();
            async move {
                let result: redis::RedisResult<()> = redis::cmd("XGROUP")
                    .arg("CREATE")
                    .arg(&stream)
                    .arg(&group)
                    .arg(&start_id)
                    .arg("MKSTREAM")
                    .query_async(&mut conn)
                    .await;
                match result {
                    Ok(()) => Ok(()),
                    Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
                    Err(e) => Err(e),
                }
            }
        })
        .await
        .map_err(|e| EventBusError::Transport(e.to_string()))
    }

    async fn read(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        block_ms: u64,
        count: usize,
    ) -> Result<Vec<Message>, EventBusError> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();

        let reply: StreamReadReply = self
            .with_retry(|mut conn| {
                let stream = stream.clone();
                let group = group.clone();
                let consumer = consumer.clone();
                async move {
                    let opts = StreamReadOptions::default()
                        .group(&group, &consumer)
                        .block(block_ms as usize)
                        .count(count);
                    conn.xread_options(&[stream.as_str()], &[">"], &opts).await
                }
            })
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;

        let mut out = Vec::new();
        for stream_key in reply.keys {
            for id_entry in stream_key.ids {
                let mut type_name: Option<String> = None;
                let mut data_json: Option<String> = None;
                for (field, value) in id_entry.map.iter() {
                    let raw: String = redis::from_redis_value(value).unwrap_or_default();
                    match field.as_str() {
                        "type" => type_name = Some(raw),
                        "data" => data_json = Some(raw),
                        _ => {}
                    }
                }
                match (type_name, data_json) {
                    (Some(t), Some(d)) => match decode_event(&t, &d) {
                        Ok(event) => out.push(Message {
                            id: id_entry.id.clone(),
                            event,
                        }),
                        Err(e) => {
                            tracing::warn!(id = %id_entry.id, error = %e, "dropping malformed event");
                            let _ = self.ack(&stream, &group, &id_entry.id).await;
                        }
                    },
                    _ => {
                        tracing::warn!(id = %id_entry.id, "dropping event missing type/data fields");
                        let _ = self.ack(&stream, &group, &id_entry.id).await;
                    }
                }
            }
        }
        Ok(out)
    }

    async fn ack(&self, stream: &str, group: &str, id: &str) -> Result<(), EventBusError> {
        let stream = stream.to_string();
        let group = group.to_string();
        let id = id.to_string();

        self.with_retry(|mut conn| {
            let stream = stream.clone();
            let group = group.clone();
            let id = id.clone();
            async move { conn.xack(&stream, &group, &[id.as_str()]).await }
        })
        .await
        .map_err(|e| EventBusError::Transport(e.to_string()))
    }

    async fn pending(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<Message>, EventBusError> {
        let stream = stream.to_string();
        let group = group.to_string();
        let consumer = consumer.to_string();

        let ids: Vec<String> = self
            .with_retry(|mut conn| {
                let stream = stream.clone();
                let group = group.clone();
                let consumer = consumer.clone();
                async move {
                    let reply: redis::streams::StreamPendingCountReply = redis::cmd("XPENDING")
                        .arg(&stream)
                        .arg(&group)
                        .arg("IDLE")
                        .arg(0)
                        .arg("-")
                        .arg("+")
                        .arg(count)
                        .arg(&consumer)
                        .query_async(&mut conn)
                        .await?;
                    Ok(reply.ids.into_iter().map(|i| i.id).collect())
                }
            })
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;

        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let claimed: StreamRangeReply = self
            .with_retry(|mut conn| {
                let stream = stream.clone();
                let ids = ids.clone();
                async move {
                    redis::cmd("XRANGE")
                        .arg(&stream)
                        .arg(ids.first().cloned().unwrap_or_else(|| "-".to_string()))
                        .arg(ids.last().cloned().unwrap_or_else(|| "+".to_string()))
                        .query_async(&mut conn)
                        .await
                }
            })
            .await
            .map_err(|e| EventBusError::Transport(e.to_string()))?;

        let mut out = Vec::new();
        for id_entry in claimed.ids {
            if !ids.contains(&id_entry.id) {
                continue;
            }
            let mut type_name: Option<String> = None;
            let mut data_json: Option<String> = None;
            for (field, value) in id_entry.map.iter() {
                let raw: String = redis::from_redis_value(value).unwrap_or_default();
                match field.as_str() {
                    "type" => type_name = Some(raw),
                    "data" => data_json = Some(raw),
                    _ => {}
                }
            }
            if let (Some(t), Some(d)) = (type_name, data_json) {
                if let Ok(event) = decode_event(&t, &d) {
                    out.push(Message {
                        id: id_entry.id.clone(),
                        event,
                    });
                }
            }
        }
        Ok(out)
    }
}

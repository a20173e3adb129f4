//! Event publisher/subscriber (C7): the Redis pub/sub bus carrying
//! `position:new` in and the domain events (`trip:started`, `stop:completed`,
//! `tracker:state:changed`, ...) out. A key prefix may be applied globally so
//! several processes can share one Redis instance (§4.6).
//!
//! Publishing uses a shared [`ConnectionManager`], which reconnects
//! transparently. Subscriptions cannot multiplex over that connection, so
//! each subscriber owns its own dedicated connection and reconnects itself
//! with backoff on disconnect — the same resilience posture this crate
//! applies to its other external collaborators.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("timed out waiting for redis connection")]
    ConnectTimeout,
    #[error("failed to serialize event payload: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A message received off a subscribed channel, with the prefix already
/// stripped back to the canonical channel name.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

fn apply_prefix(prefix: &str, channel: &str) -> String {
    format!("{prefix}{channel}")
}

#[derive(Clone)]
pub struct EventBus {
    redis_url: String,
    key_prefix: String,
    publisher: ConnectionManager,
}

impl EventBus {
    pub async fn connect(redis_url: impl Into<String>, key_prefix: impl Into<String>) -> Result<Self, EventBusError> {
        let redis_url = redis_url.into();
        let client = redis::Client::open(redis_url.as_str())?;
        let publisher = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| EventBusError::ConnectTimeout)??;
        Ok(Self {
            redis_url,
            key_prefix: key_prefix.into(),
            publisher,
        })
    }

    fn full_channel(&self, channel: &str) -> String {
        apply_prefix(&self.key_prefix, channel)
    }

    /// Publishes `payload` as JSON on `channel` (a literal name from
    /// [`domain::models::channels`]).
    pub async fn publish<T: Serialize>(&self, channel: &str, payload: &T) -> Result<(), EventBusError> {
        let json = serde_json::to_string(payload)?;
        let mut conn = self.publisher.clone();
        let _: () = conn.publish(self.full_channel(channel), json).await?;
        Ok(())
    }

    /// Subscribes to `channels` on a dedicated connection and streams
    /// messages over the returned receiver. The background task reconnects
    /// with exponential backoff on disconnect and runs until `cancel` fires.
    pub fn subscribe(&self, channels: Vec<String>, cancel: CancellationToken) -> mpsc::Receiver<BusMessage> {
        let (tx, rx) = mpsc::channel(1024);
        let redis_url = self.redis_url.clone();
        let key_prefix = self.key_prefix.clone();
        let full_channels: Vec<String> = channels.iter().map(|c| format!("{key_prefix}{c}")).collect();

        tokio::spawn(async move {
            let mut backoff = INITIAL_BACKOFF;
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                match run_subscription(&redis_url, &full_channels, &key_prefix, &tx, &cancel).await {
                    Ok(()) => return, // cancelled cleanly
                    Err(err) => {
                        warn!(error = %err, backoff_ms = backoff.as_millis() as u64, "event bus subscriber disconnected, retrying");
                        tokio::select! {
                            _ = tokio::time::sleep(backoff) => {}
                            _ = cancel.cancelled() => return,
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        });

        rx
    }
}

async fn run_subscription(
    redis_url: &str,
    full_channels: &[String],
    key_prefix: &str,
    tx: &mpsc::Sender<BusMessage>,
    cancel: &CancellationToken,
) -> Result<(), EventBusError> {
    let client = redis::Client::open(redis_url)?;
    let conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_async_connection())
        .await
        .map_err(|_| EventBusError::ConnectTimeout)??;
    let mut pubsub = conn.into_pubsub();
    for channel in full_channels {
        pubsub.subscribe(channel).await?;
    }
    debug!(channels = ?full_channels, "event bus subscriber connected");

    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            msg = futures_next(&mut stream) => {
                let Some(msg) = msg else {
                    return Err(EventBusError::Connection(redis::RedisError::from((
                        redis::ErrorKind::IoError,
                        "subscription stream ended",
                    ))));
                };
                let channel: String = msg.get_channel_name().to_string();
                let canonical = channel.strip_prefix(key_prefix).unwrap_or(&channel).to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(err) => {
                        error!(error = %err, channel = %canonical, "dropping malformed pub/sub payload");
                        continue;
                    }
                };
                if tx.send(BusMessage { channel: canonical, payload }).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Thin wrapper so the `on_message` stream can be awaited inside `select!`
/// without pulling in the `futures` crate for a single `.next()` call.
async fn futures_next<'a>(
    stream: &mut (impl futures_util::Stream<Item = redis::Msg> + Unpin),
) -> Option<redis::Msg> {
    use futures_util::StreamExt;
    stream.next().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_channel_applies_configured_prefix() {
        assert_eq!(apply_prefix("fmt:", "trip:started"), "fmt:trip:started");
    }

    #[test]
    fn empty_prefix_leaves_channel_name_untouched() {
        assert_eq!(apply_prefix("", "position:new"), "position:new");
    }
}

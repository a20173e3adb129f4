//! Hot state store (C5): a Redis-backed KV mirror of each device's motion
//! state and tracker state, with TTL so stale devices age out on their own.
//!
//! This is the system's cache, not its system of record — a flush or
//! eviction is recovered by falling through to (C8) and re-hydrating. The
//! per-device dispatcher (C4) is what actually keeps mutation of a single
//! device's state race-free; this store only needs to be safe for
//! concurrent access across devices.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

use domain::models::{MotionStateSnapshot, TrackerState};

/// Bounded wait for the initial connection to become ready (§5).
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default TTL applied to every hot-state write (§4.4).
pub const DEFAULT_STATE_TTL_SECS: u64 = 7 * 24 * 3600;

/// TTL on the throttle marker used to discard duplicate/out-of-order samples.
pub const THROTTLE_TTL_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum HotStoreError {
    #[error("redis connection error: {0}")]
    Connection(#[from] redis::RedisError),
    #[error("timed out waiting for redis connection")]
    ConnectTimeout,
    #[error("failed to (de)serialize hot state: {0}")]
    Serde(#[from] serde_json::Error),
}

fn motion_key(prefix: &str, device_id: &str) -> String {
    format!("{prefix}motion:{device_id}")
}

fn tracker_key(prefix: &str, device_id: &str) -> String {
    format!("{prefix}tracker:{device_id}")
}

fn throttle_key(prefix: &str, device_id: &str) -> String {
    format!("{prefix}throttle:{device_id}")
}

#[derive(Clone)]
pub struct HotStore {
    conn: ConnectionManager,
    key_prefix: String,
    state_ttl_secs: u64,
}

impl HotStore {
    /// Connects to Redis, waiting up to [`CONNECT_TIMEOUT`] for the
    /// connection manager to come up.
    pub async fn connect(redis_url: &str, key_prefix: impl Into<String>) -> Result<Self, HotStoreError> {
        let client = redis::Client::open(redis_url)?;
        let conn = tokio::time::timeout(CONNECT_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| HotStoreError::ConnectTimeout)??;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
            state_ttl_secs: DEFAULT_STATE_TTL_SECS,
        })
    }

    fn motion_key(&self, device_id: &str) -> String {
        motion_key(&self.key_prefix, device_id)
    }

    fn tracker_key(&self, device_id: &str) -> String {
        tracker_key(&self.key_prefix, device_id)
    }

    fn throttle_key(&self, device_id: &str) -> String {
        throttle_key(&self.key_prefix, device_id)
    }

    pub async fn get_motion_state(
        &self,
        device_id: &str,
    ) -> Result<Option<MotionStateSnapshot>, HotStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.motion_key(device_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put_motion_state(&self, snapshot: &MotionStateSnapshot) -> Result<(), HotStoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(snapshot)?;
        let _: () = conn
            .set_ex(self.motion_key(&snapshot.device_id), json, self.state_ttl_secs)
            .await?;
        Ok(())
    }

    pub async fn get_tracker_state(
        &self,
        device_id: &str,
    ) -> Result<Option<TrackerState>, HotStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.tracker_key(device_id)).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put_tracker_state(&self, state: &TrackerState) -> Result<(), HotStoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(state)?;
        let _: () = conn
            .set_ex(self.tracker_key(&state.device_id), json, self.state_ttl_secs)
            .await?;
        Ok(())
    }

    /// Evicts both hot-state entries for a device, e.g. when the orphan
    /// reaper finds one whose `lastUpdate` has gone stale (§4.8).
    pub async fn evict(&self, device_id: &str) -> Result<(), HotStoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[self.motion_key(device_id), self.tracker_key(device_id)])
            .await?;
        Ok(())
    }

    /// Checks Redis reachability for the health endpoint.
    pub async fn ping(&self) -> Result<(), HotStoreError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    /// Applies the throttle check (§4.4): a sample whose timestamp is at or
    /// before the device's last-processed timestamp is a duplicate or
    /// arrived out of order within the throttle window, and is discarded.
    /// Returns `true` when the sample should be accepted.
    pub async fn check_and_advance_throttle(
        &self,
        device_id: &str,
        sample_timestamp_millis: i64,
    ) -> Result<bool, HotStoreError> {
        let mut conn = self.conn.clone();
        let key = self.throttle_key(device_id);
        let last: Option<i64> = conn.get(&key).await?;
        if let Some(last_ts) = last {
            if sample_timestamp_millis <= last_ts {
                return Ok(false);
            }
        }
        let _: () = conn.set_ex(&key, sample_timestamp_millis, THROTTLE_TTL_SECS).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_prefix_and_device() {
        assert_eq!(motion_key("fmt:", "D1"), "fmt:motion:D1");
        assert_eq!(tracker_key("fmt:", "D1"), "fmt:tracker:D1");
        assert_eq!(throttle_key("fmt:", "D1"), "fmt:throttle:D1");
    }

    #[test]
    fn empty_prefix_yields_bare_keys() {
        assert_eq!(motion_key("", "D1"), "motion:D1");
    }
}

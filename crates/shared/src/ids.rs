//! Opaque ID minting for trip and stop records.

use chrono::Utc;
use uuid::Uuid;

/// Mints an opaque trip ID from a device ID and the current instant.
///
/// Format is `trip_{deviceId}_{unixMillis}_{uuidSuffix}`; the timestamp keeps IDs
/// roughly sortable, the UUID suffix guarantees collision-freedom across concurrent
/// per-device workers.
pub fn mint_trip_id(device_id: &str) -> String {
    mint_id("trip", device_id)
}

/// Mints an opaque stop ID from a device ID and the current instant.
pub fn mint_stop_id(device_id: &str) -> String {
    mint_id("stop", device_id)
}

fn mint_id(prefix: &str, device_id: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{device_id}_{millis}_{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_trip_id_has_prefix_and_device() {
        let id = mint_trip_id("device-42");
        assert!(id.starts_with("trip_device-42_"));
    }

    #[test]
    fn test_mint_stop_id_has_prefix_and_device() {
        let id = mint_stop_id("device-42");
        assert!(id.starts_with("stop_device-42_"));
    }

    #[test]
    fn test_minted_ids_are_unique() {
        let a = mint_trip_id("device-1");
        let b = mint_trip_id("device-1");
        assert_ne!(a, b);
    }
}

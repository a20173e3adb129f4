//! Position sample: the GPS fix ingested from a vehicle tracker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single GPS fix reported by a device, as received off the `position:new`
/// channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    pub device_id: String,
    /// Milliseconds since epoch.
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Reported speed in km/h.
    pub speed: f64,
    pub ignition: Option<bool>,
    pub heading: Option<f64>,
    pub altitude: Option<f64>,
    pub accuracy: Option<f64>,
    pub satellites: Option<u32>,
    /// Opaque bag forwarded verbatim to any trip/stop derived from this sample.
    /// Never read by detection logic.
    #[serde(default)]
    pub metadata: Value,
}

impl PositionSample {
    /// Resolves the effective ignition state, falling back to the tracker's
    /// last-known ignition when the sample omits the field, and finally to
    /// `false` when that too is unknown.
    pub fn effective_ignition(&self, last_known_ignition: Option<bool>) -> bool {
        self.ignition
            .or(last_known_ignition)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ignition: Option<bool>) -> PositionSample {
        PositionSample {
            device_id: "D1".into(),
            timestamp: 0,
            latitude: -31.42,
            longitude: -64.18,
            speed: 0.0,
            ignition,
            heading: None,
            altitude: None,
            accuracy: None,
            satellites: None,
            metadata: Value::Null,
        }
    }

    #[test]
    fn effective_ignition_uses_own_value_when_present() {
        assert!(sample(Some(true)).effective_ignition(Some(false)));
        assert!(!sample(Some(false)).effective_ignition(Some(true)));
    }

    #[test]
    fn effective_ignition_falls_back_to_tracker_state() {
        assert!(sample(None).effective_ignition(Some(true)));
        assert!(!sample(None).effective_ignition(Some(false)));
    }

    #[test]
    fn effective_ignition_defaults_to_false_when_unknown() {
        assert!(!sample(None).effective_ignition(None));
    }
}

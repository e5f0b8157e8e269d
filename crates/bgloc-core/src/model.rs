use serde::{Deserialize, Serialize};

use crate::ids::LocationId;
use crate::time::EpochMs;

/// Delivery state of a persisted location. Delivered records are deleted,
/// so there is no stored "delivered" state.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Pending,
    AwaitingSync,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Pending => "pending",
            Disposition::AwaitingSync => "awaiting_sync",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Disposition::Pending),
            "awaiting_sync" => Some(Disposition::AwaitingSync),
            _ => None,
        }
    }
}

/// One observed position.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<LocationId>,
    pub recorded_at_ms: EpochMs,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate_miles: Option<f64>,
    #[serde(default, skip_serializing)]
    pub disposition: Disposition,
}

impl LocationRecord {
    /// A transient fix as produced by the sensing layer.
    pub fn new(recorded_at_ms: EpochMs, latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            recorded_at_ms,
            latitude,
            longitude,
            speed: None,
            bearing: None,
            accuracy: None,
            altitude: None,
            provider: None,
            position: None,
            direction: None,
            estimate_miles: None,
            disposition: Disposition::Pending,
        }
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_bearing(mut self, bearing: f32) -> Self {
        self.bearing = Some(bearing);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f32) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Apply enrichment fields written by `update_for_sync`.
    pub fn apply_sync_fields(&mut self, fields: &SyncFields) {
        if let Some(p) = &fields.position {
            self.position = Some(p.clone());
        }
        if let Some(d) = &fields.direction {
            self.direction = Some(d.clone());
        }
        if let Some(m) = fields.estimate_miles {
            self.estimate_miles = Some(m);
        }
        if let Some(s) = fields.speed {
            self.speed = Some(s);
        }
    }
}

/// Fields an external enrichment step (e.g. reverse geocoding) writes back
/// onto a persisted record before it is queued for batch sync.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncFields {
    pub position: Option<String>,
    pub direction: Option<String>,
    pub estimate_miles: Option<f64>,
    pub speed: Option<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_round_trips_through_str() {
        for d in [Disposition::Pending, Disposition::AwaitingSync] {
            assert_eq!(Disposition::parse(d.as_str()), Some(d));
        }
        assert_eq!(Disposition::parse("delivered"), None);
    }

    #[test]
    fn sync_fields_only_overwrite_present_values() {
        let mut rec = LocationRecord::new(1, 25.0, 121.5).with_speed(3.0);
        rec.position = Some("old".into());
        rec.apply_sync_fields(&SyncFields {
            direction: Some("NE".into()),
            estimate_miles: Some(1.25),
            ..Default::default()
        });
        assert_eq!(rec.position.as_deref(), Some("old"));
        assert_eq!(rec.direction.as_deref(), Some("NE"));
        assert_eq!(rec.estimate_miles, Some(1.25));
        assert_eq!(rec.speed, Some(3.0));
    }

    #[test]
    fn serialized_record_uses_camel_case_and_hides_disposition() {
        let mut rec = LocationRecord::new(1_700_000_000_000, 1.5, 2.5);
        rec.id = Some(LocationId(7));
        rec.disposition = Disposition::AwaitingSync;
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v["recordedAtMs"], 1_700_000_000_000i64);
        assert_eq!(v["id"], 7);
        assert!(v.get("disposition").is_none());
        assert!(v.get("speed").is_none());
    }
}

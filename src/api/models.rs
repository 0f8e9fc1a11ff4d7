//! Backend resources and request bodies.
//!
//! Field names follow the backend's JSON. Unknown fields are ignored and most
//! fields default when missing, since list endpoints return partial objects.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parse an embedded environment JSON string. Empty strings are an empty environment.
pub fn parse_environment(raw: &str) -> Result<Map<String, Value>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    serde_json::from_str(raw)
}

/// Resources that record the user who created them.
pub trait Owned {
    fn created_by(&self) -> Option<&str>;

    fn is_owned_by(&self, email: &str) -> bool {
        self.created_by() == Some(email)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub device_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingRef {
    pub timing: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationService {
    pub service: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Application {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub services: Vec<ApplicationService>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Application {
    pub fn parsed_environment(&self) -> Result<Map<String, Value>, serde_json::Error> {
        parse_environment(&self.environment)
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.uuid)
    }
}

impl Owned for Application {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePeripheral {
    pub peripheral_schema: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Service {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub container_ref: String,
    #[serde(default)]
    pub peripherals: Vec<ServicePeripheral>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Owned for Service {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeripheralSchemaRef {
    #[serde(rename = "type")]
    pub kind: String,
}

/// A peripheral installed on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peripheral {
    #[serde(default)]
    pub name: String,
    pub schema: PeripheralSchemaRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Device {
    pub uuid: String,
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub api_heartbeat_state: Option<String>,
    #[serde(default)]
    pub peripherals: Vec<Peripheral>,
}

impl Device {
    pub fn has_peripheral_schema(&self, schema: &str) -> bool {
        self.peripherals.iter().any(|p| p.schema.kind == schema)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl Owned for Collection {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

/// A reserved time range, optionally tagged with the timing it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeslot {
    #[serde(with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub stop: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_uuid: Option<String>,
}

impl Timeslot {
    /// Overlap test used by the backend: touching endpoints count as a collision.
    pub fn overlaps(&self, other: &Timeslot) -> bool {
        self.start <= other.stop && other.start <= self.stop
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Job {
    pub uuid: String,
    #[serde(default)]
    pub application: String,
    #[serde(default)]
    pub environment: String,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub devices: Vec<DeviceRef>,
    #[serde(default)]
    pub timings: Vec<TimingRef>,
    #[serde(default)]
    pub timeslots: Vec<Timeslot>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Job {
    pub fn parsed_environment(&self) -> Result<Map<String, Value>, serde_json::Error> {
        parse_environment(&self.environment)
    }

    /// Pair every timing with the timeslots generated from it, in timing order.
    pub fn timing_timeslots(&self) -> Vec<(&str, Vec<&Timeslot>)> {
        self.timings
            .iter()
            .map(|t| {
                let slots = self
                    .timeslots
                    .iter()
                    .filter(|ts| ts.note.as_deref() == Some(t.timing.as_str()))
                    .collect();
                (t.timing.as_str(), slots)
            })
            .collect()
    }
}

impl Owned for Job {
    fn created_by(&self) -> Option<&str> {
        self.created_by.as_deref()
    }
}

/// Body of `POST /api/jobs/check/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub devices: Vec<DeviceRef>,
    pub timings: Vec<TimingRef>,
    pub application: Option<String>,
}

/// Response of the conflict check.
///
/// `conflicts` maps a device uuid to the existing reservations it collides
/// with; `timeslots` maps each requested timing to the ranges it would occupy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictCheckResult {
    #[serde(default)]
    pub conflicts: HashMap<String, Vec<Timeslot>>,
    #[serde(default)]
    pub timeslots: HashMap<String, Vec<Timeslot>>,
}

impl ConflictCheckResult {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts.values().any(|slots| !slots.is_empty())
    }

    pub fn conflicting_devices(&self) -> Vec<&str> {
        let mut devices: Vec<&str> = self
            .conflicts
            .iter()
            .filter(|(_, slots)| !slots.is_empty())
            .map(|(uuid, _)| uuid.as_str())
            .collect();
        devices.sort_unstable();
        devices
    }

    /// Devices whose existing reservations collide with `slot`, sorted.
    pub fn devices_conflicting_with(&self, slot: &Timeslot) -> Vec<&str> {
        let mut devices: Vec<&str> = self
            .conflicts
            .iter()
            .filter(|(_, reserved)| reserved.iter().any(|r| r.overlaps(slot)))
            .map(|(uuid, _)| uuid.as_str())
            .collect();
        devices.sort_unstable();
        devices
    }
}

/// Body of `POST /api/jobs/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateJobRequest {
    pub is_public: bool,
    pub application: String,
    /// JSON-encoded environment map.
    pub environment: String,
    pub devices: Vec<DeviceRef>,
    pub timings: Vec<TimingRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_project: Option<String>,
}

/// Timestamps from the backend are either RFC 3339 or naive ISO 8601 in UTC.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub(super) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_timeslot_accepts_naive_and_offset_timestamps() {
        let slot: Timeslot = serde_json::from_value(json!({
            "start": "2024-01-01T00:00:00.250000",
            "stop": "2024-01-01T02:00:00+01:00",
            "note": "type=on_demand,days=0,hours=1,minutes=0"
        }))
        .unwrap();

        assert_eq!(slot.start.to_rfc3339(), "2024-01-01T00:00:00.250+00:00");
        assert_eq!(slot.stop.to_rfc3339(), "2024-01-01T01:00:00+00:00");
        assert!(timestamp::parse("not a date").is_none());
    }

    #[test]
    fn test_timeslot_overlap_includes_touching_edges() {
        let slot = |start: &str, stop: &str| Timeslot {
            start: timestamp::parse(start).unwrap(),
            stop: timestamp::parse(stop).unwrap(),
            note: None,
            device_uuid: None,
        };
        let a = slot("2024-01-01T00:00:00Z", "2024-01-01T02:00:00Z");
        assert!(a.overlaps(&slot("2024-01-01T02:00:00Z", "2024-01-01T03:00:00Z")));
        assert!(a.overlaps(&slot("2023-12-31T00:00:00Z", "2024-01-02T00:00:00Z")));
        assert!(!a.overlaps(&slot("2024-01-01T02:00:01Z", "2024-01-01T03:00:00Z")));
    }

    #[test]
    fn test_job_groups_timeslots_by_timing() {
        let job: Job = serde_json::from_value(json!({
            "uuid": "job-1",
            "application": "app-1",
            "timings": [{"timing": "t1"}, {"timing": "t2"}],
            "timeslots": [
                {"start": "2024-01-01T00:00:00Z", "stop": "2024-01-01T01:00:00Z", "note": "t1"},
                {"start": "2024-01-02T00:00:00Z", "stop": "2024-01-02T01:00:00Z", "note": "t1"},
                {"start": "2024-01-03T00:00:00Z", "stop": "2024-01-03T01:00:00Z", "note": "other"}
            ],
            "unexpected_field": 42
        }))
        .unwrap();

        let grouped = job.timing_timeslots();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].0, "t1");
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[1].0, "t2");
        assert!(grouped[1].1.is_empty());
    }

    #[test]
    fn test_environment_and_ownership() {
        let app = Application {
            uuid: "a".into(),
            name: "demo".into(),
            environment: r#"{"RATE": "10"}"#.into(),
            created_by: Some("me@example.org".into()),
            ..Default::default()
        };
        assert_eq!(app.parsed_environment().unwrap()["RATE"], json!("10"));
        assert!(app.is_owned_by("me@example.org"));
        assert!(!app.is_owned_by("you@example.org"));
        assert_eq!(app.label(), "demo (a)");

        assert!(parse_environment("").unwrap().is_empty());
        assert!(parse_environment("[1, 2]").is_err());
    }

    #[test]
    fn test_conflicting_devices_skips_empty_entries() {
        let result: ConflictCheckResult = serde_json::from_value(json!({
            "conflicts": {
                "dev-b": [{"start": "2024-01-01T00:00:00Z", "stop": "2024-01-01T01:00:00Z"}],
                "dev-a": []
            }
        }))
        .unwrap();

        assert!(result.has_conflicts());
        assert_eq!(result.conflicting_devices(), vec!["dev-b"]);
        assert!(result.timeslots.is_empty());
    }

    #[test]
    fn test_preview_slot_maps_to_conflicting_devices() {
        let result: ConflictCheckResult = serde_json::from_value(json!({
            "conflicts": {
                "dev-b": [{"start": "2024-01-01T01:00:00Z", "stop": "2024-01-01T03:00:00Z"}],
                "dev-a": [{"start": "2024-01-01T02:30:00Z", "stop": "2024-01-01T04:00:00Z"}],
                "dev-c": [{"start": "2024-01-02T00:00:00Z", "stop": "2024-01-02T01:00:00Z"}]
            }
        }))
        .unwrap();
        let preview = Timeslot {
            start: timestamp::parse("2024-01-01T02:00:00Z").unwrap(),
            stop: timestamp::parse("2024-01-01T02:30:00Z").unwrap(),
            note: None,
            device_uuid: None,
        };

        assert_eq!(result.devices_conflicting_with(&preview), vec!["dev-a", "dev-b"]);
        assert!(ConflictCheckResult::default()
            .devices_conflicting_with(&preview)
            .is_empty());
    }

    #[test]
    fn test_create_request_shape() {
        let request = CreateJobRequest {
            is_public: false,
            application: "app".into(),
            environment: "{}".into(),
            devices: vec![DeviceRef {
                device_uuid: "d1".into(),
            }],
            timings: vec![TimingRef {
                timing: "type=on_demand,days=1,hours=0,minutes=0".into(),
            }],
            created_by_project: None,
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "is_public": false,
                "application": "app",
                "environment": "{}",
                "devices": [{"device_uuid": "d1"}],
                "timings": [{"timing": "type=on_demand,days=1,hours=0,minutes=0"}]
            })
        );
    }
}

//! Job timing descriptors and their wire format.
//!
//! A timing tells the backend when a job may run. It is either on-demand
//! (start now, expire after a duration) or advanced (an explicit window).
//! The backend stores timings as a flat `key=value` string:
//!
//! ```text
//! type=on_demand,days=1,hours=2,minutes=30
//! type=advanced,start=2024-01-01T00:00:00Z,end=2024-01-02T03:00:00Z
//! ```

mod duration;
pub mod pending;
pub mod status;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use duration::DurationParts;
pub use pending::{PendingTimingList, delete};
pub use status::{
    AdvancedForm, OnDemandForm, TimingStatus, compute_advanced_status, compute_on_demand_status,
};

use crate::api::Timeslot;

const TYPE_KEY: &str = "type";
const ON_DEMAND: &str = "on_demand";
const ADVANCED: &str = "advanced";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimingError {
    #[error("timing string is empty")]
    Empty,
    #[error("timing string must start with 'type=...', got '{0}'")]
    MissingType(String),
    #[error("unknown timing type '{0}'")]
    UnknownType(String),
    #[error("expected 'key=value' but got '{0}'")]
    MalformedPair(String),
    #[error("unknown key '{key}' for {kind} timing")]
    UnknownKey { kind: &'static str, key: String },
    #[error("key '{0}' appears more than once")]
    DuplicateKey(String),
    #[error("missing key '{0}'")]
    MissingKey(&'static str),
    #[error("invalid number '{value}' for '{key}'")]
    InvalidNumber { key: String, value: String },
    #[error("'{key}' must be below {limit}, got {value}")]
    OutOfRange { key: &'static str, value: u64, limit: u64 },
    #[error("invalid timestamp '{value}' for '{key}'")]
    InvalidTimestamp { key: &'static str, value: String },
    #[error("start must be before end")]
    EndBeforeStart,
    #[error("{0}")]
    NotAddable(String),
}

/// A validated job timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TimingDescriptor {
    /// Run from now until the duration elapses.
    OnDemand(DurationParts),
    /// Run within an explicit window.
    Advanced {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

impl TimingDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            TimingDescriptor::OnDemand(_) => ON_DEMAND,
            TimingDescriptor::Advanced { .. } => ADVANCED,
        }
    }

    /// The concrete time range this timing would occupy if scheduled at `now`.
    pub fn timeslot(&self, now: DateTime<Utc>) -> Timeslot {
        match self {
            TimingDescriptor::OnDemand(parts) => Timeslot {
                start: now,
                stop: now + parts.to_delta(),
                note: Some(self.to_string()),
                device_uuid: None,
            },
            TimingDescriptor::Advanced { start, end } => Timeslot {
                start: *start,
                stop: *end,
                note: Some(self.to_string()),
                device_uuid: None,
            },
        }
    }
}

/// Render a timestamp the way timing strings carry it: UTC, second precision, `Z` suffix.
pub fn format_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String {
    ts.with_timezone(&Utc)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn encode_on_demand(days: u64, hours: u64, minutes: u64) -> String {
    format!("type={ON_DEMAND},days={days},hours={hours},minutes={minutes}")
}

pub fn encode_advanced<Tz: TimeZone>(start: &DateTime<Tz>, end: &DateTime<Tz>) -> String {
    format!(
        "type={ADVANCED},start={},end={}",
        format_timestamp(start),
        format_timestamp(end)
    )
}

impl fmt::Display for TimingDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimingDescriptor::OnDemand(p) => {
                f.write_str(&encode_on_demand(p.days, p.hours, p.minutes))
            }
            TimingDescriptor::Advanced { start, end } => f.write_str(&encode_advanced(start, end)),
        }
    }
}

impl From<TimingDescriptor> for String {
    fn from(value: TimingDescriptor) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for TimingDescriptor {
    type Error = TimingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for TimingDescriptor {
    type Err = TimingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TimingError::Empty);
        }

        let mut parts = s.split(',');
        let head = parts.next().unwrap_or_default();
        let kind = match head.split_once('=') {
            Some((TYPE_KEY, kind)) => kind,
            _ => return Err(TimingError::MissingType(head.to_string())),
        };

        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for pair in parts {
            let (key, value) = pair
                .split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .ok_or_else(|| TimingError::MalformedPair(pair.to_string()))?;
            if pairs.iter().any(|(k, _)| *k == key) {
                return Err(TimingError::DuplicateKey(key.to_string()));
            }
            pairs.push((key, value));
        }

        match kind {
            ON_DEMAND => parse_on_demand(&pairs),
            ADVANCED => parse_advanced(&pairs),
            other => Err(TimingError::UnknownType(other.to_string())),
        }
    }
}

fn parse_on_demand(pairs: &[(&str, &str)]) -> Result<TimingDescriptor, TimingError> {
    let mut parts = DurationParts::default();
    for &(key, value) in pairs {
        let number: u64 = value.parse().map_err(|_| TimingError::InvalidNumber {
            key: key.to_string(),
            value: value.to_string(),
        })?;
        match key {
            "days" => parts.days = number,
            "hours" => parts.hours = bounded("hours", number, 24)?,
            "minutes" => parts.minutes = bounded("minutes", number, 60)?,
            _ => {
                return Err(TimingError::UnknownKey {
                    kind: ON_DEMAND,
                    key: key.to_string(),
                });
            }
        }
    }
    Ok(TimingDescriptor::OnDemand(parts))
}

fn bounded(key: &'static str, value: u64, limit: u64) -> Result<u64, TimingError> {
    if value >= limit {
        return Err(TimingError::OutOfRange { key, value, limit });
    }
    Ok(value)
}

fn parse_advanced(pairs: &[(&str, &str)]) -> Result<TimingDescriptor, TimingError> {
    let mut start = None;
    let mut end = None;
    for &(key, value) in pairs {
        match key {
            "start" => start = Some(parse_timestamp("start", value)?),
            "end" => end = Some(parse_timestamp("end", value)?),
            _ => {
                return Err(TimingError::UnknownKey {
                    kind: ADVANCED,
                    key: key.to_string(),
                });
            }
        }
    }
    let start = start.ok_or(TimingError::MissingKey("start"))?;
    let end = end.ok_or(TimingError::MissingKey("end"))?;
    if end <= start {
        return Err(TimingError::EndBeforeStart);
    }
    Ok(TimingDescriptor::Advanced { start, end })
}

fn parse_timestamp(key: &'static str, value: &str) -> Result<DateTime<Utc>, TimingError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|_| TimingError::InvalidTimestamp {
            key,
            value: value.to_string(),
        })
}

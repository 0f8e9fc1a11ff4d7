//! Validation of timing form input.
//!
//! Each computation reports a human-readable status for every intermediate
//! state of the form, and whether the timing may be added yet.

use chrono::{DateTime, SubsecRound, Utc};

use super::{DurationParts, TimingDescriptor, format_timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingStatus {
    pub message: String,
    pub addable: bool,
    /// Decomposed duration, present only when the timing is addable.
    pub parts: Option<DurationParts>,
}

impl TimingStatus {
    fn blocked(message: &str) -> Self {
        Self {
            message: message.to_string(),
            addable: false,
            parts: None,
        }
    }

    fn ready(message: String, parts: DurationParts) -> Self {
        Self {
            message,
            addable: true,
            parts: Some(parts),
        }
    }
}

pub fn compute_on_demand_status(
    target: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TimingStatus {
    let Some(target) = target else {
        return TimingStatus::blocked("Expiration date not set");
    };
    if target <= now {
        return TimingStatus::blocked("Date cannot be in the past");
    }

    let parts = DurationParts::decompose(target - now);
    TimingStatus::ready(format!("Expires in {parts}"), parts)
}

pub fn compute_advanced_status(
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> TimingStatus {
    let Some(start) = start else {
        return TimingStatus::blocked("Start date not set");
    };
    let Some(end) = end else {
        return TimingStatus::blocked("End date not set");
    };
    // Compare at the precision the wire string carries
    let (start, end) = (start.trunc_subsecs(0), end.trunc_subsecs(0));
    if end < now {
        return TimingStatus::blocked("End date can not be in the past");
    }
    if end <= start {
        return TimingStatus::blocked("Start date must be before end date");
    }

    let parts = DurationParts::decompose(end - start);
    TimingStatus::ready(
        format!(
            "Runs for {parts}, beginning on {} local time.",
            format_timestamp(&start)
        ),
        parts,
    )
}

/// Input model for an on-demand timing.
///
/// `status` caches the decomposed duration; the cache is what gets encoded
/// when the timing is added.
#[derive(Debug, Clone, Default)]
pub struct OnDemandForm {
    pub target: Option<DateTime<Utc>>,
    parts: Option<DurationParts>,
}

impl OnDemandForm {
    pub fn new(target: DateTime<Utc>) -> Self {
        Self {
            target: Some(target),
            parts: None,
        }
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> TimingStatus {
        let status = compute_on_demand_status(self.target, now);
        self.parts = status.parts;
        status
    }

    pub fn parts(&self) -> Option<DurationParts> {
        self.parts
    }

    pub fn descriptor(&self) -> Option<TimingDescriptor> {
        self.parts.map(TimingDescriptor::OnDemand)
    }
}

/// Input model for an advanced (explicit window) timing.
#[derive(Debug, Clone, Default)]
pub struct AdvancedForm {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    parts: Option<DurationParts>,
}

impl AdvancedForm {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            parts: None,
        }
    }

    pub fn status(&mut self, now: DateTime<Utc>) -> TimingStatus {
        let status = compute_advanced_status(self.start, self.end, now);
        self.parts = status.parts;
        status
    }

    pub fn parts(&self) -> Option<DurationParts> {
        self.parts
    }

    pub fn descriptor(&self) -> Option<TimingDescriptor> {
        self.parts?;
        Some(TimingDescriptor::Advanced {
            start: self.start?.trunc_subsecs(0),
            end: self.end?.trunc_subsecs(0),
        })
    }
}

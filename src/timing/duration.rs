use std::fmt;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

const MINUTES_PER_HOUR: u64 = 60;
const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

/// A duration broken down into whole days, hours and minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DurationParts {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl DurationParts {
    pub fn new(days: u64, hours: u64, minutes: u64) -> Self {
        Self {
            days,
            hours,
            minutes,
        }
    }

    /// Decompose a duration into days, then hours, then minutes.
    ///
    /// Each unit takes the remainder of the previous one and the sub-minute
    /// remainder is dropped. Negative durations decompose to zero.
    pub fn decompose(delta: TimeDelta) -> Self {
        let total_minutes = u64::try_from(delta.num_minutes()).unwrap_or(0);
        Self::from_minutes(total_minutes)
    }

    pub fn from_minutes(total_minutes: u64) -> Self {
        let days = total_minutes / MINUTES_PER_DAY;
        let rest = total_minutes % MINUTES_PER_DAY;
        Self {
            days,
            hours: rest / MINUTES_PER_HOUR,
            minutes: rest % MINUTES_PER_HOUR,
        }
    }

    pub fn total_minutes(&self) -> u64 {
        self.days * MINUTES_PER_DAY + self.hours * MINUTES_PER_HOUR + self.minutes
    }

    pub fn is_zero(&self) -> bool {
        self.total_minutes() == 0
    }

    pub fn to_delta(&self) -> TimeDelta {
        let minutes = i64::try_from(self.total_minutes()).unwrap_or(i64::MAX);
        TimeDelta::try_minutes(minutes).unwrap_or(TimeDelta::MAX)
    }
}

impl fmt::Display for DurationParts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} days, {} hours, {} minutes",
            self.days, self.hours, self.minutes
        )
    }
}

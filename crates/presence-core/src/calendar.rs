//! Day and week boundary policy.
//!
//! Streak and quota math is sensitive to where the calendar day ends, so
//! the boundary is an explicit policy rather than an ambient `Utc::now()`
//! call. Days roll over at midnight in a configurable fixed UTC offset
//! (default: UTC itself). Weeks are ISO weeks starting on Monday.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};

use crate::error::ConfigError;

/// Calendar policy used by the aggregator to bucket sessions into days
/// and weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalendarPolicy {
    offset: FixedOffset,
}

impl Default for CalendarPolicy {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(0).unwrap(),
        }
    }
}

impl CalendarPolicy {
    /// Build a policy from a UTC offset in minutes (e.g. 540 for UTC+9).
    ///
    /// # Errors
    /// Returns an error if the offset is outside the valid +/-24h range.
    pub fn from_offset_minutes(minutes: i32) -> Result<Self, ConfigError> {
        let offset =
            FixedOffset::east_opt(minutes * 60).ok_or_else(|| ConfigError::InvalidValue {
                key: "calendar.utc_offset_minutes".into(),
                message: format!("offset {minutes} minutes is out of range"),
            })?;
        Ok(Self { offset })
    }

    /// Calendar date the instant falls on under this policy.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Monday of the week containing `date`.
    pub fn week_start(&self, date: NaiveDate) -> NaiveDate {
        date - Duration::days(date.weekday().num_days_from_monday() as i64)
    }

    /// True when `next` is exactly the calendar day after `prev`.
    pub fn is_next_day(&self, prev: NaiveDate, next: NaiveDate) -> bool {
        prev.succ_opt() == Some(next)
    }
}

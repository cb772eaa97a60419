//! Session data model.
//!
//! A session exists in exactly two shapes: [`ActiveSession`] (no end
//! time yet, at most one per user) and [`CompletedSession`] (immutable
//! once written). Finalizing is the only transition between them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of presence session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Micro,
    Breathing,
    Collective,
    Custom,
}

impl SessionType {
    /// String form used for database storage and CLI arguments.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Micro => "micro",
            SessionType::Breathing => "breathing",
            SessionType::Collective => "collective",
            SessionType::Custom => "custom",
        }
    }

    /// Parse the database/CLI string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "micro" => Some(SessionType::Micro),
            "breathing" => Some(SessionType::Breathing),
            "collective" => Some(SessionType::Collective),
            "custom" => Some(SessionType::Custom),
            _ => None,
        }
    }
}

/// An in-progress session. At most one exists per user at any time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveSession {
    pub id: Uuid,
    pub user_id: String,
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
}

/// A finished session. Append-only history; never mutated after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedSession {
    pub id: Uuid,
    pub user_id: String,
    pub session_type: SessionType,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Wall-clock duration, clamped to >= 0 against backward skew.
    pub duration_secs: i64,
    pub quality_rating: Option<u8>,
}

impl ActiveSession {
    /// Turn this active session into its completed form.
    ///
    /// The duration is clamped to zero when `ended_at` is before
    /// `started_at` (the clock moved backward between the two reads).
    pub fn finalize(
        self,
        ended_at: DateTime<Utc>,
        quality_rating: Option<u8>,
    ) -> CompletedSession {
        let duration_secs = (ended_at - self.started_at).num_seconds().max(0);
        CompletedSession {
            id: self.id,
            user_id: self.user_id,
            session_type: self.session_type,
            started_at: self.started_at,
            ended_at,
            duration_secs,
            quality_rating,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn active(started_at: DateTime<Utc>) -> ActiveSession {
        ActiveSession {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            session_type: SessionType::Breathing,
            started_at,
        }
    }

    #[test]
    fn finalize_computes_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let done = active(start).finalize(start + Duration::seconds(125), Some(4));
        assert_eq!(done.duration_secs, 125);
        assert_eq!(done.quality_rating, Some(4));
    }

    #[test]
    fn finalize_clamps_negative_duration() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let done = active(start).finalize(start - Duration::seconds(30), None);
        assert_eq!(done.duration_secs, 0);
    }

    #[test]
    fn session_type_string_forms() {
        for t in [
            SessionType::Micro,
            SessionType::Breathing,
            SessionType::Collective,
            SessionType::Custom,
        ] {
            assert_eq!(SessionType::parse(t.as_str()), Some(t));
        }
        assert_eq!(SessionType::parse("nap"), None);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionType;

/// Every tracker state change produces an Event.
/// Callers (a CLI, a dashboard) poll and drain them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: Uuid,
        user_id: String,
        session_type: SessionType,
        at: DateTime<Utc>,
    },
    SessionCompleted {
        session_id: Uuid,
        user_id: String,
        duration_secs: i64,
        quality_rating: Option<u8>,
        at: DateTime<Utc>,
    },
    /// A stale session was force-completed by the reaper.
    SessionReaped {
        session_id: Uuid,
        user_id: String,
        duration_secs: i64,
        at: DateTime<Utc>,
    },
    /// The per-user aggregate changed after an ingest.
    AccountUpdated {
        user_id: String,
        daily_presence_secs: i64,
        weekly_minutes: i64,
        current_streak: u32,
        longest_streak: u32,
        at: DateTime<Utc>,
    },
}

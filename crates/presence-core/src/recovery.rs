//! Crash-recovery replay.
//!
//! A crash between finalize and ingest leaves a completed session with
//! `ingested = 0`. This pass finds those rows and replays their ingest.
//! Because ingest claims the session id inside the account transaction,
//! replay after a partial failure never double-counts. Repairs are an
//! operational event, not a caller-visible failure: they are logged and
//! counted, nothing more.

use serde::{Deserialize, Serialize};

use crate::aggregator::{IngestOutcome, StreakAggregator};
use crate::error::{PresenceError, Result};
use crate::storage::Database;

/// What a recovery pass found and did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// Sessions whose ingest was missing and has been replayed.
    pub replayed: usize,
    /// Sessions that turned out to be ingested already (a racing ingest
    /// landed between the scan and the replay).
    pub already_ingested: usize,
}

/// Replay ingest for every completed-but-not-ingested session.
///
/// # Errors
/// Propagates storage failures; individual replays that turn out to be
/// unnecessary are counted, not errored.
pub fn recover(db: &Database, aggregator: &StreakAggregator) -> Result<RecoveryReport> {
    let pending = db.uningested_sessions()?;

    let mut report = RecoveryReport::default();
    for session in pending {
        let repair = PresenceError::IngestReplay {
            session_id: session.id,
        };
        tracing::warn!(user_id = %session.user_id, "{repair}");

        match aggregator.ingest(db, &session)? {
            IngestOutcome::Applied => report.replayed += 1,
            IngestOutcome::AlreadyIngested => report.already_ingested += 1,
        }
    }

    if report.replayed > 0 {
        tracing::info!(replayed = report.replayed, "recovery pass repaired sessions");
    }
    Ok(report)
}

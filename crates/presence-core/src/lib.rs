//! # Presence Core Library
//!
//! This library provides the core business logic for presence-session
//! tracking: the session lifecycle, streak and quota accounting, and
//! their persistence. It implements a CLI-first philosophy where every
//! operation is available through a standalone binary, with any UI
//! being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Session Tracker**: owns the single in-progress session per user;
//!   `start` / `end` / `reap` are short, bounded state transitions
//! - **Streak & Quota Aggregator**: consumes completed sessions into the
//!   per-user account (daily seconds, weekly minutes, day streak)
//! - **Storage**: SQLite-backed session history and account projection,
//!   plus TOML-based configuration
//! - **Recovery**: replay pass for sessions finalized but not ingested
//!
//! ## Key Components
//!
//! - [`SessionTracker`]: session lifecycle state machine
//! - [`StreakAggregator`]: streak/quota fold over completed sessions
//! - [`Database`]: session and account persistence
//! - [`Config`]: application configuration management

pub mod aggregator;
pub mod calendar;
pub mod clock;
pub mod error;
pub mod events;
pub mod recovery;
pub mod session;
pub mod storage;
pub mod tracker;

pub use aggregator::{AggregatorConfig, IngestOutcome, PresenceAccount, StreakAggregator};
pub use calendar::CalendarPolicy;
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, DatabaseError, PresenceError, Result};
pub use events::Event;
pub use recovery::{recover, RecoveryReport};
pub use session::{ActiveSession, CompletedSession, SessionType};
pub use storage::{Config, Database};
pub use tracker::SessionTracker;

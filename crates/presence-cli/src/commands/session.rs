use clap::Subcommand;
use presence_core::storage::{Config, Database};
use presence_core::{SessionTracker, SessionType, StreakAggregator};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a session for a user
    Start {
        /// User the session belongs to
        #[arg(long)]
        user: String,
        /// Session kind: micro | breathing | collective | custom
        #[arg(long, default_value = "custom")]
        kind: String,
    },
    /// End the user's active session
    End {
        #[arg(long)]
        user: String,
        /// Optional quality rating
        #[arg(long)]
        rating: Option<u8>,
    },
    /// Print the user's active session as JSON
    Status {
        #[arg(long)]
        user: String,
    },
    /// Force-complete sessions older than the staleness threshold
    Reap {
        /// Override the configured threshold (seconds)
        #[arg(long)]
        threshold_secs: Option<i64>,
    },
}

fn build_tracker(config: &Config) -> Result<SessionTracker, Box<dyn std::error::Error>> {
    let db = Database::open()?;
    let aggregator = StreakAggregator::new(config.aggregator(), config.calendar_policy()?);
    Ok(SessionTracker::new(db, aggregator))
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let mut tracker = build_tracker(&config)?;

    match action {
        SessionAction::Start { user, kind } => {
            let kind = SessionType::parse(&kind)
                .ok_or_else(|| format!("unknown session kind: {kind}"))?;
            let session = tracker.start(&user, kind)?;
            println!("{}", serde_json::to_string_pretty(&session)?);
        }
        SessionAction::End { user, rating } => {
            let completed = tracker.end(&user, rating)?;
            println!("{}", serde_json::to_string_pretty(&completed)?);
        }
        SessionAction::Status { user } => match tracker.active_session(&user)? {
            Some(session) => println!("{}", serde_json::to_string_pretty(&session)?),
            None => println!("no active session"),
        },
        SessionAction::Reap { threshold_secs } => {
            let threshold = threshold_secs
                .map(chrono::Duration::seconds)
                .unwrap_or_else(|| config.stale_threshold());
            let reaped = tracker.reap(threshold)?;
            println!("{}", serde_json::to_string_pretty(&reaped)?);
        }
    }
    Ok(())
}

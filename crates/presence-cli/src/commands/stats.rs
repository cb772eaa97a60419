use clap::Subcommand;
use presence_core::storage::{Config, Database};
use presence_core::StreakAggregator;

#[derive(Subcommand)]
pub enum StatsAction {
    /// Current streak and quota state for a user
    Show {
        #[arg(long)]
        user: String,
    },
    /// Completed session history for a user
    History {
        #[arg(long)]
        user: String,
    },
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Database::open()?;

    match action {
        StatsAction::Show { user } => {
            let aggregator = StreakAggregator::new(config.aggregator(), config.calendar_policy()?);
            match aggregator.get_state(&db, &user)? {
                Some(account) => println!("{}", serde_json::to_string_pretty(&account)?),
                None => println!("no completed sessions for '{user}'"),
            }
        }
        StatsAction::History { user } => {
            let sessions = db.sessions_for_user(&user)?;
            println!("{}", serde_json::to_string_pretty(&sessions)?);
        }
    }
    Ok(())
}

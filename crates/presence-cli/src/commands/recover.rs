use presence_core::storage::{Config, Database};
use presence_core::StreakAggregator;

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load_or_default();
    let db = Database::open()?;
    let aggregator = StreakAggregator::new(config.aggregator(), config.calendar_policy()?);

    let report = presence_core::recover(&db, &aggregator)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

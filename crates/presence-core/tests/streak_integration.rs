//! Integration tests for streak and quota accounting.
//!
//! Sessions are produced through the real tracker path (start, advance
//! the clock, end) so the account state reflects the same transitions a
//! deployed instance would see.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use presence_core::{
    AggregatorConfig, CalendarPolicy, Database, ManualClock, PresenceAccount, SessionTracker,
    SessionType, StreakAggregator,
};

struct Harness {
    tracker: SessionTracker,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new(start: DateTime<Utc>) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let db = Database::open_memory().unwrap();
        let aggregator =
            StreakAggregator::new(AggregatorConfig::default(), CalendarPolicy::default());
        Self {
            tracker: SessionTracker::with_clock(db, aggregator, clock.clone()),
            clock,
        }
    }

    /// Complete one session for `user` ending at `at`, lasting `secs`.
    fn run_session(&mut self, user: &str, at: DateTime<Utc>, secs: i64) {
        self.clock.set(at - Duration::seconds(secs));
        self.tracker.start(user, SessionType::Breathing).unwrap();
        self.clock.set(at);
        self.tracker.end(user, None).unwrap();
    }

    fn account(&self, user: &str) -> PresenceAccount {
        self.tracker
            .aggregator()
            .get_state(self.tracker.database(), user)
            .unwrap()
            .unwrap()
    }
}

fn monday() -> DateTime<Utc> {
    // 2025-03-03 is a Monday.
    Utc.with_ymd_and_hms(2025, 3, 3, 8, 0, 0).unwrap()
}

#[test]
fn tuesday_extends_thursday_resets() {
    let mut h = Harness::new(monday() - Duration::days(5));

    // Build a five-day streak ending on Monday.
    for day in 0..5 {
        h.run_session("sam", monday() - Duration::days(4 - day), 300);
    }
    assert_eq!(h.account("sam").current_streak, 5);

    // Qualifying session on Tuesday extends to 6.
    h.run_session("sam", monday() + Duration::days(1), 300);
    assert_eq!(h.account("sam").current_streak, 6);
    assert_eq!(h.account("sam").longest_streak, 6);

    // Skipping Wednesday: Thursday resets to 1, longest stays.
    h.run_session("sam", monday() + Duration::days(3), 300);
    let account = h.account("sam");
    assert_eq!(account.current_streak, 1);
    assert_eq!(account.longest_streak, 6);
}

#[test]
fn two_same_day_sessions_count_streak_once() {
    let mut h = Harness::new(monday());

    h.run_session("lee", monday() + Duration::hours(1), 180);
    h.run_session("lee", monday() + Duration::hours(10), 240);

    let account = h.account("lee");
    assert_eq!(account.daily_presence_secs, 180 + 240);
    assert_eq!(account.weekly_minutes, 3 + 4);
    assert_eq!(account.current_streak, 1);
    assert_eq!(account.longest_streak, 1);
}

#[test]
fn sub_threshold_sessions_fill_quota_but_not_streak() {
    let mut h = Harness::new(monday());

    h.run_session("kit", monday() + Duration::hours(1), 45);
    let account = h.account("kit");
    assert_eq!(account.daily_presence_secs, 45);
    assert_eq!(account.weekly_minutes, 0);
    assert_eq!(account.current_streak, 0);

    // A qualifying session later the same day starts the streak.
    h.run_session("kit", monday() + Duration::hours(2), 90);
    let account = h.account("kit");
    assert_eq!(account.daily_presence_secs, 135);
    assert_eq!(account.weekly_minutes, 1);
    assert_eq!(account.current_streak, 1);
}

#[test]
fn weekly_minutes_reset_on_new_week() {
    let mut h = Harness::new(monday());

    // Saturday and Sunday of one week, then Monday of the next.
    h.run_session("ana", monday() + Duration::days(5), 1800);
    h.run_session("ana", monday() + Duration::days(6), 600);
    assert_eq!(h.account("ana").weekly_minutes, 40);

    h.run_session("ana", monday() + Duration::days(7), 300);
    let account = h.account("ana");
    assert_eq!(account.weekly_minutes, 5);
    // Streak is unaffected by the week boundary.
    assert_eq!(account.current_streak, 3);
}

#[test]
fn daily_seconds_reset_on_new_day() {
    let mut h = Harness::new(monday());

    h.run_session("rio", monday() + Duration::hours(2), 900);
    assert_eq!(h.account("rio").daily_presence_secs, 900);

    h.run_session("rio", monday() + Duration::days(1), 300);
    let account = h.account("rio");
    assert_eq!(account.daily_presence_secs, 300);
    assert_eq!(account.current_streak, 2);
}

#[test]
fn offset_calendar_shifts_the_day_boundary() {
    // At UTC+9, 16:00 UTC Monday is already 01:00 Tuesday.
    let clock = Arc::new(ManualClock::new(monday()));
    let db = Database::open_memory().unwrap();
    let aggregator = StreakAggregator::new(
        AggregatorConfig::default(),
        CalendarPolicy::from_offset_minutes(540).unwrap(),
    );
    let mut tracker = SessionTracker::with_clock(db, aggregator, clock.clone());

    clock.set(monday() + Duration::hours(8)); // 16:00 UTC
    tracker.start("kei", SessionType::Micro).unwrap();
    clock.advance(Duration::seconds(300));
    tracker.end("kei", None).unwrap();

    let account = tracker
        .aggregator()
        .get_state(tracker.database(), "kei")
        .unwrap()
        .unwrap();
    assert_eq!(
        account.daily_date,
        chrono::NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
    );
}

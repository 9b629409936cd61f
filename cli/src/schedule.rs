//! Trading-hours window for repeated measurement.
//!
//! Times are wall-clock Taiwan time (UTC+8, no daylight saving).

use chrono::{
    DateTime, Datelike, Duration as ChronoDuration, FixedOffset, NaiveDateTime, NaiveTime, Utc,
    Weekday,
};
use harness::config::{ConfigError, ScheduleSection};
use std::time::Duration;

const TAIPEI: FixedOffset = match FixedOffset::east_opt(8 * 3600) {
    Some(offset) => offset,
    None => panic!("UTC+8 is a valid offset"),
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradingWindow {
    start: NaiveTime,
    end: NaiveTime,
    weekdays_only: bool,
}

impl TradingWindow {
    pub fn new(start: NaiveTime, end: NaiveTime, weekdays_only: bool) -> Self {
        Self {
            start,
            end,
            weekdays_only,
        }
    }

    pub fn from_config(section: &ScheduleSection) -> Result<Self, ConfigError> {
        let (start, end) = section.times()?;
        Ok(Self::new(start, end, section.weekdays_only))
    }

    fn local(now: DateTime<Utc>) -> NaiveDateTime {
        now.with_timezone(&TAIPEI).naive_local()
    }

    fn trades_on(&self, day: Weekday) -> bool {
        !(self.weekdays_only && matches!(day, Weekday::Sat | Weekday::Sun))
    }

    /// True when `now` falls inside the window, both ends included.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        let local = Self::local(now);
        let t = local.time();
        self.trades_on(local.weekday()) && self.start <= t && t <= self.end
    }

    /// How long until the window next opens; zero while it is open.
    pub fn until_open(&self, now: DateTime<Utc>) -> Duration {
        if self.contains(now) {
            return Duration::ZERO;
        }
        let local = Self::local(now);
        (0..=7)
            .map(|days| local.date() + ChronoDuration::days(days))
            .filter(|date| self.trades_on(date.weekday()))
            .map(|date| date.and_time(self.start))
            .find(|open| *open > local)
            .and_then(|open| (open - local).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

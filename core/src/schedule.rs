//! Event calendar: which day it is, how long until start, and the local-day
//! window click counts are scoped to.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// One of the two event days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDay {
    One,
    Two,
}

impl EventDay {
    pub fn number(self) -> u8 {
        match self {
            EventDay::One => 1,
            EventDay::Two => 2,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(EventDay::One),
            2 => Some(EventDay::Two),
            _ => None,
        }
    }
}

impl fmt::Display for EventDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {}", self.number())
    }
}

/// Half-open interval `[start, end)` covering one local calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DayWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        (self.start..self.end).contains(&instant)
    }
}

/// Window from local midnight of `now`'s date to local midnight of the next
/// date, in `now`'s own time zone.
pub fn day_window<Tz: TimeZone>(now: &DateTime<Tz>) -> DayWindow {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    DayWindow {
        start: start_of_day(&tz, today),
        end: start_of_day(&tz, tomorrow),
    }
}

fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    if let Some(dt) = tz.from_local_datetime(&midnight).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Midnight skipped by a DST jump: the day starts at the first valid hour.
    let after_gap = midnight + TimeDelta::hours(1);
    match tz.from_local_datetime(&after_gap).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => tz.from_utc_datetime(&midnight).with_timezone(&Utc),
    }
}

/// Time remaining until the event starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}d {:02}h {:02}m {:02}s",
            self.days, self.hours, self.minutes, self.seconds
        )
    }
}

/// Live session of one event day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimes {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SessionTimes {
    /// `[start, start + minutes)` on `date`, starting at `hour:minute` UTC.
    fn utc(date: NaiveDate, hour: u32, minute: u32, minutes: i64) -> Self {
        let start = date
            .and_hms_opt(hour, minute, 0)
            .as_ref()
            .map(NaiveDateTime::and_utc)
            .unwrap_or_default();
        Self {
            start,
            end: start + TimeDelta::minutes(minutes),
        }
    }

    /// "Friday, March 7, 1:30 PM - 2:30 PM (UTC-05:00)" in `tz`.
    pub fn describe_in<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: fmt::Display,
    {
        let start = self.start.with_timezone(tz);
        let end = self.end.with_timezone(tz);
        format!(
            "{} - {} (UTC{})",
            start.format("%A, %B %-d, %-I:%M %p"),
            end.format("%-I:%M %p"),
            start.format("%:z")
        )
    }
}

/// Dates of the two event days, their live sessions and the opening instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchedule {
    pub day_one: NaiveDate,
    pub day_two: NaiveDate,
    pub starts_at: DateTime<Utc>,
    pub day_one_session: SessionTimes,
    pub day_two_session: SessionTimes,
}

impl Default for EventSchedule {
    fn default() -> Self {
        let day_one = NaiveDate::from_ymd_opt(2025, 3, 7).unwrap_or_default();
        let day_two = NaiveDate::from_ymd_opt(2025, 3, 8).unwrap_or_default();
        // 1:30 PM to 2:30 PM US Eastern, both days
        let day_one_session = SessionTimes::utc(day_one, 18, 30, 60);
        Self {
            day_one,
            day_two,
            starts_at: day_one_session.start,
            day_one_session,
            day_two_session: SessionTimes::utc(day_two, 18, 30, 60),
        }
    }
}

impl EventSchedule {
    /// Event day for a local calendar date, if any.
    pub fn day_for(&self, date: NaiveDate) -> Option<EventDay> {
        if date == self.day_one {
            Some(EventDay::One)
        } else if date == self.day_two {
            Some(EventDay::Two)
        } else {
            None
        }
    }

    /// Event day at `now`, judged by `now`'s local date.
    pub fn day_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Option<EventDay> {
        self.day_for(now.date_naive())
    }

    pub fn session(&self, day: EventDay) -> SessionTimes {
        match day {
            EventDay::One => self.day_one_session,
            EventDay::Two => self.day_two_session,
        }
    }

    /// `None` once the start instant has passed.
    pub fn countdown(&self, now: DateTime<Utc>) -> Option<Countdown> {
        let remaining = (self.starts_at - now).num_seconds();
        if remaining <= 0 {
            return None;
        }
        Some(Countdown {
            days: remaining / 86_400,
            hours: (remaining / 3_600) % 24,
            minutes: (remaining / 60) % 60,
            seconds: remaining % 60,
        })
    }
}

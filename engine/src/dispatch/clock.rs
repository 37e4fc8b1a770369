//! Wall-clock source for the time and date replies

use chrono::{Local, NaiveDateTime};

pub trait Clock: Send + Sync {
    /// Current local time
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// "The time is HH:MM:SS."
pub fn time_reply(now: NaiveDateTime) -> String {
    format!("The time is {}.", now.format("%H:%M:%S"))
}

/// "Today is Weekday, DD Month YYYY."
pub fn date_reply(now: NaiveDateTime) -> String {
    format!("Today is {}.", now.format("%A, %d %B %Y"))
}

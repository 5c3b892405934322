//! Schedule times and their anchoring to absolute instants.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;

/// A `stop_times.txt` time: seconds since the service-day origin.
///
/// Values of 24:00:00 and later belong to the same service day but fall on
/// the next calendar day.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceTime(u32);

impl ServiceTime {
    pub const SECONDS_PER_DAY: u32 = 24 * 3600;

    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Self {
        Self(hours * 3600 + minutes * 60 + seconds)
    }

    pub fn seconds(self) -> u32 {
        self.0
    }

    /// True for times written as 24:00:00 or later.
    pub fn is_next_calendar_day(self) -> bool {
        self.0 >= Self::SECONDS_PER_DAY
    }

    /// Parses `H:MM:SS` or `HH:MM:SS`. Hours may pass 24; values too large
    /// to count in seconds are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split(':');
        let hours: u32 = parts.next()?.parse().ok()?;
        let minutes: u32 = parts.next()?.parse().ok()?;
        let seconds: u32 = parts.next()?.parse().ok()?;
        if parts.next().is_some() || minutes >= 60 || seconds >= 60 {
            return None;
        }
        let total = hours
            .checked_mul(3600)?
            .checked_add(minutes * 60 + seconds)?;
        Some(Self(total))
    }
}

impl fmt::Display for ServiceTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 / 60) % 60,
            self.0 % 60
        )
    }
}

/// The calendar date a schedule is evaluated against, in the agency zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ServiceDay {
    date: NaiveDate,
    tz: Tz,
}

impl ServiceDay {
    pub fn new(date: NaiveDate, tz: Tz) -> Self {
        Self { date, tz }
    }

    /// The service day whose date is today in `tz` at instant `now`.
    pub fn containing(now: DateTime<Utc>, tz: Tz) -> Self {
        Self::new(now.with_timezone(&tz).date_naive(), tz)
    }

    /// Noon minus twelve hours, which keeps offsets exact on DST change days.
    pub fn origin(&self) -> DateTime<Utc> {
        let noon = self.date.and_time(NaiveTime::MIN) + Duration::hours(12);
        let local_noon = self
            .tz
            .from_local_datetime(&noon)
            .earliest()
            .unwrap_or_else(|| self.tz.from_utc_datetime(&noon));
        local_noon.with_timezone(&Utc) - Duration::hours(12)
    }

    pub fn instant(&self, time: ServiceTime) -> DateTime<Utc> {
        self.origin() + Duration::seconds(i64::from(time.seconds()))
    }
}

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};
use time::{
    Date as TimeDate, Duration as TimeDuration, Month, format_description::BorrowedFormatItem,
    macros::format_description,
};

const ISO_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

const SHORT_MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

///
/// Date
///
/// Calendar day stored as whole days since 1970-01-01.
/// Day granularity is the only temporal resolution the planner reasons about.
///

#[derive(Clone, Copy, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Date(i32);

impl Date {
    pub const EPOCH: Self = Self(0);
    pub const MIN: Self = Self(i32::MIN);
    pub const MAX: Self = Self(i32::MAX);

    const fn epoch_date() -> TimeDate {
        // Safe: constant valid date
        match TimeDate::from_calendar_date(1970, Month::January, 1) {
            Ok(d) => d,
            Err(_) => unreachable!(),
        }
    }

    #[must_use]
    pub const fn from_days(days: i32) -> Self {
        Self(days)
    }

    #[must_use]
    pub fn new_checked(y: i32, m: u8, d: u8) -> Option<Self> {
        let month = Month::try_from(m).ok()?;
        let date = TimeDate::from_calendar_date(y, month, d).ok()?;
        Some(Self::from_time_date(date))
    }

    /// Whole days since the epoch.
    #[must_use]
    pub const fn days(self) -> i32 {
        self.0
    }

    /// Returns the year component (e.g. 2025)
    #[must_use]
    pub fn year(self) -> i32 {
        self.to_time_date().year()
    }

    /// Returns the month component (1–12)
    #[must_use]
    pub fn month(self) -> u8 {
        self.to_time_date().month().into()
    }

    /// Returns the day-of-month component (1–31)
    #[must_use]
    pub fn day(self) -> u8 {
        self.to_time_date().day()
    }

    #[must_use]
    pub const fn add_days(self, days: i32) -> Self {
        Self(self.0.saturating_add(days))
    }

    #[must_use]
    pub const fn next(self) -> Self {
        self.add_days(1)
    }

    #[must_use]
    pub const fn prev(self) -> Self {
        self.add_days(-1)
    }

    /// Signed number of days from `self` to `other`.
    #[must_use]
    pub const fn days_until(self, other: Self) -> i64 {
        other.0 as i64 - self.0 as i64
    }

    /// Parse an ISO `YYYY-MM-DD` string into a `Date`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        TimeDate::parse(s, ISO_FORMAT)
            .ok()
            .map(Self::from_time_date)
    }

    /// Parse the compact `d-Mon-yy` form (e.g. `1-Jan-25`); two-digit years
    /// land in 2000–2099.
    #[must_use]
    pub fn parse_short(s: &str) -> Option<Self> {
        let mut parts = s.split('-');
        let day = parts.next()?.parse::<u8>().ok()?;
        let month_name = parts.next()?.to_ascii_lowercase();
        let year_part = parts.next()?;
        if parts.next().is_some() || year_part.len() != 2 {
            return None;
        }
        let year = 2000 + year_part.parse::<i32>().ok()?;
        let month_index = SHORT_MONTHS.iter().position(|m| *m == month_name)?;
        let month = u8::try_from(month_index + 1).ok()?;

        Self::new_checked(year, month, day)
    }

    /// Parse either accepted absolute form.
    #[must_use]
    pub fn parse_any(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::parse(s).or_else(|| Self::parse_short(s))
    }

    #[expect(clippy::cast_possible_truncation)]
    fn from_time_date(date: TimeDate) -> Self {
        let epoch = Self::epoch_date();
        let days = (date - epoch).whole_days();
        Self(days as i32)
    }

    fn to_time_date(self) -> TimeDate {
        let epoch = Self::epoch_date();
        let delta = TimeDuration::days(self.0.into());
        epoch.checked_add(delta).unwrap_or({
            if self.0 >= 0 {
                TimeDate::MAX
            } else {
                TimeDate::MIN
            }
        })
    }
}

impl Debug for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Date({self})")
    }
}

impl Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.to_time_date();
        let month: u8 = d.month().into();
        write!(f, "{:04}-{:02}-{:02}", d.year(), month, d.day())
    }
}

impl Serialize for Date {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Date {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid date: {s}")))
    }
}

///
/// TESTS
///

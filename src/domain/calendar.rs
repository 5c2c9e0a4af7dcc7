//! Working-day calendar
//!
//! Pure date arithmetic over a set of workable weekdays plus an optional list
//! of holidays. Every duration and offset in the scheduler is counted in
//! working days through this type; nothing else steps dates directly.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use super::error::{Result, ScheduleError};

const ALL_WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// A set of weekdays, serialized as lowercase three-letter names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct WeekdaySet(u8);

impl WeekdaySet {
    /// Monday to Friday
    pub const WEEKDAYS: WeekdaySet = WeekdaySet(0b0001_1111);

    /// No days at all
    pub const EMPTY: WeekdaySet = WeekdaySet(0);

    fn bit(day: Weekday) -> u8 {
        1 << day.num_days_from_monday()
    }

    /// Builds a set from individual days
    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        Self(days.into_iter().fold(0, |acc, d| acc | Self::bit(d)))
    }

    /// Returns true if the day is in the set
    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & Self::bit(day) != 0
    }

    /// Returns true if no day is set
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Iterates the days in Monday-first order
    pub fn iter(&self) -> impl Iterator<Item = Weekday> + '_ {
        ALL_WEEKDAYS.into_iter().filter(|d| self.contains(*d))
    }
}

impl Default for WeekdaySet {
    fn default() -> Self {
        Self::WEEKDAYS
    }
}

impl fmt::Display for WeekdaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(weekday_name).collect();
        f.write_str(&names.join(","))
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Parses a weekday name (`mon`, `Monday`, `TUE`, ...)
pub fn parse_weekday(s: &str) -> Option<Weekday> {
    s.trim().parse::<Weekday>().ok()
}

impl TryFrom<Vec<String>> for WeekdaySet {
    type Error = String;

    fn try_from(value: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut days = Vec::with_capacity(value.len());
        for name in &value {
            let day = parse_weekday(name).ok_or_else(|| format!("unknown weekday '{}'", name))?;
            days.push(day);
        }
        Ok(Self::from_days(days))
    }
}

impl From<WeekdaySet> for Vec<String> {
    fn from(set: WeekdaySet) -> Self {
        set.iter().map(|d| weekday_name(d).to_string()).collect()
    }
}

/// Working-day model for one project (or the workspace default)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WorkingCalendar {
    /// Weekdays considered workable
    pub working_days: WeekdaySet,

    /// Specific dates that are never worked, regardless of weekday
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub holidays: BTreeSet<NaiveDate>,
}

impl WorkingCalendar {
    /// Creates a calendar with the given working days and no holidays
    pub fn new(working_days: WeekdaySet) -> Self {
        Self {
            working_days,
            holidays: BTreeSet::new(),
        }
    }

    /// Adds holidays to the calendar
    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// Returns true if work happens on this date
    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days.contains(date.weekday()) && !self.holidays.contains(&date)
    }

    fn ensure_workable(&self) -> Result<()> {
        if self.working_days.is_empty() {
            return Err(ScheduleError::InvalidDate(
                "calendar has no working days".to_string(),
            ));
        }
        Ok(())
    }

    /// Rolls forward over non-working days; a working date is returned as is
    pub fn next_working_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        self.ensure_workable()?;

        // Holidays are finite and at least one weekday works, so this ends.
        let mut current = date;
        while !self.is_working_day(current) {
            current = step_forward(current)?;
        }
        Ok(current)
    }

    /// Rolls backward over non-working days; a working date is returned as is
    pub fn previous_working_day(&self, date: NaiveDate) -> Result<NaiveDate> {
        self.ensure_workable()?;

        let mut current = date;
        while !self.is_working_day(current) {
            current = step_backward(current)?;
        }
        Ok(current)
    }

    /// Advances `n` working days from `date`
    ///
    /// A non-working `date` is first rolled forward, so `n == 0` is exactly
    /// [`next_working_day`](Self::next_working_day).
    pub fn add_working_days(&self, date: NaiveDate, n: u32) -> Result<NaiveDate> {
        let mut current = self.next_working_day(date)?;
        for _ in 0..n {
            current = self.next_working_day(step_forward(current)?)?;
        }
        Ok(current)
    }

    /// Steps back `n` working days from `date`
    pub fn subtract_working_days(&self, date: NaiveDate, n: u32) -> Result<NaiveDate> {
        let mut current = self.previous_working_day(date)?;
        for _ in 0..n {
            current = self.previous_working_day(step_backward(current)?)?;
        }
        Ok(current)
    }

    /// Counts working days strictly between two dates
    ///
    /// Negative when `b < a`; zero for equal or adjacent dates.
    pub fn working_days_between(&self, a: NaiveDate, b: NaiveDate) -> i64 {
        let (lo, hi, sign) = if a <= b { (a, b, 1) } else { (b, a, -1) };

        let count = lo
            .iter_days()
            .skip(1)
            .take_while(|d| *d < hi)
            .filter(|d| self.is_working_day(*d))
            .count() as i64;

        sign * count
    }

    /// Derives the end date of a task spanning `duration_days` working days
    ///
    /// The span is inclusive: a one-day task ends on its (normalized) start.
    pub fn end_date_for(&self, start: NaiveDate, duration_days: u32) -> Result<NaiveDate> {
        self.add_working_days(start, duration_days.saturating_sub(1))
    }
}

fn step_forward(date: NaiveDate) -> Result<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| ScheduleError::InvalidDate(format!("{} is out of range", date)))
}

fn step_backward(date: NaiveDate) -> Result<NaiveDate> {
    date.pred_opt()
        .ok_or_else(|| ScheduleError::InvalidDate(format!("{} is out of range", date)))
}

//! School holidays and opening hours.

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::aggregation::types::{DateSpan, DayClass, DayType};

fn default_open_half_hour() -> usize {
    17
}

fn default_close_half_hour() -> usize {
    31
}

/// Holidays plus the half-hours during which the school is open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchoolCalendar {
    #[serde(default)]
    pub holidays: Vec<DateSpan>,
    /// First open half-hour (inclusive), 17 = 08:30.
    #[serde(default = "default_open_half_hour")]
    pub open_half_hour: usize,
    /// First closed half-hour after opening, 31 = 15:30.
    #[serde(default = "default_close_half_hour")]
    pub close_half_hour: usize,
}

impl Default for SchoolCalendar {
    fn default() -> Self {
        Self {
            holidays: Vec::new(),
            open_half_hour: default_open_half_hour(),
            close_half_hour: default_close_half_hour(),
        }
    }
}

impl SchoolCalendar {
    pub fn with_holidays(holidays: Vec<DateSpan>) -> Self {
        Self {
            holidays,
            ..Self::default()
        }
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.iter().any(|h| h.contains(date))
    }

    pub fn is_weekend(date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    /// Holidays take precedence over weekends.
    pub fn day_class(&self, date: NaiveDate) -> DayClass {
        if self.is_holiday(date) {
            DayClass::Holiday
        } else if Self::is_weekend(date) {
            DayClass::Weekend
        } else {
            DayClass::SchoolDay
        }
    }

    pub fn is_school_day(&self, date: NaiveDate) -> bool {
        self.day_class(date) == DayClass::SchoolDay
    }

    pub fn is_open(&self, half_hour: usize) -> bool {
        half_hour >= self.open_half_hour && half_hour < self.close_half_hour
    }

    pub fn day_type(&self, date: NaiveDate, half_hour: usize) -> DayType {
        match self.day_class(date) {
            DayClass::Holiday => DayType::Holiday,
            DayClass::Weekend => DayType::Weekend,
            DayClass::SchoolDay if self.is_open(half_hour) => DayType::SchoolDayOpen,
            DayClass::SchoolDay => DayType::SchoolDayClosed,
        }
    }

    pub fn school_days_in(&self, span: &DateSpan) -> usize {
        span.iter_days().filter(|d| self.is_school_day(*d)).count()
    }
}

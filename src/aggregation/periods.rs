//! Time-scale resolution.
//!
//! Turns a validated [`TimeScale`] into concrete [`Period`]s anchored at the
//! latest available data date. Periods are not clipped here; the bucketer
//! clips them and reports periods with no overlap as unavailable.

use chrono::{Duration, NaiveDate};

use super::bucketing::{academic_year_label, academic_year_start, month_end, month_start, shift_months};
use super::types::{
    AggregationResult, DateSpan, Period, PeriodUnit, Selection, TimeScale, TimeScaleItem, week_start,
};
use crate::school::SchoolCalendar;

/// How far back a school-week search walks before giving up.
const SCHOOL_WEEK_SEARCH_LIMIT: usize = 104;

/// Resolves time-scale specifications into periods.
pub trait PeriodResolver {
    fn periods_for(&self, scale: &TimeScale, available: DateSpan) -> AggregationResult<Vec<Period>>;
}

/// Calendar-aware resolver; the default.
#[derive(Clone, Debug, Default)]
pub struct CalendarPeriodResolver {
    calendar: SchoolCalendar,
}

impl CalendarPeriodResolver {
    pub fn new(calendar: SchoolCalendar) -> Self {
        Self { calendar }
    }

    fn resolve(&self, item: &TimeScaleItem, available: DateSpan) -> AggregationResult<Period> {
        let (from, to) = match item.selection {
            Selection::Offset(n) => (n, n),
            Selection::Range(from, to) => (from, to),
        };
        let first = self.occurrence(item.unit, from, available)?;
        let last = self.occurrence(item.unit, to, available)?;
        let span = DateSpan::new(first.start, last.end);
        Ok(Period::new(span.start, span.end, describe(item.unit, &first, &last)))
    }

    /// The `offset`-th occurrence of `unit` relative to the one holding the
    /// latest available date.
    fn occurrence(&self, unit: PeriodUnit, offset: i32, available: DateSpan) -> AggregationResult<DateSpan> {
        let latest = available.end;
        let span = match unit {
            PeriodUnit::All => available,
            PeriodUnit::Year => {
                let end = shift_months(latest, 12 * offset)?;
                DateSpan::new(shift_months(end, -12)? + Duration::days(1), end)
            }
            PeriodUnit::AcademicYear => {
                let start = shift_months(academic_year_start(latest), 12 * offset)?;
                DateSpan::new(start, shift_months(start, 12)? - Duration::days(1))
            }
            PeriodUnit::Month => {
                let start = shift_months(month_start(latest), offset)?;
                DateSpan::new(start, month_end(start)?)
            }
            PeriodUnit::Week => {
                let start = week_start(latest) + Duration::weeks(offset as i64);
                DateSpan::new(start, start + Duration::days(6))
            }
            PeriodUnit::SchoolWeek => self.school_week(latest, offset),
            PeriodUnit::Day => DateSpan::single(latest + Duration::days(offset as i64)),
        };
        Ok(span)
    }

    /// Weeks containing at least one school day, counted back from the week
    /// holding `latest`. Falls back to plain weeks when none are found.
    fn school_week(&self, latest: NaiveDate, offset: i32) -> DateSpan {
        let week = |start: NaiveDate| DateSpan::new(start, start + Duration::days(6));
        let wanted = offset.unsigned_abs() as usize;
        (0..SCHOOL_WEEK_SEARCH_LIMIT)
            .map(|i| week(week_start(latest) - Duration::weeks(i as i64)))
            .filter(|w| self.calendar.school_days_in(w) > 0)
            .nth(wanted)
            .unwrap_or_else(|| week(week_start(latest) + Duration::weeks(offset as i64)))
    }
}

impl PeriodResolver for CalendarPeriodResolver {
    fn periods_for(&self, scale: &TimeScale, available: DateSpan) -> AggregationResult<Vec<Period>> {
        scale
            .0
            .iter()
            .map(|item| self.resolve(item, available))
            .collect()
    }
}

fn describe(unit: PeriodUnit, first: &DateSpan, last: &DateSpan) -> String {
    let one = |span: &DateSpan| match unit {
        PeriodUnit::All => "all".to_string(),
        PeriodUnit::Year => format!("{} - {}", span.start.format("%b %Y"), span.end.format("%b %Y")),
        PeriodUnit::AcademicYear => academic_year_label(span.start),
        PeriodUnit::Month => span.start.format("%b %Y").to_string(),
        PeriodUnit::Week | PeriodUnit::SchoolWeek => format!(
            "{} - {}",
            span.start.format("%d %b %Y"),
            span.end.format("%d %b %Y")
        ),
        PeriodUnit::Day => span.start.format("%a %d %b %Y").to_string(),
    };
    if first == last {
        return one(first);
    }
    match unit {
        PeriodUnit::Week | PeriodUnit::SchoolWeek | PeriodUnit::Day => format!(
            "{} - {}",
            first.start.format("%d %b %Y"),
            last.end.format("%d %b %Y")
        ),
        PeriodUnit::Year => format!("{} - {}", first.start.format("%b %Y"), last.end.format("%b %Y")),
        _ => format!("{} - {}", one(first), one(last)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::types::TimeScaleSpec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn available() -> DateSpan {
        // ends on Wednesday 2024-03-13
        DateSpan::new(d(2022, 1, 1), d(2024, 3, 13))
    }

    fn resolve(spec: TimeScaleSpec) -> Vec<Period> {
        let scale = TimeScale::parse(&spec).unwrap();
        CalendarPeriodResolver::default()
            .periods_for(&scale, available())
            .unwrap()
    }

    #[test]
    fn year_offsets_are_rolling() {
        let periods = resolve(TimeScaleSpec::List(vec![
            TimeScaleSpec::offset(PeriodUnit::Year, 0),
            TimeScaleSpec::offset(PeriodUnit::Year, -1),
        ]));
        assert_eq!(periods[0].span(), DateSpan::new(d(2023, 3, 14), d(2024, 3, 13)));
        assert_eq!(periods[1].span(), DateSpan::new(d(2022, 3, 14), d(2023, 3, 13)));
        assert_eq!(periods[0].description, "Mar 2023 - Mar 2024");
    }

    #[test]
    fn month_and_academic_year() {
        let month = resolve(TimeScaleSpec::offset(PeriodUnit::Month, -1));
        assert_eq!(month[0].span(), DateSpan::new(d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month[0].description, "Feb 2024");

        let academic = resolve(TimeScaleSpec::Tag(PeriodUnit::AcademicYear));
        assert_eq!(academic[0].span(), DateSpan::new(d(2023, 9, 1), d(2024, 8, 31)));
        assert_eq!(academic[0].description, "2023/24");
    }

    #[test]
    fn ranges_span_first_start_to_last_end() {
        let weeks = resolve(TimeScaleSpec::range(PeriodUnit::Week, -2, 0));
        assert_eq!(weeks.len(), 1);
        assert_eq!(weeks[0].span(), DateSpan::new(d(2024, 2, 25), d(2024, 3, 16)));
        assert_eq!(weeks[0].description, "25 Feb 2024 - 16 Mar 2024");

        let months = resolve(TimeScaleSpec::range(PeriodUnit::Month, -2, 0));
        assert_eq!(months[0].description, "Jan 2024 - Mar 2024");
    }

    #[test]
    fn day_and_all() {
        let day = resolve(TimeScaleSpec::offset(PeriodUnit::Day, -1));
        assert_eq!(day[0].span(), DateSpan::single(d(2024, 3, 12)));
        assert_eq!(day[0].description, "Tue 12 Mar 2024");

        let all = resolve(TimeScaleSpec::Tag(PeriodUnit::All));
        assert_eq!(all[0].span(), available());
    }

    #[test]
    fn school_weeks_skip_holidays() {
        let calendar = SchoolCalendar::with_holidays(vec![DateSpan::new(d(2024, 3, 4), d(2024, 3, 8))]);
        let resolver = CalendarPeriodResolver::new(calendar);
        let scale = TimeScale::parse(&TimeScaleSpec::offset(PeriodUnit::SchoolWeek, -1)).unwrap();
        let periods = resolver.periods_for(&scale, available()).unwrap();
        // week of 3 Mar is all holiday on school days, so -1 lands on 25 Feb
        assert_eq!(periods[0].start_date, d(2024, 2, 25));
    }
}

//! X-axis bucketing.
//!
//! An [`XAxisBucketer`] is built for one period clipped to the available
//! data. It owns the ordered bucket labels, each bucket's concrete extent,
//! and the `(date, half_hour) → bucket` lookup used during accumulation.

use chrono::{Datelike, Duration, Months, NaiveDate};

use super::types::{
    AggregationError, AggregationResult, BucketSpan, DateSpan, Granularity, Period, XLabel,
    half_hour_start, week_start,
};
use crate::school::{HALF_HOURS, SchoolCalendar};

const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

// ---------------------------------------------------------------------------
// Date helpers
// ---------------------------------------------------------------------------

/// Shift by whole months; negative goes back.
pub fn shift_months(date: NaiveDate, months: i32) -> AggregationResult<NaiveDate> {
    let shifted = if months >= 0 {
        date.checked_add_months(Months::new(months.unsigned_abs()))
    } else {
        date.checked_sub_months(Months::new(months.unsigned_abs()))
    };
    shifted.ok_or_else(|| AggregationError::config(format!("{date} shifted {months} months overflows")))
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

pub fn month_end(date: NaiveDate) -> AggregationResult<NaiveDate> {
    Ok(shift_months(month_start(date), 1)? - Duration::days(1))
}

/// 1 September on or before `date`.
pub fn academic_year_start(date: NaiveDate) -> NaiveDate {
    let year = if date.month() >= 9 {
        date.year()
    } else {
        date.year() - 1
    };
    NaiveDate::from_ymd_opt(year, 9, 1).unwrap_or(date)
}

/// `"2023/24"` for the academic year starting in September 2023.
pub fn academic_year_label(start: NaiveDate) -> String {
    format!("{}/{:02}", start.year(), (start.year() + 1) % 100)
}

// ---------------------------------------------------------------------------
// Bucketer
// ---------------------------------------------------------------------------

/// Bucket layout for one period.
#[derive(Clone, Debug)]
pub struct XAxisBucketer {
    granularity: Granularity,
    span: DateSpan,
    labels: Vec<XLabel>,
    spans: Vec<BucketSpan>,
}

impl XAxisBucketer {
    /// Clip `period` to `available` and lay out its buckets.
    ///
    /// No overlap at all is [`AggregationError::PeriodUnavailable`].
    pub fn new(
        granularity: Granularity,
        period: &Period,
        available: DateSpan,
        calendar: &SchoolCalendar,
    ) -> AggregationResult<Self> {
        let span = period.span().intersect(&available).ok_or_else(|| {
            AggregationError::PeriodUnavailable {
                period: period.description.clone(),
                available,
            }
        })?;

        let (labels, spans) = match granularity {
            Granularity::Year => rolling_years(span)?,
            Granularity::AcademicYear => academic_years(span)?,
            Granularity::Month => months(span)?,
            Granularity::Week => weeks(span, |_| true),
            Granularity::SchoolWeek => weeks(span, |week| calendar.school_days_in(week) > 0),
            Granularity::Day => span
                .iter_days()
                .map(|d| (XLabel::Date(d), BucketSpan::range(DateSpan::single(d))))
                .unzip(),
            Granularity::DayOfWeek => {
                let first = span.start.weekday().num_days_from_sunday() as usize;
                (0..7)
                    .map(|i| {
                        let occurrences = span
                            .iter_days()
                            .skip((7 + i - first) % 7)
                            .step_by(7)
                            .count() as i64;
                        (
                            XLabel::Text(WEEKDAY_NAMES[i].to_string()),
                            BucketSpan::days_only(occurrences),
                        )
                    })
                    .unzip()
            }
            Granularity::Intraday => (0..HALF_HOURS)
                .map(|hh| {
                    let time = half_hour_start(span.start, hh).format("%H:%M").to_string();
                    (XLabel::Text(time), BucketSpan::days_only(span.days()))
                })
                .unzip(),
            Granularity::DateTime => span
                .iter_days()
                .flat_map(|d| {
                    (0..HALF_HOURS).map(move |hh| {
                        (
                            XLabel::DateTime(half_hour_start(d, hh)),
                            BucketSpan::range(DateSpan::single(d)),
                        )
                    })
                })
                .unzip(),
            Granularity::NoBuckets => (
                vec![XLabel::Text(period.description.clone())],
                vec![BucketSpan::range(span)],
            ),
        };

        if labels.is_empty() {
            return Err(AggregationError::PeriodUnavailable {
                period: period.description.clone(),
                available,
            });
        }

        Ok(Self {
            granularity,
            span,
            labels,
            spans,
        })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// The period after clipping to available data.
    pub fn span(&self) -> DateSpan {
        self.span
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[XLabel] {
        &self.labels
    }

    pub fn bucket_spans(&self) -> &[BucketSpan] {
        &self.spans
    }

    /// Concrete date ranges of date-based buckets, in x-axis order.
    pub fn date_ranges(&self) -> Vec<(usize, DateSpan)> {
        self.spans
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.span.map(|s| (i, s)))
            .collect()
    }

    /// Bucket holding `date` (and `half_hour` for sub-daily axes).
    pub fn index(&self, date: NaiveDate, half_hour: Option<usize>) -> AggregationResult<usize> {
        let out_of_range = || {
            AggregationError::BucketOutOfRange(match half_hour {
                Some(hh) => format!("{date} half-hour {hh}"),
                None => date.to_string(),
            })
        };
        if !self.span.contains(date) {
            return Err(out_of_range());
        }
        let day_offset = (date - self.span.start).num_days() as usize;
        match self.granularity {
            Granularity::Day => Ok(day_offset),
            Granularity::DayOfWeek => Ok(date.weekday().num_days_from_sunday() as usize),
            Granularity::Intraday => match half_hour {
                Some(hh) if hh < HALF_HOURS => Ok(hh),
                _ => Err(out_of_range()),
            },
            Granularity::DateTime => match half_hour {
                Some(hh) if hh < HALF_HOURS => Ok(day_offset * HALF_HOURS + hh),
                _ => Err(out_of_range()),
            },
            Granularity::Year
            | Granularity::AcademicYear
            | Granularity::Month
            | Granularity::Week
            | Granularity::SchoolWeek
            | Granularity::NoBuckets => {
                let i = self
                    .spans
                    .partition_point(|b| b.span.is_some_and(|s| s.start <= date));
                i.checked_sub(1)
                    .filter(|&i| self.spans[i].span.is_some_and(|s| s.contains(date)))
                    .ok_or_else(out_of_range)
            }
        }
    }
}

type Layout = (Vec<XLabel>, Vec<BucketSpan>);

fn rolling_years(span: DateSpan) -> AggregationResult<Layout> {
    let mut buckets = Vec::new();
    let mut end = span.end;
    while end >= span.start {
        let start = (shift_months(end, -12)? + Duration::days(1)).max(span.start);
        buckets.push(DateSpan::new(start, end));
        end = start - Duration::days(1);
    }
    buckets.reverse();
    Ok(buckets
        .into_iter()
        .map(|b| {
            let label = format!("{} - {}", b.start.format("%b %Y"), b.end.format("%b %Y"));
            (XLabel::Text(label), BucketSpan::range(b))
        })
        .unzip())
}

fn academic_years(span: DateSpan) -> AggregationResult<Layout> {
    let mut layout: Layout = (Vec::new(), Vec::new());
    let mut start = academic_year_start(span.start);
    while start <= span.end {
        let next = shift_months(start, 12)?;
        let bucket = DateSpan::new(start.max(span.start), (next - Duration::days(1)).min(span.end));
        layout.0.push(XLabel::Text(academic_year_label(start)));
        layout.1.push(BucketSpan::range(bucket));
        start = next;
    }
    Ok(layout)
}

fn months(span: DateSpan) -> AggregationResult<Layout> {
    let mut layout: Layout = (Vec::new(), Vec::new());
    let mut start = month_start(span.start);
    while start <= span.end {
        let bucket = DateSpan::new(start.max(span.start), month_end(start)?.min(span.end));
        layout.0.push(XLabel::Text(start.format("%b %Y").to_string()));
        layout.1.push(BucketSpan::range(bucket));
        start = shift_months(start, 1)?;
    }
    Ok(layout)
}

/// Sunday-to-Saturday weeks, keeping those accepted by `keep`.
fn weeks(span: DateSpan, keep: impl Fn(&DateSpan) -> bool) -> Layout {
    let mut layout: Layout = (Vec::new(), Vec::new());
    let mut start = week_start(span.start);
    while start <= span.end {
        let bucket = DateSpan::new(start.max(span.start), (start + Duration::days(6)).min(span.end));
        if keep(&bucket) {
            layout.0.push(XLabel::Date(bucket.start));
            layout.1.push(BucketSpan::range(bucket));
        }
        start += Duration::days(7);
    }
    layout
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

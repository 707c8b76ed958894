//! Chart aggregation entry point.
//!
//! [`Aggregator::run`] resolves the request's periods, accumulates each one
//! into fresh per-series arrays, merges the surviving periods and runs the
//! post-processing pipeline.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::benchmarks::BenchmarkValues;
use super::breakdown::{Contribution, SeriesBreakdownResolver, TimeSlice};
use super::bucketing::XAxisBucketer;
use super::periods::{CalendarPeriodResolver, PeriodResolver};
use super::pipeline;
use super::types::{
    AggregationError, AggregationResult, BucketSpan, BucketedSeries, ChartRequest, Combine, DateSpan,
    Granularity, Period, Series, SeriesKey, TimeScale, Unit,
};
use super::units::UnitConverter;
use crate::config::EngineConfig;
use crate::school::{HALF_HOURS, School};

/// Aggregate one chart with the default calendar period resolver.
pub fn aggregate(
    school: &School,
    config: &EngineConfig,
    request: &ChartRequest,
) -> AggregationResult<BucketedSeries> {
    Aggregator::new(school, config).run(request)
}

/// Runs chart requests against one school.
pub struct Aggregator<'a> {
    school: &'a School,
    config: &'a EngineConfig,
    converter: UnitConverter,
    periods: Box<dyn PeriodResolver + 'a>,
}

impl<'a> Aggregator<'a> {
    pub fn new(school: &'a School, config: &'a EngineConfig) -> Self {
        Self {
            school,
            config,
            converter: UnitConverter::new(config.conversion.clone()),
            periods: Box::new(CalendarPeriodResolver::new(school.calendar.clone())),
        }
    }

    /// Swap the period resolution service.
    pub fn with_period_resolver(mut self, resolver: impl PeriodResolver + 'a) -> Self {
        self.periods = Box::new(resolver);
        self
    }

    pub fn converter(&self) -> &UnitConverter {
        &self.converter
    }

    /// Aggregate `request`.
    ///
    /// Configuration and specification errors abort. Periods without data
    /// are dropped with a warning; when every period is dropped the result is
    /// [`AggregationError::AllPeriodsFailed`].
    pub fn run(&self, request: &ChartRequest) -> AggregationResult<BucketedSeries> {
        info!(
            chart = %request.name,
            school = %self.school.name,
            x_axis = %request.x_axis,
            unit = %request.yaxis_units,
            "aggregating chart"
        );
        let resolver = SeriesBreakdownResolver::new(self.school, request, &self.converter)?;
        resolver.check_granularity(request.x_axis)?;
        let scale = TimeScale::parse(&request.timescale)?;
        let keys = resolver.series_keys()?;
        let normalization = self.converter.scale(request.yaxis_scaling, self.school)?;

        let available = resolver.available_span()?;
        let mut periods = self.periods.periods_for(&scale, available)?;
        periods.sort_by_key(|p| (p.start_date, p.end_date));
        debug!(periods = periods.len(), %available, "resolved periods");

        let mut done = Vec::with_capacity(periods.len());
        let mut warnings = Vec::new();
        let mut last_error = None;
        for period in &periods {
            match self.aggregate_period(&resolver, &keys, request.x_axis, period, available) {
                Ok(mut result) => {
                    result.scale(normalization);
                    info!(
                        period = %period.description,
                        buckets = result.bucketer.len(),
                        "aggregated period"
                    );
                    done.push(result);
                }
                Err(err) if err.is_data_unavailable() => {
                    warn!(period = %period.description, error = %err, "dropping period");
                    warnings.push(format!("{} dropped: {err}", period.description));
                    last_error = Some(err.to_string());
                }
                Err(err) => return Err(err),
            }
        }
        let Some(latest) = done.pop() else {
            return Err(AggregationError::AllPeriodsFailed {
                requested: periods.len(),
                last_error: last_error.unwrap_or_else(|| "no periods resolved".into()),
            });
        };

        let mut bs = merge(done, latest, request, warnings);
        if request.inject_benchmark {
            let values = BenchmarkValues::for_school(
                self.school,
                &self.config.benchmarks,
                &self.converter,
                request.yaxis_units,
                normalization,
            )?;
            bs = pipeline::inject_benchmarks(bs, &values);
        }
        bs = pipeline::filter_series(bs, &request.filter.series)?;
        bs = pipeline::extract_secondary_axis(bs, request.y2_axis);
        if request.is_scatter() {
            bs = pipeline::reorganise_scatter(bs)?;
            bs = pipeline::remove_zero_x_entries(bs);
        }
        if request.yaxis_units == Unit::Kw {
            bs = pipeline::rescale_to_kw(bs);
        }
        bs = pipeline::compute_totals(bs);
        if request.nullify_trailing_zeros {
            bs = pipeline::nullify_trailing_zeros(bs);
        }
        if request.cumulative {
            bs = pipeline::accumulate(bs);
        }
        let bs = pipeline::reverse(bs, request.reverse_series, request.reverse_xaxis);

        info!(
            chart = %request.name,
            buckets = bs.len(),
            series = bs.series.len(),
            y2 = bs.y2_axis.len(),
            warnings = bs.warnings.len(),
            total = %bs.title_summary(),
            "aggregated chart"
        );
        Ok(bs)
    }

    fn aggregate_period(
        &self,
        resolver: &SeriesBreakdownResolver<'_>,
        keys: &[(SeriesKey, Combine)],
        granularity: Granularity,
        period: &Period,
        available: DateSpan,
    ) -> AggregationResult<PeriodResult> {
        let bucketer = XAxisBucketer::new(granularity, period, available, &self.school.calendar)?;
        let mut acc = Accumulator::new(keys, bucketer.len());

        // With day pre-filters, kW averages divide by the days kept.
        let mut bucket_spans = bucketer.bucket_spans().to_vec();
        let count_days = resolver.filters_days() && !granularity.is_sub_daily();
        if count_days {
            bucket_spans.iter_mut().for_each(|b| b.days = 0);
        }

        let span = bucketer.span();
        if granularity.is_sub_daily() {
            for date in span.iter_days() {
                for hh in 0..HALF_HOURS {
                    let i = bucketer.index(date, Some(hh))?;
                    acc.add(i, resolver.contributions(TimeSlice::HalfHour(date, hh))?);
                }
            }
        } else if granularity == Granularity::DayOfWeek {
            for date in span.iter_days() {
                let i = bucketer.index(date, None)?;
                acc.add(i, resolver.contributions(TimeSlice::DateRange(DateSpan::single(date)))?);
                if count_days && resolver.includes_day(date)? {
                    bucket_spans[i].days += 1;
                }
            }
        } else {
            for (i, range) in bucketer.date_ranges() {
                acc.add(i, resolver.contributions(TimeSlice::DateRange(range))?);
                if count_days {
                    let mut kept = 0;
                    for date in range.iter_days() {
                        if resolver.includes_day(date)? {
                            kept += 1;
                        }
                    }
                    bucket_spans[i].days = kept;
                }
            }
        }
        debug!(
            period = %period.description,
            %span,
            buckets = bucketer.len(),
            series = acc.series.len(),
            "accumulated period"
        );

        Ok(PeriodResult {
            period: period.clone(),
            bucketer,
            bucket_spans,
            series: acc.finish(),
        })
    }
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

/// Per-period series arrays, preallocated for every known key.
struct Accumulator {
    n: usize,
    index: BTreeMap<SeriesKey, usize>,
    series: Vec<Series>,
}

impl Accumulator {
    fn new(keys: &[(SeriesKey, Combine)], n: usize) -> Self {
        let mut acc = Self {
            n,
            index: BTreeMap::new(),
            series: Vec::with_capacity(keys.len()),
        };
        for (key, combine) in keys {
            acc.insert(key.clone(), *combine);
        }
        acc
    }

    fn insert(&mut self, key: SeriesKey, combine: Combine) -> usize {
        let i = self.series.len();
        self.index.insert(key.clone(), i);
        self.series.push(Series::zeroed(key, combine, self.n));
        i
    }

    fn add(&mut self, bucket: usize, contributions: Vec<Contribution>) {
        for c in contributions {
            let i = match self.index.get(&c.key) {
                Some(&i) => i,
                None => {
                    warn!(series = %c.key, "contribution for unexpected series");
                    self.insert(c.key, c.combine)
                }
            };
            let series = &mut self.series[i];
            let (value, count) = (&mut series.values[bucket], &mut series.counts[bucket]);
            match series.combine {
                Combine::Sum | Combine::Mean => *value += c.value,
                Combine::Max if *count == 0 => *value = c.value,
                Combine::Max => *value = value.max(c.value),
            }
            *count += 1;
        }
    }

    fn finish(mut self) -> Vec<Series> {
        for series in self.series.iter_mut().filter(|s| s.combine == Combine::Mean) {
            for (value, count) in series.values.iter_mut().zip(&series.counts) {
                if *count > 0 {
                    *value /= f64::from(*count);
                }
            }
        }
        self.series
    }
}

struct PeriodResult {
    period: Period,
    bucketer: XAxisBucketer,
    /// The bucketer's spans, with day counts narrowed by day pre-filters.
    bucket_spans: Vec<BucketSpan>,
    series: Vec<Series>,
}

impl PeriodResult {
    /// Apply the normalization multiplier to summed energy series.
    fn scale(&mut self, factor: f64) {
        if factor == 1.0 {
            return;
        }
        for series in self
            .series
            .iter_mut()
            .filter(|s| s.combine == Combine::Sum && !s.key.is_secondary())
        {
            series.values.iter_mut().for_each(|v| *v *= factor);
        }
    }
}

// ---------------------------------------------------------------------------
// Multi-period merge
// ---------------------------------------------------------------------------

/// Combine period results, oldest first. The most recent period supplies
/// the x-axis; older arrays are zero-padded or truncated to its length.
fn merge(
    older: Vec<PeriodResult>,
    latest: PeriodResult,
    request: &ChartRequest,
    mut warnings: Vec<String>,
) -> BucketedSeries {
    let periods: Vec<String> = older
        .iter()
        .chain(std::iter::once(&latest))
        .map(|r| r.period.description.clone())
        .collect();
    let qualify = !older.is_empty();
    let PeriodResult {
        period: latest_period,
        bucketer,
        bucket_spans,
        series: latest_series,
    } = latest;
    let n = bucketer.len();

    let mut series = Vec::new();
    for result in older {
        let len = result.bucketer.len();
        if len != n {
            warn!(
                period = %result.period.description,
                buckets = len,
                canonical = n,
                "period length differs from the canonical x-axis"
            );
            warnings.push(format!(
                "{} has {len} buckets, aligned to {n}",
                result.period.description
            ));
        }
        for mut s in result.series {
            s.values.resize(n, 0.0);
            s.counts.resize(n, 0);
            s.key = s.key.with_period(&result.period.description);
            series.push(s);
        }
    }
    for mut s in latest_series {
        if qualify {
            s.key = s.key.with_period(&latest_period.description);
        }
        series.push(s);
    }

    BucketedSeries {
        granularity: request.x_axis,
        unit: request.yaxis_units,
        normalization: request.yaxis_scaling,
        x_axis: bucketer.labels().to_vec(),
        bucket_spans,
        x_axis_label: None,
        series,
        y2_axis: Vec::new(),
        point_labels: None,
        series_totals: Vec::new(),
        grand_total: 0.0,
        periods,
        warnings,
    }
}

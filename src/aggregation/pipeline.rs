//! Post-processing transforms.
//!
//! Each stage takes a [`BucketedSeries`] by value and returns the next one.
//! The aggregator applies them in a fixed order:
//!
//! 1. [`inject_benchmarks`]
//! 2. [`filter_series`]
//! 3. [`extract_secondary_axis`]
//! 4. [`reorganise_scatter`]
//! 5. [`remove_zero_x_entries`]
//! 6. [`rescale_to_kw`]
//! 7. [`compute_totals`]
//! 8. [`nullify_trailing_zeros`]
//! 9. [`accumulate`]
//! 10. [`reverse`]
//!
//! Totals are taken before the display-only stages 8 and 9, so they stay
//! plain bucket sums.

use regex::Regex;
use tracing::debug;

use super::benchmarks::{self, BenchmarkValues};
use super::types::{
    AggregationError, AggregationResult, BucketSpan, BucketedSeries, Combine, SecondaryAxis,
    Series, SeriesFilter, SeriesPart, XLabel,
};

/// Days an injected annual benchmark bucket stands for.
const BENCHMARK_BUCKET_DAYS: i64 = 365;

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Append exemplar, regional and national buckets. Only unqualified
/// electricity and gas series with a positive total receive values; every
/// other series gets zeros so the arrays stay aligned.
pub fn inject_benchmarks(mut bs: BucketedSeries, values: &BenchmarkValues) -> BucketedSeries {
    let rows: Vec<Option<[f64; 3]>> = bs
        .series
        .iter()
        .map(|s| {
            s.key
                .plain_fuel()
                .filter(|_| s.total() > 0.0)
                .and_then(|fuel| values.row_for(fuel))
        })
        .collect();
    if rows.iter().all(Option::is_none) {
        debug!("no unqualified fuel series with usage, skipping benchmarks");
        return bs;
    }

    for (i, label) in benchmarks::labels().into_iter().enumerate() {
        bs.x_axis.push(XLabel::Text(label.to_string()));
        bs.bucket_spans.push(BucketSpan::days_only(BENCHMARK_BUCKET_DAYS));
        if let Some(points) = bs.point_labels.as_mut() {
            points.push(XLabel::Text(label.to_string()));
        }
        for (series, row) in bs.series.iter_mut().zip(&rows) {
            match row {
                Some(row) => {
                    series.values.push(row[i]);
                    series.counts.push(1);
                }
                None => {
                    series.values.push(0.0);
                    series.counts.push(0);
                }
            }
        }
        for series in &mut bs.y2_axis {
            series.values.push(0.0);
            series.counts.push(0);
        }
    }
    bs
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

fn compile(patterns: &[String]) -> AggregationResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(&format!("^(?:{p})$"))
                .map_err(|e| AggregationError::config(format!("invalid series filter '{p}': {e}")))
        })
        .collect()
}

/// Anchored patterns per filterable dimension.
struct CompiledFilter {
    fuel: Vec<Regex>,
    meter: Vec<Regex>,
    submeter: Vec<Regex>,
    day_type: Vec<Regex>,
    heating: Vec<Regex>,
    heating_day_type: Vec<Regex>,
    model_type: Vec<Regex>,
}

impl CompiledFilter {
    fn new(filter: &SeriesFilter) -> AggregationResult<Self> {
        Ok(Self {
            fuel: compile(&filter.fuel)?,
            meter: compile(&filter.meter)?,
            submeter: compile(&filter.submeter)?,
            day_type: compile(&filter.day_type)?,
            heating: compile(&filter.heating)?,
            heating_day_type: compile(&filter.heating_day_type)?,
            model_type: compile(&filter.model_type)?,
        })
    }

    /// Patterns configured for the dimension `part` belongs to.
    fn patterns_for(&self, part: &SeriesPart) -> Option<&[Regex]> {
        let patterns = match part {
            SeriesPart::Fuel(_) => &self.fuel,
            SeriesPart::Meter(_) => &self.meter,
            SeriesPart::Submeter(_) => &self.submeter,
            SeriesPart::DayType(_) => &self.day_type,
            SeriesPart::Heating(_) => &self.heating,
            SeriesPart::HeatingDayType(_) => &self.heating_day_type,
            SeriesPart::ModelType(_) => &self.model_type,
            _ => return None,
        };
        (!patterns.is_empty()).then_some(patterns.as_slice())
    }

    fn keeps(&self, series: &Series) -> bool {
        if series.key.is_secondary() {
            return true;
        }
        let mut judged = series
            .key
            .parts
            .iter()
            .filter_map(|part| self.patterns_for(part).map(|p| (part.to_string(), p)))
            .peekable();
        if judged.peek().is_none() {
            return true;
        }
        judged.any(|(name, patterns)| patterns.iter().any(|re| re.is_match(&name)))
    }
}

/// Keep series whose parts match the configured allow-patterns.
///
/// A series is judged only on the dimensions it has and the filter
/// configures; it survives when any of those match. Series with no such
/// dimension, and secondary-axis series, are always kept.
pub fn filter_series(mut bs: BucketedSeries, filter: &SeriesFilter) -> AggregationResult<BucketedSeries> {
    if filter.is_empty() {
        return Ok(bs);
    }
    let compiled = CompiledFilter::new(filter)?;
    let before = bs.series.len();
    bs.series.retain(|series| compiled.keeps(series));
    debug!(before, after = bs.series.len(), "filtered series");
    Ok(bs)
}

// ---------------------------------------------------------------------------
// Axis reassignment
// ---------------------------------------------------------------------------

/// Move the configured secondary-axis series, including period-qualified
/// copies, to the y2 axis.
pub fn extract_secondary_axis(mut bs: BucketedSeries, axis: Option<SecondaryAxis>) -> BucketedSeries {
    let Some(axis) = axis else {
        return bs;
    };
    let (secondary, primary): (Vec<Series>, Vec<Series>) = bs
        .series
        .into_iter()
        .partition(|s| s.key.secondary_axis() == Some(axis));
    bs.series = primary;
    bs.y2_axis.extend(secondary);
    bs
}

/// Replace the x-axis with degree days (or temperature) for scatter charts.
/// The original labels move to `point_labels`.
pub fn reorganise_scatter(mut bs: BucketedSeries) -> AggregationResult<BucketedSeries> {
    let position = |series: &[Series], axis| series.iter().position(|s| s.key.secondary_axis() == Some(axis));
    let mut found = None;
    for axis in [SecondaryAxis::DegreeDays, SecondaryAxis::Temperature] {
        if let Some(i) = position(&bs.y2_axis, axis) {
            found = Some(bs.y2_axis.remove(i));
            break;
        }
        if let Some(i) = position(&bs.series, axis) {
            found = Some(bs.series.remove(i));
            break;
        }
    }
    let replacement = found.ok_or_else(|| {
        AggregationError::config("scatter charts need a degree days or temperature series")
    })?;

    let dates = std::mem::replace(
        &mut bs.x_axis,
        replacement.values.iter().map(|v| XLabel::Value(*v)).collect(),
    );
    bs.point_labels = Some(dates);
    bs.x_axis_label = Some(replacement.name());
    Ok(bs)
}

/// Drop buckets whose scatter x value is exactly zero.
pub fn remove_zero_x_entries(mut bs: BucketedSeries) -> BucketedSeries {
    let keep: Vec<bool> = bs
        .x_axis
        .iter()
        .map(|label| !matches!(label, XLabel::Value(v) if *v == 0.0))
        .collect();
    if keep.iter().all(|k| *k) {
        return bs;
    }
    fn retain<T>(items: &mut Vec<T>, keep: &[bool]) {
        let mut flags = keep.iter();
        items.retain(|_| flags.next().copied().unwrap_or(true));
    }
    retain(&mut bs.x_axis, &keep);
    retain(&mut bs.bucket_spans, &keep);
    if let Some(points) = bs.point_labels.as_mut() {
        retain(points, &keep);
    }
    for series in bs.series.iter_mut().chain(bs.y2_axis.iter_mut()) {
        retain(&mut series.values, &keep);
        retain(&mut series.counts, &keep);
    }
    bs
}

// ---------------------------------------------------------------------------
// Rescaling and ordering
// ---------------------------------------------------------------------------

/// Turn summed kWh into average kW per bucket.
///
/// Sub-daily buckets divide by their half-hour sample count; coarser ones by
/// the hours the bucket spans. Averaged and peak series are left alone.
pub fn rescale_to_kw(mut bs: BucketedSeries) -> BucketedSeries {
    let sub_daily = bs.granularity.is_sub_daily();
    let spans = bs.bucket_spans.clone();
    for series in bs
        .series
        .iter_mut()
        .chain(bs.y2_axis.iter_mut())
        .filter(|s| s.combine == Combine::Sum)
    {
        for (i, value) in series.values.iter_mut().enumerate() {
            *value = if sub_daily {
                match series.counts.get(i) {
                    Some(&count) if count > 0 => 2.0 * *value / f64::from(count),
                    _ => 0.0,
                }
            } else {
                match spans.get(i) {
                    Some(span) if span.days > 0 => *value / (span.days as f64 * 24.0),
                    _ => 0.0,
                }
            };
        }
    }
    bs
}

/// Blank (NaN) each series' run of zero buckets at the end of the x-axis,
/// so a partly elapsed period stops its line at the last real value.
pub fn nullify_trailing_zeros(mut bs: BucketedSeries) -> BucketedSeries {
    for series in &mut bs.series {
        for value in series.values.iter_mut().rev() {
            if *value != 0.0 {
                break;
            }
            *value = f64::NAN;
        }
    }
    bs
}

/// Replace each series' values with running totals. Blanked buckets stay
/// blank and do not reset the total.
pub fn accumulate(mut bs: BucketedSeries) -> BucketedSeries {
    for series in &mut bs.series {
        let mut running = 0.0;
        for value in series.values.iter_mut().filter(|v| !v.is_nan()) {
            running += *value;
            *value = running;
        }
    }
    bs
}

/// Reverse series order and/or the x-axis, keeping every array in step.
pub fn reverse(mut bs: BucketedSeries, series_order: bool, x_axis: bool) -> BucketedSeries {
    if series_order {
        bs.series.reverse();
        bs.series_totals.reverse();
    }
    if x_axis {
        bs.x_axis.reverse();
        bs.bucket_spans.reverse();
        if let Some(points) = bs.point_labels.as_mut() {
            points.reverse();
        }
        for series in bs.series.iter_mut().chain(bs.y2_axis.iter_mut()) {
            series.values.reverse();
            series.counts.reverse();
        }
    }
    bs
}

/// Per-series totals and the grand total.
pub fn compute_totals(mut bs: BucketedSeries) -> BucketedSeries {
    bs.series_totals = bs.series.iter().map(|s| (s.name(), s.total())).collect();
    bs.grand_total = bs.series_totals.iter().map(|(_, total)| total).sum();
    bs
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Chart aggregation engine.
//!
//! Turns half-hourly meter readings into chart-ready series: one value per
//! x-axis bucket per named series, in the requested unit.
//!
//! # Module structure
//!
//! - [`types`] — request, series key and result structs, error type
//! - [`units`] — kWh conversion, normalization, label helpers
//! - [`bucketing`] — x-axis bucket layout and lookup
//! - [`breakdown`] — per-slice series contributions
//! - [`periods`] — time-scale to period resolution
//! - [`benchmarks`] — comparison figures for injected buckets
//! - [`pipeline`] — post-processing transforms
//! - [`aggregator`] — the entry point tying them together

pub mod aggregator;
pub mod benchmarks;
pub mod breakdown;
pub mod bucketing;
pub mod periods;
pub mod pipeline;
pub mod types;
pub mod units;

// Re-export the most commonly used items at the crate::aggregation level.
pub use aggregator::{Aggregator, aggregate};
pub use benchmarks::{BenchmarkConstants, BenchmarkValues};
pub use breakdown::{SeriesBreakdownResolver, TimeSlice};
pub use bucketing::XAxisBucketer;
pub use periods::{CalendarPeriodResolver, PeriodResolver};
pub use types::{
    AggregationError, AggregationResult, Breakdown, BucketSpan, BucketedSeries, ChartFilter,
    ChartRequest, ChartType, Combine, DateSpan, DayClass, DayType, FuelType, Granularity,
    MeterSelector, Normalization, Period, PeriodUnit, SecondaryAxis, Series, SeriesFilter,
    SeriesKey, SeriesPart, TimeScale, TimeScaleSpec, Unit, XLabel,
};
pub use units::{ConversionRates, UnitConverter};

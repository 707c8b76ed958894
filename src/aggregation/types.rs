//! Shared types for the aggregation engine.
//!
//! Request, key and result structs live here so the bucketer, the breakdown
//! resolver and the pipeline transforms agree on one vocabulary.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Aggregation failure.
///
/// Only [`AggregationError::PeriodUnavailable`] and
/// [`AggregationError::InsufficientData`] are recoverable: the aggregator drops
/// the affected period and keeps going. Everything else aborts the request.
#[derive(Debug, thiserror::Error)]
pub enum AggregationError {
    /// Unknown or inconsistent breakdown, unit, axis key or meter.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed time-scale specification, or a unit that needs a fuel type
    /// requested without one.
    #[error("bad chart specification: {0}")]
    BadChartSpecification(String),

    /// The period does not overlap the available data at all.
    #[error("period {period} unavailable, data covers {available}")]
    PeriodUnavailable { period: String, available: DateSpan },

    /// A meter or weather series does not cover the requested slice.
    #[error("insufficient data for {source_name}: requested {requested}, available {available}")]
    InsufficientData {
        source_name: String,
        requested: String,
        available: String,
    },

    /// A date or half-hour fell outside every bucket of the x-axis.
    #[error("{0} is outside the x-axis")]
    BucketOutOfRange(String),

    /// Every requested period was dropped.
    #[error("all {requested} requested periods failed, last error: {last_error}")]
    AllPeriodsFailed { requested: usize, last_error: String },
}

impl AggregationError {
    /// True for the data-unavailability class that degrades per period.
    pub fn is_data_unavailable(&self) -> bool {
        matches!(
            self,
            Self::PeriodUnavailable { .. } | Self::InsufficientData { .. }
        )
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn spec(msg: impl Into<String>) -> Self {
        Self::BadChartSpecification(msg.into())
    }
}

/// Convenience alias.
pub type AggregationResult<T> = std::result::Result<T, AggregationError>;

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// Inclusive date range.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateSpan {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Number of calendar days covered (0 for an inverted span).
    pub fn days(&self) -> i64 {
        ((self.end - self.start).num_days() + 1).max(0)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn covers(&self, other: &DateSpan) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Overlap of two spans, `None` when they are disjoint.
    pub fn intersect(&self, other: &DateSpan) -> Option<DateSpan> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start <= end).then_some(DateSpan { start, end })
    }

    /// Every date in the span, ascending.
    pub fn iter_days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn count_weekday(&self, weekday: Weekday) -> i64 {
        self.iter_days().filter(|d| d.weekday() == weekday).count() as i64
    }
}

impl fmt::Display for DateSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

/// A resolved time period with its human-readable description.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub description: String,
}

impl Period {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, description: impl Into<String>) -> Self {
        Self {
            start_date,
            end_date,
            description: description.into(),
        }
    }

    pub fn span(&self) -> DateSpan {
        DateSpan::new(self.start_date, self.end_date)
    }
}

/// The half-hour slot (0..48) starting at `datetime`.
pub fn half_hour_index(datetime: NaiveDateTime) -> usize {
    use chrono::Timelike;
    (datetime.hour() * 2 + datetime.minute() / 30) as usize
}

/// The datetime at which half-hour slot `hh` of `date` starts.
pub fn half_hour_start(date: NaiveDate, hh: usize) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN) + Duration::minutes(30 * hh as i64)
}

// ---------------------------------------------------------------------------
// Granularity
// ---------------------------------------------------------------------------

/// X-axis bucket granularity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Year,
    AcademicYear,
    Month,
    Week,
    SchoolWeek,
    Day,
    DayOfWeek,
    /// Half-hour of day, 48 buckets.
    Intraday,
    /// One bucket per half-hour of the period.
    #[serde(rename = "datetime")]
    DateTime,
    /// The whole period in one bucket.
    NoBuckets,
}

impl Granularity {
    /// Buckets shorter than a day; kW rescaling uses sample counts.
    pub fn is_sub_daily(self) -> bool {
        matches!(self, Self::Intraday | Self::DateTime)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Year => "year",
            Self::AcademicYear => "academic_year",
            Self::Month => "month",
            Self::Week => "week",
            Self::SchoolWeek => "school_week",
            Self::Day => "day",
            Self::DayOfWeek => "day_of_week",
            Self::Intraday => "intraday",
            Self::DateTime => "datetime",
            Self::NoBuckets => "no_buckets",
        };
        f.write_str(s)
    }
}

impl FromStr for Granularity {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(Self::Year),
            "academic_year" | "academicyear" => Ok(Self::AcademicYear),
            "month" => Ok(Self::Month),
            "week" => Ok(Self::Week),
            "school_week" | "schoolweek" => Ok(Self::SchoolWeek),
            "day" => Ok(Self::Day),
            "day_of_week" | "dayofweek" => Ok(Self::DayOfWeek),
            "intraday" => Ok(Self::Intraday),
            "datetime" => Ok(Self::DateTime),
            "no_buckets" | "nodatebuckets" => Ok(Self::NoBuckets),
            other => Err(AggregationError::config(format!(
                "unknown x-axis granularity '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Units and normalization
// ---------------------------------------------------------------------------

/// Y-axis unit.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    #[default]
    Kwh,
    Kw,
    Co2,
    #[serde(rename = "£", alias = "pounds")]
    Pounds,
    /// Tariff-accurate cost; must be read from the meter's cost data.
    AccountingCost,
    LibraryBooks,
}

impl Unit {
    pub const ALL: [Unit; 6] = [
        Unit::Kwh,
        Unit::Kw,
        Unit::Co2,
        Unit::Pounds,
        Unit::AccountingCost,
        Unit::LibraryBooks,
    ];
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Kwh => "kwh",
            Self::Kw => "kw",
            Self::Co2 => "co2",
            Self::Pounds => "£",
            Self::AccountingCost => "accounting_cost",
            Self::LibraryBooks => "library_books",
        };
        f.write_str(s)
    }
}

impl FromStr for Unit {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "kwh" => Ok(Self::Kwh),
            "kw" => Ok(Self::Kw),
            "co2" => Ok(Self::Co2),
            "£" | "pounds" => Ok(Self::Pounds),
            "accounting_cost" => Ok(Self::AccountingCost),
            "library_books" => Ok(Self::LibraryBooks),
            other => Err(AggregationError::config(format!("unknown unit '{other}'"))),
        }
    }
}

/// Y-axis normalization.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    PerPupil,
    PerFloorArea,
    Per200Pupils,
    Per1000Pupils,
}

/// Fuel carried by a meter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuelType {
    Electricity,
    Gas,
    StorageHeater,
    SolarPv,
    Oil,
}

impl fmt::Display for FuelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
            Self::StorageHeater => "storage heaters",
            Self::SolarPv => "solar pv (consumed onsite)",
            Self::Oil => "oil",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Breakdown dimensions
// ---------------------------------------------------------------------------

/// Primary series-breakdown dimension.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Breakdown {
    #[serde(rename = "fuel")]
    Fuel,
    #[serde(rename = "daytype")]
    DayType,
    #[serde(rename = "heating")]
    Heating,
    #[serde(rename = "heating_daytype")]
    HeatingDayType,
    #[serde(rename = "model_type")]
    ModelType,
    #[serde(rename = "meter")]
    Meter,
    #[serde(rename = "submeter")]
    Submeter,
    #[serde(rename = "accounting_cost")]
    AccountingCost,
    #[serde(rename = "hotwater")]
    HotWater,
    #[serde(rename = "none")]
    None,
    #[serde(rename = "cusum")]
    Cusum,
    #[serde(rename = "baseload")]
    Baseload,
    #[serde(rename = "peak_kw")]
    PeakKw,
    #[serde(rename = "predicted_heat")]
    PredictedHeat,
}

/// How a breakdown dimension produces its series.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BreakdownKind {
    /// Picks which meters or cost components feed the sums.
    Splitter,
    /// Classifies each day or half-hour into a category.
    Classifier,
    /// Computes its own series from meter data or a model.
    Derived,
}

impl Breakdown {
    pub fn kind(self) -> BreakdownKind {
        match self {
            Self::Fuel | Self::Meter | Self::Submeter | Self::AccountingCost => {
                BreakdownKind::Splitter
            }
            Self::DayType | Self::Heating | Self::HeatingDayType | Self::ModelType => {
                BreakdownKind::Classifier
            }
            Self::HotWater
            | Self::None
            | Self::Cusum
            | Self::Baseload
            | Self::PeakKw
            | Self::PredictedHeat => BreakdownKind::Derived,
        }
    }
}

impl fmt::Display for Breakdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fuel => "fuel",
            Self::DayType => "daytype",
            Self::Heating => "heating",
            Self::HeatingDayType => "heating_daytype",
            Self::ModelType => "model_type",
            Self::Meter => "meter",
            Self::Submeter => "submeter",
            Self::AccountingCost => "accounting_cost",
            Self::HotWater => "hotwater",
            Self::None => "none",
            Self::Cusum => "cusum",
            Self::Baseload => "baseload",
            Self::PeakKw => "peak_kw",
            Self::PredictedHeat => "predicted_heat",
        };
        f.write_str(s)
    }
}

impl FromStr for Breakdown {
    type Err = AggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let all = [
            Self::Fuel,
            Self::DayType,
            Self::Heating,
            Self::HeatingDayType,
            Self::ModelType,
            Self::Meter,
            Self::Submeter,
            Self::AccountingCost,
            Self::HotWater,
            Self::None,
            Self::Cusum,
            Self::Baseload,
            Self::PeakKw,
            Self::PredictedHeat,
        ];
        all.into_iter()
            .find(|b| b.to_string() == s)
            .ok_or_else(|| AggregationError::config(format!("unknown series breakdown '{s}'")))
    }
}

/// Secondary-axis-only physical quantity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecondaryAxis {
    DegreeDays,
    Temperature,
    Irradiance,
    GridCarbon,
    GasCarbon,
}

impl fmt::Display for SecondaryAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DegreeDays => "Degree Days",
            Self::Temperature => "Temperature",
            Self::Irradiance => "Solar Irradiance",
            Self::GridCarbon => "Carbon Intensity of Electricity Grid (kg/kWh)",
            Self::GasCarbon => "Carbon Intensity of Gas (kg/kWh)",
        };
        f.write_str(s)
    }
}

/// Which meters a chart reads.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterSelector {
    #[default]
    All,
    AllElectricity,
    AllHeat,
    StorageHeater,
    SolarPv,
    Named(String),
}

impl fmt::Display for MeterSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::AllElectricity => f.write_str("all_electricity"),
            Self::AllHeat => f.write_str("all_heat"),
            Self::StorageHeater => f.write_str("storage_heater"),
            Self::SolarPv => f.write_str("solar_pv"),
            Self::Named(name) => write!(f, "meter '{name}'"),
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    #[default]
    Column,
    Bar,
    Line,
    Pie,
    Scatter,
}

// ---------------------------------------------------------------------------
// Time scale
// ---------------------------------------------------------------------------

/// Calendar unit a time-scale item is expressed in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodUnit {
    All,
    Year,
    AcademicYear,
    Month,
    Week,
    SchoolWeek,
    Day,
}

/// An offset or an inclusive `[from, to]` offset range, as written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OffsetSpec {
    Offset(i32),
    Range(Vec<i32>),
}

/// Time-scale specification exactly as configured: a tag, a one-entry
/// `{unit = offset}` / `{unit = [from, to]}` map, or a list of those.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeScaleSpec {
    Tag(PeriodUnit),
    Offset(BTreeMap<PeriodUnit, OffsetSpec>),
    List(Vec<TimeScaleSpec>),
}

impl Default for TimeScaleSpec {
    fn default() -> Self {
        Self::Tag(PeriodUnit::All)
    }
}

impl TimeScaleSpec {
    pub fn offset(unit: PeriodUnit, offset: i32) -> Self {
        Self::Offset(BTreeMap::from([(unit, OffsetSpec::Offset(offset))]))
    }

    pub fn range(unit: PeriodUnit, from: i32, to: i32) -> Self {
        Self::Offset(BTreeMap::from([(unit, OffsetSpec::Range(vec![from, to]))]))
    }
}

/// Which occurrence(s) of a unit a time-scale item selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Selection {
    /// Offset from the most recent occurrence (0 = latest, -1 = previous).
    Offset(i32),
    /// From the start of `from` to the end of `to`.
    Range(i32, i32),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimeScaleItem {
    pub unit: PeriodUnit,
    pub selection: Selection,
}

/// Validated time scale: one or more items.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimeScale(pub Vec<TimeScaleItem>);

impl TimeScale {
    /// Validate a configured spec. Malformed input is a
    /// [`AggregationError::BadChartSpecification`].
    pub fn parse(spec: &TimeScaleSpec) -> AggregationResult<Self> {
        match spec {
            TimeScaleSpec::List(items) => {
                if items.is_empty() {
                    return Err(AggregationError::spec("empty time-scale list"));
                }
                items
                    .iter()
                    .map(|item| match item {
                        TimeScaleSpec::List(_) => {
                            Err(AggregationError::spec("nested time-scale lists"))
                        }
                        other => Self::parse_item(other),
                    })
                    .collect::<AggregationResult<Vec<_>>>()
                    .map(TimeScale)
            }
            other => Ok(TimeScale(vec![Self::parse_item(other)?])),
        }
    }

    fn parse_item(spec: &TimeScaleSpec) -> AggregationResult<TimeScaleItem> {
        match spec {
            TimeScaleSpec::Tag(unit) => Ok(TimeScaleItem {
                unit: *unit,
                selection: Selection::Offset(0),
            }),
            TimeScaleSpec::Offset(map) => {
                let mut entries = map.iter();
                let (Some((unit, offset)), None) = (entries.next(), entries.next()) else {
                    return Err(AggregationError::spec(format!(
                        "time-scale map must have exactly one key, got {}",
                        map.len()
                    )));
                };
                let selection = match offset {
                    OffsetSpec::Offset(n) => Selection::Offset(*n),
                    OffsetSpec::Range(bounds) => match bounds.as_slice() {
                        [from, to] if from <= to => Selection::Range(*from, *to),
                        [from, to] => {
                            return Err(AggregationError::spec(format!(
                                "reversed time-scale range [{from}, {to}]"
                            )));
                        }
                        other => {
                            return Err(AggregationError::spec(format!(
                                "time-scale range needs two bounds, got {}",
                                other.len()
                            )));
                        }
                    },
                };
                if *unit == PeriodUnit::All && selection != Selection::Offset(0) {
                    return Err(AggregationError::spec("'all' takes no offset"));
                }
                Ok(TimeScaleItem {
                    unit: *unit,
                    selection,
                })
            }
            TimeScaleSpec::List(_) => Err(AggregationError::spec("nested time-scale lists")),
        }
    }
}

// ---------------------------------------------------------------------------
// Filters and request
// ---------------------------------------------------------------------------

/// Day classification used for day pre-filters.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Holiday,
    Weekend,
    SchoolDay,
}

/// Regex allow-patterns applied to finished series, per dimension.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesFilter {
    pub fuel: Vec<String>,
    pub meter: Vec<String>,
    pub submeter: Vec<String>,
    pub day_type: Vec<String>,
    pub heating: Vec<String>,
    pub heating_day_type: Vec<String>,
    pub model_type: Vec<String>,
}

impl SeriesFilter {
    pub fn is_empty(&self) -> bool {
        self.fuel.is_empty()
            && self.meter.is_empty()
            && self.submeter.is_empty()
            && self.day_type.is_empty()
            && self.heating.is_empty()
            && self.heating_day_type.is_empty()
            && self.model_type.is_empty()
    }
}

/// Chart filters. `day_type`, `heating` and `model_type` drop whole days
/// before accumulation; `series` drops finished series.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartFilter {
    pub day_type: Option<Vec<DayClass>>,
    pub heating: Option<bool>,
    pub model_type: Option<Vec<String>>,
    pub series: SeriesFilter,
}

impl ChartFilter {
    /// True when any per-day pre-filter is configured.
    pub fn has_day_filters(&self) -> bool {
        self.day_type.is_some() || self.heating.is_some() || self.model_type.is_some()
    }
}

/// A fully resolved chart request. Built upstream; never mutated here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChartRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub chart_type: ChartType,
    pub x_axis: Granularity,
    pub series_breakdown: Vec<Breakdown>,
    #[serde(default)]
    pub y2_axis: Option<SecondaryAxis>,
    #[serde(default)]
    pub yaxis_units: Unit,
    #[serde(default)]
    pub yaxis_scaling: Normalization,
    #[serde(default)]
    pub meter_definition: MeterSelector,
    #[serde(default)]
    pub timescale: TimeScaleSpec,
    #[serde(default)]
    pub filter: ChartFilter,
    #[serde(default)]
    pub reverse_xaxis: bool,
    #[serde(default)]
    pub reverse_series: bool,
    #[serde(default)]
    pub inject_benchmark: bool,
    /// Blank the run of zero buckets at the end of each series.
    #[serde(default)]
    pub nullify_trailing_zeros: bool,
    /// Plot running totals instead of per-bucket values.
    #[serde(default)]
    pub cumulative: bool,
}

impl ChartRequest {
    /// Minimal request; remaining fields take their defaults.
    pub fn new(x_axis: Granularity, series_breakdown: Vec<Breakdown>) -> Self {
        Self {
            name: String::new(),
            chart_type: ChartType::default(),
            x_axis,
            series_breakdown,
            y2_axis: None,
            yaxis_units: Unit::default(),
            yaxis_scaling: Normalization::default(),
            meter_definition: MeterSelector::default(),
            timescale: TimeScaleSpec::default(),
            filter: ChartFilter::default(),
            reverse_xaxis: false,
            reverse_series: false,
            inject_benchmark: false,
            nullify_trailing_zeros: false,
            cumulative: false,
        }
    }

    pub fn is_scatter(&self) -> bool {
        self.chart_type == ChartType::Scatter
    }
}

// ---------------------------------------------------------------------------
// Series identity
// ---------------------------------------------------------------------------

/// Half-hour day type.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DayType {
    Holiday,
    Weekend,
    SchoolDayOpen,
    SchoolDayClosed,
}

impl DayType {
    pub const ALL: [DayType; 4] = [
        DayType::Holiday,
        DayType::Weekend,
        DayType::SchoolDayOpen,
        DayType::SchoolDayClosed,
    ];
}

impl fmt::Display for DayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Holiday => "Holiday",
            Self::Weekend => "Weekend",
            Self::SchoolDayOpen => "School Day Open",
            Self::SchoolDayClosed => "School Day Closed",
        };
        f.write_str(s)
    }
}

/// Heating-by-day-type category; the 7-way cross.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeatingDayType {
    HeatingOn(DayClass),
    HotWaterOnly(DayClass),
    BoilerOff,
}

impl HeatingDayType {
    pub fn all() -> [HeatingDayType; 7] {
        use DayClass::*;
        [
            Self::HeatingOn(SchoolDay),
            Self::HeatingOn(Holiday),
            Self::HeatingOn(Weekend),
            Self::HotWaterOnly(SchoolDay),
            Self::HotWaterOnly(Holiday),
            Self::HotWaterOnly(Weekend),
            Self::BoilerOff,
        ]
    }
}

impl fmt::Display for HeatingDayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let day = |class: &DayClass| match class {
            DayClass::SchoolDay => "School Days",
            DayClass::Holiday => "Holidays",
            DayClass::Weekend => "Weekends",
        };
        match self {
            Self::HeatingOn(c) => write!(f, "Heating On {}", day(c)),
            Self::HotWaterOnly(c) => write!(f, "Hot water/kitchen only On {}", day(c)),
            Self::BoilerOff => f.write_str("Boiler Off"),
        }
    }
}

/// Useful vs wasted hot water.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HotWaterUse {
    Useful,
    Wasted,
}

/// One dimension's contribution to a series identity.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SeriesPart {
    Fuel(FuelType),
    DayType(DayType),
    /// `true` for heating days.
    Heating(bool),
    HeatingDayType(HeatingDayType),
    ModelType(String),
    Meter(String),
    Submeter(String),
    BillComponent(String),
    HotWater(HotWaterUse),
    Energy,
    Cusum,
    Baseload,
    PeakKw,
    PredictedHeat,
    Secondary(SecondaryAxis),
}

impl fmt::Display for SeriesPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fuel(fuel) => write!(f, "{fuel}"),
            Self::DayType(day_type) => write!(f, "{day_type}"),
            Self::Heating(true) => f.write_str("Heating Day"),
            Self::Heating(false) => f.write_str("Hot Water (& Kitchen)"),
            Self::HeatingDayType(hdt) => write!(f, "{hdt}"),
            Self::ModelType(name)
            | Self::Meter(name)
            | Self::Submeter(name)
            | Self::BillComponent(name) => f.write_str(name),
            Self::HotWater(HotWaterUse::Useful) => f.write_str("Hot Water Usage"),
            Self::HotWater(HotWaterUse::Wasted) => f.write_str("Wasted Hot Water Usage"),
            Self::Energy => f.write_str("Energy"),
            Self::Cusum => f.write_str("CUSUM"),
            Self::Baseload => f.write_str("BASELOAD"),
            Self::PeakKw => f.write_str("Peak (kW)"),
            Self::PredictedHeat => f.write_str("Predicted Heat"),
            Self::Secondary(axis) => write!(f, "{axis}"),
        }
    }
}

/// Structured series identity. Display joins parts with `": "` and appends
/// `":<period>"` once the series has been period-qualified by a merge.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub parts: Vec<SeriesPart>,
    pub period: Option<String>,
}

impl SeriesKey {
    pub fn new(parts: Vec<SeriesPart>) -> Self {
        Self {
            parts,
            period: None,
        }
    }

    pub fn single(part: SeriesPart) -> Self {
        Self::new(vec![part])
    }

    pub fn secondary(axis: SecondaryAxis) -> Self {
        Self::single(SeriesPart::Secondary(axis))
    }

    pub fn with_period(mut self, description: &str) -> Self {
        self.period = Some(description.to_string());
        self
    }

    /// The secondary axis this key names, if it is a secondary series.
    pub fn secondary_axis(&self) -> Option<SecondaryAxis> {
        match self.parts.as_slice() {
            [SeriesPart::Secondary(axis)] => Some(*axis),
            _ => None,
        }
    }

    pub fn is_secondary(&self) -> bool {
        self.secondary_axis().is_some()
    }

    /// Unqualified single-fuel key (benchmark injection target).
    pub fn plain_fuel(&self) -> Option<FuelType> {
        match (self.parts.as_slice(), &self.period) {
            ([SeriesPart::Fuel(fuel)], None) => Some(*fuel),
            _ => None,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                f.write_str(": ")?;
            }
            write!(f, "{part}")?;
        }
        if let Some(period) = &self.period {
            write!(f, ":{period}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// X-axis label.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum XLabel {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Text(String),
    Value(f64),
}

impl fmt::Display for XLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M")),
            Self::Text(s) => f.write_str(s),
            Self::Value(v) => write!(f, "{v}"),
        }
    }
}

/// Concrete extent of one bucket. Day-of-week and intraday buckets have no
/// contiguous range but still record how many days they span.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BucketSpan {
    pub span: Option<DateSpan>,
    pub days: i64,
}

impl BucketSpan {
    pub fn range(span: DateSpan) -> Self {
        Self {
            span: Some(span),
            days: span.days(),
        }
    }

    pub fn days_only(days: i64) -> Self {
        Self { span: None, days }
    }
}

/// How samples in one bucket combine.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Combine {
    /// Energy-like: summed, unit-converted, kW-rescaled.
    #[default]
    Sum,
    /// Physical quantities: averaged over samples.
    Mean,
    /// Peak demand: largest sample wins.
    Max,
}

/// One named series with its per-bucket values and sample counts.
#[derive(Clone, Debug, PartialEq)]
pub struct Series {
    pub key: SeriesKey,
    pub combine: Combine,
    pub values: Vec<f64>,
    pub counts: Vec<u32>,
}

impl Series {
    pub fn zeroed(key: SeriesKey, combine: Combine, n: usize) -> Self {
        Self {
            key,
            combine,
            values: vec![0.0; n],
            counts: vec![0; n],
        }
    }

    pub fn name(&self) -> String {
        self.key.to_string()
    }

    /// Sum over buckets; blanked (NaN) buckets are skipped.
    pub fn total(&self) -> f64 {
        self.values.iter().filter(|v| !v.is_nan()).sum()
    }
}

/// The aggregation result handed to renderers.
#[derive(Clone, Debug, PartialEq)]
pub struct BucketedSeries {
    pub granularity: Granularity,
    pub unit: Unit,
    pub normalization: Normalization,
    pub x_axis: Vec<XLabel>,
    pub bucket_spans: Vec<BucketSpan>,
    /// Set when scatter reorganisation replaced the x-axis.
    pub x_axis_label: Option<String>,
    pub series: Vec<Series>,
    pub y2_axis: Vec<Series>,
    pub point_labels: Option<Vec<XLabel>>,
    pub series_totals: Vec<(String, f64)>,
    pub grand_total: f64,
    /// Descriptions of the periods that were aggregated, oldest first.
    pub periods: Vec<String>,
    pub warnings: Vec<String>,
}

impl BucketedSeries {
    pub fn len(&self) -> usize {
        self.x_axis.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x_axis.is_empty()
    }

    pub fn series_named(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name() == name)
    }

    pub fn y2_named(&self, name: &str) -> Option<&Series> {
        self.y2_axis.iter().find(|s| s.name() == name)
    }

    pub fn series_names(&self) -> Vec<String> {
        self.series.iter().map(Series::name).collect()
    }

    /// True when every array has the x-axis length.
    pub fn is_consistent(&self) -> bool {
        let n = self.len();
        self.bucket_spans.len() == n
            && self
                .point_labels
                .as_ref()
                .is_none_or(|labels| labels.len() == n)
            && self
                .series
                .iter()
                .chain(self.y2_axis.iter())
                .all(|s| s.values.len() == n && s.counts.len() == n)
    }

    /// Title text from the grand total, e.g. `"1,234 kWh"`.
    pub fn title_summary(&self) -> String {
        super::units::format_total(self.grand_total, self.unit)
    }

    pub fn y_axis_label(&self) -> String {
        super::units::y_axis_label(self.unit, self.normalization)
    }

    /// Renderer-facing JSON envelope.
    pub fn to_chart_json(&self) -> serde_json::Value {
        let map = |series: &[Series]| -> serde_json::Map<String, serde_json::Value> {
            series
                .iter()
                .map(|s| (s.name(), serde_json::json!(s.values)))
                .collect()
        };
        let counts: serde_json::Map<String, serde_json::Value> = self
            .series
            .iter()
            .map(|s| (s.name(), serde_json::json!(s.counts)))
            .collect();
        let totals: serde_json::Map<String, serde_json::Value> = self
            .series_totals
            .iter()
            .map(|(name, total)| (name.clone(), serde_json::json!(total)))
            .collect();
        serde_json::json!({
            "x_axis": self.x_axis,
            "x_axis_label": self.x_axis_label,
            "series": map(&self.series),
            "series_order": self.series_names(),
            "series_counts": counts,
            "y2_axis": map(&self.y2_axis),
            "series_totals": totals,
            "grand_total": self.grand_total,
            "point_labels": self.point_labels,
            "_meta": {
                "granularity": self.granularity.to_string(),
                "unit": self.unit.to_string(),
                "normalization": self.normalization,
                "periods": self.periods,
                "warnings": self.warnings,
            }
        })
    }
}

/// Sunday on or before `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_sunday() as i64)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

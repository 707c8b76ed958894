//! Half-hourly meter readings.
//!
//! [`AmrSource`] is the read interface the breakdown resolver consumes;
//! [`AmrData`] is the in-memory implementation loaded from school datasets.

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::aggregation::types::{AggregationError, AggregationResult, DateSpan, FuelType};

/// Half-hour readings per day.
pub const HALF_HOURS: usize = 48;

/// Lowest half-hours averaged into the daily baseload.
const BASELOAD_SAMPLES: usize = 8;

/// Which quantity to read.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReadingKind {
    Kwh,
    /// Tariff cost in £, summed over bill components.
    AccountingCost,
}

/// Read access to one meter's half-hourly data.
pub trait AmrSource: Send + Sync + Debug {
    fn start_date(&self) -> Option<NaiveDate>;
    fn end_date(&self) -> Option<NaiveDate>;

    /// The 48 readings of one day.
    fn days_x48(&self, date: NaiveDate, kind: ReadingKind) -> AggregationResult<Vec<f64>>;

    /// Names of the tariff components this meter is billed with.
    fn bill_component_names(&self) -> Vec<String>;

    /// Per-component £ for one day, or one half-hour of it.
    fn bill_components(
        &self,
        date: NaiveDate,
        half_hour: Option<usize>,
    ) -> AggregationResult<BTreeMap<String, f64>>;

    fn span(&self) -> Option<DateSpan> {
        Some(DateSpan::new(self.start_date()?, self.end_date()?))
    }

    fn half_hour(&self, date: NaiveDate, half_hour: usize, kind: ReadingKind) -> AggregationResult<f64> {
        let day = self.days_x48(date, kind)?;
        day.get(half_hour).copied().ok_or_else(|| {
            AggregationError::BucketOutOfRange(format!("half-hour {half_hour} of {date}"))
        })
    }

    fn one_day(&self, date: NaiveDate, kind: ReadingKind) -> AggregationResult<f64> {
        Ok(self.days_x48(date, kind)?.iter().sum())
    }

    /// Sum over an inclusive date range.
    fn date_range(&self, start: NaiveDate, end: NaiveDate, kind: ReadingKind) -> AggregationResult<f64> {
        DateSpan::new(start, end)
            .iter_days()
            .map(|date| self.one_day(date, kind))
            .sum()
    }

    fn bill_components_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AggregationResult<BTreeMap<String, f64>> {
        let mut totals = BTreeMap::new();
        for date in DateSpan::new(start, end).iter_days() {
            for (name, value) in self.bill_components(date, None)? {
                *totals.entry(name).or_insert(0.0) += value;
            }
        }
        Ok(totals)
    }

    /// Average of the lowest half-hours, as kW.
    fn baseload_kw(&self, date: NaiveDate) -> AggregationResult<f64> {
        let mut day = self.days_x48(date, ReadingKind::Kwh)?;
        day.sort_by(f64::total_cmp);
        let lowest = &day[..BASELOAD_SAMPLES.min(day.len())];
        if lowest.is_empty() {
            return Ok(0.0);
        }
        Ok(2.0 * lowest.iter().sum::<f64>() / lowest.len() as f64)
    }

    /// Largest half-hour of the day, as kW.
    fn peak_kw(&self, date: NaiveDate) -> AggregationResult<f64> {
        let day = self.days_x48(date, ReadingKind::Kwh)?;
        Ok(2.0 * day.iter().copied().fold(0.0, f64::max))
    }
}

/// One day of readings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DayReadings {
    pub kwh: Vec<f64>,
    /// Tariff components in £, each 48 half-hours.
    #[serde(default)]
    pub costs: BTreeMap<String, Vec<f64>>,
}

/// In-memory AMR data keyed by date.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<NaiveDate, DayReadings>", into = "BTreeMap<NaiveDate, DayReadings>")]
pub struct AmrData {
    days: BTreeMap<NaiveDate, DayReadings>,
}

impl TryFrom<BTreeMap<NaiveDate, DayReadings>> for AmrData {
    type Error = String;

    fn try_from(days: BTreeMap<NaiveDate, DayReadings>) -> Result<Self, Self::Error> {
        for (date, day) in &days {
            if day.kwh.len() != HALF_HOURS {
                return Err(format!(
                    "{date}: expected {HALF_HOURS} kWh readings, got {}",
                    day.kwh.len()
                ));
            }
            if let Some((name, _)) = day.costs.iter().find(|(_, v)| v.len() != HALF_HOURS) {
                return Err(format!("{date}: cost component '{name}' is not {HALF_HOURS} long"));
            }
        }
        Ok(Self { days })
    }
}

impl From<AmrData> for BTreeMap<NaiveDate, DayReadings> {
    fn from(data: AmrData) -> Self {
        data.days
    }
}

impl AmrData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert one day; readings must be 48 long.
    pub fn insert(&mut self, date: NaiveDate, kwh: Vec<f64>) -> AggregationResult<()> {
        self.insert_day(date, DayReadings {
            kwh,
            costs: BTreeMap::new(),
        })
    }

    pub fn insert_day(&mut self, date: NaiveDate, day: DayReadings) -> AggregationResult<()> {
        if day.kwh.len() != HALF_HOURS {
            return Err(AggregationError::config(format!(
                "{date}: expected {HALF_HOURS} kWh readings, got {}",
                day.kwh.len()
            )));
        }
        self.days.insert(date, day);
        Ok(())
    }

    /// Constant `kwh_per_half_hour` over `span`.
    pub fn constant(span: DateSpan, kwh_per_half_hour: f64) -> Self {
        let days = span
            .iter_days()
            .map(|date| {
                (date, DayReadings {
                    kwh: vec![kwh_per_half_hour; HALF_HOURS],
                    costs: BTreeMap::new(),
                })
            })
            .collect();
        Self { days }
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    fn day(&self, date: NaiveDate) -> AggregationResult<&DayReadings> {
        self.days.get(&date).ok_or_else(|| AggregationError::InsufficientData {
            source_name: "amr data".into(),
            requested: date.to_string(),
            available: self
                .span()
                .map_or_else(|| "nothing".to_string(), |s| s.to_string()),
        })
    }
}

impl AmrSource for AmrData {
    fn start_date(&self) -> Option<NaiveDate> {
        self.days.keys().next().copied()
    }

    fn end_date(&self) -> Option<NaiveDate> {
        self.days.keys().next_back().copied()
    }

    fn days_x48(&self, date: NaiveDate, kind: ReadingKind) -> AggregationResult<Vec<f64>> {
        let day = self.day(date)?;
        match kind {
            ReadingKind::Kwh => Ok(day.kwh.clone()),
            ReadingKind::AccountingCost => {
                if day.costs.is_empty() {
                    return Err(AggregationError::config(format!(
                        "no accounting cost data on {date}"
                    )));
                }
                let mut total = vec![0.0; HALF_HOURS];
                for component in day.costs.values() {
                    for (slot, value) in total.iter_mut().zip(component) {
                        *slot += value;
                    }
                }
                Ok(total)
            }
        }
    }

    fn bill_component_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .days
            .values()
            .flat_map(|d| d.costs.keys().cloned())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn bill_components(
        &self,
        date: NaiveDate,
        half_hour: Option<usize>,
    ) -> AggregationResult<BTreeMap<String, f64>> {
        let day = self.day(date)?;
        day.costs
            .iter()
            .map(|(name, values)| {
                let value = match half_hour {
                    Some(hh) => values.get(hh).copied().ok_or_else(|| {
                        AggregationError::BucketOutOfRange(format!("half-hour {hh} of {date}"))
                    })?,
                    None => values.iter().sum(),
                };
                Ok((name.clone(), value))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Meter
// ---------------------------------------------------------------------------

/// A physical or aggregate meter.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "MeterRecord")]
pub struct Meter {
    pub name: String,
    pub fuel: FuelType,
    pub amr: Arc<dyn AmrSource>,
    /// Internal circuits, for submeter breakdowns.
    pub sub_meters: Vec<Meter>,
}

#[derive(Deserialize)]
struct MeterRecord {
    name: String,
    fuel: FuelType,
    readings: AmrData,
    #[serde(default)]
    sub_meters: Vec<MeterRecord>,
}

impl From<MeterRecord> for Meter {
    fn from(record: MeterRecord) -> Self {
        Meter {
            name: record.name,
            fuel: record.fuel,
            amr: Arc::new(record.readings),
            sub_meters: record.sub_meters.into_iter().map(Meter::from).collect(),
        }
    }
}

impl Meter {
    pub fn new(name: impl Into<String>, fuel: FuelType, amr: Arc<dyn AmrSource>) -> Self {
        Self {
            name: name.into(),
            fuel,
            amr,
            sub_meters: Vec::new(),
        }
    }

    pub fn with_sub_meters(mut self, sub_meters: Vec<Meter>) -> Self {
        self.sub_meters = sub_meters;
        self
    }

    pub fn span(&self) -> Option<DateSpan> {
        self.amr.span()
    }

    pub fn covers(&self, requested: &DateSpan) -> bool {
        self.span().is_some_and(|s| s.covers(requested))
    }

    /// Fail fast when `requested` is not fully covered.
    pub fn check_coverage(&self, requested: &DateSpan) -> AggregationResult<()> {
        if self.covers(requested) {
            return Ok(());
        }
        Err(AggregationError::InsufficientData {
            source_name: format!("meter '{}'", self.name),
            requested: requested.to_string(),
            available: self
                .span()
                .map_or_else(|| "nothing".to_string(), |s| s.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn ramp_day() -> Vec<f64> {
        (0..HALF_HOURS).map(|i| i as f64).collect()
    }

    #[test]
    fn range_sum_and_bounds() {
        let data = AmrData::constant(DateSpan::new(d(1), d(10)), 0.5);
        assert_eq!(data.start_date(), Some(d(1)));
        assert_eq!(data.end_date(), Some(d(10)));
        assert_eq!(data.one_day(d(3), ReadingKind::Kwh).unwrap(), 24.0);
        assert_eq!(data.date_range(d(1), d(10), ReadingKind::Kwh).unwrap(), 240.0);
        let err = data.one_day(d(11), ReadingKind::Kwh).unwrap_err();
        assert!(err.is_data_unavailable());
    }

    #[test]
    fn baseload_and_peak() {
        let mut data = AmrData::new();
        data.insert(d(1), ramp_day()).unwrap();
        // lowest eight are 0..=7, mean 3.5 kWh per half-hour
        assert_eq!(data.baseload_kw(d(1)).unwrap(), 7.0);
        assert_eq!(data.peak_kw(d(1)).unwrap(), 94.0);
    }

    #[test]
    fn accounting_cost_sums_components() {
        let mut data = AmrData::new();
        let costs = BTreeMap::from([
            ("day rate".to_string(), vec![0.10; HALF_HOURS]),
            ("standing charge".to_string(), vec![0.02; HALF_HOURS]),
        ]);
        data.insert_day(d(1), DayReadings {
            kwh: vec![1.0; HALF_HOURS],
            costs,
        })
        .unwrap();
        let total = data.one_day(d(1), ReadingKind::AccountingCost).unwrap();
        assert!((total - 5.76).abs() < 1e-9);
        let parts = data.bill_components(d(1), Some(0)).unwrap();
        assert_eq!(parts.len(), 2);
        assert!((parts["day rate"] - 0.10).abs() < 1e-12);
        assert_eq!(
            data.bill_component_names(),
            vec!["day rate".to_string(), "standing charge".to_string()]
        );
    }

    #[test]
    fn rejects_short_days() {
        let mut data = AmrData::new();
        assert!(data.insert(d(1), vec![1.0; 47]).is_err());
        let parsed: Result<AmrData, _> =
            serde_json::from_str(r#"{"2024-03-01": {"kwh": [1.0, 2.0]}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn meter_coverage_check() {
        let meter = Meter::new(
            "Main",
            FuelType::Electricity,
            Arc::new(AmrData::constant(DateSpan::new(d(1), d(5)), 1.0)),
        );
        assert!(meter.check_coverage(&DateSpan::new(d(2), d(4))).is_ok());
        let err = meter
            .check_coverage(&DateSpan::new(d(4), d(8)))
            .unwrap_err();
        assert!(matches!(err, AggregationError::InsufficientData { .. }));
        assert!(err.to_string().contains("Main"));
    }
}

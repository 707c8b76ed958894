//! Ancillary half-hourly series: temperature, solar irradiance and grid
//! carbon intensity.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::amr::HALF_HOURS;
use crate::aggregation::types::{AggregationError, AggregationResult, DateSpan};

/// Base temperature for heating degree days, °C.
pub const DEGREE_DAY_BASE_TEMPERATURE: f64 = 15.5;

/// 48 values per day keyed by date.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HalfHourlySeries {
    days: BTreeMap<NaiveDate, Vec<f64>>,
}

impl HalfHourlySeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, date: NaiveDate, values: Vec<f64>) -> AggregationResult<()> {
        if values.len() != HALF_HOURS {
            return Err(AggregationError::config(format!(
                "{date}: expected {HALF_HOURS} values, got {}",
                values.len()
            )));
        }
        self.days.insert(date, values);
        Ok(())
    }

    /// Same value every half-hour of `date`.
    pub fn insert_flat(&mut self, date: NaiveDate, value: f64) {
        self.days.insert(date, vec![value; HALF_HOURS]);
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    pub fn span(&self) -> Option<DateSpan> {
        let start = *self.days.keys().next()?;
        let end = *self.days.keys().next_back()?;
        Some(DateSpan::new(start, end))
    }

    fn day(&self, name: &str, date: NaiveDate) -> AggregationResult<&[f64]> {
        self.days
            .get(&date)
            .map(Vec::as_slice)
            .ok_or_else(|| AggregationError::InsufficientData {
                source_name: name.to_string(),
                requested: date.to_string(),
                available: self
                    .span()
                    .map_or_else(|| "nothing".to_string(), |s| s.to_string()),
            })
    }

    pub fn value(&self, name: &str, date: NaiveDate, half_hour: usize) -> AggregationResult<f64> {
        self.day(name, date)?
            .get(half_hour)
            .copied()
            .ok_or_else(|| AggregationError::BucketOutOfRange(format!("half-hour {half_hour}")))
    }

    pub fn day_average(&self, name: &str, date: NaiveDate) -> AggregationResult<f64> {
        let day = self.day(name, date)?;
        Ok(day.iter().sum::<f64>() / day.len().max(1) as f64)
    }
}

/// Weather and grid data for a school's location.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Weather {
    pub temperatures: HalfHourlySeries,
    pub irradiance: HalfHourlySeries,
    pub grid_carbon: HalfHourlySeries,
}

impl Weather {
    pub fn temperature(&self, date: NaiveDate, half_hour: usize) -> AggregationResult<f64> {
        self.temperatures.value("temperature", date, half_hour)
    }

    pub fn average_temperature(&self, date: NaiveDate) -> AggregationResult<f64> {
        self.temperatures.day_average("temperature", date)
    }

    pub fn degree_days(&self, date: NaiveDate) -> AggregationResult<f64> {
        Ok((DEGREE_DAY_BASE_TEMPERATURE - self.average_temperature(date)?).max(0.0))
    }

    /// Degree days implied by a single half-hour's temperature.
    pub fn half_hour_degree_days(&self, date: NaiveDate, half_hour: usize) -> AggregationResult<f64> {
        Ok((DEGREE_DAY_BASE_TEMPERATURE - self.temperature(date, half_hour)?).max(0.0))
    }

    pub fn irradiance(&self, date: NaiveDate, half_hour: usize) -> AggregationResult<f64> {
        self.irradiance.value("solar irradiance", date, half_hour)
    }

    pub fn average_irradiance(&self, date: NaiveDate) -> AggregationResult<f64> {
        self.irradiance.day_average("solar irradiance", date)
    }

    pub fn grid_carbon(&self, date: NaiveDate, half_hour: usize) -> AggregationResult<f64> {
        self.grid_carbon.value("grid carbon intensity", date, half_hour)
    }

    pub fn average_grid_carbon(&self, date: NaiveDate) -> AggregationResult<f64> {
        self.grid_carbon.day_average("grid carbon intensity", date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_days_from_daily_mean() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut weather = Weather::default();
        let temps: Vec<f64> = (0..HALF_HOURS).map(|i| if i < 24 { 2.0 } else { 8.0 }).collect();
        weather.temperatures.insert(date, temps).unwrap();
        assert_eq!(weather.average_temperature(date).unwrap(), 5.0);
        assert_eq!(weather.degree_days(date).unwrap(), 10.5);
        assert_eq!(weather.half_hour_degree_days(date, 30).unwrap(), 7.5);

        let warm = date.succ_opt().unwrap();
        weather.temperatures.insert_flat(warm, 20.0);
        assert_eq!(weather.degree_days(warm).unwrap(), 0.0);
    }

    #[test]
    fn missing_day_is_insufficient_data() {
        let weather = Weather::default();
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let err = weather.average_irradiance(date).unwrap_err();
        assert!(err.is_data_unavailable());
        assert!(err.to_string().contains("solar irradiance"));
    }
}

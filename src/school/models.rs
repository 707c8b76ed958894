//! Heating and hot-water model interfaces.
//!
//! Model fitting happens upstream; the engine only asks fitted models to
//! classify days and predict consumption. [`ThresholdHeatingModel`] and
//! [`FixedEfficiencyHotWaterModel`] are simple fitted forms loaded from
//! school datasets.

use std::fmt::Debug;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::weather::DEGREE_DAY_BASE_TEMPERATURE;
use crate::aggregation::types::DayClass;

/// Fitted heating regression.
pub trait HeatingModel: Send + Sync + Debug {
    /// Whether the heating ran on `date`, given that day's heat kWh.
    fn heating_on(&self, date: NaiveDate, day_kwh: f64) -> bool;

    /// Regression category for the day.
    fn model_type(&self, date: NaiveDate, day_kwh: f64, day_class: DayClass) -> String;

    /// Every category [`HeatingModel::model_type`] can return, in display order.
    fn model_types(&self) -> Vec<String>;

    /// Near-zero consumption days.
    fn boiler_off(&self, _date: NaiveDate, day_kwh: f64) -> bool {
        day_kwh <= 0.0
    }

    /// Expected heat kWh for a day at `average_temperature`.
    fn predicted_kwh(&self, date: NaiveDate, average_temperature: f64, day_class: DayClass) -> f64;
}

/// Splits a day's heat consumption into useful and wasted hot water.
pub trait HotWaterModel: Send + Sync + Debug {
    /// `(useful_kwh, wasted_kwh)` for one day.
    fn daily_usage(&self, date: NaiveDate, day_kwh: f64, day_class: DayClass) -> (f64, f64);
}

/// Linear degree-day model with a heating threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdHeatingModel {
    /// Days above this heat kWh count as heating days.
    pub heating_threshold_kwh: f64,
    /// Days at or below this are boiler-off days.
    pub boiler_off_kwh: f64,
    /// Hot water and kitchen load on an occupied day.
    pub base_kwh: f64,
    pub kwh_per_degree_day: f64,
    /// Fraction of the occupied prediction used on weekends and holidays.
    pub unoccupied_factor: f64,
}

impl Default for ThresholdHeatingModel {
    fn default() -> Self {
        Self {
            heating_threshold_kwh: 200.0,
            boiler_off_kwh: 5.0,
            base_kwh: 100.0,
            kwh_per_degree_day: 40.0,
            unoccupied_factor: 0.25,
        }
    }
}

pub const MODEL_HEATING_OCCUPIED: &str = "heating_occupied";
pub const MODEL_HEATING_UNOCCUPIED: &str = "heating_unoccupied";
pub const MODEL_SUMMER_OCCUPIED: &str = "summer_occupied";
pub const MODEL_SUMMER_UNOCCUPIED: &str = "summer_unoccupied";
pub const MODEL_NONE: &str = "none";

impl HeatingModel for ThresholdHeatingModel {
    fn heating_on(&self, _date: NaiveDate, day_kwh: f64) -> bool {
        day_kwh > self.heating_threshold_kwh
    }

    fn model_type(&self, date: NaiveDate, day_kwh: f64, day_class: DayClass) -> String {
        let occupied = day_class == DayClass::SchoolDay;
        let name = if self.boiler_off(date, day_kwh) {
            MODEL_NONE
        } else {
            match (self.heating_on(date, day_kwh), occupied) {
                (true, true) => MODEL_HEATING_OCCUPIED,
                (true, false) => MODEL_HEATING_UNOCCUPIED,
                (false, true) => MODEL_SUMMER_OCCUPIED,
                (false, false) => MODEL_SUMMER_UNOCCUPIED,
            }
        };
        name.to_string()
    }

    fn model_types(&self) -> Vec<String> {
        [
            MODEL_HEATING_OCCUPIED,
            MODEL_HEATING_UNOCCUPIED,
            MODEL_SUMMER_OCCUPIED,
            MODEL_SUMMER_UNOCCUPIED,
            MODEL_NONE,
        ]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
    }

    fn boiler_off(&self, _date: NaiveDate, day_kwh: f64) -> bool {
        day_kwh <= self.boiler_off_kwh
    }

    fn predicted_kwh(&self, _date: NaiveDate, average_temperature: f64, day_class: DayClass) -> f64 {
        let degree_days = (DEGREE_DAY_BASE_TEMPERATURE - average_temperature).max(0.0);
        let occupied = self.base_kwh + self.kwh_per_degree_day * degree_days;
        match day_class {
            DayClass::SchoolDay => occupied,
            DayClass::Holiday | DayClass::Weekend => occupied * self.unoccupied_factor,
        }
    }
}

/// Constant efficiency on school days; everything used on other days is
/// wasted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedEfficiencyHotWaterModel {
    pub efficiency: f64,
}

impl Default for FixedEfficiencyHotWaterModel {
    fn default() -> Self {
        Self { efficiency: 0.5 }
    }
}

impl HotWaterModel for FixedEfficiencyHotWaterModel {
    fn daily_usage(&self, _date: NaiveDate, day_kwh: f64, day_class: DayClass) -> (f64, f64) {
        match day_class {
            DayClass::SchoolDay => {
                let useful = day_kwh * self.efficiency.clamp(0.0, 1.0);
                (useful, day_kwh - useful)
            }
            DayClass::Holiday | DayClass::Weekend => (0.0, day_kwh),
        }
    }
}

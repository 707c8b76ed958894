//! Materialized school data consumed by the aggregation engine.
//!
//! Everything here is read-only once built: meters with their half-hourly
//! readings, the school calendar, weather and the fitted models.
//!
//! # Module structure
//!
//! - [`amr`] — half-hourly readings and the [`AmrSource`] read trait
//! - [`calendar`] — holidays and opening hours
//! - [`weather`] — temperature, irradiance, grid carbon
//! - [`models`] — heating and hot-water model traits

pub mod amr;
pub mod calendar;
pub mod models;
pub mod weather;

use std::sync::Arc;

use serde::Deserialize;

pub use amr::{AmrData, AmrSource, DayReadings, HALF_HOURS, Meter, ReadingKind};
pub use calendar::SchoolCalendar;
pub use models::{FixedEfficiencyHotWaterModel, HeatingModel, HotWaterModel, ThresholdHeatingModel};
pub use weather::{DEGREE_DAY_BASE_TEMPERATURE, HalfHourlySeries, Weather};

use crate::aggregation::types::{AggregationError, AggregationResult, FuelType, MeterSelector};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, serde::Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchoolType {
    #[default]
    Primary,
    Secondary,
    Special,
}

/// Aggregate and physical meters of one school.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct MeterCollection {
    pub electricity: Option<Meter>,
    pub heat: Option<Meter>,
    pub storage_heater: Option<Meter>,
    pub solar_pv: Option<Meter>,
    pub electricity_meters: Vec<Meter>,
    pub heat_meters: Vec<Meter>,
}

/// The meters a selector resolved to.
#[derive(Clone, Debug)]
pub struct SelectedMeters {
    /// The meter non-fuel breakdowns read.
    pub primary: Meter,
    /// Aggregate meters by fuel, for fuel breakdowns.
    pub by_fuel: Vec<Meter>,
    /// Physical meters, for meter breakdowns.
    pub physical: Vec<Meter>,
}

impl MeterCollection {
    fn aggregates(&self) -> Vec<Meter> {
        [
            &self.electricity,
            &self.heat,
            &self.storage_heater,
            &self.solar_pv,
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect()
    }

    pub fn find(&self, name: &str) -> Option<&Meter> {
        fn search<'a>(meters: &'a [Meter], name: &str) -> Option<&'a Meter> {
            meters.iter().find_map(|m| {
                if m.name == name {
                    Some(m)
                } else {
                    search(&m.sub_meters, name)
                }
            })
        }
        let all: Vec<&Meter> = [
            &self.electricity,
            &self.heat,
            &self.storage_heater,
            &self.solar_pv,
        ]
        .into_iter()
        .flatten()
        .chain(self.electricity_meters.iter())
        .chain(self.heat_meters.iter())
        .collect();
        all.iter().find(|m| m.name == name).copied().or_else(|| {
            all.iter()
                .find_map(|m| search(&m.sub_meters, name))
        })
    }

    /// Resolve a chart's meter selector.
    pub fn select(&self, selector: &MeterSelector) -> AggregationResult<SelectedMeters> {
        let missing = || AggregationError::config(format!("school has no meter for {selector}"));
        let selected = match selector {
            MeterSelector::All => {
                let by_fuel = self.aggregates();
                let primary = self
                    .electricity
                    .clone()
                    .or_else(|| self.heat.clone())
                    .ok_or_else(missing)?;
                let physical = self
                    .electricity_meters
                    .iter()
                    .chain(self.heat_meters.iter())
                    .cloned()
                    .collect();
                SelectedMeters {
                    primary,
                    by_fuel,
                    physical,
                }
            }
            MeterSelector::AllElectricity => {
                let primary = self.electricity.clone().ok_or_else(missing)?;
                SelectedMeters {
                    by_fuel: vec![primary.clone()],
                    physical: self.electricity_meters.clone(),
                    primary,
                }
            }
            MeterSelector::AllHeat => {
                let primary = self.heat.clone().ok_or_else(missing)?;
                SelectedMeters {
                    by_fuel: vec![primary.clone()],
                    physical: self.heat_meters.clone(),
                    primary,
                }
            }
            MeterSelector::StorageHeater => single(self.storage_heater.clone().ok_or_else(missing)?),
            MeterSelector::SolarPv => single(self.solar_pv.clone().ok_or_else(missing)?),
            MeterSelector::Named(name) => single(self.find(name).cloned().ok_or_else(missing)?),
        };
        Ok(selected)
    }
}

fn single(meter: Meter) -> SelectedMeters {
    SelectedMeters {
        by_fuel: vec![meter.clone()],
        physical: vec![meter.clone()],
        primary: meter,
    }
}

impl SelectedMeters {
    /// Meters whose coverage bounds the chart's available data.
    pub fn bounding(&self) -> &[Meter] {
        &self.by_fuel
    }

    /// Aggregate meter for `fuel`, if selected.
    pub fn fuel(&self, fuel: FuelType) -> Option<&Meter> {
        self.by_fuel.iter().find(|m| m.fuel == fuel)
    }
}

/// A school and everything the engine reads about it.
#[derive(Clone, Debug, Deserialize)]
#[serde(from = "SchoolRecord")]
pub struct School {
    pub name: String,
    pub school_type: SchoolType,
    pub pupils: Option<f64>,
    pub floor_area: Option<f64>,
    /// Regional annual heating degree days, for benchmark adjustment.
    pub annual_degree_days: Option<f64>,
    pub calendar: SchoolCalendar,
    pub meters: MeterCollection,
    pub weather: Weather,
    pub heating_model: Option<Arc<dyn HeatingModel>>,
    pub hot_water_model: Option<Arc<dyn HotWaterModel>>,
}

#[derive(Deserialize)]
struct SchoolRecord {
    name: String,
    #[serde(default)]
    school_type: SchoolType,
    #[serde(default)]
    pupils: Option<f64>,
    #[serde(default)]
    floor_area: Option<f64>,
    #[serde(default)]
    annual_degree_days: Option<f64>,
    #[serde(default)]
    calendar: SchoolCalendar,
    #[serde(default)]
    meters: MeterCollection,
    #[serde(default)]
    weather: Weather,
    #[serde(default)]
    heating_model: Option<ThresholdHeatingModel>,
    #[serde(default)]
    hot_water_model: Option<FixedEfficiencyHotWaterModel>,
}

impl From<SchoolRecord> for School {
    fn from(r: SchoolRecord) -> Self {
        School {
            name: r.name,
            school_type: r.school_type,
            pupils: r.pupils,
            floor_area: r.floor_area,
            annual_degree_days: r.annual_degree_days,
            calendar: r.calendar,
            meters: r.meters,
            weather: r.weather,
            heating_model: r
                .heating_model
                .map(|m| Arc::new(m) as Arc<dyn HeatingModel>),
            hot_water_model: r
                .hot_water_model
                .map(|m| Arc::new(m) as Arc<dyn HotWaterModel>),
        }
    }
}

impl School {
    /// A school with no meters or data.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            school_type: SchoolType::default(),
            pupils: None,
            floor_area: None,
            annual_degree_days: None,
            calendar: SchoolCalendar::default(),
            meters: MeterCollection::default(),
            weather: Weather::default(),
            heating_model: None,
            hot_water_model: None,
        }
    }

    pub fn heating_model(&self) -> AggregationResult<&dyn HeatingModel> {
        self.heating_model
            .as_deref()
            .ok_or_else(|| AggregationError::config(format!("{} has no heating model", self.name)))
    }

    pub fn hot_water_model(&self) -> AggregationResult<&dyn HotWaterModel> {
        self.hot_water_model.as_deref().ok_or_else(|| {
            AggregationError::config(format!("{} has no hot water model", self.name))
        })
    }
}

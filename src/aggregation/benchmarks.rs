//! Benchmark comparison figures.
//!
//! Annual reference usage for a school of the same size: electricity scales
//! with pupils, gas with floor area adjusted for the regional climate.

use serde::{Deserialize, Serialize};

use super::types::{AggregationError, AggregationResult, FuelType, Unit};
use super::units::UnitConverter;
use crate::school::{School, SchoolType};

pub const EXEMPLAR_LABEL: &str = "Exemplar School";
pub const REGIONAL_LABEL: &str = "Regional Average";
pub const NATIONAL_LABEL: &str = "National Average";

/// Reference constants, annual figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConstants {
    pub electricity_kwh_per_pupil: f64,
    pub exemplar_electricity_kwh_per_pupil: f64,
    pub secondary_electricity_multiplier: f64,
    pub gas_kwh_per_m2: f64,
    pub exemplar_gas_kwh_per_m2: f64,
    pub average_annual_degree_days: f64,
    /// Share of gas use that tracks degree days.
    pub gas_heating_share: f64,
}

impl Default for BenchmarkConstants {
    fn default() -> Self {
        Self {
            electricity_kwh_per_pupil: 250.0,
            exemplar_electricity_kwh_per_pupil: 175.0,
            secondary_electricity_multiplier: 1.3,
            gas_kwh_per_m2: 0.9 * 115_000.0 / 1200.0,
            exemplar_gas_kwh_per_m2: 80.0,
            average_annual_degree_days: 2000.0,
            gas_heating_share: 0.6,
        }
    }
}

impl BenchmarkConstants {
    pub fn validate(&self) -> Result<(), String> {
        if self.average_annual_degree_days <= 0.0 {
            return Err("average_annual_degree_days must be positive".into());
        }
        if !(0.0..=1.0).contains(&self.gas_heating_share) {
            return Err("gas_heating_share must be between 0 and 1".into());
        }
        Ok(())
    }

    /// Climate adjustment divisor for gas: moves `national / regional`
    /// degree days towards 1 by the heating share.
    pub fn degree_day_adjustment(&self, regional_degree_days: Option<f64>) -> f64 {
        match regional_degree_days {
            Some(regional) if regional > 0.0 => {
                let ratio = self.average_annual_degree_days / regional;
                (ratio - 1.0) * self.gas_heating_share + 1.0
            }
            _ => 1.0,
        }
    }
}

/// `[exemplar, regional, national]` for one fuel, in the chart unit.
pub type BenchmarkRow = [f64; 3];

/// Injected comparison values for one school.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BenchmarkValues {
    pub electricity: Option<BenchmarkRow>,
    pub gas: Option<BenchmarkRow>,
}

pub fn labels() -> [&'static str; 3] {
    [EXEMPLAR_LABEL, REGIONAL_LABEL, NATIONAL_LABEL]
}

impl BenchmarkValues {
    /// Compute annual benchmarks for `school` in `unit`, multiplied by the
    /// chart's normalization factor.
    pub fn for_school(
        school: &School,
        constants: &BenchmarkConstants,
        converter: &UnitConverter,
        unit: Unit,
        scale: f64,
    ) -> AggregationResult<Self> {
        let pupils = school.pupils.filter(|p| *p > 0.0).ok_or_else(|| {
            AggregationError::config(format!("benchmarks need a pupil count for {}", school.name))
        })?;
        let floor_area = school.floor_area.filter(|a| *a > 0.0).ok_or_else(|| {
            AggregationError::config(format!("benchmarks need a floor area for {}", school.name))
        })?;

        let multiplier = match school.school_type {
            SchoolType::Secondary => constants.secondary_electricity_multiplier,
            SchoolType::Primary | SchoolType::Special => 1.0,
        };
        let national = constants.electricity_kwh_per_pupil * pupils * multiplier;
        let exemplar = constants.exemplar_electricity_kwh_per_pupil * pupils * multiplier;
        let electricity = [exemplar, national, national];

        let adjustment = constants.degree_day_adjustment(school.annual_degree_days);
        let national_gas = constants.gas_kwh_per_m2 * floor_area;
        let gas = [
            constants.exemplar_gas_kwh_per_m2 * floor_area / adjustment,
            national_gas / adjustment,
            national_gas,
        ];

        let to_unit = |row: BenchmarkRow, fuel| -> AggregationResult<BenchmarkRow> {
            let rate = converter.rate(unit, Some(fuel))?;
            // kW keeps kWh here; the rescaling stage divides by the bucket hours.
            let rate = if unit == Unit::Kw { 1.0 } else { rate };
            Ok(row.map(|v| v * rate * scale))
        };
        Ok(Self {
            electricity: Some(to_unit(electricity, FuelType::Electricity)?),
            gas: Some(to_unit(gas, FuelType::Gas)?),
        })
    }

    /// Row for a fuel series; storage heaters compare against gas.
    pub fn row_for(&self, fuel: FuelType) -> Option<BenchmarkRow> {
        match fuel {
            FuelType::Electricity => self.electricity,
            FuelType::Gas | FuelType::StorageHeater => self.gas,
            FuelType::SolarPv | FuelType::Oil => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn school() -> School {
        let mut s = School::empty("Benchmark Primary");
        s.pupils = Some(200.0);
        s.floor_area = Some(1000.0);
        s
    }

    #[test]
    fn primary_school_electricity_and_gas() {
        let values = BenchmarkValues::for_school(
            &school(),
            &BenchmarkConstants::default(),
            &UnitConverter::default(),
            Unit::Kwh,
            1.0,
        )
        .unwrap();
        assert_eq!(values.electricity, Some([35_000.0, 50_000.0, 50_000.0]));
        let gas = values.gas.unwrap();
        assert_eq!(gas[0], 80_000.0);
        assert!((gas[2] - 86_250.0).abs() < 1e-9);
        assert_eq!(gas[1], gas[2]);
    }

    #[test]
    fn colder_regions_get_a_higher_gas_benchmark() {
        let mut s = school();
        s.annual_degree_days = Some(2500.0);
        let values = BenchmarkValues::for_school(
            &s,
            &BenchmarkConstants::default(),
            &UnitConverter::default(),
            Unit::Kwh,
            1.0,
        )
        .unwrap();
        let gas = values.gas.unwrap();
        // adjustment = (0.8 - 1) * 0.6 + 1 = 0.88
        assert!((gas[1] - 86_250.0 / 0.88).abs() < 1e-6);
        assert!(gas[1] > gas[2]);
    }

    #[test]
    fn secondary_schools_and_pounds() {
        let mut s = school();
        s.school_type = SchoolType::Secondary;
        let values = BenchmarkValues::for_school(
            &s,
            &BenchmarkConstants::default(),
            &UnitConverter::default(),
            Unit::Pounds,
            1.0,
        )
        .unwrap();
        let elec = values.electricity.unwrap();
        assert!((elec[2] - 50_000.0 * 1.3 * 0.15).abs() < 1e-6);
    }

    #[test]
    fn missing_pupils_is_a_configuration_error() {
        let mut s = school();
        s.pupils = None;
        let err = BenchmarkValues::for_school(
            &s,
            &BenchmarkConstants::default(),
            &UnitConverter::default(),
            Unit::Kwh,
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, AggregationError::Configuration(_)));
    }
}

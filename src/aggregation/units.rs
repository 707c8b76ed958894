//! Unit conversion and y-axis normalization.
//!
//! Every energy figure is accumulated in kWh and converted with a per-fuel
//! multiplier. Normalization scales a whole period by pupil count or floor
//! area and never divides by zero.

use serde::{Deserialize, Serialize};

use super::types::{AggregationError, AggregationResult, FuelType, Normalization, Unit};
use crate::school::School;

/// Tariff and emission factors, per kWh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionRates {
    pub electricity_pounds: f64,
    pub gas_pounds: f64,
    pub oil_pounds: f64,
    pub electricity_co2: f64,
    pub gas_co2: f64,
    pub oil_co2: f64,
    pub solar_pv_co2: f64,
    pub pounds_per_library_book: f64,
}

impl Default for ConversionRates {
    fn default() -> Self {
        Self {
            electricity_pounds: 0.15,
            gas_pounds: 0.03,
            oil_pounds: 0.05,
            electricity_co2: 0.283,
            gas_co2: 0.204,
            oil_co2: 0.285,
            solar_pv_co2: 0.040,
            pounds_per_library_book: 5.0,
        }
    }
}

impl ConversionRates {
    /// Every factor must be finite and the library-book divisor non-zero.
    pub fn validate(&self) -> Result<(), String> {
        let all = [
            ("electricity_pounds", self.electricity_pounds),
            ("gas_pounds", self.gas_pounds),
            ("oil_pounds", self.oil_pounds),
            ("electricity_co2", self.electricity_co2),
            ("gas_co2", self.gas_co2),
            ("oil_co2", self.oil_co2),
            ("solar_pv_co2", self.solar_pv_co2),
            ("pounds_per_library_book", self.pounds_per_library_book),
        ];
        if let Some((name, _)) = all.iter().find(|(_, v)| !v.is_finite()) {
            return Err(format!("conversion rate {name} is not finite"));
        }
        if self.pounds_per_library_book <= 0.0 {
            return Err("pounds_per_library_book must be positive".into());
        }
        Ok(())
    }
}

/// kWh to chart-unit converter.
#[derive(Clone, Debug, Default)]
pub struct UnitConverter {
    rates: ConversionRates,
}

impl UnitConverter {
    pub fn new(rates: ConversionRates) -> Self {
        Self { rates }
    }

    pub fn rates(&self) -> &ConversionRates {
        &self.rates
    }

    /// Multiplier from 1 kWh to `unit` for `fuel`.
    ///
    /// kW reads a half-hour's kWh as an implied average power, hence 2.0.
    /// Solar generation is an avoided cost and prices negative.
    pub fn rate(&self, unit: Unit, fuel: Option<FuelType>) -> AggregationResult<f64> {
        match unit {
            Unit::Kwh => Ok(1.0),
            Unit::Kw => Ok(2.0),
            Unit::Co2 => Ok(self.co2_rate(require_fuel(unit, fuel)?)),
            Unit::Pounds | Unit::AccountingCost => {
                Ok(self.pounds_rate(require_fuel(unit, fuel)?))
            }
            Unit::LibraryBooks => Ok(self.pounds_rate(require_fuel(unit, fuel)?)
                / self.rates.pounds_per_library_book),
        }
    }

    /// Multiplier applied to summed kWh while accumulating.
    ///
    /// kW charts accumulate kWh and are rescaled once buckets are complete.
    /// Accounting cost is read from tariff data directly, so it is never a
    /// multiple of kWh.
    pub fn accumulation_rate(&self, unit: Unit, fuel: Option<FuelType>) -> AggregationResult<f64> {
        match unit {
            Unit::Kw | Unit::AccountingCost => Ok(1.0),
            other => self.rate(other, fuel),
        }
    }

    /// Value-preserving conversion between units for one fuel.
    pub fn convert(
        &self,
        value: f64,
        from: Unit,
        to: Unit,
        fuel: Option<FuelType>,
    ) -> AggregationResult<f64> {
        if from == to {
            return Ok(value);
        }
        let from_rate = self.rate(from, fuel)?;
        let to_rate = self.rate(to, fuel)?;
        if from_rate == 0.0 {
            return Err(AggregationError::config(format!(
                "cannot convert from {from}: zero rate"
            )));
        }
        Ok(value * to_rate / from_rate)
    }

    /// Normalization multiplier for `school`.
    pub fn scale(&self, kind: Normalization, school: &School) -> AggregationResult<f64> {
        let per_pupil = || -> AggregationResult<f64> {
            match school.pupils {
                Some(p) if p > 0.0 && p.is_finite() => Ok(1.0 / p),
                other => Err(AggregationError::config(format!(
                    "per-pupil scaling needs a positive pupil count for {}, got {other:?}",
                    school.name
                ))),
            }
        };
        match kind {
            Normalization::None => Ok(1.0),
            Normalization::PerPupil => per_pupil(),
            Normalization::Per200Pupils => Ok(200.0 * per_pupil()?),
            Normalization::Per1000Pupils => Ok(1000.0 * per_pupil()?),
            Normalization::PerFloorArea => match school.floor_area {
                Some(a) if a > 0.0 && a.is_finite() => Ok(1.0 / a),
                other => Err(AggregationError::config(format!(
                    "per-floor-area scaling needs a positive floor area for {}, got {other:?}",
                    school.name
                ))),
            },
        }
    }

    fn pounds_rate(&self, fuel: FuelType) -> f64 {
        match fuel {
            FuelType::Electricity | FuelType::StorageHeater => self.rates.electricity_pounds,
            FuelType::Gas => self.rates.gas_pounds,
            FuelType::Oil => self.rates.oil_pounds,
            FuelType::SolarPv => -self.rates.electricity_pounds,
        }
    }

    fn co2_rate(&self, fuel: FuelType) -> f64 {
        match fuel {
            FuelType::Electricity | FuelType::StorageHeater => self.rates.electricity_co2,
            FuelType::Gas => self.rates.gas_co2,
            FuelType::Oil => self.rates.oil_co2,
            FuelType::SolarPv => self.rates.solar_pv_co2,
        }
    }
}

fn require_fuel(unit: Unit, fuel: Option<FuelType>) -> AggregationResult<FuelType> {
    fuel.ok_or_else(|| {
        AggregationError::spec(format!("unit {unit} requires a fuel type, none supplied"))
    })
}

// ---------------------------------------------------------------------------
// Labels
// ---------------------------------------------------------------------------

pub fn unit_description(unit: Unit) -> &'static str {
    match unit {
        Unit::Kwh => "kWh",
        Unit::Kw => "kW",
        Unit::Co2 => "CO2 (kg)",
        Unit::Pounds | Unit::AccountingCost => "£",
        Unit::LibraryBooks => "library books",
    }
}

pub fn normalization_description(kind: Normalization) -> Option<&'static str> {
    match kind {
        Normalization::None => None,
        Normalization::PerPupil => Some("per pupil"),
        Normalization::PerFloorArea => Some("per floor area (m2)"),
        Normalization::Per200Pupils => Some("per 200 pupil (average size primary school)"),
        Normalization::Per1000Pupils => Some("per 1000 pupil (average size secondary school)"),
    }
}

/// Axis label such as `"kWh"` or `"£/per pupil"`.
pub fn y_axis_label(unit: Unit, normalization: Normalization) -> String {
    match normalization_description(normalization) {
        Some(scaling) => format!("{}/{scaling}", unit_description(unit)),
        None => unit_description(unit).to_string(),
    }
}

/// Human-readable magnitude with thousands separators.
pub fn format_value(value: f64) -> String {
    if !value.is_finite() {
        return "NaN".to_string();
    }
    let magnitude = value.abs();
    if magnitude < 10.0 {
        return format!("{value:.2}");
    }
    if magnitude < 100.0 {
        return format!("{value:.1}");
    }
    let rounded = value.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    if rounded < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Title text for a total in `unit`, e.g. `"1,234 kWh"` or `"£5,678"`.
pub fn format_total(total: f64, unit: Unit) -> String {
    if !total.is_finite() {
        return "NaN total".to_string();
    }
    match unit {
        Unit::Pounds | Unit::AccountingCost => format!("£{}", format_value(total)),
        other => format!("{} {}", format_value(total), unit_description(other)),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

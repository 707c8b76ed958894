//! Per-slice series breakdown.
//!
//! [`SeriesBreakdownResolver`] answers one question: for this half-hour or
//! date range, how much goes into each series? Breakdown dimensions come in
//! three kinds (see [`BreakdownKind`]):
//!
//! - a *splitter* picks the meters (or tariff components) summed,
//! - *classifiers* put each day or half-hour into a category,
//! - *derived* dimensions compute their own series from meters or models.
//!
//! Splitter and classifier parts cross-product into one [`SeriesKey`] per
//! combination. Slices that need no classification go through one batched
//! range query per meter.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::debug;

use super::types::{
    AggregationError, AggregationResult, Breakdown, BreakdownKind, ChartFilter, ChartRequest,
    Combine, DateSpan, DayClass, DayType, FuelType, Granularity, HeatingDayType, HotWaterUse,
    SecondaryAxis, SeriesKey, SeriesPart, Unit,
};
use super::units::UnitConverter;
use crate::school::{HALF_HOURS, Meter, ReadingKind, School, SelectedMeters};

/// One unit of accumulation work.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeSlice {
    HalfHour(NaiveDate, usize),
    DateRange(DateSpan),
}

/// A value destined for one series.
#[derive(Clone, Debug, PartialEq)]
pub struct Contribution {
    pub key: SeriesKey,
    pub value: f64,
    pub combine: Combine,
}

/// Merges values for the same key within one slice.
#[derive(Default)]
struct Contributions {
    entries: BTreeMap<SeriesKey, (f64, u32, Combine)>,
}

impl Contributions {
    fn push(&mut self, key: SeriesKey, value: f64, combine: Combine) {
        let entry = self.entries.entry(key).or_insert((
            match combine {
                Combine::Max => f64::NEG_INFINITY,
                Combine::Sum | Combine::Mean => 0.0,
            },
            0,
            combine,
        ));
        match combine {
            Combine::Sum | Combine::Mean => entry.0 += value,
            Combine::Max => entry.0 = entry.0.max(value),
        }
        entry.1 += 1;
    }

    fn finish(self) -> Vec<Contribution> {
        self.entries
            .into_iter()
            .map(|(key, (value, n, combine))| Contribution {
                key,
                value: match combine {
                    Combine::Mean if n > 0 => value / n as f64,
                    _ => value,
                },
                combine,
            })
            .collect()
    }
}

/// A meter feeding the sums, with the series part it contributes.
#[derive(Clone, Debug)]
struct Source {
    part: Option<SeriesPart>,
    meter: Meter,
    /// Outside its own coverage the meter contributes nothing instead of
    /// failing.
    zero_fill: bool,
}

/// Resolves slice contributions for one chart request.
#[derive(Debug)]
pub struct SeriesBreakdownResolver<'a> {
    school: &'a School,
    converter: &'a UnitConverter,
    filter: &'a ChartFilter,
    unit: Unit,
    dims: Vec<Breakdown>,
    splitter: Option<Breakdown>,
    classifiers: Vec<Breakdown>,
    derived: Vec<Breakdown>,
    secondary: Option<SecondaryAxis>,
    meters: SelectedMeters,
    sources: Vec<Source>,
}

impl<'a> SeriesBreakdownResolver<'a> {
    /// Validate the request's breakdown and resolve its meters. Every
    /// inconsistency is a configuration error raised here, before any data
    /// is read.
    pub fn new(
        school: &'a School,
        request: &'a ChartRequest,
        converter: &'a UnitConverter,
    ) -> AggregationResult<Self> {
        let dims = request.series_breakdown.clone();
        if dims.is_empty() {
            return Err(AggregationError::config("series breakdown is empty"));
        }
        if let Some(dup) = dims.iter().duplicates().next() {
            return Err(AggregationError::config(format!(
                "breakdown '{dup}' requested twice"
            )));
        }

        let of_kind = |kind: BreakdownKind| -> Vec<Breakdown> {
            dims.iter().copied().filter(|d| d.kind() == kind).collect()
        };
        let splitters = of_kind(BreakdownKind::Splitter);
        let classifiers = of_kind(BreakdownKind::Classifier);
        let derived = of_kind(BreakdownKind::Derived);

        if splitters.len() > 1 {
            return Err(AggregationError::config(format!(
                "breakdowns {} cannot be combined",
                splitters.iter().join(" and ")
            )));
        }
        if !derived.is_empty() && (!splitters.is_empty() || !classifiers.is_empty()) {
            return Err(AggregationError::config(format!(
                "derived breakdowns ({}) cannot be combined with {}",
                derived.iter().join(", "),
                splitters.iter().chain(classifiers.iter()).join(", ")
            )));
        }
        let splitter = splitters.first().copied();
        if splitter == Some(Breakdown::AccountingCost)
            && !matches!(request.yaxis_units, Unit::AccountingCost | Unit::Pounds)
        {
            return Err(AggregationError::config(format!(
                "accounting cost breakdown needs a £ unit, got {}",
                request.yaxis_units
            )));
        }

        let meters = school.meters.select(&request.meter_definition)?;
        let sources = match splitter {
            Some(Breakdown::Fuel) => meters
                .by_fuel
                .iter()
                .map(|m| Source {
                    part: Some(SeriesPart::Fuel(m.fuel)),
                    meter: m.clone(),
                    zero_fill: false,
                })
                .collect(),
            Some(Breakdown::Meter) => zero_filled(&meters.physical, SeriesPart::Meter),
            Some(Breakdown::Submeter) => zero_filled(&meters.primary.sub_meters, SeriesPart::Submeter),
            _ => vec![Source {
                part: None,
                meter: meters.primary.clone(),
                zero_fill: false,
            }],
        };
        if sources.is_empty() {
            return Err(AggregationError::config(format!(
                "{} breakdown found no meters for {}",
                splitter.map_or_else(|| "series".to_string(), |s| s.to_string()),
                request.meter_definition
            )));
        }

        debug!(
            breakdown = %dims.iter().join(","),
            sources = sources.len(),
            primary = %meters.primary.name,
            "resolved series breakdown"
        );

        Ok(Self {
            school,
            converter,
            filter: &request.filter,
            unit: request.yaxis_units,
            dims,
            splitter,
            classifiers,
            derived,
            secondary: request.y2_axis,
            meters,
            sources,
        })
    }

    /// Reject breakdowns that need whole days on a sub-daily x-axis.
    pub fn check_granularity(&self, granularity: Granularity) -> AggregationResult<()> {
        if !granularity.is_sub_daily() {
            return Ok(());
        }
        match self
            .derived
            .iter()
            .find(|d| !matches!(d, Breakdown::None | Breakdown::PeakKw))
        {
            Some(dim) => Err(AggregationError::config(format!(
                "breakdown '{dim}' needs a daily or coarser x-axis, got {granularity}"
            ))),
            None => Ok(()),
        }
    }

    /// Every series this request can produce, in display order, followed by
    /// the secondary-axis series.
    pub fn series_keys(&self) -> AggregationResult<Vec<(SeriesKey, Combine)>> {
        let mut keys = Vec::new();
        if self.derived.is_empty() {
            let per_dim = self
                .dims
                .iter()
                .map(|dim| self.parts_for(*dim))
                .collect::<AggregationResult<Vec<_>>>()?;
            keys.extend(
                per_dim
                    .into_iter()
                    .multi_cartesian_product()
                    .map(|parts| (SeriesKey::new(parts), Combine::Sum)),
            );
        } else {
            for dim in &self.derived {
                match dim {
                    Breakdown::HotWater => {
                        for usage in [HotWaterUse::Useful, HotWaterUse::Wasted] {
                            keys.push((SeriesKey::single(SeriesPart::HotWater(usage)), Combine::Sum));
                        }
                    }
                    Breakdown::PeakKw => keys.push((SeriesKey::single(SeriesPart::PeakKw), Combine::Max)),
                    other => keys.push((SeriesKey::single(derived_part(*other)), Combine::Sum)),
                }
            }
        }
        if let Some(axis) = self.secondary {
            keys.push((SeriesKey::secondary(axis), Combine::Mean));
        }
        Ok(keys)
    }

    fn parts_for(&self, dim: Breakdown) -> AggregationResult<Vec<SeriesPart>> {
        let parts = match dim {
            Breakdown::Fuel | Breakdown::Meter | Breakdown::Submeter => {
                self.sources.iter().filter_map(|s| s.part.clone()).collect()
            }
            Breakdown::AccountingCost => self
                .meters
                .primary
                .amr
                .bill_component_names()
                .into_iter()
                .map(SeriesPart::BillComponent)
                .collect(),
            Breakdown::DayType => DayType::ALL.into_iter().map(SeriesPart::DayType).collect(),
            Breakdown::Heating => vec![SeriesPart::Heating(true), SeriesPart::Heating(false)],
            Breakdown::HeatingDayType => HeatingDayType::all()
                .into_iter()
                .map(SeriesPart::HeatingDayType)
                .collect(),
            Breakdown::ModelType => self
                .school
                .heating_model()?
                .model_types()
                .into_iter()
                .map(SeriesPart::ModelType)
                .collect(),
            derived => vec![derived_part(derived)],
        };
        Ok(parts)
    }

    /// Date range for which every input this request reads has data.
    pub fn available_span(&self) -> AggregationResult<DateSpan> {
        let mut spans = Vec::new();
        for meter in self.meters.bounding() {
            spans.push((format!("meter '{}'", meter.name), meter.span()));
        }
        let weather = &self.school.weather;
        let needs_temperature = matches!(
            self.secondary,
            Some(SecondaryAxis::DegreeDays | SecondaryAxis::Temperature)
        ) || self
            .derived
            .iter()
            .any(|d| matches!(d, Breakdown::Cusum | Breakdown::PredictedHeat));
        if needs_temperature {
            spans.push(("temperature".to_string(), weather.temperatures.span()));
        }
        match self.secondary {
            Some(SecondaryAxis::Irradiance) => {
                spans.push(("solar irradiance".to_string(), weather.irradiance.span()));
            }
            Some(SecondaryAxis::GridCarbon) => {
                spans.push(("grid carbon intensity".to_string(), weather.grid_carbon.span()));
            }
            _ => {}
        }

        let mut available: Option<DateSpan> = None;
        for (name, span) in spans {
            let span = span.ok_or_else(|| AggregationError::InsufficientData {
                source_name: name.clone(),
                requested: "any data".into(),
                available: "nothing".into(),
            })?;
            available = match available {
                None => Some(span),
                Some(current) => Some(current.intersect(&span).ok_or_else(|| {
                    AggregationError::InsufficientData {
                        source_name: name.clone(),
                        requested: current.to_string(),
                        available: span.to_string(),
                    }
                })?),
            };
        }
        available.ok_or_else(|| AggregationError::config("chart reads no data sources"))
    }

    /// True when range slices have to be walked day by day.
    pub fn needs_day_iteration(&self) -> bool {
        !self.classifiers.is_empty()
            || self.filter.has_day_filters()
            || self.derived.iter().any(|d| *d != Breakdown::None)
    }

    pub fn filters_days(&self) -> bool {
        self.filter.has_day_filters()
    }

    /// Whether the chart's day pre-filters keep `date`.
    pub fn includes_day(&self, date: NaiveDate) -> AggregationResult<bool> {
        if !self.filter.has_day_filters() {
            return Ok(true);
        }
        self.day_passes(date, self.school.calendar.day_class(date))
    }

    /// Contributions of one slice, merged per series.
    pub fn contributions(&self, slice: TimeSlice) -> AggregationResult<Vec<Contribution>> {
        let mut out = Contributions::default();
        match slice {
            TimeSlice::HalfHour(date, hh) => self.half_hour(date, hh, &mut out)?,
            TimeSlice::DateRange(span) if self.needs_day_iteration() => {
                self.day_by_day(span, &mut out)?
            }
            TimeSlice::DateRange(span) => self.range(span, &mut out)?,
        }
        if let Some(axis) = self.secondary {
            self.secondary_contribution(axis, slice, &mut out)?;
        }
        Ok(out.finish())
    }

    // -----------------------------------------------------------------------
    // Slice paths
    // -----------------------------------------------------------------------

    /// One batched query per source.
    fn range(&self, span: DateSpan, out: &mut Contributions) -> AggregationResult<()> {
        if self.splitter == Some(Breakdown::AccountingCost) {
            let primary = &self.meters.primary;
            primary.check_coverage(&span)?;
            for (name, value) in primary.amr.bill_components_range(span.start, span.end)? {
                out.push(
                    SeriesKey::single(SeriesPart::BillComponent(name)),
                    value,
                    Combine::Sum,
                );
            }
            return Ok(());
        }
        for source in &self.sources {
            let Some(covered) = self.covered(source, &span)? else {
                continue;
            };
            let (kind, rate) = self.reading(source.meter.fuel)?;
            let value = source.meter.amr.date_range(covered.start, covered.end, kind)? * rate;
            out.push(self.key(source.part.as_ref(), &[]), value, Combine::Sum);
        }
        Ok(())
    }

    fn day_by_day(&self, span: DateSpan, out: &mut Contributions) -> AggregationResult<()> {
        for source in self.sources.iter().filter(|s| !s.zero_fill) {
            source.meter.check_coverage(&span)?;
        }
        if self.needs_heat_meter() {
            self.heat_meter().check_coverage(&span)?;
        }
        for date in span.iter_days() {
            let class = self.school.calendar.day_class(date);
            if !self.day_passes(date, class)? {
                continue;
            }
            if self.derived.is_empty() {
                self.classified_day(date, class, out)?;
            } else {
                self.derived_day(date, class, out)?;
            }
        }
        Ok(())
    }

    fn classified_day(&self, date: NaiveDate, class: DayClass, out: &mut Contributions) -> AggregationResult<()> {
        let day_parts = self.day_level_parts(date, class)?;
        let split_by_hour = self.classifiers.contains(&Breakdown::DayType);

        if self.splitter == Some(Breakdown::AccountingCost) {
            let amr = &self.meters.primary.amr;
            if split_by_hour {
                for hh in 0..HALF_HOURS {
                    let day_type = self.school.calendar.day_type(date, hh);
                    for (name, value) in amr.bill_components(date, Some(hh))? {
                        let parts = self.classes(&day_parts, Some(day_type));
                        out.push(self.key(Some(&SeriesPart::BillComponent(name)), &parts), value, Combine::Sum);
                    }
                }
            } else {
                for (name, value) in amr.bill_components(date, None)? {
                    out.push(
                        self.key(Some(&SeriesPart::BillComponent(name)), &day_parts),
                        value,
                        Combine::Sum,
                    );
                }
            }
            return Ok(());
        }

        for source in &self.sources {
            if source.zero_fill && !source.meter.span().is_some_and(|s| s.contains(date)) {
                continue;
            }
            let (kind, rate) = self.reading(source.meter.fuel)?;
            if split_by_hour {
                let readings = source.meter.amr.days_x48(date, kind)?;
                let mut by_type: BTreeMap<DayType, f64> = BTreeMap::new();
                for (hh, value) in readings.iter().enumerate() {
                    *by_type
                        .entry(self.school.calendar.day_type(date, hh))
                        .or_insert(0.0) += value;
                }
                for (day_type, value) in by_type {
                    let parts = self.classes(&day_parts, Some(day_type));
                    out.push(self.key(source.part.as_ref(), &parts), value * rate, Combine::Sum);
                }
            } else {
                let value = source.meter.amr.one_day(date, kind)? * rate;
                out.push(self.key(source.part.as_ref(), &day_parts), value, Combine::Sum);
            }
        }
        Ok(())
    }

    fn derived_day(&self, date: NaiveDate, class: DayClass, out: &mut Contributions) -> AggregationResult<()> {
        let primary = &self.meters.primary;
        for dim in &self.derived {
            match dim {
                Breakdown::None => {
                    let (kind, rate) = self.reading(primary.fuel)?;
                    let value = primary.amr.one_day(date, kind)? * rate;
                    out.push(SeriesKey::single(SeriesPart::Energy), value, Combine::Sum);
                }
                Breakdown::Baseload => {
                    primary.check_coverage(&DateSpan::single(date))?;
                    let kwh = primary.amr.baseload_kw(date)? * 24.0;
                    let rate = self.model_rate(primary.fuel)?;
                    out.push(SeriesKey::single(SeriesPart::Baseload), kwh * rate, Combine::Sum);
                }
                Breakdown::PeakKw => {
                    primary.check_coverage(&DateSpan::single(date))?;
                    out.push(
                        SeriesKey::single(SeriesPart::PeakKw),
                        primary.amr.peak_kw(date)?,
                        Combine::Max,
                    );
                }
                Breakdown::PredictedHeat => {
                    let predicted = self.predicted_kwh(date, class)?;
                    let rate = self.model_rate(self.heat_meter().fuel)?;
                    out.push(SeriesKey::single(SeriesPart::PredictedHeat), predicted * rate, Combine::Sum);
                }
                Breakdown::Cusum => {
                    let predicted = self.predicted_kwh(date, class)?;
                    let actual = self.heat_day_kwh(date)?;
                    let rate = self.model_rate(self.heat_meter().fuel)?;
                    out.push(
                        SeriesKey::single(SeriesPart::Cusum),
                        (predicted - actual) * rate,
                        Combine::Sum,
                    );
                }
                Breakdown::HotWater => {
                    let day_kwh = self.heat_day_kwh(date)?;
                    let (useful, wasted) = self
                        .school
                        .hot_water_model()?
                        .daily_usage(date, day_kwh, class);
                    let rate = self.model_rate(self.heat_meter().fuel)?;
                    out.push(SeriesKey::single(SeriesPart::HotWater(HotWaterUse::Useful)), useful * rate, Combine::Sum);
                    out.push(SeriesKey::single(SeriesPart::HotWater(HotWaterUse::Wasted)), wasted * rate, Combine::Sum);
                }
                other => {
                    return Err(AggregationError::config(format!(
                        "'{other}' is not a derived breakdown"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Half-hour slices validate coverage on every call.
    fn half_hour(&self, date: NaiveDate, hh: usize, out: &mut Contributions) -> AggregationResult<()> {
        let class = self.school.calendar.day_class(date);
        if !self.day_passes(date, class)? {
            return Ok(());
        }
        let day = DateSpan::single(date);
        let primary = &self.meters.primary;

        if !self.derived.is_empty() {
            for dim in &self.derived {
                primary.check_coverage(&day)?;
                match dim {
                    Breakdown::None => {
                        let (kind, rate) = self.reading(primary.fuel)?;
                        let value = primary.amr.half_hour(date, hh, kind)? * rate;
                        out.push(SeriesKey::single(SeriesPart::Energy), value, Combine::Sum);
                    }
                    Breakdown::PeakKw => {
                        let kwh = primary.amr.half_hour(date, hh, ReadingKind::Kwh)?;
                        out.push(SeriesKey::single(SeriesPart::PeakKw), 2.0 * kwh, Combine::Max);
                    }
                    other => {
                        return Err(AggregationError::config(format!(
                            "breakdown '{other}' needs a daily or coarser x-axis"
                        )));
                    }
                }
            }
            return Ok(());
        }

        let day_parts = self.day_level_parts(date, class)?;
        let day_type = self
            .classifiers
            .contains(&Breakdown::DayType)
            .then(|| self.school.calendar.day_type(date, hh));
        let parts = self.classes(&day_parts, day_type);

        if self.splitter == Some(Breakdown::AccountingCost) {
            primary.check_coverage(&day)?;
            for (name, value) in primary.amr.bill_components(date, Some(hh))? {
                out.push(self.key(Some(&SeriesPart::BillComponent(name)), &parts), value, Combine::Sum);
            }
            return Ok(());
        }
        for source in &self.sources {
            if source.zero_fill && !source.meter.covers(&day) {
                continue;
            }
            source.meter.check_coverage(&day)?;
            let (kind, rate) = self.reading(source.meter.fuel)?;
            let value = source.meter.amr.half_hour(date, hh, kind)? * rate;
            out.push(self.key(source.part.as_ref(), &parts), value, Combine::Sum);
        }
        Ok(())
    }

    fn secondary_contribution(
        &self,
        axis: SecondaryAxis,
        slice: TimeSlice,
        out: &mut Contributions,
    ) -> AggregationResult<()> {
        let weather = &self.school.weather;
        let key = SeriesKey::secondary(axis);
        match slice {
            TimeSlice::HalfHour(date, hh) => {
                if !self.includes_day(date)? {
                    return Ok(());
                }
                let value = match axis {
                    SecondaryAxis::DegreeDays => weather.half_hour_degree_days(date, hh)?,
                    SecondaryAxis::Temperature => weather.temperature(date, hh)?,
                    SecondaryAxis::Irradiance => weather.irradiance(date, hh)?,
                    SecondaryAxis::GridCarbon => weather.grid_carbon(date, hh)?,
                    SecondaryAxis::GasCarbon => self.converter.rate(Unit::Co2, Some(FuelType::Gas))?,
                };
                out.push(key, value, Combine::Mean);
            }
            TimeSlice::DateRange(span) => {
                for date in span.iter_days() {
                    if !self.includes_day(date)? {
                        continue;
                    }
                    let value = match axis {
                        SecondaryAxis::DegreeDays => weather.degree_days(date)?,
                        SecondaryAxis::Temperature => weather.average_temperature(date)?,
                        SecondaryAxis::Irradiance => weather.average_irradiance(date)?,
                        SecondaryAxis::GridCarbon => weather.average_grid_carbon(date)?,
                        SecondaryAxis::GasCarbon => {
                            self.converter.rate(Unit::Co2, Some(FuelType::Gas))?
                        }
                    };
                    out.push(key.clone(), value, Combine::Mean);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// How to read a meter of `fuel` and what to multiply the sum by.
    fn reading(&self, fuel: FuelType) -> AggregationResult<(ReadingKind, f64)> {
        let kind = match self.unit {
            Unit::AccountingCost => ReadingKind::AccountingCost,
            _ => ReadingKind::Kwh,
        };
        Ok((kind, self.converter.accumulation_rate(self.unit, Some(fuel))?))
    }

    /// Rate for model-derived kWh; these have no tariff data, so accounting
    /// cost falls back to the economic rate.
    fn model_rate(&self, fuel: FuelType) -> AggregationResult<f64> {
        match self.unit {
            Unit::AccountingCost => self.converter.rate(Unit::Pounds, Some(fuel)),
            other => self.converter.accumulation_rate(other, Some(fuel)),
        }
    }

    /// Part of `span` this source covers; `None` for a zero-filled source
    /// with no overlap.
    fn covered(&self, source: &Source, span: &DateSpan) -> AggregationResult<Option<DateSpan>> {
        if source.zero_fill {
            return Ok(source.meter.span().and_then(|s| s.intersect(span)));
        }
        source.meter.check_coverage(span)?;
        Ok(Some(*span))
    }

    /// Key parts in requested-dimension order.
    fn key(&self, split: Option<&SeriesPart>, classes: &[SeriesPart]) -> SeriesKey {
        let mut classes = classes.iter();
        let parts = self
            .dims
            .iter()
            .filter_map(|dim| match dim.kind() {
                BreakdownKind::Splitter => split.cloned(),
                BreakdownKind::Classifier => classes.next().cloned(),
                BreakdownKind::Derived => Some(derived_part(*dim)),
            })
            .collect();
        SeriesKey::new(parts)
    }

    /// Classifier parts in classifier order, using `day_type` for the
    /// half-hour day-type slot.
    fn classes(&self, day_parts: &[SeriesPart], day_type: Option<DayType>) -> Vec<SeriesPart> {
        let mut day_parts = day_parts.iter();
        self.classifiers
            .iter()
            .filter_map(|dim| match dim {
                Breakdown::DayType => day_type.map(SeriesPart::DayType),
                _ => day_parts.next().cloned(),
            })
            .collect()
    }

    /// Classifier parts decided per day, in classifier order (day type
    /// excluded).
    fn day_level_parts(&self, date: NaiveDate, class: DayClass) -> AggregationResult<Vec<SeriesPart>> {
        let mut parts = Vec::new();
        let mut heat_kwh = None;
        for dim in &self.classifiers {
            if *dim == Breakdown::DayType {
                continue;
            }
            let kwh = match heat_kwh {
                Some(kwh) => kwh,
                None => {
                    let kwh = self.heat_day_kwh(date)?;
                    heat_kwh = Some(kwh);
                    kwh
                }
            };
            let model = self.school.heating_model()?;
            let part = match dim {
                Breakdown::Heating => SeriesPart::Heating(model.heating_on(date, kwh)),
                Breakdown::HeatingDayType => SeriesPart::HeatingDayType(if model.boiler_off(date, kwh) {
                    HeatingDayType::BoilerOff
                } else if model.heating_on(date, kwh) {
                    HeatingDayType::HeatingOn(class)
                } else {
                    HeatingDayType::HotWaterOnly(class)
                }),
                Breakdown::ModelType => SeriesPart::ModelType(model.model_type(date, kwh, class)),
                other => {
                    return Err(AggregationError::config(format!(
                        "'{other}' is not a classifier"
                    )));
                }
            };
            parts.push(part);
        }
        Ok(parts)
    }

    fn day_passes(&self, date: NaiveDate, class: DayClass) -> AggregationResult<bool> {
        if let Some(classes) = &self.filter.day_type {
            if !classes.contains(&class) {
                return Ok(false);
            }
        }
        if self.filter.heating.is_none() && self.filter.model_type.is_none() {
            return Ok(true);
        }
        let kwh = self.heat_day_kwh(date)?;
        let model = self.school.heating_model()?;
        if let Some(wanted) = self.filter.heating {
            if model.heating_on(date, kwh) != wanted {
                return Ok(false);
            }
        }
        if let Some(types) = &self.filter.model_type {
            if !types.contains(&model.model_type(date, kwh, class)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn needs_heat_meter(&self) -> bool {
        self.filter.heating.is_some()
            || self.filter.model_type.is_some()
            || self
                .classifiers
                .iter()
                .any(|d| *d != Breakdown::DayType)
            || self
                .derived
                .iter()
                .any(|d| matches!(d, Breakdown::Cusum | Breakdown::HotWater))
    }

    /// Meter the heating and hot-water models read.
    fn heat_meter(&self) -> &Meter {
        self.meters
            .fuel(FuelType::Gas)
            .or_else(|| self.meters.fuel(FuelType::StorageHeater))
            .or(self.school.meters.heat.as_ref())
            .unwrap_or(&self.meters.primary)
    }

    fn heat_day_kwh(&self, date: NaiveDate) -> AggregationResult<f64> {
        let meter = self.heat_meter();
        meter.check_coverage(&DateSpan::single(date))?;
        meter.amr.one_day(date, ReadingKind::Kwh)
    }

    fn predicted_kwh(&self, date: NaiveDate, class: DayClass) -> AggregationResult<f64> {
        let temperature = self.school.weather.average_temperature(date)?;
        Ok(self.school.heating_model()?.predicted_kwh(date, temperature, class))
    }
}

fn zero_filled(meters: &[Meter], part: fn(String) -> SeriesPart) -> Vec<Source> {
    meters
        .iter()
        .map(|m| Source {
            part: Some(part(m.name.clone())),
            meter: m.clone(),
            zero_fill: true,
        })
        .collect()
}

fn derived_part(dim: Breakdown) -> SeriesPart {
    match dim {
        Breakdown::Cusum => SeriesPart::Cusum,
        Breakdown::Baseload => SeriesPart::Baseload,
        Breakdown::PeakKw => SeriesPart::PeakKw,
        Breakdown::PredictedHeat => SeriesPart::PredictedHeat,
        _ => SeriesPart::Energy,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

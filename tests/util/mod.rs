use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDate;
use energy_charts::aggregation::types::{AggregationResult, DateSpan, FuelType};
use energy_charts::school::{
    AmrData, AmrSource, HALF_HOURS, HalfHourlySeries, Meter, ReadingKind, School, SchoolCalendar,
};

/// Captures tracing output for tests.
#[allow(dead_code)]
pub struct TestTracing {
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

#[allow(dead_code)]
impl TestTracing {
    pub fn new() -> Self {
        Self {
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let writer = self.buffer.clone();
        let make_writer = move || TestWriter(writer.clone());
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(make_writer)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn output(&self) -> String {
        let buf = self.buffer.lock().unwrap();
        String::from_utf8_lossy(&buf).to_string()
    }

    /// Assert that the captured log output contains the provided substring.
    pub fn assert_contains(&self, needle: &str) {
        let out = self.output();
        assert!(
            out.contains(needle),
            "expected logs to contain `{needle}`, got:\n{out}"
        );
    }

    pub fn lines(&self) -> Vec<String> {
        self.output()
            .lines()
            .map(std::string::ToString::to_string)
            .collect()
    }
}

struct TestWriter(Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for TestWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut guard = self.0.lock().unwrap();
        guard.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

#[allow(dead_code)]
pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[allow(dead_code)]
pub fn span(start: NaiveDate, end: NaiveDate) -> DateSpan {
    DateSpan::new(start, end)
}

#[allow(dead_code)]
pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-6 * expected.abs().max(1.0),
        "expected {expected}, got {actual}"
    );
}

// ---------------------------------------------------------------------------
// Meter data
// ---------------------------------------------------------------------------

/// Half-hourly readings generated from `kwh(date, half_hour)`.
#[allow(dead_code)]
pub fn readings(span: DateSpan, kwh: impl Fn(NaiveDate, usize) -> f64) -> AmrData {
    let mut amr = AmrData::new();
    for d in span.iter_days() {
        amr.insert(d, (0..HALF_HOURS).map(|hh| kwh(d, hh)).collect())
            .unwrap();
    }
    amr
}

/// Wraps readings and counts how the engine reads them.
#[allow(dead_code)]
#[derive(Debug)]
pub struct CountingAmr {
    inner: AmrData,
    pub range_calls: AtomicUsize,
    pub day_calls: AtomicUsize,
}

#[allow(dead_code)]
impl CountingAmr {
    pub fn new(inner: AmrData) -> Self {
        Self {
            inner,
            range_calls: AtomicUsize::new(0),
            day_calls: AtomicUsize::new(0),
        }
    }

    pub fn range_calls(&self) -> usize {
        self.range_calls.load(Ordering::SeqCst)
    }

    pub fn day_calls(&self) -> usize {
        self.day_calls.load(Ordering::SeqCst)
    }
}

impl AmrSource for CountingAmr {
    fn start_date(&self) -> Option<NaiveDate> {
        self.inner.start_date()
    }

    fn end_date(&self) -> Option<NaiveDate> {
        self.inner.end_date()
    }

    fn days_x48(&self, date: NaiveDate, kind: ReadingKind) -> AggregationResult<Vec<f64>> {
        self.day_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.days_x48(date, kind)
    }

    fn bill_component_names(&self) -> Vec<String> {
        self.inner.bill_component_names()
    }

    fn bill_components(
        &self,
        date: NaiveDate,
        half_hour: Option<usize>,
    ) -> AggregationResult<BTreeMap<String, f64>> {
        self.inner.bill_components(date, half_hour)
    }

    fn date_range(&self, start: NaiveDate, end: NaiveDate, kind: ReadingKind) -> AggregationResult<f64> {
        self.range_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.date_range(start, end, kind)
    }
}

// ---------------------------------------------------------------------------
// School builder
// ---------------------------------------------------------------------------

/// Synthetic school for integration tests.
#[allow(dead_code)]
pub struct SchoolBuilder {
    school: School,
}

#[allow(dead_code)]
impl SchoolBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            school: School::empty(name),
        }
    }

    pub fn pupils(mut self, pupils: f64) -> Self {
        self.school.pupils = Some(pupils);
        self
    }

    pub fn floor_area(mut self, area: f64) -> Self {
        self.school.floor_area = Some(area);
        self
    }

    pub fn holidays(mut self, holidays: Vec<DateSpan>) -> Self {
        self.school.calendar = SchoolCalendar::with_holidays(holidays);
        self
    }

    pub fn electricity(mut self, amr: Arc<dyn AmrSource>) -> Self {
        self.school.meters.electricity = Some(Meter::new("Electricity", FuelType::Electricity, amr));
        self
    }

    pub fn gas(mut self, amr: Arc<dyn AmrSource>) -> Self {
        self.school.meters.heat = Some(Meter::new("Gas", FuelType::Gas, amr));
        self
    }

    pub fn electricity_meters(mut self, meters: Vec<Meter>) -> Self {
        self.school.meters.electricity_meters = meters;
        self
    }

    /// Flat daily temperatures from `temperature(date)`.
    pub fn temperatures(mut self, span: DateSpan, temperature: impl Fn(NaiveDate) -> f64) -> Self {
        let mut series = HalfHourlySeries::new();
        for d in span.iter_days() {
            series.insert_flat(d, temperature(d));
        }
        self.school.weather.temperatures = series;
        self
    }

    pub fn build(self) -> School {
        self.school
    }
}

use std::hint::black_box;
use std::sync::Arc;

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use energy_charts::aggregation::types::{
    Breakdown, ChartRequest, DateSpan, FuelType, Granularity, TimeScaleSpec, Unit,
};
use energy_charts::aggregation::{Aggregator, BucketedSeries};
use energy_charts::config::EngineConfig;
use energy_charts::school::{AmrData, HALF_HOURS, Meter, School, SchoolCalendar};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Three years of half-hourly electricity and gas for one school.
fn sample_school() -> School {
    let span = DateSpan::new(date(2021, 9, 1), date(2024, 8, 31));
    let mut electricity = AmrData::new();
    let mut gas = AmrData::new();
    for (i, d) in span.iter_days().enumerate() {
        let day: Vec<f64> = (0..HALF_HOURS)
            .map(|hh| 2.0 + ((hh + i) % 7) as f64 * 0.25)
            .collect();
        electricity.insert(d, day.clone()).unwrap();
        gas.insert(d, day.iter().map(|v| v * 3.0).collect()).unwrap();
    }
    let mut school = School::empty("Bench Secondary");
    school.pupils = Some(900.0);
    school.floor_area = Some(6500.0);
    school.calendar = SchoolCalendar::with_holidays(vec![
        DateSpan::new(date(2022, 7, 22), date(2022, 9, 4)),
        DateSpan::new(date(2023, 7, 21), date(2023, 9, 3)),
    ]);
    school.meters.electricity = Some(Meter::new("Electricity", FuelType::Electricity, Arc::new(electricity)));
    school.meters.heat = Some(Meter::new("Gas", FuelType::Gas, Arc::new(gas)));
    school
}

fn run(aggregator: &Aggregator<'_>, request: &ChartRequest) -> BucketedSeries {
    aggregator.run(request).unwrap()
}

fn bench_weekly(c: &mut Criterion) {
    let school = sample_school();
    let config = EngineConfig::default();
    let aggregator = Aggregator::new(&school, &config);

    let mut group = c.benchmark_group("weekly_three_years");
    for breakdown in [Breakdown::Fuel, Breakdown::DayType] {
        let mut request = ChartRequest::new(Granularity::Week, vec![breakdown]);
        request.timescale = TimeScaleSpec::default();
        request.yaxis_units = Unit::Pounds;
        group.bench_with_input(BenchmarkId::from_parameter(breakdown), &request, |b, request| {
            b.iter(|| black_box(run(&aggregator, black_box(request)).len()))
        });
    }
    group.finish();
}

fn bench_intraday_kw(c: &mut Criterion) {
    let school = sample_school();
    let config = EngineConfig::default();
    let aggregator = Aggregator::new(&school, &config);
    let mut request = ChartRequest::new(Granularity::Intraday, vec![Breakdown::None]);
    request.yaxis_units = Unit::Kw;
    c.bench_function("intraday_kw_all_data", |b| {
        b.iter(|| black_box(run(&aggregator, black_box(&request)).grand_total))
    });
}

criterion_group!(aggregate_perf, bench_weekly, bench_intraday_kw);
criterion_main!(aggregate_perf);

mod util;

use std::sync::Arc;

use chrono::{Datelike, NaiveDate, Weekday};
use energy_charts::aggregation::types::{
    AggregationError, Breakdown, ChartRequest, ChartType, DayClass, DayType, Granularity, MeterSelector,
    Normalization, PeriodUnit, SecondaryAxis, TimeScaleSpec, Unit, XLabel,
};
use energy_charts::aggregation::{BucketedSeries, aggregate};
use energy_charts::config::EngineConfig;
use energy_charts::school::{AmrSource, School};
use util::{CountingAmr, SchoolBuilder, TestTracing, assert_close, date, readings, span};

fn run(school: &School, request: &ChartRequest) -> BucketedSeries {
    aggregate(school, &EngineConfig::default(), request).unwrap()
}

fn request(x_axis: Granularity, breakdown: Vec<Breakdown>, timescale: TimeScaleSpec) -> ChartRequest {
    let mut r = ChartRequest::new(x_axis, breakdown);
    r.timescale = timescale;
    r
}

fn holidays_2023() -> Vec<energy_charts::aggregation::types::DateSpan> {
    vec![
        span(date(2023, 4, 3), date(2023, 4, 14)),
        span(date(2023, 7, 24), date(2023, 8, 31)),
        span(date(2023, 12, 20), date(2024, 1, 3)),
    ]
}

// ---------------------------------------------------------------------------
// Day-type scenarios
// ---------------------------------------------------------------------------

/// 10 kWh a day spread over school days only.
fn school_day_only_school() -> School {
    let year = span(date(2023, 1, 1), date(2023, 12, 31));
    let calendar = energy_charts::school::SchoolCalendar::with_holidays(holidays_2023());
    let amr = readings(year, |d, _| if calendar.is_school_day(d) { 10.0 / 48.0 } else { 0.0 });
    SchoolBuilder::new("Day Type Primary")
        .holidays(holidays_2023())
        .electricity(Arc::new(amr))
        .build()
}

#[test]
fn day_of_week_by_day_type_counts_school_days() {
    let school = school_day_only_school();
    let r = request(
        Granularity::DayOfWeek,
        vec![Breakdown::DayType],
        TimeScaleSpec::offset(PeriodUnit::Year, 0),
    );
    let bs = run(&school, &r);

    assert_eq!(bs.len(), 7);
    assert!(bs.is_consistent());
    assert_eq!(bs.x_axis[0], XLabel::Text("Sunday".into()));
    assert_eq!(
        bs.series_names(),
        vec!["Holiday", "Weekend", "School Day Open", "School Day Closed"]
    );

    let open = bs.series_named("School Day Open").unwrap();
    let closed = bs.series_named("School Day Closed").unwrap();
    let school_days = school
        .calendar
        .school_days_in(&span(date(2023, 1, 1), date(2023, 12, 31)));
    assert_close(open.total() + closed.total(), 10.0 * school_days as f64);

    for weekend in [0, 6] {
        for series in &bs.series {
            assert_eq!(series.values[weekend], 0.0, "{} on day {weekend}", series.name());
        }
    }
    assert_eq!(bs.series_named("Holiday").unwrap().total(), 0.0);
    assert_eq!(bs.series_named("Weekend").unwrap().total(), 0.0);
}

#[test]
fn day_type_partition_matches_unfiltered_total() {
    let year = span(date(2023, 1, 1), date(2023, 12, 31));
    let amr = readings(year, |d, hh| 1.0 + (hh % 5) as f64 * 0.1 + d.day() as f64 * 0.01);
    let school = SchoolBuilder::new("Partition Primary")
        .holidays(holidays_2023())
        .electricity(Arc::new(amr))
        .build();

    for unit in [Unit::Kwh, Unit::Pounds, Unit::Co2] {
        let mut by_type = request(Granularity::Month, vec![Breakdown::DayType], TimeScaleSpec::default());
        by_type.yaxis_units = unit;
        let mut total = request(Granularity::Month, vec![Breakdown::None], TimeScaleSpec::default());
        total.yaxis_units = unit;

        let by_type = run(&school, &by_type);
        let total = run(&school, &total);
        assert_eq!(by_type.len(), 12);
        assert_eq!(total.series_names(), vec!["Energy"]);
        for i in 0..12 {
            let parts: f64 = by_type.series.iter().map(|s| s.values[i]).sum();
            assert_close(parts, total.series[0].values[i]);
        }
    }
}

// ---------------------------------------------------------------------------
// kW averaging
// ---------------------------------------------------------------------------

fn half_kwh_school() -> School {
    let amr = readings(span(date(2024, 1, 1), date(2024, 1, 31)), |_, _| 0.5);
    SchoolBuilder::new("Flat Load").electricity(Arc::new(amr)).build()
}

#[test]
fn forty_eight_half_kwh_readings_are_one_kw() {
    let school = half_kwh_school();
    let mut r = request(Granularity::Day, vec![Breakdown::None], TimeScaleSpec::offset(PeriodUnit::Day, 0));
    r.yaxis_units = Unit::Kw;
    let bs = run(&school, &r);
    assert_eq!(bs.len(), 1);
    assert_close(bs.series[0].values[0], 1.0);
}

#[test]
fn kw_on_weekly_and_intraday_axes() {
    let school = half_kwh_school();
    let mut weekly = request(Granularity::Week, vec![Breakdown::None], TimeScaleSpec::default());
    weekly.yaxis_units = Unit::Kw;
    let bs = run(&school, &weekly);
    for value in &bs.series[0].values {
        assert_close(*value, 1.0);
    }

    let mut intraday = request(Granularity::Intraday, vec![Breakdown::None], TimeScaleSpec::default());
    intraday.yaxis_units = Unit::Kw;
    let bs = run(&school, &intraday);
    assert_eq!(bs.len(), 48);
    assert_eq!(bs.series[0].counts[0], 31);
    for value in &bs.series[0].values {
        assert_close(*value, 1.0);
    }
}

#[test]
fn kw_averages_only_the_days_a_filter_keeps() {
    let school = half_kwh_school();
    for x_axis in [Granularity::Week, Granularity::DayOfWeek, Granularity::Month] {
        let mut r = request(x_axis, vec![Breakdown::None], TimeScaleSpec::default());
        r.yaxis_units = Unit::Kw;
        r.filter.day_type = Some(vec![DayClass::Weekend]);
        let bs = run(&school, &r);
        assert!(bs.is_consistent());
        for (value, bucket) in bs.series[0].values.iter().zip(&bs.bucket_spans) {
            if bucket.days > 0 {
                assert_close(*value, 1.0);
            } else {
                assert_eq!(*value, 0.0, "{x_axis}");
            }
        }
        if x_axis == Granularity::DayOfWeek {
            // four Sundays and no Mondays survive in January 2024
            assert_eq!(bs.bucket_spans[0].days, 4);
            assert_eq!(bs.bucket_spans[1].days, 0);
        }
    }
}

#[test]
fn cumulative_weekly_line_ends_at_the_total() {
    let school = half_kwh_school();
    let mut r = request(Granularity::Week, vec![Breakdown::None], TimeScaleSpec::default());
    r.cumulative = true;
    r.nullify_trailing_zeros = true;
    let bs = run(&school, &r);
    let values = &bs.series[0].values;
    assert!(values.windows(2).all(|w| w[1] >= w[0]));
    assert_close(values[values.len() - 1], 31.0 * 24.0);
    assert_close(bs.series_totals[0].1, 31.0 * 24.0);
    assert_close(bs.grand_total, 31.0 * 24.0);
}

// ---------------------------------------------------------------------------
// Secondary axis
// ---------------------------------------------------------------------------

/// Freezing weekends, mild weekdays, January 2023.
fn cold_weekend_school() -> School {
    let january = span(date(2023, 1, 1), date(2023, 1, 31));
    SchoolBuilder::new("Cold Weekends")
        .electricity(Arc::new(readings(january, |_, _| 0.5)))
        .temperatures(january, |d| match d.weekday() {
            Weekday::Sat | Weekday::Sun => 0.0,
            _ => 10.0,
        })
        .build()
}

#[test]
fn day_filters_apply_to_the_secondary_axis_on_every_x_axis() {
    let school = cold_weekend_school();
    for x_axis in [Granularity::Intraday, Granularity::Month] {
        let mut r = request(x_axis, vec![Breakdown::None], TimeScaleSpec::default());
        r.y2_axis = Some(SecondaryAxis::Temperature);
        r.filter.day_type = Some(vec![DayClass::Weekend]);
        let bs = run(&school, &r);
        assert_eq!(bs.y2_axis.len(), 1);
        assert!(
            bs.y2_axis[0].values.iter().all(|v| *v == 0.0),
            "{x_axis}: {:?}",
            bs.y2_axis[0].values
        );
    }

    let mut intraday = request(Granularity::Intraday, vec![Breakdown::None], TimeScaleSpec::default());
    intraday.y2_axis = Some(SecondaryAxis::Temperature);
    intraday.filter.day_type = Some(vec![DayClass::Weekend]);
    let bs = run(&school, &intraday);
    // 4 Saturdays and 5 Sundays in January 2023
    assert_eq!(bs.y2_axis[0].counts[0], 9);
    assert_eq!(bs.series[0].counts[0], 9);
}

// ---------------------------------------------------------------------------
// Multi-period
// ---------------------------------------------------------------------------

fn multi_period_school(end: NaiveDate) -> School {
    let amr = readings(span(date(2023, 1, 1), end), |_, _| 1.0);
    SchoolBuilder::new("Multi Period").electricity(Arc::new(amr)).build()
}

fn three_weeks_oldest_missing() -> ChartRequest {
    request(
        Granularity::Day,
        vec![Breakdown::None],
        TimeScaleSpec::List(vec![
            TimeScaleSpec::offset(PeriodUnit::Week, 0),
            TimeScaleSpec::offset(PeriodUnit::Week, -1),
            TimeScaleSpec::offset(PeriodUnit::Week, -200),
        ]),
    )
}

#[test]
fn missing_oldest_period_is_dropped_with_one_warning() {
    // Saturday, so both recent weeks are complete
    let school = multi_period_school(date(2024, 3, 16));
    let bs = run(&school, &three_weeks_oldest_missing());

    assert_eq!(bs.periods, vec!["03 Mar 2024 - 09 Mar 2024", "10 Mar 2024 - 16 Mar 2024"]);
    assert_eq!(
        bs.series_names(),
        vec![
            "Energy:03 Mar 2024 - 09 Mar 2024",
            "Energy:10 Mar 2024 - 16 Mar 2024"
        ]
    );
    assert_eq!(bs.warnings.len(), 1);
    assert!(bs.is_consistent());
    assert_eq!(bs.x_axis[0], XLabel::Date(date(2024, 3, 10)));
}

#[test]
fn dropped_period_is_logged() {
    let tracing = TestTracing::new();
    let _guard = tracing.install();
    let school = multi_period_school(date(2024, 3, 16));
    run(&school, &three_weeks_oldest_missing());
    tracing.assert_contains("dropping period");
    tracing.assert_contains("aggregated chart");
}

#[test]
fn most_recent_period_supplies_the_x_axis() {
    // data stops mid-March: March has 13 buckets, February 29
    let school = multi_period_school(date(2024, 3, 13));
    let r = request(
        Granularity::Day,
        vec![Breakdown::None],
        TimeScaleSpec::List(vec![
            TimeScaleSpec::offset(PeriodUnit::Month, 0),
            TimeScaleSpec::offset(PeriodUnit::Month, -1),
        ]),
    );
    let bs = run(&school, &r);

    assert_eq!(bs.periods, vec!["Feb 2024", "Mar 2024"]);
    assert_eq!(bs.len(), 13);
    assert_eq!(bs.x_axis[0], XLabel::Date(date(2024, 3, 1)));
    assert_eq!(bs.x_axis[12], XLabel::Date(date(2024, 3, 13)));
    let february = bs.series_named("Energy:Feb 2024").unwrap();
    assert_eq!(february.values, vec![48.0; 13]);
    assert_eq!(bs.warnings, vec!["Feb 2024 has 29 buckets, aligned to 13"]);
}

#[test]
fn every_period_missing_fails() {
    let school = multi_period_school(date(2024, 3, 16));
    let r = request(
        Granularity::Day,
        vec![Breakdown::None],
        TimeScaleSpec::offset(PeriodUnit::Week, -500),
    );
    let err = aggregate(&school, &EngineConfig::default(), &r).unwrap_err();
    assert!(matches!(err, AggregationError::AllPeriodsFailed { requested: 1, .. }));
}

// ---------------------------------------------------------------------------
// Scatter and benchmarks
// ---------------------------------------------------------------------------

#[test]
fn scatter_uses_degree_days_as_x_axis() {
    let days = span(date(2024, 1, 1), date(2024, 1, 10));
    let amr = readings(days, |d, _| d.day() as f64);
    let school = SchoolBuilder::new("Scatter Primary")
        .gas(Arc::new(amr))
        .temperatures(days, |d| (d.day() - 1) as f64)
        .build();

    let mut r = request(Granularity::Day, vec![Breakdown::None], TimeScaleSpec::default());
    r.chart_type = ChartType::Scatter;
    r.y2_axis = Some(SecondaryAxis::DegreeDays);
    let bs = run(&school, &r);

    let expected: Vec<XLabel> = (0..10).map(|i| XLabel::Value(15.5 - i as f64)).collect();
    assert_eq!(bs.x_axis, expected);
    let dates: Vec<XLabel> = days.iter_days().map(XLabel::Date).collect();
    assert_eq!(bs.point_labels, Some(dates));
    assert_eq!(bs.x_axis_label.as_deref(), Some("Degree Days"));
    assert!(bs.y2_axis.is_empty());
    assert_eq!(bs.series[0].values[0], 48.0);
    assert!(bs.is_consistent());
}

#[test]
fn benchmarks_for_a_two_hundred_pupil_school() {
    let year = span(date(2023, 1, 1), date(2023, 12, 31));
    let school = SchoolBuilder::new("Benchmark Primary")
        .pupils(200.0)
        .floor_area(1000.0)
        .electricity(Arc::new(readings(year, |_, _| 1.0)))
        .gas(Arc::new(readings(year, |_, _| 2.0)))
        .build();

    let mut r = request(Granularity::Year, vec![Breakdown::Fuel], TimeScaleSpec::offset(PeriodUnit::Year, 0));
    r.inject_benchmark = true;
    let bs = run(&school, &r);

    assert_eq!(bs.len(), 4);
    assert_eq!(
        bs.x_axis[1..],
        [
            XLabel::Text("Exemplar School".into()),
            XLabel::Text("Regional Average".into()),
            XLabel::Text("National Average".into()),
        ]
    );
    let electricity = bs.series_named("electricity").unwrap();
    assert_close(electricity.values[0], 365.0 * 48.0);
    assert_eq!(electricity.values[1..], [35_000.0, 50_000.0, 50_000.0]);
    let gas = bs.series_named("gas").unwrap();
    assert_close(gas.values[1], 80_000.0);
    assert_close(gas.values[2], 86_250.0);
    assert_close(gas.values[3], 86_250.0);
    assert!(bs.is_consistent());
}

#[test]
fn normalised_benchmarks_scale_with_the_chart() {
    let year = span(date(2023, 1, 1), date(2023, 12, 31));
    let school = SchoolBuilder::new("Per Pupil")
        .pupils(200.0)
        .floor_area(1000.0)
        .electricity(Arc::new(readings(year, |_, _| 1.0)))
        .build();
    let mut r = request(Granularity::Year, vec![Breakdown::Fuel], TimeScaleSpec::offset(PeriodUnit::Year, 0));
    r.inject_benchmark = true;
    r.yaxis_scaling = Normalization::PerPupil;
    let bs = run(&school, &r);
    let electricity = bs.series_named("electricity").unwrap();
    assert_close(electricity.values[0], 365.0 * 48.0 / 200.0);
    assert_close(electricity.values[3], 250.0);
}

// ---------------------------------------------------------------------------
// Data access and failures
// ---------------------------------------------------------------------------

#[test]
fn unclassified_ranges_use_one_query_per_bucket() {
    let amr = Arc::new(CountingAmr::new(readings(
        span(date(2023, 1, 1), date(2023, 12, 30)),
        |_, _| 1.0,
    )));
    let school = SchoolBuilder::new("Batched").electricity(amr.clone()).build();
    let bs = run(&school, &request(Granularity::Week, vec![Breakdown::None], TimeScaleSpec::default()));

    assert_eq!(bs.len(), 52);
    assert_eq!(amr.range_calls(), 52);
    assert_eq!(amr.day_calls(), 0);
    assert_close(bs.grand_total, 364.0 * 48.0);
}

#[test]
fn classified_ranges_walk_days() {
    let amr = Arc::new(CountingAmr::new(readings(
        span(date(2023, 1, 1), date(2023, 1, 28)),
        |_, _| 1.0,
    )));
    let school = SchoolBuilder::new("Walked").electricity(amr.clone()).build();
    run(&school, &request(Granularity::Week, vec![Breakdown::DayType], TimeScaleSpec::default()));
    assert_eq!(amr.range_calls(), 0);
    assert_eq!(amr.day_calls(), 28);
}

#[test]
fn configuration_errors_abort() {
    let school = half_kwh_school();

    let mut unknown_meter = request(Granularity::Day, vec![Breakdown::None], TimeScaleSpec::default());
    unknown_meter.meter_definition = MeterSelector::Named("Sports Hall".into());
    let err = aggregate(&school, &EngineConfig::default(), &unknown_meter).unwrap_err();
    assert!(matches!(err, AggregationError::Configuration(_)));

    let mut per_pupil = request(Granularity::Day, vec![Breakdown::None], TimeScaleSpec::default());
    per_pupil.yaxis_scaling = Normalization::PerPupil;
    let err = aggregate(&school, &EngineConfig::default(), &per_pupil).unwrap_err();
    assert!(matches!(err, AggregationError::Configuration(_)));

    let bad_scale = request(Granularity::Day, vec![Breakdown::None], TimeScaleSpec::List(vec![]));
    let err = aggregate(&school, &EngineConfig::default(), &bad_scale).unwrap_err();
    assert!(matches!(err, AggregationError::BadChartSpecification(_)));
}

#[test]
fn reversal_flags_apply_last() {
    let school = multi_period_school(date(2024, 3, 16));
    let mut r = request(
        Granularity::Day,
        vec![Breakdown::DayType],
        TimeScaleSpec::offset(PeriodUnit::Week, 0),
    );
    r.reverse_xaxis = true;
    r.reverse_series = true;
    let bs = run(&school, &r);
    assert_eq!(bs.x_axis[0], XLabel::Date(date(2024, 3, 16)));
    assert_eq!(bs.series_names()[0], DayType::SchoolDayClosed.to_string());
    assert_eq!(bs.series_totals[0].0, bs.series_names()[0]);
    assert_eq!(date(2024, 3, 16).weekday(), Weekday::Sat);
    assert_eq!(bs.series_named("Weekend").unwrap().values[0], 48.0);
}

#[test]
fn chart_json_envelope() {
    let school = half_kwh_school();
    let bs = run(&school, &request(Granularity::Week, vec![Breakdown::Fuel], TimeScaleSpec::default()));
    let json = bs.to_chart_json();
    assert_eq!(json["series_order"][0], "electricity");
    assert_eq!(json["x_axis"].as_array().unwrap().len(), bs.len());
    assert_eq!(json["_meta"]["unit"], "kWh");
    assert!(school.meters.electricity.as_ref().unwrap().amr.span().is_some());
}

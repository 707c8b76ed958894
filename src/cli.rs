//! Command-line surface.
//!
//! `energy-charts aggregate` runs one catalog chart against one school
//! dataset; `energy-charts charts` lists a catalog. Errors carry a stable
//! code and kind so `--json` callers get a structured envelope.

use std::fmt;
use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use itertools::Itertools;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::aggregation::types::{AggregationError, BucketedSeries};
use crate::aggregation::units::format_value;
use crate::aggregation::{Aggregator, ChartRequest};
use crate::config::{ChartCatalog, ConfigError, EngineConfig, load_school};

#[derive(Parser, Debug)]
#[command(name = "energy-charts")]
#[command(version, about = "Aggregate half-hourly school meter data into chart series")]
pub struct Cli {
    /// More logging on stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Aggregate one chart for one school
    Aggregate {
        /// School dataset (JSON)
        #[arg(long)]
        school: PathBuf,
        /// Chart catalog (TOML)
        #[arg(long)]
        charts: PathBuf,
        /// Chart name in the catalog
        #[arg(long)]
        chart: String,
        /// Engine configuration (TOML); defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print the chart JSON envelope instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List the charts in a catalog
    Charts {
        #[arg(long)]
        charts: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    pub fn json_output(&self) -> bool {
        match &self.command {
            Commands::Aggregate { json, .. } | Commands::Charts { json, .. } => *json,
        }
    }
}

/// Install the stderr subscriber. Safe to call more than once.
pub fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed command, with what a caller needs to react to it.
#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub kind: &'static str,
    pub message: String,
    pub hint: Option<String>,
    pub retryable: bool,
}

impl CliError {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "error": {
                "code": self.code,
                "kind": self.kind,
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
            }
        })
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, "\nhint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        let (kind, hint) = match &err {
            ConfigError::Read { .. } => ("io", Some("check the path exists and is readable".to_string())),
            ConfigError::Parse(_) | ConfigError::Validation(_) => ("config", None),
            ConfigError::Json(_) => ("dataset", None),
            ConfigError::UnknownChart(_) => (
                "unknown_chart",
                Some("run `energy-charts charts --charts <catalog>` to list charts".to_string()),
            ),
        };
        Self {
            code: 2,
            kind,
            message: err.to_string(),
            hint,
            retryable: false,
        }
    }
}

impl From<AggregationError> for CliError {
    fn from(err: AggregationError) -> Self {
        let (code, kind) = match &err {
            AggregationError::Configuration(_) => (3, "configuration"),
            AggregationError::BadChartSpecification(_) => (3, "bad_chart_specification"),
            AggregationError::PeriodUnavailable { .. }
            | AggregationError::InsufficientData { .. }
            | AggregationError::AllPeriodsFailed { .. } => (4, "data_unavailable"),
            AggregationError::BucketOutOfRange(_) => (5, "internal"),
        };
        Self {
            code,
            kind,
            message: err.to_string(),
            hint: None,
            retryable: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Run `cli` and return what should go to stdout.
pub fn run(cli: &Cli) -> Result<String, CliError> {
    match &cli.command {
        Commands::Aggregate {
            school,
            charts,
            chart,
            config,
            json,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(path)?,
                None => EngineConfig::default(),
            };
            let catalog = ChartCatalog::load(charts)?;
            let request = catalog.chart(chart)?;
            let school = load_school(school)?;
            info!(chart = %request.name, school = %school.name, "running chart");

            let result = Aggregator::new(&school, &config).run(&request)?;
            if *json {
                Ok(serde_json::to_string_pretty(&result.to_chart_json()).map_err(|e| CliError {
                    code: 5,
                    kind: "internal",
                    message: e.to_string(),
                    hint: None,
                    retryable: false,
                })?)
            } else {
                Ok(render_table(&request, &result))
            }
        }
        Commands::Charts { charts, json } => {
            let catalog = ChartCatalog::load(charts)?;
            if *json {
                let list: Vec<_> = catalog
                    .charts
                    .iter()
                    .map(|(name, r)| {
                        serde_json::json!({
                            "name": name,
                            "x_axis": r.x_axis.to_string(),
                            "series_breakdown": r.series_breakdown.iter().map(ToString::to_string).collect::<Vec<_>>(),
                            "unit": r.yaxis_units.to_string(),
                        })
                    })
                    .collect();
                Ok(serde_json::Value::Array(list).to_string())
            } else {
                Ok(catalog
                    .charts
                    .iter()
                    .map(|(name, r)| {
                        format!(
                            "{name}\t{} by {} in {}",
                            r.x_axis,
                            r.series_breakdown.iter().join(", "),
                            r.yaxis_units
                        )
                    })
                    .join("\n"))
            }
        }
    }
}

/// Plain-text table: one row per bucket, one column per series.
pub fn render_table(request: &ChartRequest, bs: &BucketedSeries) -> String {
    ChartTable { request, bs }.to_string()
}

struct ChartTable<'a> {
    request: &'a ChartRequest,
    bs: &'a BucketedSeries,
}

impl fmt::Display for ChartTable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bs = self.bs;
        let title = if self.request.name.is_empty() {
            "chart"
        } else {
            &self.request.name
        };
        writeln!(f, "{title}: {} ({})", bs.title_summary(), bs.y_axis_label())?;
        if !bs.periods.is_empty() {
            writeln!(f, "periods: {}", bs.periods.join(", "))?;
        }

        let mut header = vec![bs.x_axis_label.clone().unwrap_or_default()];
        header.extend(bs.series.iter().chain(bs.y2_axis.iter()).map(|s| s.name()));
        let mut rows = vec![header];
        for (i, label) in bs.x_axis.iter().enumerate() {
            let mut row = vec![label.to_string()];
            row.extend(bs.series.iter().chain(bs.y2_axis.iter()).map(|s| {
                match s.values.get(i) {
                    Some(v) if !v.is_nan() => format_value(*v),
                    _ => String::new(),
                }
            }));
            rows.push(row);
        }

        let columns = rows.first().map_or(0, Vec::len);
        let widths: Vec<usize> = (0..columns)
            .map(|c| rows.iter().map(|r| r[c].chars().count()).max().unwrap_or(0))
            .collect();
        for row in &rows {
            let line = row
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(c, (cell, w))| {
                    if c == 0 {
                        format!("{cell:<w$}")
                    } else {
                        format!("{cell:>w$}")
                    }
                })
                .join("  ");
            writeln!(f, "{}", line.trim_end())?;
        }
        for warning in &bs.warnings {
            writeln!(f, "warning: {warning}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::types::{
        BucketSpan, Combine, DateSpan, FuelType, Granularity, Normalization, Series, SeriesKey,
        SeriesPart, Unit, XLabel,
    };
    use chrono::NaiveDate;

    #[test]
    fn parses_aggregate_command() {
        let cli = Cli::try_parse_from([
            "energy-charts",
            "-vv",
            "aggregate",
            "--school",
            "school.json",
            "--charts",
            "charts.toml",
            "--chart",
            "benchmark",
            "--json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.json_output());
        assert!(matches!(cli.command, Commands::Aggregate { ref chart, .. } if chart == "benchmark"));
    }

    #[test]
    fn error_envelope_shape() {
        let err: CliError = AggregationError::Configuration("bad unit".into()).into();
        let json = err.to_json();
        assert_eq!(json["error"]["code"], 3);
        assert_eq!(json["error"]["kind"], "configuration");
        assert_eq!(json["error"]["retryable"], false);

        let err: CliError = ConfigError::UnknownChart("x".into()).into();
        assert_eq!(err.kind, "unknown_chart");
        assert!(err.hint.is_some());
    }

    #[test]
    fn table_lists_buckets_and_totals() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bs = BucketedSeries {
            granularity: Granularity::Day,
            unit: Unit::Kwh,
            normalization: Normalization::None,
            x_axis: vec![XLabel::Date(day)],
            bucket_spans: vec![BucketSpan::range(DateSpan::single(day))],
            x_axis_label: None,
            series: vec![Series {
                key: SeriesKey::single(SeriesPart::Fuel(FuelType::Electricity)),
                combine: Combine::Sum,
                values: vec![1234.0],
                counts: vec![1],
            }],
            y2_axis: Vec::new(),
            point_labels: None,
            series_totals: vec![("electricity".into(), 1234.0)],
            grand_total: 1234.0,
            periods: vec!["all".into()],
            warnings: vec!["older period dropped".into()],
        };
        let mut request = ChartRequest::new(Granularity::Day, Vec::new());
        request.name = "daily".into();
        let table = render_table(&request, &bs);
        assert!(table.starts_with("daily: 1,234 kWh (kWh)"));
        let row = table.lines().find(|l| l.starts_with("2024-01-01")).unwrap();
        assert_eq!(row.split_whitespace().collect::<Vec<_>>(), vec!["2024-01-01", "1,234"]);
        assert!(table.contains("warning: older period dropped"));

        let mut blank = bs.clone();
        blank.series[0].values[0] = f64::NAN;
        let table = render_table(&request, &blank);
        let row = table.lines().find(|l| l.starts_with("2024-01-01")).unwrap();
        assert_eq!(row.split_whitespace().collect::<Vec<_>>(), vec!["2024-01-01"]);
    }
}

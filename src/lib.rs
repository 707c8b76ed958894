//! School energy chart aggregation.
//!
//! [`aggregation`] turns half-hourly meter readings held in a [`school::School`]
//! into [`aggregation::BucketedSeries`] ready for a chart renderer.
//! [`config`] loads engine settings, chart catalogs and school datasets;
//! [`cli`] is the `energy-charts` command surface.

pub mod aggregation;
pub mod cli;
pub mod config;
pub mod school;

pub use aggregation::{AggregationError, AggregationResult, Aggregator, BucketedSeries, ChartRequest, aggregate};
pub use config::{ChartCatalog, ConfigError, EngineConfig};

//! Engine configuration and chart catalogs.
//!
//! Both are TOML. [`EngineConfig`] holds conversion rates and benchmark
//! constants; every field has a default so an empty file is valid.
//! [`ChartCatalog`] holds flat, already-resolved chart requests keyed by name.
//! School datasets are JSON and load through [`load_school`].

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::aggregation::benchmarks::BenchmarkConstants;
use crate::aggregation::types::ChartRequest;
use crate::aggregation::units::ConversionRates;
use crate::school::School;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid school dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error("unknown chart '{0}'")]
    UnknownChart(String),
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Engine configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub conversion: ConversionRates,
    pub benchmarks: BenchmarkConstants,
}

impl EngineConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_toml_str(&read(path)?)?;
        debug!(path = %path.display(), "loaded engine config");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.conversion
            .validate()
            .and_then(|()| self.benchmarks.validate())
            .map_err(ConfigError::Validation)
    }
}

// ---------------------------------------------------------------------------
// Chart catalog
// ---------------------------------------------------------------------------

/// Named chart requests from `[charts.<name>]` tables.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartCatalog {
    #[serde(default)]
    pub charts: BTreeMap<String, ChartRequest>,
}

impl ChartCatalog {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let catalog = Self::from_toml_str(&read(path)?)?;
        debug!(path = %path.display(), charts = catalog.charts.len(), "loaded chart catalog");
        Ok(catalog)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// The request named `name`, with its `name` field set.
    pub fn chart(&self, name: &str) -> Result<ChartRequest, ConfigError> {
        let mut request = self
            .charts
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownChart(name.to_string()))?;
        request.name = name.to_string();
        Ok(request)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.charts.keys().map(String::as_str)
    }
}

/// Load a school dataset from JSON.
pub fn load_school(path: &Path) -> Result<School, ConfigError> {
    let school: School = serde_json::from_str(&read(path)?)?;
    debug!(path = %path.display(), school = %school.name, "loaded school");
    Ok(school)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

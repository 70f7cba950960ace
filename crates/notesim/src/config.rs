//! Loading the sweep parameter document and the market data file.

use std::fs;
use std::path::{Path, PathBuf};

use notesim_core::model::{MarketData, MarketDataFile};
use notesim_core::pricing::price_note_table;
use notesim_core::sweep::SweepConfig;

use crate::error::LoadError;

/// A validated sweep config along with the document it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: SweepConfig,
    /// Raw parameter document, archived alongside the results
    pub source: String,
    pub path: PathBuf,
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Parse and validate a sweep parameter document
pub fn parse_sweep_config(yaml: &str, path: &Path) -> Result<SweepConfig, LoadError> {
    let config: SweepConfig = serde_saphyr::from_str(yaml).map_err(|source| LoadError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

pub fn load_sweep_config(path: &Path) -> Result<LoadedConfig, LoadError> {
    let source = read(path)?;
    let config = parse_sweep_config(&source, path)?;
    tracing::info!(
        path = %path.display(),
        name = %config.simulation_name,
        "Loaded sweep configuration"
    );
    Ok(LoadedConfig {
        config,
        source,
        path: path.to_path_buf(),
    })
}

/// Load market data from a `.json`, `.yaml` or `.yml` file.
///
/// When the file carries no note rows, a note table is priced from the
/// per-year market state for the sweep's protection levels.
pub fn load_market_data(path: &Path, config: &SweepConfig) -> Result<MarketData, LoadError> {
    let text = read(path)?;
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    let file: MarketDataFile = match extension.as_deref() {
        Some("json") => serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })?,
        Some("yaml" | "yml") => serde_saphyr::from_str(&text).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })?,
        _ => {
            return Err(LoadError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };

    let market = MarketData::from(file);
    if !market.notes().is_empty() {
        tracing::info!(
            years = market.years().count(),
            notes = market.notes().len(),
            "Loaded market data with note table"
        );
        return Ok(market);
    }

    let notes = price_note_table(
        &market,
        &config.note_parameters.protection_levels,
        &config.note_parameters.pricing,
    )?;
    tracing::info!(
        years = market.years().count(),
        notes = notes.len(),
        "Priced note table from market conditions"
    );
    Ok(market.with_notes(notes))
}

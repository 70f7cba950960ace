//! Sweep configuration document.
//!
//! Deserialized as-is from the parameter file, then validated into the
//! typed config structs the engine consumes.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{Allocation, percent_label};
use crate::observe::Observer;
use crate::pricing::{DEFAULT_PROTECTION_LEVELS, PricingConfig};
use crate::simulation::{DEFAULT_INFLATION_RATE, RebalancingFrequency};
use crate::withdrawal::{
    FixedDollarConfig, FixedPercentageConfig, RmdConfig, WithdrawalConfig, WithdrawalKind,
};

fn default_simulation_name() -> String {
    "default".to_string()
}

fn default_protection_levels() -> Vec<f64> {
    DEFAULT_PROTECTION_LEVELS.to_vec()
}

fn default_true() -> bool {
    true
}

fn default_inflation_rate() -> f64 {
    DEFAULT_INFLATION_RATE
}

fn default_starting_age() -> u8 {
    72
}

fn default_database_file() -> PathBuf {
    PathBuf::from("simulation_results.db")
}

fn default_results_directory() -> PathBuf {
    PathBuf::from("results")
}

fn default_batch_size() -> usize {
    256
}

/// Reject an axis whose values collide once rendered into a run id
fn check_distinct<T>(
    axis: &'static str,
    values: &[T],
    label: impl Fn(&T) -> String,
) -> Result<(), ConfigError> {
    let mut seen = Vec::with_capacity(values.len());
    for value in values {
        let text = label(value);
        if seen.contains(&text) {
            return Err(ConfigError::DuplicateValue { axis, value: text });
        }
        seen.push(text);
    }
    Ok(())
}

/// Top-level sweep parameter document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    #[serde(default = "default_simulation_name")]
    pub simulation_name: String,
    pub time_parameters: TimeParameters,
    /// Named portfolios, enumerated in name order
    pub portfolio_allocations: BTreeMap<String, AllocationWeights>,
    #[serde(default)]
    pub note_parameters: NoteParameters,
    #[serde(default)]
    pub withdrawal_parameters: WithdrawalParameters,
    pub initial_conditions: InitialConditions,
    #[serde(default)]
    pub output_parameters: OutputParameters,
    #[serde(default)]
    pub execution: ExecutionParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeParameters {
    pub start_years: Vec<i16>,
    pub time_horizons: Vec<u8>,
}

/// Raw weights as written in the parameter file
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AllocationWeights {
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub notes: f64,
    #[serde(default)]
    pub bonds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteParameters {
    #[serde(default = "default_protection_levels")]
    pub protection_levels: Vec<f64>,
    #[serde(default)]
    pub pricing: PricingConfig,
}

impl Default for NoteParameters {
    fn default() -> Self {
        NoteParameters {
            protection_levels: default_protection_levels(),
            pricing: PricingConfig::default(),
        }
    }
}

/// Withdrawal policy for every run.
///
/// `rates` is a fraction of the starting amount. Fixed-dollar runs withdraw
/// `rate * starting_amount` each year; RMD runs ignore the rates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalParameters {
    #[serde(default)]
    pub rates: Vec<f64>,
    #[serde(default)]
    pub strategy: WithdrawalKind,
    #[serde(default = "default_true")]
    pub inflation_adjusted: bool,
    #[serde(default = "default_inflation_rate")]
    pub inflation_rate: f64,
    #[serde(default = "default_starting_age")]
    pub starting_age: u8,
}

impl Default for WithdrawalParameters {
    fn default() -> Self {
        WithdrawalParameters {
            rates: vec![0.0],
            strategy: WithdrawalKind::default(),
            inflation_adjusted: true,
            inflation_rate: default_inflation_rate(),
            starting_age: default_starting_age(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub starting_amount: f64,
    #[serde(default)]
    pub rebalancing_frequency: RebalancingFrequency,
    #[serde(default = "default_inflation_rate")]
    pub fallback_inflation_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputParameters {
    #[serde(default = "default_database_file")]
    pub database_file: PathBuf,
    #[serde(default = "default_results_directory")]
    pub results_directory: PathBuf,
}

impl Default for OutputParameters {
    fn default() -> Self {
        OutputParameters {
            database_file: default_database_file(),
            results_directory: default_results_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionParameters {
    /// Worker threads, rayon's default when unset
    #[serde(default)]
    pub workers: Option<usize>,
    /// Runs handed to the sink per write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for ExecutionParameters {
    fn default() -> Self {
        ExecutionParameters {
            workers: None,
            batch_size: default_batch_size(),
        }
    }
}

impl SweepConfig {
    /// Check every axis and numeric field
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_parameters.start_years.is_empty() {
            return Err(ConfigError::EmptyAxis("start_years"));
        }
        if self.time_parameters.time_horizons.is_empty() {
            return Err(ConfigError::EmptyAxis("time_horizons"));
        }
        if self.time_parameters.time_horizons.contains(&0) {
            return Err(ConfigError::OutOfRange {
                field: "time_horizon",
                value: 0.0,
                reason: "must be at least one year",
            });
        }
        if self.portfolio_allocations.is_empty() {
            return Err(ConfigError::EmptyAxis("portfolio_allocations"));
        }
        check_distinct("start_years", &self.time_parameters.start_years, i16::to_string)?;
        check_distinct("time_horizons", &self.time_parameters.time_horizons, u8::to_string)?;
        check_distinct(
            "protection_levels",
            &self.note_parameters.protection_levels,
            |&p| format!("{}pct", percent_label(p)),
        )?;

        let holds_notes = self.portfolio_allocations.values().any(|w| w.notes > 0.0);
        if holds_notes && self.note_parameters.protection_levels.is_empty() {
            return Err(ConfigError::EmptyAxis("protection_levels"));
        }
        for &level in &self.note_parameters.protection_levels {
            if !(level > 0.0 && level < 1.0) {
                return Err(ConfigError::OutOfRange {
                    field: "protection_level",
                    value: level,
                    reason: "must lie strictly between 0 and 1",
                });
            }
        }

        let withdrawal = &self.withdrawal_parameters;
        if withdrawal.strategy != WithdrawalKind::Rmd {
            if withdrawal.rates.is_empty() {
                return Err(ConfigError::EmptyAxis("withdrawal rates"));
            }
            check_distinct("withdrawal rates", &withdrawal.rates, |&r| {
                format!("{}pct", percent_label(r))
            })?;
        }

        let start = &self.initial_conditions;
        if !start.starting_amount.is_finite() || start.starting_amount <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "starting_amount",
                value: start.starting_amount,
                reason: "must be a positive finite number",
            });
        }
        if self.execution.batch_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "batch_size",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        if self.execution.workers == Some(0) {
            return Err(ConfigError::OutOfRange {
                field: "workers",
                value: 0.0,
                reason: "must be at least 1",
            });
        }
        Ok(())
    }

    /// Validated allocation for a named portfolio
    pub fn allocation(&self, name: &str, observer: &dyn Observer) -> Result<Allocation, ConfigError> {
        let weights = self
            .portfolio_allocations
            .get(name)
            .ok_or_else(|| ConfigError::UnknownVariant {
                kind: "portfolio",
                tag: name.to_string(),
            })?;
        Allocation::from_parts(weights.equity, weights.notes, weights.bonds, observer)
    }

    /// Withdrawal config for one run, with inflation and ages counted from
    /// `first_withdrawal_year`
    pub fn withdrawal_config(
        &self,
        rate: f64,
        first_withdrawal_year: i16,
    ) -> Result<WithdrawalConfig, ConfigError> {
        let params = &self.withdrawal_parameters;
        let inflation = params.inflation_adjusted.then_some(params.inflation_rate);
        let starting_amount = self.initial_conditions.starting_amount;

        let config = match params.strategy {
            WithdrawalKind::FixedPercentage => WithdrawalConfig::FixedPercentage(
                FixedPercentageConfig::new(rate, inflation)?.anchored_at(starting_amount),
            ),
            WithdrawalKind::FixedDollar => WithdrawalConfig::FixedDollar(FixedDollarConfig::new(
                rate * starting_amount,
                inflation,
            )?),
            WithdrawalKind::Rmd => WithdrawalConfig::Rmd(RmdConfig::new(params.starting_age)?),
        };
        Ok(config.starting_in(first_withdrawal_year))
    }
}

//! Enumeration of the sweep cross-product

use crate::error::ConfigError;
use crate::model::SimulationParameters;
use crate::withdrawal::WithdrawalKind;

use super::SweepConfig;

/// Runs to execute, in enumeration order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGrid {
    pub runs: Vec<SimulationParameters>,
    /// Start/horizon combinations dropped for running past the data
    pub skipped: usize,
}

impl ParameterGrid {
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Enumerate start year x horizon x portfolio x protection level x
/// withdrawal rate.
///
/// Combinations whose last year falls after `last_data_year` are never
/// produced. Portfolios without notes get a single pass with no protection
/// level, and RMD sweeps collapse the rate axis to one pass.
pub fn generate_parameters(
    config: &SweepConfig,
    last_data_year: i16,
) -> Result<ParameterGrid, ConfigError> {
    config.validate()?;

    let rates: Vec<f64> = match config.withdrawal_parameters.strategy {
        WithdrawalKind::Rmd => vec![0.0],
        _ => config.withdrawal_parameters.rates.clone(),
    };
    let protection_levels: Vec<Option<f64>> = config
        .note_parameters
        .protection_levels
        .iter()
        .copied()
        .map(Some)
        .collect();

    let mut grid = ParameterGrid::default();
    for &start_year in &config.time_parameters.start_years {
        for &horizon in &config.time_parameters.time_horizons {
            if i32::from(start_year) + i32::from(horizon) > i32::from(last_data_year) {
                grid.skipped += 1;
                continue;
            }

            for (name, weights) in &config.portfolio_allocations {
                let levels: &[Option<f64>] = if weights.notes > 0.0 {
                    &protection_levels
                } else {
                    &[None]
                };

                for &protection_level in levels {
                    for &withdrawal_rate in &rates {
                        grid.runs.push(SimulationParameters {
                            start_year,
                            portfolio_type: name.clone(),
                            equity_allocation: weights.equity,
                            note_allocation: weights.notes,
                            bond_allocation: weights.bonds,
                            protection_level,
                            withdrawal_rate,
                            time_horizon: horizon,
                        });
                    }
                }
            }
        }
    }
    Ok(grid)
}

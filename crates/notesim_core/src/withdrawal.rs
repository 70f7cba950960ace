//! Annual withdrawal strategies
//!
//! Each strategy is built from a validated config struct and keeps its own
//! forward-only state, so every portfolio path needs its own instance.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimulationError};
use crate::model::RmdTable;
use crate::portfolio::Portfolio;

/// Strategy tag used in sweep configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalKind {
    #[default]
    FixedPercentage,
    FixedDollar,
    Rmd,
}

impl FromStr for WithdrawalKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed_percentage" => Ok(WithdrawalKind::FixedPercentage),
            "fixed_dollar" => Ok(WithdrawalKind::FixedDollar),
            "rmd" => Ok(WithdrawalKind::Rmd),
            _ => Err(ConfigError::UnknownVariant {
                kind: "withdrawal strategy",
                tag: s.to_string(),
            }),
        }
    }
}

fn validate_inflation(rate: Option<f64>) -> Result<Option<f64>, ConfigError> {
    match rate {
        Some(r) if !r.is_finite() || r <= -1.0 => Err(ConfigError::OutOfRange {
            field: "inflation_rate",
            value: r,
            reason: "must be finite and greater than -1",
        }),
        other => Ok(other),
    }
}

/// Withdraw `rate` of the portfolio each year. With an inflation rate the
/// first withdrawal is fixed and then grown by inflation instead.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPercentageConfig {
    rate: f64,
    inflation_rate: Option<f64>,
    start_year: Option<i16>,
    anchor_value: Option<f64>,
}

impl FixedPercentageConfig {
    pub fn new(rate: f64, inflation_rate: Option<f64>) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ConfigError::OutOfRange {
                field: "withdrawal_rate",
                value: rate,
                reason: "must lie between 0 and 1",
            });
        }
        Ok(FixedPercentageConfig {
            rate,
            inflation_rate: validate_inflation(inflation_rate)?,
            start_year: None,
            anchor_value: None,
        })
    }

    /// Count inflation years from `year` instead of the first withdrawal
    #[must_use]
    pub fn starting_in(mut self, year: i16) -> Self {
        self.start_year = Some(year);
        self
    }

    /// Base inflation-adjusted withdrawals on `value` rather than the
    /// portfolio value seen at the first withdrawal
    #[must_use]
    pub fn anchored_at(mut self, value: f64) -> Self {
        self.anchor_value = Some(value);
        self
    }

    #[must_use]
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Withdraw a constant dollar amount, optionally grown by inflation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDollarConfig {
    amount: f64,
    inflation_rate: Option<f64>,
    start_year: Option<i16>,
}

impl FixedDollarConfig {
    pub fn new(amount: f64, inflation_rate: Option<f64>) -> Result<Self, ConfigError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "withdrawal_amount",
                value: amount,
                reason: "must be a non-negative finite number",
            });
        }
        Ok(FixedDollarConfig {
            amount,
            inflation_rate: validate_inflation(inflation_rate)?,
            start_year: None,
        })
    }

    #[must_use]
    pub fn starting_in(mut self, year: i16) -> Self {
        self.start_year = Some(year);
        self
    }

    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }
}

/// Required minimum distributions for a holder aged `starting_age` in the
/// start year
#[derive(Debug, Clone, PartialEq)]
pub struct RmdConfig {
    starting_age: u8,
    start_year: Option<i16>,
    table: RmdTable,
}

impl RmdConfig {
    pub fn new(starting_age: u8) -> Result<Self, ConfigError> {
        if starting_age > 120 {
            return Err(ConfigError::OutOfRange {
                field: "starting_age",
                value: f64::from(starting_age),
                reason: "must be at most 120",
            });
        }
        Ok(RmdConfig {
            starting_age,
            start_year: None,
            table: RmdTable::uniform_lifetime(),
        })
    }

    #[must_use]
    pub fn starting_in(mut self, year: i16) -> Self {
        self.start_year = Some(year);
        self
    }

    #[must_use]
    pub fn starting_age(&self) -> u8 {
        self.starting_age
    }
}

/// Validated configuration for any strategy
#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalConfig {
    FixedPercentage(FixedPercentageConfig),
    FixedDollar(FixedDollarConfig),
    Rmd(RmdConfig),
}

impl WithdrawalConfig {
    /// Anchor every inflation and age calculation at `year`
    #[must_use]
    pub fn starting_in(self, year: i16) -> Self {
        match self {
            WithdrawalConfig::FixedPercentage(c) => {
                WithdrawalConfig::FixedPercentage(c.starting_in(year))
            }
            WithdrawalConfig::FixedDollar(c) => WithdrawalConfig::FixedDollar(c.starting_in(year)),
            WithdrawalConfig::Rmd(c) => WithdrawalConfig::Rmd(c.starting_in(year)),
        }
    }
}

/// Forward-only clock shared by every strategy
#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct YearClock {
    start_year: Option<i16>,
    last_year: Option<i16>,
}

impl YearClock {
    fn new(start_year: Option<i16>) -> Self {
        YearClock {
            start_year,
            last_year: None,
        }
    }

    /// Advance to `year` and return whole years elapsed since the start
    fn advance(&mut self, year: i16) -> Result<i32, SimulationError> {
        if let Some(previous) = self.last_year {
            if year < previous {
                return Err(SimulationError::NonMonotonicYear {
                    previous,
                    requested: year,
                });
            }
        }
        self.last_year = Some(year);
        let start = *self.start_year.get_or_insert(year);
        Ok((i32::from(year) - i32::from(start)).max(0))
    }
}

fn inflation_factor(inflation_rate: Option<f64>, years: i32) -> f64 {
    inflation_rate.map_or(1.0, |r| (1.0 + r).powi(years))
}

/// Percentage strategy state: the anchor value is captured on first use
#[derive(Debug, Clone, PartialEq)]
pub struct FixedPercentageState {
    config: FixedPercentageConfig,
    clock: YearClock,
    anchor_value: Option<f64>,
}

impl FixedPercentageState {
    fn calculate(&mut self, value: f64, year: i16) -> Result<f64, SimulationError> {
        let elapsed = self.clock.advance(year)?;
        let amount = match self.config.inflation_rate {
            Some(rate) => {
                let anchor = *self.anchor_value.get_or_insert(value);
                self.config.rate * anchor * inflation_factor(Some(rate), elapsed)
            }
            None => self.config.rate * value,
        };
        Ok(amount.min(value))
    }

    /// Portfolio value the inflation-adjusted withdrawal is based on
    #[must_use]
    pub fn anchor_value(&self) -> Option<f64> {
        self.anchor_value
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FixedDollarState {
    config: FixedDollarConfig,
    clock: YearClock,
}

impl FixedDollarState {
    fn calculate(&mut self, value: f64, year: i16) -> Result<f64, SimulationError> {
        let elapsed = self.clock.advance(year)?;
        let amount = self.config.amount * inflation_factor(self.config.inflation_rate, elapsed);
        Ok(amount.min(value))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RmdState {
    config: RmdConfig,
    clock: YearClock,
}

impl RmdState {
    fn calculate(&mut self, value: f64, year: i16) -> Result<f64, SimulationError> {
        let elapsed = self.clock.advance(year)?;
        let age = u8::try_from(i32::from(self.config.starting_age) + elapsed).unwrap_or(u8::MAX);
        Ok(self
            .config
            .table
            .divisor_for_age(age)
            .map_or(0.0, |divisor| value / divisor))
    }

    /// Holder age in `year`, given the years seen so far
    #[must_use]
    pub fn age_in(&self, year: i16) -> Option<i32> {
        let start = self.clock.start_year?;
        Some(i32::from(self.config.starting_age) + (i32::from(year) - i32::from(start)).max(0))
    }
}

/// Stateful withdrawal calculator for one portfolio path
#[derive(Debug, Clone, PartialEq)]
pub enum WithdrawalStrategy {
    FixedPercentage(FixedPercentageState),
    FixedDollar(FixedDollarState),
    Rmd(RmdState),
}

impl WithdrawalStrategy {
    #[must_use]
    pub fn from_config(config: WithdrawalConfig) -> Self {
        match config {
            WithdrawalConfig::FixedPercentage(config) => {
                WithdrawalStrategy::FixedPercentage(FixedPercentageState {
                    clock: YearClock::new(config.start_year),
                    anchor_value: config.anchor_value,
                    config,
                })
            }
            WithdrawalConfig::FixedDollar(config) => {
                WithdrawalStrategy::FixedDollar(FixedDollarState {
                    clock: YearClock::new(config.start_year),
                    config,
                })
            }
            WithdrawalConfig::Rmd(config) => WithdrawalStrategy::Rmd(RmdState {
                clock: YearClock::new(config.start_year),
                config,
            }),
        }
    }

    /// Amount to withdraw for `calendar_year`.
    ///
    /// Years must be requested in non-decreasing order. Fixed strategies cap
    /// the amount at the portfolio value.
    pub fn calculate_withdrawal(
        &mut self,
        portfolio: &Portfolio,
        calendar_year: i16,
    ) -> Result<f64, SimulationError> {
        let value = portfolio.current_value().max(0.0);
        match self {
            WithdrawalStrategy::FixedPercentage(state) => state.calculate(value, calendar_year),
            WithdrawalStrategy::FixedDollar(state) => state.calculate(value, calendar_year),
            WithdrawalStrategy::Rmd(state) => state.calculate(value, calendar_year),
        }
    }
}

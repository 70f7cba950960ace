//! Simulation results and run identities

use serde::{Deserialize, Serialize};

use super::percent_label;

/// State of one portfolio at the end of one simulated year.
///
/// `year` counts from 0 (the initial state row) while `calendar_year` is the
/// historical year whose returns were applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearlyResult {
    pub year: u16,
    pub calendar_year: i16,
    pub starting_value: f64,
    pub ending_value: f64,
    pub withdrawal_amount: f64,
    pub equity_return: f64,
    pub note_return: f64,
    pub bond_return: f64,
    pub portfolio_return: f64,
    pub equity_value: f64,
    pub note_value: f64,
    pub bond_value: f64,
    pub inflation_rate: f64,
}

/// Inputs that identify one sweep run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    pub start_year: i16,
    pub portfolio_type: String,
    pub equity_allocation: f64,
    pub note_allocation: f64,
    pub bond_allocation: f64,
    /// `None` for portfolios without notes
    pub protection_level: Option<f64>,
    pub withdrawal_rate: f64,
    pub time_horizon: u8,
}

impl SimulationParameters {
    /// Unique run id, e.g. `1990_structured_10pct_4pct_20yr`.
    ///
    /// Runs without notes use `traditional` in place of the protection level.
    #[must_use]
    pub fn sim_id(&self) -> String {
        let protection = match self.protection_level {
            Some(p) => format!("{}pct", percent_label(p)),
            None => "traditional".to_string(),
        };
        format!(
            "{}_{}_{}_{}pct_{}yr",
            self.start_year,
            self.portfolio_type,
            protection,
            percent_label(self.withdrawal_rate),
            self.time_horizon
        )
    }

    /// Last calendar year whose returns the run needs
    #[must_use]
    pub fn end_year(&self) -> i16 {
        self.start_year + i16::from(self.time_horizon)
    }
}

/// Aggregate statistics of one portfolio path
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub terminal_value: f64,
    /// Portfolio still had money at the end
    pub success: bool,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub inflation_adjusted_terminal: f64,
}

/// Everything persisted for one completed sweep run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRecord {
    pub sim_id: String,
    pub params: SimulationParameters,
    pub summary: SimulationSummary,
    pub years: Vec<YearlyResult>,
}

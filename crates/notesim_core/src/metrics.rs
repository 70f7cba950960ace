//! Path statistics computed from yearly results

use crate::model::{SimulationSummary, YearlyResult};

/// Largest peak-to-trough decline as a fraction of the running peak
#[must_use]
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in values {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst
}

/// Population standard deviation, 0 for fewer than two points
#[must_use]
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Compound annual growth rate over `years`, 0 when no time has passed
#[must_use]
pub fn cagr(initial: f64, terminal: f64, years: usize) -> f64 {
    if years == 0 || initial <= 0.0 {
        return 0.0;
    }
    (terminal.max(0.0) / initial).powf(1.0 / years as f64) - 1.0
}

/// Summary statistics for one path.
///
/// Year-0 rows (the initial state) count toward the drawdown scan but not
/// toward the year count or the volatility sample.
#[must_use]
pub fn summarize(initial_value: f64, years: &[YearlyResult]) -> SimulationSummary {
    let terminal_value = years.last().map_or(initial_value, |r| r.ending_value);
    let simulated: Vec<&YearlyResult> = years.iter().filter(|r| r.year > 0).collect();

    let returns: Vec<f64> = simulated.iter().map(|r| r.portfolio_return).collect();
    let endings: Vec<f64> = years.iter().map(|r| r.ending_value).collect();
    let cumulative_inflation: f64 = years.iter().map(|r| 1.0 + r.inflation_rate).product();

    SimulationSummary {
        terminal_value,
        success: terminal_value > 0.0,
        cagr: cagr(initial_value, terminal_value, simulated.len()),
        max_drawdown: max_drawdown(&endings),
        volatility: population_std_dev(&returns),
        inflation_adjusted_terminal: terminal_value / cumulative_inflation,
    }
}

//! Integration tests for the notesim simulation engine
//!
//! Tests are organized by topic:
//! - `portfolio` - Rebalance, returns and withdrawals on a single portfolio
//! - `notes` - Note payoffs and per-year note selection
//! - `pricing` - Black-Scholes participation rates
//! - `withdrawal` - Withdrawal strategy amounts and state
//! - `simulation` - Multi-year engine runs
//! - `sweep` - Parameter enumeration, parallel execution and sinks

mod simulation;

use std::collections::BTreeMap;

use crate::model::{MarketData, NoteTable, NoteTerms, YearData};
use crate::pricing::PricingConfig;
use crate::simulation::RebalancingFrequency;
use crate::sweep::{
    AllocationWeights, ExecutionParameters, InitialConditions, NoteParameters, OutputParameters,
    SweepConfig, TimeParameters, WithdrawalParameters,
};
use crate::withdrawal::WithdrawalKind;

const FIRST_YEAR: i16 = 2000;
const EQUITY: [f64; 11] = [
    -0.091, -0.119, -0.221, 0.287, 0.109, 0.049, 0.158, 0.055, -0.370, 0.265, 0.151,
];
const BONDS: [f64; 11] = [
    0.116, 0.084, 0.103, 0.041, 0.043, 0.024, 0.043, 0.070, 0.052, 0.059, 0.065,
];
const INFLATION: [f64; 11] = [
    0.034, 0.028, 0.016, 0.023, 0.027, 0.034, 0.032, 0.028, 0.038, -0.004, 0.016,
];

/// Tabulated protection levels and participation rates for every year
const NOTE_LEVELS: [(f64, f64); 3] = [(0.05, 1.15), (0.10, 0.92), (0.15, 0.77)];

fn year_rows() -> Vec<YearData> {
    (0..EQUITY.len())
        .map(|i| {
            YearData::new(FIRST_YEAR + i as i16, EQUITY[i], BONDS[i])
                .with_inflation(INFLATION[i])
                .with_market_state(0.03 + 0.001 * i as f64, 0.18 + 0.01 * i as f64)
        })
        .collect()
}

fn note_table() -> NoteTable {
    (0..EQUITY.len())
        .flat_map(|i| {
            NOTE_LEVELS.iter().map(move |&(level, pr)| NoteTerms {
                protection_level: level,
                participation_rate: pr,
                ..NoteTerms::fallback(FIRST_YEAR + i as i16)
            })
        })
        .collect()
}

/// Eleven years of returns (2000-2010) with a note table for every year
pub(crate) fn sample_market() -> MarketData {
    MarketData::new(year_rows(), note_table())
}

/// Same returns with no notes tabulated
pub(crate) fn market_without_notes() -> MarketData {
    MarketData::new(year_rows(), NoteTable::new())
}

pub(crate) fn equity_return(year: i16) -> f64 {
    EQUITY[(year - FIRST_YEAR) as usize]
}

pub(crate) fn bond_return(year: i16) -> f64 {
    BONDS[(year - FIRST_YEAR) as usize]
}

pub(crate) fn inflation(year: i16) -> f64 {
    INFLATION[(year - FIRST_YEAR) as usize]
}

pub(crate) fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected}, got {actual} (tolerance {tolerance})"
    );
}

/// Two portfolios (one with notes), two protection levels, two rates
pub(crate) fn sample_sweep_config() -> SweepConfig {
    SweepConfig {
        simulation_name: "sample".to_string(),
        time_parameters: TimeParameters {
            start_years: vec![2000, 2004, 2008],
            time_horizons: vec![3, 5],
        },
        portfolio_allocations: BTreeMap::from([
            (
                "structured".to_string(),
                AllocationWeights {
                    equity: 0.5,
                    notes: 0.2,
                    bonds: 0.3,
                },
            ),
            (
                "traditional".to_string(),
                AllocationWeights {
                    equity: 0.6,
                    notes: 0.0,
                    bonds: 0.4,
                },
            ),
        ]),
        note_parameters: NoteParameters {
            protection_levels: vec![0.05, 0.10],
            pricing: PricingConfig::default(),
        },
        withdrawal_parameters: WithdrawalParameters {
            rates: vec![0.03, 0.04],
            strategy: WithdrawalKind::FixedPercentage,
            inflation_adjusted: true,
            inflation_rate: 0.02,
            starting_age: 72,
        },
        initial_conditions: InitialConditions {
            starting_amount: 1_000_000.0,
            rebalancing_frequency: RebalancingFrequency::Annual,
            fallback_inflation_rate: 0.02,
        },
        output_parameters: OutputParameters::default(),
        execution: ExecutionParameters {
            workers: None,
            batch_size: 5,
        },
    }
}

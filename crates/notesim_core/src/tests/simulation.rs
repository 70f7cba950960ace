//! Tests for multi-year engine runs

use crate::error::SimulationError;
use crate::model::{Allocation, MarketData, NoteTable, NoteTerms, YearData, note_return};
use crate::observe::{NullObserver, RecordingObserver};
use crate::simulation::{PortfolioSpec, RebalancingFrequency, SimulationEngine, SimulationPlan};
use crate::withdrawal::{FixedDollarConfig, FixedPercentageConfig, WithdrawalConfig};

use super::{
    assert_close, bond_return, equity_return, inflation, market_without_notes, sample_market,
};

fn structured() -> PortfolioSpec {
    PortfolioSpec::new(
        "structured",
        Allocation::from_parts(0.5, 0.2, 0.3, &NullObserver).unwrap(),
    )
}

fn traditional() -> PortfolioSpec {
    PortfolioSpec::new(
        "traditional",
        Allocation::from_parts(0.6, 0.0, 0.4, &NullObserver).unwrap(),
    )
}

fn equity_only() -> PortfolioSpec {
    PortfolioSpec::new(
        "equity",
        Allocation::from_parts(1.0, 0.0, 0.0, &NullObserver).unwrap(),
    )
}

#[test]
fn test_equity_only_path_compounds_returns() {
    let market = sample_market();
    let plan = SimulationPlan::new(2003, 2005, 100_000.0).portfolio(equity_only());
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    let path = &paths[0];
    assert_eq!(path.years.len(), 3);
    let expected = 100_000.0 * (1.0 + 0.287) * (1.0 + 0.109) * (1.0 + 0.049);
    assert_close(path.terminal_value(), expected, 1e-6);

    for (row, year) in path.years.iter().zip(2003..) {
        assert_eq!(row.calendar_year, year);
        assert_eq!(row.equity_return, equity_return(year));
        assert_eq!(row.bond_return, bond_return(year));
        assert_eq!(row.inflation_rate, inflation(year));
        assert_close(row.portfolio_return, equity_return(year), 1e-12);
    }
}

#[test]
fn test_initial_state_row() {
    let market = sample_market();
    let plan = SimulationPlan::new(2001, 2002, 1_000_000.0)
        .portfolio(structured())
        .record_initial_state(true);
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    let rows = &paths[0].years;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0].year, 0);
    assert_eq!(rows[0].calendar_year, 2000);
    assert_eq!(rows[0].ending_value, 1_000_000.0);
    assert_eq!(rows[0].portfolio_return, 0.0);
    assert_eq!(rows[0].inflation_rate, 0.0);
    assert_close(rows[0].note_value, 200_000.0, 1e-6);
    assert_eq!(rows[1].year, 1);
    assert_eq!(rows[2].year, 2);
    assert_eq!(rows[2].calendar_year, 2002);
}

#[test]
fn test_note_return_uses_selected_terms() {
    let market = sample_market();
    let plan = SimulationPlan::new(2001, 2004, 1_000_000.0)
        .portfolio(structured())
        .protection_level(0.10);
    let observer = RecordingObserver::new();
    let paths = SimulationEngine::new(&market, plan, &observer)
        .unwrap()
        .run()
        .unwrap();

    for row in &paths[0].years {
        let expected = note_return(
            equity_return(row.calendar_year),
            0.92,
            0.10,
            Default::default(),
        );
        assert_close(row.note_return, expected, 1e-12);
    }
    assert_eq!(observer.count("note_resolved"), 4);
    assert_eq!(observer.count("note_fallback"), 0);
}

#[test]
fn test_missing_note_table_falls_back_with_warning() {
    let market = market_without_notes();
    let plan = SimulationPlan::new(2001, 2002, 1_000_000.0)
        .portfolio(structured())
        .protection_level(0.15);
    let observer = RecordingObserver::new();
    let paths = SimulationEngine::new(&market, plan, &observer)
        .unwrap()
        .run()
        .unwrap();

    // Default terms: 10% buffer, full participation
    assert_close(paths[0].years[0].note_return, -0.019, 1e-12);
    assert_eq!(observer.count("note_fallback"), 2);
}

#[test]
fn test_pre_selected_note_overrides_table() {
    let market = sample_market();
    let pre = NoteTerms {
        participation_rate: 1.5,
        protection_level: 0.30,
        ..NoteTerms::fallback(2003)
    };
    let plan = SimulationPlan::new(2003, 2003, 1_000.0)
        .portfolio(structured())
        .protection_level(0.10)
        .pre_select_note(pre);
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    assert_close(paths[0].years[0].note_return, 0.287 * 1.5, 1e-12);
}

#[test]
fn test_traditional_portfolio_skips_note_resolution() {
    let market = sample_market();
    let plan = SimulationPlan::new(2001, 2003, 1_000.0).portfolio(traditional());
    let observer = RecordingObserver::new();
    let paths = SimulationEngine::new(&market, plan, &observer)
        .unwrap()
        .run()
        .unwrap();

    assert!(paths[0].years.iter().all(|r| r.note_return == 0.0 && r.note_value == 0.0));
    assert_eq!(observer.count("note_resolved"), 0);
}

#[test]
fn test_rows_are_consistent_after_withdrawal() {
    let market = sample_market();
    let withdrawal = FixedPercentageConfig::new(0.04, Some(0.02)).unwrap();
    let plan = SimulationPlan::new(2000, 2010, 1_000_000.0)
        .portfolio(structured())
        .portfolio(traditional())
        .protection_level(0.10)
        .withdrawal(WithdrawalConfig::FixedPercentage(withdrawal));
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    assert_eq!(paths.len(), 2);
    for path in &paths {
        assert_eq!(path.years.len(), 11);
        let mut previous_end = 1_000_000.0;
        for row in &path.years {
            assert_close(row.starting_value, previous_end, 1e-6);
            assert_close(
                row.equity_value + row.note_value + row.bond_value,
                row.ending_value,
                1e-6,
            );
            assert!(row.withdrawal_amount <= row.starting_value * (1.0 + row.portfolio_return) + 1e-6);
            assert_close(
                row.starting_value * (1.0 + row.portfolio_return) - row.withdrawal_amount,
                row.ending_value,
                1e-6,
            );
            previous_end = row.ending_value;
        }
    }
}

#[test]
fn test_each_portfolio_owns_its_withdrawal_state() {
    let market = sample_market();
    let withdrawal = FixedPercentageConfig::new(0.04, Some(0.0)).unwrap();
    let plan = SimulationPlan::new(2001, 2002, 1_000_000.0)
        .portfolio(equity_only())
        .portfolio(traditional())
        .withdrawal(WithdrawalConfig::FixedPercentage(withdrawal));
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    // Anchors differ because each path captured its own first value
    let equity_anchor = 1_000_000.0 * (1.0 + equity_return(2001));
    let traditional_anchor =
        1_000_000.0 * (0.6 * (1.0 + equity_return(2001)) + 0.4 * (1.0 + bond_return(2001)));
    assert_close(paths[0].years[1].withdrawal_amount, 0.04 * equity_anchor, 1e-6);
    assert_close(paths[1].years[1].withdrawal_amount, 0.04 * traditional_anchor, 1e-6);
}

#[test]
fn test_stop_on_depletion() {
    let market = sample_market();
    let withdrawal = WithdrawalConfig::FixedDollar(FixedDollarConfig::new(600_000.0, None).unwrap());
    let base = SimulationPlan::new(2000, 2005, 1_000_000.0)
        .portfolio(traditional())
        .withdrawal(withdrawal);

    let observer = RecordingObserver::new();
    let stopped = SimulationEngine::new(&market, base.clone().stop_on_depletion(true), &observer)
        .unwrap()
        .run()
        .unwrap();
    let rows = &stopped[0].years;
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].ending_value, 0.0);
    assert!(!stopped[0].summary().success);
    assert_eq!(observer.count("portfolio_depleted"), 1);

    // Depleted in 2001 and empty through 2005, reported once
    let observer = RecordingObserver::new();
    let continued = SimulationEngine::new(&market, base, &observer)
        .unwrap()
        .run()
        .unwrap();
    assert_eq!(continued[0].years.len(), 6);
    assert!(continued[0].years[1..].iter().all(|r| r.ending_value == 0.0));
    assert_eq!(observer.count("portfolio_depleted"), 1);
    assert_eq!(observer.count("year_completed"), 6);
}

#[test]
fn test_buy_and_hold_lets_weights_drift() {
    let market = sample_market();
    let plan = SimulationPlan::new(2003, 2004, 1_000.0)
        .portfolio(traditional())
        .rebalancing(RebalancingFrequency::Never);
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    let last = &paths[0].years[1];
    let equity = 600.0 * (1.0 + equity_return(2003)) * (1.0 + equity_return(2004));
    let bonds = 400.0 * (1.0 + bond_return(2003)) * (1.0 + bond_return(2004));
    assert_close(last.equity_value, equity, 1e-9);
    assert_close(last.bond_value, bonds, 1e-9);
}

#[test]
fn test_data_gap_aborts_run() {
    let mut rows: Vec<YearData> = sample_market().years().cloned().collect();
    rows.retain(|y| y.year != 2003);
    let market = MarketData::new(rows, NoteTable::new());
    let plan = SimulationPlan::new(2001, 2005, 1_000.0).portfolio(traditional());

    let err = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap_err();
    assert!(matches!(err, SimulationError::DataGap { year: 2003, .. }));
}

#[test]
fn test_invalid_plans_are_rejected() {
    let market = sample_market();
    let empty = SimulationPlan::new(2001, 2005, 1_000.0);
    assert!(SimulationEngine::new(&market, empty, &NullObserver).is_err());

    let backwards = SimulationPlan::new(2005, 2001, 1_000.0).portfolio(traditional());
    assert!(SimulationEngine::new(&market, backwards, &NullObserver).is_err());

    let broke = SimulationPlan::new(2001, 2005, 0.0).portfolio(traditional());
    assert!(SimulationEngine::new(&market, broke, &NullObserver).is_err());

    let bad_level = SimulationPlan::new(2001, 2005, 1_000.0)
        .portfolio(structured())
        .protection_level(1.2);
    assert!(matches!(
        SimulationEngine::new(&market, bad_level, &NullObserver),
        Err(SimulationError::Config(_))
    ));
}

#[test]
fn test_path_summary() {
    let market = sample_market();
    let plan = SimulationPlan::new(2001, 2010, 1_000_000.0)
        .portfolio(structured())
        .protection_level(0.05)
        .record_initial_state(true);
    let paths = SimulationEngine::new(&market, plan, &NullObserver)
        .unwrap()
        .run()
        .unwrap();

    let summary = paths[0].summary();
    let terminal = paths[0].terminal_value();
    assert_eq!(summary.terminal_value, terminal);
    assert!(summary.success);
    assert_close(
        summary.cagr,
        (terminal / 1_000_000.0).powf(1.0 / 10.0) - 1.0,
        1e-12,
    );
    assert!(summary.volatility > 0.0);
    assert!(summary.max_drawdown > 0.0 && summary.max_drawdown < 1.0);
    assert!(summary.inflation_adjusted_terminal < terminal);
}

//! Historical replay of one or more portfolios over a range of years
//!
//! Each year the engine fetches equity and bond returns, resolves the note
//! for the year when any portfolio holds notes, and then for every portfolio
//! applies returns, withdraws, records a [`YearlyResult`] and rebalances.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, SimulationError};
use crate::metrics::summarize;
use crate::model::{
    Allocation, AssetClass, AssetReturns, MarketData, NoteSelector, NoteTerms, SimulationSummary,
    YearlyResult,
};
use crate::observe::{Observer, SimEvent};
use crate::portfolio::Portfolio;
use crate::withdrawal::{WithdrawalConfig, WithdrawalStrategy};

pub const DEFAULT_INFLATION_RATE: f64 = 0.02;

/// When portfolios return to their target weights
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalancingFrequency {
    #[default]
    Annual,
    /// Buy and hold, weights drift with returns
    Never,
}

/// A named portfolio to simulate
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSpec {
    pub name: String,
    pub allocation: Allocation,
}

impl PortfolioSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, allocation: Allocation) -> Self {
        PortfolioSpec {
            name: name.into(),
            allocation,
        }
    }
}

/// Everything one engine run needs besides market data
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// First calendar year whose returns are applied
    pub first_year: i16,
    /// Last calendar year whose returns are applied
    pub last_year: i16,
    pub initial_value: f64,
    pub portfolios: Vec<PortfolioSpec>,
    pub protection_level: Option<f64>,
    pub pre_selected_notes: FxHashMap<i16, NoteTerms>,
    pub withdrawal: Option<WithdrawalConfig>,
    pub rebalancing: RebalancingFrequency,
    /// Used for years without an inflation observation
    pub fallback_inflation_rate: f64,
    /// Emit a year-0 row with the starting allocation
    pub record_initial_state: bool,
    /// Stop a portfolio once its value reaches zero
    pub stop_on_depletion: bool,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(first_year: i16, last_year: i16, initial_value: f64) -> Self {
        SimulationPlan {
            first_year,
            last_year,
            initial_value,
            portfolios: Vec::new(),
            protection_level: None,
            pre_selected_notes: FxHashMap::default(),
            withdrawal: None,
            rebalancing: RebalancingFrequency::Annual,
            fallback_inflation_rate: DEFAULT_INFLATION_RATE,
            record_initial_state: false,
            stop_on_depletion: false,
        }
    }

    #[must_use]
    pub fn portfolio(mut self, spec: PortfolioSpec) -> Self {
        self.portfolios.push(spec);
        self
    }

    #[must_use]
    pub fn protection_level(mut self, level: f64) -> Self {
        self.protection_level = Some(level);
        self
    }

    #[must_use]
    pub fn pre_select_note(mut self, terms: NoteTerms) -> Self {
        self.pre_selected_notes.insert(terms.calendar_year, terms);
        self
    }

    #[must_use]
    pub fn withdrawal(mut self, config: WithdrawalConfig) -> Self {
        self.withdrawal = Some(config);
        self
    }

    #[must_use]
    pub fn rebalancing(mut self, frequency: RebalancingFrequency) -> Self {
        self.rebalancing = frequency;
        self
    }

    #[must_use]
    pub fn fallback_inflation_rate(mut self, rate: f64) -> Self {
        self.fallback_inflation_rate = rate;
        self
    }

    #[must_use]
    pub fn record_initial_state(mut self, enabled: bool) -> Self {
        self.record_initial_state = enabled;
        self
    }

    #[must_use]
    pub fn stop_on_depletion(mut self, enabled: bool) -> Self {
        self.stop_on_depletion = enabled;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.portfolios.is_empty() {
            return Err(ConfigError::EmptyAxis("portfolios"));
        }
        if !self.initial_value.is_finite() || self.initial_value <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "initial_value",
                value: self.initial_value,
                reason: "must be a positive finite number",
            });
        }
        if self.last_year < self.first_year {
            return Err(ConfigError::OutOfRange {
                field: "last_year",
                value: f64::from(self.last_year),
                reason: "must not precede first_year",
            });
        }
        if let Some(level) = self.protection_level {
            if !(level > 0.0 && level < 1.0) {
                return Err(ConfigError::OutOfRange {
                    field: "protection_level",
                    value: level,
                    reason: "must lie strictly between 0 and 1",
                });
            }
        }
        if !self.fallback_inflation_rate.is_finite() || self.fallback_inflation_rate <= -1.0 {
            return Err(ConfigError::OutOfRange {
                field: "fallback_inflation_rate",
                value: self.fallback_inflation_rate,
                reason: "must be finite and greater than -1",
            });
        }
        Ok(())
    }
}

/// Yearly history of one simulated portfolio
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioPath {
    pub name: String,
    pub initial_value: f64,
    pub years: Vec<YearlyResult>,
}

impl PortfolioPath {
    #[must_use]
    pub fn summary(&self) -> SimulationSummary {
        summarize(self.initial_value, &self.years)
    }

    #[must_use]
    pub fn terminal_value(&self) -> f64 {
        self.years
            .last()
            .map_or(self.initial_value, |r| r.ending_value)
    }
}

struct PathState {
    name: String,
    portfolio: Portfolio,
    withdrawal: Option<WithdrawalStrategy>,
    years: Vec<YearlyResult>,
    active: bool,
    /// Depleted as of the last simulated year
    depleted: bool,
}

impl PathState {
    fn initial_row(&self, calendar_year: i16) -> YearlyResult {
        let value = self.portfolio.current_value();
        YearlyResult {
            year: 0,
            calendar_year,
            starting_value: value,
            ending_value: value,
            equity_value: self.portfolio.asset_value(AssetClass::Equity),
            note_value: self.portfolio.asset_value(AssetClass::Notes),
            bond_value: self.portfolio.asset_value(AssetClass::Bonds),
            ..Default::default()
        }
    }
}

/// Drives every portfolio of a plan through the same historical years
pub struct SimulationEngine<'a> {
    market: &'a MarketData,
    plan: SimulationPlan,
    observer: &'a dyn Observer,
}

impl<'a> SimulationEngine<'a> {
    pub fn new(
        market: &'a MarketData,
        plan: SimulationPlan,
        observer: &'a dyn Observer,
    ) -> Result<Self, SimulationError> {
        plan.validate()?;
        Ok(SimulationEngine {
            market,
            plan,
            observer,
        })
    }

    #[must_use]
    pub fn plan(&self) -> &SimulationPlan {
        &self.plan
    }

    /// Run every year of the plan. A missing equity or bond return aborts
    /// the whole run.
    pub fn run(self) -> Result<Vec<PortfolioPath>, SimulationError> {
        let plan = &self.plan;
        let observer = self.observer;

        let mut paths: Vec<PathState> = plan
            .portfolios
            .iter()
            .map(|spec| PathState {
                name: spec.name.clone(),
                portfolio: Portfolio::new(plan.initial_value, spec.allocation.clone()),
                withdrawal: plan
                    .withdrawal
                    .clone()
                    .map(WithdrawalStrategy::from_config),
                years: Vec::new(),
                active: true,
                depleted: false,
            })
            .collect();

        if plan.record_initial_state {
            for path in &mut paths {
                let row = path.initial_row(plan.first_year - 1);
                path.years.push(row);
            }
        }

        let needs_notes = plan.portfolios.iter().any(|p| p.allocation.holds_notes());
        let selector = NoteSelector::new(
            self.market.notes(),
            &plan.pre_selected_notes,
            plan.protection_level,
        );

        for (index, year) in (plan.first_year..=plan.last_year).enumerate() {
            if paths.iter().all(|p| !p.active) {
                break;
            }

            let equity_return = self.market.equity_return(year)?;
            let bond_return = self.market.bond_return(year)?;
            let inflation_rate = self
                .market
                .inflation_rate(year)
                .unwrap_or(plan.fallback_inflation_rate);

            let mut returns = AssetReturns::new()
                .with(AssetClass::Equity, equity_return)
                .with(AssetClass::Bonds, bond_return);
            let mut note_return = 0.0;
            if needs_notes {
                let (terms, _) = selector.resolve(year, observer);
                note_return = terms.calculate_return(equity_return);
                observer.record(&SimEvent::NoteResolved {
                    year,
                    note_id: terms.note_id(),
                    participation_rate: terms.participation_rate,
                    note_return,
                });
                returns.set(AssetClass::Notes, note_return);
            }

            let year_index = u16::try_from(index + 1).unwrap_or(u16::MAX);
            for path in paths.iter_mut().filter(|p| p.active) {
                let portfolio = &mut path.portfolio;
                let starting_value = portfolio.current_value();
                portfolio.apply_returns(&returns, observer);
                let portfolio_return = portfolio.annual_return();

                let requested = match path.withdrawal.as_mut() {
                    Some(strategy) => strategy.calculate_withdrawal(portfolio, year)?,
                    None => 0.0,
                };
                let withdrawal_amount = portfolio.withdraw(requested, observer);

                path.years.push(YearlyResult {
                    year: year_index,
                    calendar_year: year,
                    starting_value,
                    ending_value: portfolio.current_value(),
                    withdrawal_amount,
                    equity_return,
                    note_return,
                    bond_return,
                    portfolio_return,
                    equity_value: portfolio.asset_value(AssetClass::Equity),
                    note_value: portfolio.asset_value(AssetClass::Notes),
                    bond_value: portfolio.asset_value(AssetClass::Bonds),
                    inflation_rate,
                });
                observer.record(&SimEvent::YearCompleted {
                    portfolio: path.name.clone(),
                    year,
                    ending_value: portfolio.current_value(),
                    portfolio_return,
                });

                let depleted = portfolio.is_depleted();
                if depleted && !path.depleted {
                    observer.record(&SimEvent::PortfolioDepleted {
                        portfolio: path.name.clone(),
                        year,
                    });
                }
                path.depleted = depleted;
                if depleted && plan.stop_on_depletion {
                    path.active = false;
                    continue;
                }

                if plan.rebalancing == RebalancingFrequency::Annual {
                    portfolio.rebalance();
                }
            }
        }

        Ok(paths
            .into_iter()
            .map(|p| PortfolioPath {
                name: p.name,
                initial_value: plan.initial_value,
                years: p.years,
            })
            .collect())
    }
}

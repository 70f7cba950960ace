//! Structured-note portfolio simulation library
//!
//! This crate replays historical market returns through portfolios that mix
//! equities, bonds and structured notes. It supports:
//! - Black-Scholes participation-rate pricing for buffered/floored notes
//! - Buffer and Floor payoff rules applied to realized annual returns
//! - Annual rebalancing with proportional withdrawals
//! - Fixed-percentage, fixed-dollar and RMD withdrawal strategies
//! - Parameter sweeps across start years, horizons, protection levels and
//!   withdrawal rates, executed on a worker pool with a single-writer sink
//!
//! # Example
//!
//! ```ignore
//! use notesim_core::model::{Allocation, MarketData};
//! use notesim_core::observe::NullObserver;
//! use notesim_core::simulation::{PortfolioSpec, SimulationEngine, SimulationPlan};
//!
//! let allocation = Allocation::from_parts(0.5, 0.2, 0.3, &NullObserver)?;
//! let plan = SimulationPlan::new(1990, 2019, 1_000_000.0)
//!     .portfolio(PortfolioSpec::new("structured", allocation))
//!     .protection_level(0.10);
//! let paths = SimulationEngine::new(&market, plan, &NullObserver)?.run()?;
//! ```

#![warn(clippy::all)]

// ============================================================================
// Core modules
// ============================================================================

pub mod error;
pub mod math;
pub mod metrics;
pub mod observe;
pub mod portfolio;
pub mod pricing;
pub mod simulation;
pub mod sweep;
pub mod withdrawal;

// ============================================================================
// Type definition modules
// ============================================================================

pub mod model;

// ============================================================================
// Test modules
// ============================================================================

#[cfg(test)]
mod tests;

// ============================================================================
// Public re-exports for convenience
// ============================================================================

pub use error::{ConfigError, PricingError, SimulationError, SweepError};
pub use observe::{NullObserver, Observer, SimEvent};

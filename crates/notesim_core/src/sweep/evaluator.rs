//! Sweep execution: parallel evaluation, single-writer persistence.
//!
//! Runs are evaluated a batch at a time on the worker pool. Each finished
//! batch comes back to the calling thread in enumeration order and is
//! handed to the [`ResultSink`] before the next batch is dispatched, so the
//! sink sees identical input in identical order on every run.

use std::any::Any;
use std::convert::Infallible;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::{ConfigError, SimulationError, SweepError};
use crate::model::{MarketData, SimulationParameters, SimulationRecord};
use crate::observe::{Observer, SimEvent};
use crate::simulation::{PortfolioSpec, SimulationEngine, SimulationPlan};

use super::{SweepConfig, generate_parameters};

/// Progress tracking for a running sweep
#[derive(Debug, Clone)]
pub struct SweepProgress {
    /// Runs evaluated so far, failures included
    completed: Arc<AtomicUsize>,
    total: Arc<AtomicUsize>,
    cancelled: Arc<AtomicBool>,
}

impl SweepProgress {
    #[must_use]
    pub fn new(total: usize) -> Self {
        Self {
            completed: Arc::new(AtomicUsize::new(0)),
            total: Arc::new(AtomicUsize::new(total)),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Completed share in `[0, 1]`
    #[must_use]
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.completed() as f64 / total as f64
        }
    }

    pub fn add(&self, runs: usize) {
        self.completed.fetch_add(runs, Ordering::Relaxed);
    }

    pub fn reset(&self, total: usize) {
        self.completed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Stop dispatching further batches. The batch in flight still finishes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

impl Default for SweepProgress {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Destination for completed runs. Only ever called from one thread.
pub trait ResultSink {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write_batch(&mut self, records: &[SimulationRecord]) -> Result<(), Self::Error>;
}

impl ResultSink for Vec<SimulationRecord> {
    type Error = Infallible;

    fn write_batch(&mut self, records: &[SimulationRecord]) -> Result<(), Self::Error> {
        self.extend_from_slice(records);
        Ok(())
    }
}

/// A run that errored or panicked and was left out of the results
#[derive(Debug, Clone, PartialEq)]
pub struct FailedRun {
    pub sim_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepOutcome {
    /// Runs written to the sink
    pub completed: usize,
    pub failed: Vec<FailedRun>,
    /// Combinations excluded because they ran past the market data
    pub skipped: usize,
    pub cancelled: bool,
}

/// Execute one sweep run: a year-0 row, then the returns of
/// `start_year + 1 ..= start_year + horizon`, stopping early on depletion.
pub fn run_single(
    config: &SweepConfig,
    params: &SimulationParameters,
    market: &MarketData,
    observer: &dyn Observer,
) -> Result<SimulationRecord, SimulationError> {
    let first_year = params.start_year + 1;
    market.aligned_years(first_year, params.end_year(), false)?;
    let allocation = config.allocation(&params.portfolio_type, observer)?;
    let withdrawal = config.withdrawal_config(params.withdrawal_rate, first_year)?;
    let initial = &config.initial_conditions;

    let mut plan = SimulationPlan::new(first_year, params.end_year(), initial.starting_amount)
        .portfolio(PortfolioSpec::new(params.portfolio_type.clone(), allocation))
        .withdrawal(withdrawal)
        .rebalancing(initial.rebalancing_frequency)
        .fallback_inflation_rate(initial.fallback_inflation_rate)
        .record_initial_state(true)
        .stop_on_depletion(true);
    if let Some(level) = params.protection_level {
        plan = plan.protection_level(level);
    }

    let path = SimulationEngine::new(market, plan, observer)?
        .run()?
        .into_iter()
        .next()
        .ok_or(ConfigError::EmptyAxis("portfolios"))?;

    Ok(SimulationRecord {
        sim_id: params.sim_id(),
        params: params.clone(),
        summary: path.summary(),
        years: path.years,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "simulation panicked".to_string()
    }
}

/// Runs the whole cross-product of a [`SweepConfig`] against one market
pub struct SweepRunner<'a> {
    config: &'a SweepConfig,
    market: &'a MarketData,
    observer: &'a dyn Observer,
    progress: SweepProgress,
}

impl<'a> SweepRunner<'a> {
    #[must_use]
    pub fn new(config: &'a SweepConfig, market: &'a MarketData, observer: &'a dyn Observer) -> Self {
        SweepRunner {
            config,
            market,
            observer,
            progress: SweepProgress::default(),
        }
    }

    /// Share progress and cancellation with the caller
    #[must_use]
    pub fn with_progress(mut self, progress: SweepProgress) -> Self {
        self.progress = progress;
        self
    }

    #[must_use]
    pub fn progress(&self) -> &SweepProgress {
        &self.progress
    }

    fn evaluate(&self, params: &SimulationParameters) -> Result<SimulationRecord, FailedRun> {
        let result = catch_unwind(AssertUnwindSafe(|| {
            run_single(self.config, params, self.market, self.observer)
        }));
        let reason = match result {
            Ok(Ok(record)) => return Ok(record),
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        Err(FailedRun {
            sim_id: params.sim_id(),
            reason,
        })
    }

    #[cfg(feature = "parallel")]
    fn evaluate_batch(
        &self,
        batch: &[SimulationParameters],
        pool: Option<&rayon::ThreadPool>,
    ) -> Vec<Result<SimulationRecord, FailedRun>> {
        let work = || -> Vec<Result<SimulationRecord, FailedRun>> {
            batch.par_iter().map(|p| self.evaluate(p)).collect()
        };
        match pool {
            Some(pool) => pool.install(work),
            None => work(),
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_batch(
        &self,
        batch: &[SimulationParameters],
    ) -> Vec<Result<SimulationRecord, FailedRun>> {
        batch.iter().map(|p| self.evaluate(p)).collect()
    }

    /// Evaluate every run and stream the results into `sink`.
    ///
    /// Failed runs are reported and skipped. A sink error stops the sweep.
    pub fn run<S: ResultSink>(&self, sink: &mut S) -> Result<SweepOutcome, SweepError> {
        let last_year = self
            .market
            .last_year()
            .ok_or(ConfigError::EmptyAxis("market years"))?;
        let grid = generate_parameters(self.config, last_year)?;
        let total = grid.len();

        self.progress.reset(total);
        self.observer.record(&SimEvent::SweepStarted {
            total,
            skipped: grid.skipped,
        });

        #[cfg(feature = "parallel")]
        let pool = match self.config.execution.workers {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| SweepError::WorkerPool(e.to_string()))?,
            ),
            None => None,
        };

        let mut outcome = SweepOutcome {
            skipped: grid.skipped,
            ..Default::default()
        };

        for batch in grid.runs.chunks(self.config.execution.batch_size) {
            if self.progress.is_cancelled() {
                outcome.cancelled = true;
                break;
            }

            #[cfg(feature = "parallel")]
            let results = self.evaluate_batch(batch, pool.as_ref());
            #[cfg(not(feature = "parallel"))]
            let results = self.evaluate_batch(batch);

            let mut records = Vec::with_capacity(results.len());
            for result in results {
                match result {
                    Ok(record) => records.push(record),
                    Err(failed) => {
                        self.observer.record(&SimEvent::SimulationFailed {
                            sim_id: failed.sim_id.clone(),
                            reason: failed.reason.clone(),
                        });
                        outcome.failed.push(failed);
                    }
                }
            }

            sink.write_batch(&records)
                .map_err(|e| SweepError::Persistence(Box::new(e)))?;
            outcome.completed += records.len();
            self.progress.add(batch.len());
            self.observer.record(&SimEvent::BatchWritten {
                completed: self.progress.completed(),
                total,
            });
        }

        self.observer.record(&SimEvent::SweepFinished {
            completed: outcome.completed,
            failed: outcome.failed.len(),
            cancelled: outcome.cancelled,
        });
        Ok(outcome)
    }
}

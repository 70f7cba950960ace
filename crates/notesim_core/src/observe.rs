//! Observability sink injected into simulation components.
//!
//! The core never writes to a global logger. Components take a
//! `&dyn Observer` and report typed [`SimEvent`]s; the host decides where they
//! go (the `notesim` binary forwards them to `tracing`).

use std::sync::{Mutex, PoisonError};

use crate::model::AssetClass;

/// Severity attached to each event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// Something worth reporting while simulating
#[derive(Debug, Clone, PartialEq)]
pub enum SimEvent {
    /// Allocation weights did not sum to 1 and were rescaled
    AllocationNormalized { original_sum: f64 },
    /// A held asset had no return for the year and kept its value
    MissingReturn { asset: AssetClass },
    /// Withdrawal request exceeded the portfolio value and was capped
    WithdrawalShortfall { requested: f64, available: f64 },
    /// No note table for the year, default terms substituted
    NoteFallback { year: i16 },
    /// Requested protection level not tabulated, nearest one used
    ClosestNoteSelected {
        year: i16,
        requested: f64,
        selected: f64,
    },
    /// Note terms chosen for a year and the resulting note return
    NoteResolved {
        year: i16,
        note_id: String,
        participation_rate: f64,
        note_return: f64,
    },
    /// A portfolio path finished a year
    YearCompleted {
        portfolio: String,
        year: i16,
        ending_value: f64,
        portfolio_return: f64,
    },
    /// A portfolio ran out of money
    PortfolioDepleted { portfolio: String, year: i16 },
    /// One sweep run failed and was excluded from the results
    SimulationFailed { sim_id: String, reason: String },
    SweepStarted { total: usize, skipped: usize },
    BatchWritten { completed: usize, total: usize },
    SweepFinished {
        completed: usize,
        failed: usize,
        cancelled: bool,
    },
}

impl SimEvent {
    #[must_use]
    pub fn level(&self) -> Level {
        match self {
            SimEvent::NoteResolved { .. } | SimEvent::YearCompleted { .. } => Level::Debug,
            SimEvent::PortfolioDepleted { .. }
            | SimEvent::SweepStarted { .. }
            | SimEvent::BatchWritten { .. }
            | SimEvent::SweepFinished { .. }
            | SimEvent::ClosestNoteSelected { .. } => Level::Info,
            SimEvent::AllocationNormalized { .. }
            | SimEvent::MissingReturn { .. }
            | SimEvent::WithdrawalShortfall { .. }
            | SimEvent::NoteFallback { .. } => Level::Warn,
            SimEvent::SimulationFailed { .. } => Level::Error,
        }
    }

    /// Stable event name for structured sinks
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SimEvent::AllocationNormalized { .. } => "allocation_normalized",
            SimEvent::MissingReturn { .. } => "missing_return",
            SimEvent::WithdrawalShortfall { .. } => "withdrawal_shortfall",
            SimEvent::NoteFallback { .. } => "note_fallback",
            SimEvent::ClosestNoteSelected { .. } => "closest_note_selected",
            SimEvent::NoteResolved { .. } => "note_resolved",
            SimEvent::YearCompleted { .. } => "year_completed",
            SimEvent::PortfolioDepleted { .. } => "portfolio_depleted",
            SimEvent::SimulationFailed { .. } => "simulation_failed",
            SimEvent::SweepStarted { .. } => "sweep_started",
            SimEvent::BatchWritten { .. } => "batch_written",
            SimEvent::SweepFinished { .. } => "sweep_finished",
        }
    }
}

/// Receiver for simulation events. Shared across worker threads.
pub trait Observer: Send + Sync {
    fn record(&self, event: &SimEvent);
}

/// Discards every event
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl Observer for NullObserver {
    fn record(&self, _event: &SimEvent) {}
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<SimEvent>>,
}

impl RecordingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    #[must_use]
    pub fn events(&self) -> Vec<SimEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events with the given name
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.name() == name)
            .count()
    }
}

impl Observer for RecordingObserver {
    fn record(&self, event: &SimEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_counts_by_name() {
        let observer = RecordingObserver::new();
        observer.record(&SimEvent::NoteFallback { year: 2001 });
        observer.record(&SimEvent::NoteFallback { year: 2002 });
        observer.record(&SimEvent::MissingReturn {
            asset: AssetClass::Notes,
        });

        assert_eq!(observer.count("note_fallback"), 2);
        assert_eq!(observer.count("missing_return"), 1);
        assert_eq!(observer.events().len(), 3);
    }

    #[test]
    fn test_event_levels() {
        assert_eq!(SimEvent::NoteFallback { year: 2001 }.level(), Level::Warn);
        assert_eq!(
            SimEvent::SimulationFailed {
                sim_id: "x".into(),
                reason: "y".into()
            }
            .level(),
            Level::Error
        );
        assert!(Level::Debug < Level::Warn);
    }
}

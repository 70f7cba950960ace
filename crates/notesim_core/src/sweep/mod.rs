//! Parameter sweeps over historical start years.
//!
//! A sweep enumerates start year x horizon x portfolio x protection level x
//! withdrawal rate, runs each combination as an independent simulation and
//! streams the results to a single writer.
//!
//! ```ignore
//! use notesim_core::sweep::{SweepConfig, SweepRunner};
//!
//! let mut records = Vec::new();
//! let outcome = SweepRunner::new(&config, &market, &observer).run(&mut records)?;
//! assert_eq!(outcome.completed, records.len());
//! ```

mod config;
mod evaluator;
mod grid;

pub use config::{
    AllocationWeights, ExecutionParameters, InitialConditions, NoteParameters, OutputParameters,
    SweepConfig, TimeParameters, WithdrawalParameters,
};
pub use evaluator::{FailedRun, ResultSink, SweepOutcome, SweepProgress, SweepRunner, run_single};
pub use grid::{ParameterGrid, generate_parameters};

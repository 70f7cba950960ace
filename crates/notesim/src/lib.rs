//! Batch runner for notesim parameter sweeps.
//!
//! Loads a sweep parameter document and a market data file, runs every
//! combination through [`notesim_core`], and stores the results in SQLite.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod store;

pub use config::{LoadedConfig, load_market_data, load_sweep_config};
pub use error::{LoadError, StoreError};
pub use logging::{TracingObserver, init_logging};
pub use pipeline::{PipelineOptions, PipelineReport, run_pipeline};
pub use store::{ResultStore, SqliteSink};

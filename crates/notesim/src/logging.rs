use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Mutex;

use notesim_core::{Observer, SimEvent};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Size cap applied to the log file once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LogRotation {
    /// File size that triggers truncation
    max_bytes: u64,
    /// Tail of the file carried over after truncation
    retain_bytes: u64,
}

impl LogRotation {
    const STARTUP: LogRotation = LogRotation {
        max_bytes: 5 * 1024 * 1024,
        retain_bytes: 1024 * 1024,
    };

    const MARKER: &'static [u8] = b"[notesim] earlier entries truncated\n";

    /// Truncate `path` to its newest whole lines. Returns whether it did.
    fn apply(&self, path: &Path) -> io::Result<bool> {
        let len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if len <= self.max_bytes {
            return Ok(false);
        }

        let mut tail = Vec::with_capacity(self.retain_bytes as usize);
        let mut reader = File::open(path)?;
        reader.seek(SeekFrom::End(-(self.retain_bytes.min(len) as i64)))?;
        reader.read_to_end(&mut tail)?;

        let first_line = match tail.iter().position(|&b| b == b'\n') {
            Some(newline) => newline + 1,
            None => tail.len(),
        };

        let mut out = File::create(path)?;
        out.write_all(Self::MARKER)?;
        out.write_all(&tail[first_line..])?;
        Ok(true)
    }
}

/// Initialize logging to write to a file in the data directory.
///
/// Logs go to `{data_dir}/notesim.log`, trimmed at startup when it has grown
/// past 5 MB. The level comes from `level` unless `RUST_LOG` is set.
pub fn init_logging(data_dir: &Path, level: &str) -> color_eyre::Result<()> {
    fs::create_dir_all(data_dir)?;

    let log_path = data_dir.join("notesim.log");
    let rotated = LogRotation::STARTUP.apply(&log_path);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("notesim={level}")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true),
        )
        .init();

    match rotated {
        Ok(true) => tracing::info!(log_path = %log_path.display(), "Log file truncated"),
        Ok(false) => {}
        Err(e) => tracing::warn!(log_path = %log_path.display(), error = %e, "Log truncation failed"),
    }
    tracing::info!(log_path = %log_path.display(), "notesim logging initialized");
    Ok(())
}

/// Forwards simulation events to `tracing` under the `notesim::sim` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record(&self, event: &SimEvent) {
        match event {
            SimEvent::AllocationNormalized { original_sum } => {
                tracing::warn!(target: "notesim::sim", original_sum, "Allocation weights renormalized");
            }
            SimEvent::MissingReturn { asset } => {
                tracing::warn!(target: "notesim::sim", %asset, "No return for held asset, value unchanged");
            }
            SimEvent::WithdrawalShortfall {
                requested,
                available,
            } => {
                tracing::warn!(target: "notesim::sim", requested, available, "Withdrawal capped at portfolio value");
            }
            SimEvent::NoteFallback { year } => {
                tracing::warn!(target: "notesim::sim", year, "No note data for year, using default terms");
            }
            SimEvent::ClosestNoteSelected {
                year,
                requested,
                selected,
            } => {
                tracing::info!(target: "notesim::sim", year, requested, selected, "Using closest protection level");
            }
            SimEvent::NoteResolved {
                year,
                note_id,
                participation_rate,
                note_return,
            } => {
                tracing::debug!(target: "notesim::sim", year, %note_id, participation_rate, note_return, "Note resolved");
            }
            SimEvent::YearCompleted {
                portfolio,
                year,
                ending_value,
                portfolio_return,
            } => {
                tracing::debug!(target: "notesim::sim", %portfolio, year, ending_value, portfolio_return, "Year completed");
            }
            SimEvent::PortfolioDepleted { portfolio, year } => {
                tracing::info!(target: "notesim::sim", %portfolio, year, "Portfolio depleted");
            }
            SimEvent::SimulationFailed { sim_id, reason } => {
                tracing::error!(target: "notesim::sim", %sim_id, %reason, "Simulation failed");
            }
            SimEvent::SweepStarted { total, skipped } => {
                tracing::info!(target: "notesim::sim", total, skipped, "Sweep started");
            }
            SimEvent::BatchWritten { completed, total } => {
                let percent = if *total == 0 {
                    100.0
                } else {
                    *completed as f64 / *total as f64 * 100.0
                };
                tracing::info!(
                    target: "notesim::sim",
                    completed,
                    total,
                    "Completed {completed}/{total} simulations ({percent:.1}%)"
                );
            }
            SimEvent::SweepFinished {
                completed,
                failed,
                cancelled,
            } => {
                tracing::info!(target: "notesim::sim", completed, failed, cancelled, "Sweep finished");
            }
        }
    }
}

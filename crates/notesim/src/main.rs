use std::path::PathBuf;

use clap::Parser;
use notesim::{PipelineOptions, init_logging, run_pipeline};

#[derive(Parser, Debug)]
#[command(name = "notesim")]
#[command(about = "Structured-note portfolio simulator: runs parameter sweeps into SQLite")]
struct Args {
    /// Sweep parameter file (YAML)
    #[arg(long, default_value = "simulation_params.yaml")]
    params: PathBuf,

    /// Market data file (YAML or JSON)
    #[arg(long, default_value = "market_data.yaml")]
    market: PathBuf,

    /// Worker threads (default: one per core)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Skip creating the schema and archiving the parameter file
    #[arg(long)]
    skip_setup: bool,

    /// Log level (debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Path to the data directory holding the log (default: ~/.notesim/)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".notesim")
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
    init_logging(&data_dir, &args.log_level)?;

    let options = PipelineOptions {
        params: args.params,
        market: args.market,
        workers: args.workers,
        skip_setup: args.skip_setup,
    };
    let report = match run_pipeline(&options) {
        Ok(report) => report,
        Err(err) => {
            tracing::error!("Error in simulation process: {err:#}");
            return Err(err);
        }
    };

    let outcome = &report.outcome;
    println!(
        "{} simulations written to {} ({} failed, {} skipped) in {:.1}s",
        outcome.completed,
        report.database.display(),
        outcome.failed.len(),
        outcome.skipped,
        report.elapsed_seconds
    );
    for failed in &outcome.failed {
        println!("  failed: {} ({})", failed.sim_id, failed.reason);
    }
    println!("Summary exported to {}", report.summary_path.display());

    tracing::info!("Simulation process completed successfully");
    Ok(())
}

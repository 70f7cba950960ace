//! The batch run: load inputs, prepare the database, sweep, export.

use std::path::PathBuf;
use std::time::Instant;

use color_eyre::eyre::WrapErr;
use jiff::Zoned;
use notesim_core::sweep::{SweepOutcome, SweepRunner};

use crate::config::{load_market_data, load_sweep_config};
use crate::logging::TracingObserver;
use crate::store::ResultStore;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub params: PathBuf,
    pub market: PathBuf,
    /// Overrides `execution.workers` from the parameter file
    pub workers: Option<usize>,
    /// Assume the schema and parameter archive already exist
    pub skip_setup: bool,
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: SweepOutcome,
    pub database: PathBuf,
    pub summary_path: PathBuf,
    pub elapsed_seconds: f64,
}

pub fn run_pipeline(options: &PipelineOptions) -> color_eyre::Result<PipelineReport> {
    let started = Instant::now();

    let loaded = load_sweep_config(&options.params)?;
    let mut config = loaded.config;
    if let Some(workers) = options.workers {
        config.execution.workers = Some(workers);
        config.validate()?;
    }

    let market = load_market_data(&options.market, &config)?;
    let levels = &config.note_parameters.protection_levels;
    let output = &config.output_parameters;

    let mut store = ResultStore::open(&output.database_file)
        .wrap_err_with(|| format!("opening {}", output.database_file.display()))?;
    if options.skip_setup {
        tracing::info!("Skipping database setup");
    } else {
        store.init_schema(levels)?;
        store.save_parameter_file(
            &config.simulation_name,
            &loaded.source,
            &jiff::Timestamp::now().to_string(),
        )?;
    }
    store.populate_market_conditions(&market, levels)?;

    let outcome = {
        let observer = TracingObserver;
        let mut sink = store.sink(config.simulation_name.clone());
        SweepRunner::new(&config, &market, &observer)
            .run(&mut sink)
            .wrap_err("running simulations")?
    };

    let stamp = Zoned::now().strftime("%Y%m%d_%H%M%S").to_string();
    let summary_path = output
        .results_directory
        .join(format!("summary_results_{stamp}.json"));
    store.export_summary_json(&summary_path)?;

    let elapsed_seconds = started.elapsed().as_secs_f64();
    tracing::info!(
        completed = outcome.completed,
        failed = outcome.failed.len(),
        skipped = outcome.skipped,
        "All simulations completed in {elapsed_seconds:.1} seconds"
    );

    Ok(PipelineReport {
        outcome,
        database: output.database_file.clone(),
        summary_path,
        elapsed_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MARKET: &str = r#"
years:
  - {year: 2000, equity_return: -0.091, bond_return: 0.116, inflation_rate: 0.034, treasury_rate: 0.058, vix_level: 0.23}
  - {year: 2001, equity_return: -0.119, bond_return: 0.084, inflation_rate: 0.028, treasury_rate: 0.034, vix_level: 0.26}
  - {year: 2002, equity_return: -0.221, bond_return: 0.103, inflation_rate: 0.016, treasury_rate: 0.016, vix_level: 0.27}
  - {year: 2003, equity_return: 0.287, bond_return: 0.041, inflation_rate: 0.023, treasury_rate: 0.010, vix_level: 0.22}
"#;

    fn params(db: &std::path::Path, results: &std::path::Path) -> String {
        format!(
            r#"
simulation_name: pipeline_test
time_parameters:
  start_years: [2000, 2001, 2002]
  time_horizons: [2]
portfolio_allocations:
  structured: {{equity: 0.5, notes: 0.2, bonds: 0.3}}
  traditional: {{equity: 0.6, bonds: 0.4}}
note_parameters:
  protection_levels: [0.1]
withdrawal_parameters:
  rates: [0.04]
initial_conditions:
  starting_amount: 1000000.0
output_parameters:
  database_file: "{}"
  results_directory: "{}"
execution:
  batch_size: 3
"#,
            db.display(),
            results.display()
        )
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        let results = dir.path().join("results");
        let params_path = dir.path().join("params.yaml");
        let market_path = dir.path().join("market.yaml");
        fs::write(&params_path, params(&db, &results)).unwrap();
        fs::write(&market_path, MARKET).unwrap();

        let options = PipelineOptions {
            params: params_path,
            market: market_path,
            workers: Some(2),
            skip_setup: false,
        };
        let report = run_pipeline(&options).unwrap();

        // 2002 + 2 runs past 2003; the other two starts give two runs each
        assert_eq!(report.outcome.skipped, 1);
        assert_eq!(report.outcome.completed, 4);
        assert!(report.outcome.failed.is_empty());
        assert!(report.summary_path.starts_with(&results));
        assert!(report.summary_path.exists());

        let store = ResultStore::open(&db).unwrap();
        let rows = store.simulations().unwrap();
        assert_eq!(rows.len(), 4);
        assert!(rows.iter().all(|r| r.parameter_file == "pipeline_test"));
        assert_eq!(store.yearly_row_count(&rows[0].sim_id).unwrap(), 3);

        // Notes were priced from the market state, so participation is not the default
        let participation = store.market_participation(2000, 0.1).unwrap().unwrap();
        assert!(participation > 0.0 && participation != 1.0);
    }

    #[test]
    fn test_skip_setup_requires_existing_schema() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        let params_path = dir.path().join("params.yaml");
        let market_path = dir.path().join("market.yaml");
        fs::write(&params_path, params(&db, &dir.path().join("results"))).unwrap();
        fs::write(&market_path, MARKET).unwrap();

        let options = PipelineOptions {
            params: params_path,
            market: market_path,
            workers: None,
            skip_setup: true,
        };
        assert!(run_pipeline(&options).is_err());
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("results.db");
        let params_path = dir.path().join("params.yaml");
        let market_path = dir.path().join("market.yaml");
        fs::write(&params_path, params(&db, &dir.path().join("results"))).unwrap();
        fs::write(&market_path, MARKET).unwrap();

        let options = PipelineOptions {
            params: params_path,
            market: market_path,
            workers: Some(0),
            skip_setup: false,
        };
        assert!(run_pipeline(&options).is_err());
        assert!(!db.exists());
    }
}

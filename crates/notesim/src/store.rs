//! SQLite result store.
//!
//! Only this module issues SQL. The sweep writes through [`SqliteSink`],
//! one transaction per batch.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use notesim_core::model::{MarketData, SimulationRecord, percent_label};
use notesim_core::sweep::ResultSink;
use rusqlite::types::Value;
use rusqlite::{Connection, Transaction, params, params_from_iter};
use serde::Serialize;

use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS simulations (
    sim_id TEXT PRIMARY KEY,
    start_year INTEGER NOT NULL,
    portfolio_type TEXT NOT NULL,
    equity_allocation REAL NOT NULL,
    note_allocation REAL NOT NULL,
    bond_allocation REAL NOT NULL,
    protection_level REAL,
    withdrawal_rate REAL NOT NULL,
    time_horizon INTEGER NOT NULL,
    parameter_file TEXT NOT NULL,
    terminal_value REAL NOT NULL,
    success_flag INTEGER NOT NULL,
    cagr REAL NOT NULL,
    max_drawdown REAL NOT NULL,
    volatility REAL NOT NULL,
    inflation_adjusted_terminal REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS yearly_results (
    sim_id TEXT NOT NULL,
    year INTEGER NOT NULL,
    calendar_year INTEGER NOT NULL,
    starting_value REAL NOT NULL,
    ending_value REAL NOT NULL,
    withdrawal_amount REAL NOT NULL,
    equity_return REAL NOT NULL,
    note_return REAL NOT NULL,
    bond_return REAL NOT NULL,
    portfolio_return REAL NOT NULL,
    equity_value REAL NOT NULL,
    note_value REAL NOT NULL,
    bond_value REAL NOT NULL,
    inflation_rate REAL NOT NULL,
    PRIMARY KEY (sim_id, year)
);

CREATE TABLE IF NOT EXISTS market_conditions (
    calendar_year INTEGER PRIMARY KEY,
    sp500_return REAL,
    bond_return REAL,
    inflation_rate REAL,
    treasury_rate REAL,
    vix_level REAL
);

CREATE TABLE IF NOT EXISTS simulation_parameters (
    parameter_file TEXT PRIMARY KEY,
    file_content TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_yearly_sim_id ON yearly_results(sim_id);
CREATE INDEX IF NOT EXISTS idx_yearly_calendar_year ON yearly_results(calendar_year);
CREATE INDEX IF NOT EXISTS idx_sim_portfolio_type ON simulations(portfolio_type);
CREATE INDEX IF NOT EXISTS idx_sim_start_year ON simulations(start_year);
";

/// `market_conditions` column holding the participation rate at `level`
#[must_use]
pub fn participation_column(level: f64) -> String {
    format!("note_participation_{}pct", percent_label(level).replace('.', "_"))
}

/// Levels in first-seen order, one per participation column
fn distinct_levels(levels: &[f64]) -> Vec<f64> {
    let mut seen: Vec<String> = Vec::with_capacity(levels.len());
    let mut distinct = Vec::with_capacity(levels.len());
    for &level in levels {
        let column = participation_column(level);
        if !seen.contains(&column) {
            seen.push(column);
            distinct.push(level);
        }
    }
    distinct
}

/// One row of the `simulations` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRow {
    pub sim_id: String,
    pub start_year: i64,
    pub portfolio_type: String,
    pub equity_allocation: f64,
    pub note_allocation: f64,
    pub bond_allocation: f64,
    pub protection_level: Option<f64>,
    pub withdrawal_rate: f64,
    pub time_horizon: i64,
    pub parameter_file: String,
    pub terminal_value: f64,
    pub success_flag: bool,
    pub cagr: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub inflation_adjusted_terminal: f64,
}

pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (or create) the results database at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        tracing::debug!(path = %path.display(), "Opened results database");
        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            conn: Connection::open_in_memory()?,
        })
    }

    /// Create every table and index, adding a participation column for each
    /// tracked protection level that is not there yet
    pub fn init_schema(&self, protection_levels: &[f64]) -> Result<(), StoreError> {
        self.conn.execute_batch(SCHEMA)?;

        let mut existing = self.columns("market_conditions")?;
        for &level in protection_levels {
            let column = participation_column(level);
            if !existing.contains(&column) {
                self.conn.execute(
                    &format!("ALTER TABLE market_conditions ADD COLUMN \"{column}\" REAL"),
                    [],
                )?;
                existing.push(column);
            }
        }
        tracing::info!(levels = protection_levels.len(), "Database schema ready");
        Ok(())
    }

    fn columns(&self, table: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }

    /// Archive the parameter document a sweep was run with
    pub fn save_parameter_file(
        &self,
        name: &str,
        content: &str,
        timestamp: &str,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO simulation_parameters (parameter_file, file_content, timestamp)
             VALUES (?1, ?2, ?3)",
            params![name, content, timestamp],
        )?;
        Ok(())
    }

    /// Write one `market_conditions` row per market year. Years without a
    /// note at a tracked level record a participation rate of 1.0.
    pub fn populate_market_conditions(
        &mut self,
        market: &MarketData,
        protection_levels: &[f64],
    ) -> Result<usize, StoreError> {
        let levels = distinct_levels(protection_levels);
        let mut columns = vec![
            "calendar_year".to_string(),
            "sp500_return".to_string(),
            "bond_return".to_string(),
            "inflation_rate".to_string(),
            "treasury_rate".to_string(),
            "vix_level".to_string(),
        ];
        columns.extend(
            levels
                .iter()
                .map(|&l| format!("\"{}\"", participation_column(l))),
        );
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO market_conditions ({}) VALUES ({})",
            columns.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction()?;
        let mut rows = 0;
        {
            let mut stmt = tx.prepare(&sql)?;
            for year in market.years() {
                let mut values: Vec<Value> = vec![
                    Value::Integer(i64::from(year.year)),
                    year.equity_return.into(),
                    year.bond_return.into(),
                    year.inflation_rate.into(),
                    year.treasury_rate.into(),
                    year.vix_level.into(),
                ];
                values.extend(levels.iter().map(|&level| {
                    Value::Real(
                        market
                            .notes()
                            .participation_for(year.year, level)
                            .unwrap_or(1.0),
                    )
                }));
                stmt.execute(params_from_iter(values))?;
                rows += 1;
            }
        }
        tx.commit()?;
        tracing::info!(rows, "Populated market conditions");
        Ok(rows)
    }

    /// Sink writing sweep batches into this store, tagged with `parameter_file`
    pub fn sink(&mut self, parameter_file: impl Into<String>) -> SqliteSink<'_> {
        SqliteSink {
            conn: &mut self.conn,
            parameter_file: parameter_file.into(),
        }
    }

    /// All simulation summaries, in insertion order
    pub fn simulations(&self) -> Result<Vec<SimulationRow>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT sim_id, start_year, portfolio_type, equity_allocation, note_allocation,
                    bond_allocation, protection_level, withdrawal_rate, time_horizon,
                    parameter_file, terminal_value, success_flag, cagr, max_drawdown,
                    volatility, inflation_adjusted_terminal
             FROM simulations ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SimulationRow {
                    sim_id: row.get(0)?,
                    start_year: row.get(1)?,
                    portfolio_type: row.get(2)?,
                    equity_allocation: row.get(3)?,
                    note_allocation: row.get(4)?,
                    bond_allocation: row.get(5)?,
                    protection_level: row.get(6)?,
                    withdrawal_rate: row.get(7)?,
                    time_horizon: row.get(8)?,
                    parameter_file: row.get(9)?,
                    terminal_value: row.get(10)?,
                    success_flag: row.get(11)?,
                    cagr: row.get(12)?,
                    max_drawdown: row.get(13)?,
                    volatility: row.get(14)?,
                    inflation_adjusted_terminal: row.get(15)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Number of `yearly_results` rows for one simulation
    pub fn yearly_row_count(&self, sim_id: &str) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM yearly_results WHERE sim_id = ?1",
            params![sim_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Participation rate recorded in `market_conditions`
    pub fn market_participation(&self, year: i16, level: f64) -> Result<Option<f64>, StoreError> {
        let sql = format!(
            "SELECT \"{}\" FROM market_conditions WHERE calendar_year = ?1",
            participation_column(level)
        );
        let value = self
            .conn
            .query_row(&sql, params![i64::from(year)], |row| row.get(0))?;
        Ok(value)
    }

    /// Write the `simulations` table as a JSON array to `path`
    pub fn export_summary_json(&self, path: &Path) -> Result<usize, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let rows = self.simulations()?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &rows)?;
        tracing::info!(path = %path.display(), rows = rows.len(), "Exported summary results");
        Ok(rows.len())
    }
}

/// Single writer for sweep results
pub struct SqliteSink<'a> {
    conn: &'a mut Connection,
    parameter_file: String,
}

fn insert_record(
    tx: &Transaction<'_>,
    record: &SimulationRecord,
    parameter_file: &str,
) -> Result<(), rusqlite::Error> {
    let p = &record.params;
    let s = &record.summary;

    // A rewritten run may be shorter than the copy already stored
    tx.prepare_cached("DELETE FROM yearly_results WHERE sim_id = ?1")?
        .execute(params![record.sim_id])?;

    tx.prepare_cached(
        "INSERT OR REPLACE INTO simulations (
            sim_id, start_year, portfolio_type, equity_allocation, note_allocation,
            bond_allocation, protection_level, withdrawal_rate, time_horizon, parameter_file,
            terminal_value, success_flag, cagr, max_drawdown, volatility,
            inflation_adjusted_terminal
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
    )?
    .execute(params![
        record.sim_id,
        i64::from(p.start_year),
        p.portfolio_type,
        p.equity_allocation,
        p.note_allocation,
        p.bond_allocation,
        p.protection_level,
        p.withdrawal_rate,
        i64::from(p.time_horizon),
        parameter_file,
        s.terminal_value,
        s.success,
        s.cagr,
        s.max_drawdown,
        s.volatility,
        s.inflation_adjusted_terminal,
    ])?;

    let mut yearly = tx.prepare_cached(
        "INSERT OR REPLACE INTO yearly_results (
            sim_id, year, calendar_year, starting_value, ending_value, withdrawal_amount,
            equity_return, note_return, bond_return, portfolio_return,
            equity_value, note_value, bond_value, inflation_rate
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    )?;
    for row in &record.years {
        yearly.execute(params![
            record.sim_id,
            i64::from(row.year),
            i64::from(row.calendar_year),
            row.starting_value,
            row.ending_value,
            row.withdrawal_amount,
            row.equity_return,
            row.note_return,
            row.bond_return,
            row.portfolio_return,
            row.equity_value,
            row.note_value,
            row.bond_value,
            row.inflation_rate,
        ])?;
    }
    Ok(())
}

impl ResultSink for SqliteSink<'_> {
    type Error = StoreError;

    fn write_batch(&mut self, records: &[SimulationRecord]) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        for record in records {
            insert_record(&tx, record, &self.parameter_file)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesim_core::model::{
        NoteTable, NoteTerms, SimulationParameters, SimulationSummary, YearData, YearlyResult,
    };

    fn record(start_year: i16, level: Option<f64>) -> SimulationRecord {
        let params = SimulationParameters {
            start_year,
            portfolio_type: "structured".to_string(),
            equity_allocation: 0.5,
            note_allocation: 0.2,
            bond_allocation: 0.3,
            protection_level: level,
            withdrawal_rate: 0.04,
            time_horizon: 1,
        };
        let years = vec![
            YearlyResult {
                year: 0,
                calendar_year: start_year,
                ending_value: 1_000.0,
                ..Default::default()
            },
            YearlyResult {
                year: 1,
                calendar_year: start_year + 1,
                starting_value: 1_000.0,
                ending_value: 1_060.0,
                withdrawal_amount: 40.0,
                portfolio_return: 0.1,
                ..Default::default()
            },
        ];
        SimulationRecord {
            sim_id: params.sim_id(),
            params,
            summary: SimulationSummary {
                terminal_value: 1_060.0,
                success: true,
                cagr: 0.06,
                ..Default::default()
            },
            years,
        }
    }

    #[test]
    fn test_participation_column_names() {
        assert_eq!(participation_column(0.10), "note_participation_10pct");
        assert_eq!(participation_column(0.045), "note_participation_4_5pct");
    }

    #[test]
    fn test_schema_is_idempotent_and_grows_columns() {
        let store = ResultStore::in_memory().unwrap();
        store.init_schema(&[0.05, 0.10]).unwrap();
        store.init_schema(&[0.05, 0.10, 0.20]).unwrap();

        let columns = store.columns("market_conditions").unwrap();
        assert!(columns.contains(&"note_participation_5pct".to_string()));
        assert!(columns.contains(&"note_participation_20pct".to_string()));
        assert_eq!(columns.len(), 6 + 3);
    }

    #[test]
    fn test_sink_writes_summary_and_yearly_rows() {
        let mut store = ResultStore::in_memory().unwrap();
        store.init_schema(&[0.10]).unwrap();

        let records = vec![record(2000, Some(0.10)), record(2001, None)];
        store.sink("study").write_batch(&records).unwrap();

        let rows = store.simulations().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sim_id, "2000_structured_10pct_4pct_1yr");
        assert_eq!(rows[0].parameter_file, "study");
        assert_eq!(rows[0].protection_level, Some(0.10));
        assert!(rows[0].success_flag);
        assert_eq!(rows[1].protection_level, None);
        assert_eq!(store.yearly_row_count("2000_structured_10pct_4pct_1yr").unwrap(), 2);
    }

    #[test]
    fn test_rewriting_a_run_replaces_it() {
        let mut store = ResultStore::in_memory().unwrap();
        store.init_schema(&[]).unwrap();

        let mut sink = store.sink("study");
        sink.write_batch(&[record(2000, Some(0.10))]).unwrap();
        sink.write_batch(&[record(2000, Some(0.10))]).unwrap();

        assert_eq!(store.simulations().unwrap().len(), 1);
        assert_eq!(store.yearly_row_count("2000_structured_10pct_4pct_1yr").unwrap(), 2);
    }

    #[test]
    fn test_rewriting_a_shorter_run_drops_stale_years() {
        let mut store = ResultStore::in_memory().unwrap();
        store.init_schema(&[0.10]).unwrap();
        let sim_id = "2000_structured_10pct_4pct_1yr";

        store.sink("study").write_batch(&[record(2000, Some(0.10))]).unwrap();
        assert_eq!(store.yearly_row_count(sim_id).unwrap(), 2);

        // Depleted in the first year: only the year-0 row survives
        let mut depleted = record(2000, Some(0.10));
        depleted.years.truncate(1);
        depleted.summary.terminal_value = 0.0;
        depleted.summary.success = false;
        store.sink("study").write_batch(&[depleted]).unwrap();

        assert_eq!(store.yearly_row_count(sim_id).unwrap(), 1);
        let rows = store.simulations().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success_flag);
    }

    #[test]
    fn test_repeated_levels_share_one_column() {
        let mut store = ResultStore::in_memory().unwrap();
        store.init_schema(&[0.10, 0.10, 0.20]).unwrap();
        assert_eq!(store.columns("market_conditions").unwrap().len(), 6 + 2);

        let market = MarketData::new(vec![YearData::new(2000, 0.1, 0.05)], NoteTable::new());
        let rows = store
            .populate_market_conditions(&market, &[0.10, 0.10, 0.20])
            .unwrap();
        assert_eq!(rows, 1);
        assert_eq!(store.market_participation(2000, 0.10).unwrap(), Some(1.0));
    }

    #[test]
    fn test_write_without_schema_fails() {
        let mut store = ResultStore::in_memory().unwrap();
        let err = store.sink("study").write_batch(&[record(2000, None)]);
        assert!(matches!(err, Err(StoreError::Database(_))));
    }

    #[test]
    fn test_market_conditions_default_participation() {
        let mut store = ResultStore::in_memory().unwrap();
        store.init_schema(&[0.10, 0.20]).unwrap();

        let notes: NoteTable = [NoteTerms {
            participation_rate: 0.85,
            ..NoteTerms::fallback(2000)
        }]
        .into_iter()
        .collect();
        let market = MarketData::new(
            vec![
                YearData::new(2000, 0.1, 0.05).with_market_state(0.04, 0.2),
                YearData::new(2001, -0.1, 0.06),
            ],
            notes,
        );

        let rows = store
            .populate_market_conditions(&market, &[0.10, 0.20])
            .unwrap();
        assert_eq!(rows, 2);
        assert_eq!(store.market_participation(2000, 0.10).unwrap(), Some(0.85));
        assert_eq!(store.market_participation(2000, 0.20).unwrap(), Some(1.0));
        assert_eq!(store.market_participation(2001, 0.10).unwrap(), Some(1.0));
    }

    #[test]
    fn test_export_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ResultStore::open(&dir.path().join("results.db")).unwrap();
        store.init_schema(&[0.10]).unwrap();
        store
            .sink("study")
            .write_batch(&[record(2000, Some(0.10))])
            .unwrap();

        let path = dir.path().join("out").join("summary.json");
        assert_eq!(store.export_summary_json(&path).unwrap(), 1);

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[0]["sim_id"], "2000_structured_10pct_4pct_1yr");
        assert_eq!(json[0]["success_flag"], true);
    }

    #[test]
    fn test_parameter_archive_replaces_by_name() {
        let store = ResultStore::in_memory().unwrap();
        store.init_schema(&[]).unwrap();
        store.save_parameter_file("study", "a: 1", "2024-01-01T00:00:00Z").unwrap();
        store.save_parameter_file("study", "a: 2", "2024-01-02T00:00:00Z").unwrap();

        let (count, content): (i64, String) = store
            .conn
            .query_row(
                "SELECT COUNT(*), MAX(file_content) FROM simulation_parameters",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(content, "a: 2");
    }
}

mod allocation;
mod market;
mod notes;
mod results;
mod rmd;

pub use allocation::{Allocation, AssetClass, AssetReturns, WEIGHT_TOLERANCE};
pub use market::{MarketData, MarketDataFile, YearData};
pub use notes::{
    DEFAULT_UNDERLYING, NoteResolution, NoteSelector, NoteTable, NoteTerms, ProtectionType,
    note_return,
};
pub use results::{SimulationParameters, SimulationRecord, SimulationSummary, YearlyResult};
pub use rmd::{RmdTable, RmdTableEntry};

/// Format a decimal fraction as a compact percent label: 0.1 -> "10", 0.045 -> "4.5"
#[must_use]
pub fn percent_label(fraction: f64) -> String {
    let pct = (fraction * 100.0 * 1000.0).round() / 1000.0;
    let text = format!("{pct:.3}");
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

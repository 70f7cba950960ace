//! Historical market data: annual return series, market state and notes

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SimulationError;
use crate::model::notes::{NoteTable, NoteTerms};

/// One calendar year of market observations.
///
/// Only the return series are needed to replay a path. The remaining fields
/// describe the market state used to price notes for that year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct YearData {
    pub year: i16,
    #[serde(default)]
    pub equity_return: Option<f64>,
    #[serde(default)]
    pub bond_return: Option<f64>,
    #[serde(default)]
    pub inflation_rate: Option<f64>,
    #[serde(default)]
    pub treasury_rate: Option<f64>,
    #[serde(default)]
    pub vix_level: Option<f64>,
    #[serde(default)]
    pub dividend_yield: Option<f64>,
    #[serde(default)]
    pub funding_spread: Option<f64>,
    #[serde(default)]
    pub equity_level: Option<f64>,
}

impl YearData {
    #[must_use]
    pub fn new(year: i16, equity_return: f64, bond_return: f64) -> Self {
        YearData {
            year,
            equity_return: Some(equity_return),
            bond_return: Some(bond_return),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_inflation(mut self, rate: f64) -> Self {
        self.inflation_rate = Some(rate);
        self
    }

    #[must_use]
    pub fn with_market_state(mut self, treasury_rate: f64, vix_level: f64) -> Self {
        self.treasury_rate = Some(treasury_rate);
        self.vix_level = Some(vix_level);
        self
    }
}

/// On-disk layout of a market data document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketDataFile {
    pub years: Vec<YearData>,
    #[serde(default)]
    pub notes: Vec<NoteTerms>,
}

/// Immutable year-indexed market data shared by every simulation
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    years: BTreeMap<i16, YearData>,
    notes: NoteTable,
}

impl From<MarketDataFile> for MarketData {
    fn from(file: MarketDataFile) -> Self {
        MarketData::new(file.years, file.notes.into_iter().collect())
    }
}

impl MarketData {
    /// Later rows for the same year replace earlier ones
    #[must_use]
    pub fn new(years: impl IntoIterator<Item = YearData>, notes: NoteTable) -> Self {
        MarketData {
            years: years.into_iter().map(|y| (y.year, y)).collect(),
            notes,
        }
    }

    /// Replace the note table
    #[must_use]
    pub fn with_notes(mut self, notes: NoteTable) -> Self {
        self.notes = notes;
        self
    }

    #[must_use]
    pub fn notes(&self) -> &NoteTable {
        &self.notes
    }

    #[must_use]
    pub fn year(&self, year: i16) -> Option<&YearData> {
        self.years.get(&year)
    }

    /// All years in ascending order
    pub fn years(&self) -> impl Iterator<Item = &YearData> {
        self.years.values()
    }

    #[must_use]
    pub fn first_year(&self) -> Option<i16> {
        self.years.keys().next().copied()
    }

    #[must_use]
    pub fn last_year(&self) -> Option<i16> {
        self.years.keys().next_back().copied()
    }

    pub fn equity_return(&self, year: i16) -> Result<f64, SimulationError> {
        self.year(year)
            .and_then(|y| y.equity_return)
            .ok_or(SimulationError::DataGap {
                year,
                series: "equity return",
            })
    }

    pub fn bond_return(&self, year: i16) -> Result<f64, SimulationError> {
        self.year(year)
            .and_then(|y| y.bond_return)
            .ok_or(SimulationError::DataGap {
                year,
                series: "bond return",
            })
    }

    #[must_use]
    pub fn inflation_rate(&self, year: i16) -> Option<f64> {
        self.year(year).and_then(|y| y.inflation_rate)
    }

    /// Years in `start..=end` with both return series (and a note table
    /// when `require_notes` is set).
    pub fn aligned_years(
        &self,
        start: i16,
        end: i16,
        require_notes: bool,
    ) -> Result<Vec<i16>, SimulationError> {
        let years: Vec<i16> = self
            .years
            .range(start..=end)
            .filter(|(_, y)| y.equity_return.is_some() && y.bond_return.is_some())
            .filter(|(year, _)| !require_notes || self.notes.has_year(**year))
            .map(|(year, _)| *year)
            .collect();

        if years.is_empty() {
            return Err(SimulationError::NoOverlappingData {
                start_year: start,
                end_year: end,
            });
        }
        Ok(years)
    }
}

//! Structured note terms, payoff rules and per-year note selection

use std::fmt;
use std::str::FromStr;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::observe::{Observer, SimEvent};

pub const DEFAULT_UNDERLYING: &str = "S&P 500";

/// Protection levels closer than this are treated as the same level
const LEVEL_EPSILON: f64 = 1e-9;

/// How downside protection is applied to negative underlying returns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtectionType {
    /// Absorbs the first `p` of losses, the holder takes the rest
    #[default]
    #[serde(alias = "buffer", alias = "BUFFER")]
    Buffer,
    /// Caps losses at `p`
    #[serde(alias = "floor", alias = "FLOOR")]
    Floor,
}

impl ProtectionType {
    /// Three-letter code used in note identifiers
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            ProtectionType::Buffer => "BUF",
            ProtectionType::Floor => "FLO",
        }
    }
}

impl fmt::Display for ProtectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtectionType::Buffer => f.write_str("Buffer"),
            ProtectionType::Floor => f.write_str("Floor"),
        }
    }
}

impl FromStr for ProtectionType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buffer" => Ok(ProtectionType::Buffer),
            "floor" => Ok(ProtectionType::Floor),
            _ => Err(ConfigError::UnknownVariant {
                kind: "protection type",
                tag: s.to_string(),
            }),
        }
    }
}

/// Annual note return for an underlying return `u`.
///
/// Gains are scaled by the participation rate. Losses are absorbed up to
/// `protection_level` (Buffer) or capped at it (Floor).
#[must_use]
pub fn note_return(
    underlying_return: f64,
    participation_rate: f64,
    protection_level: f64,
    protection_type: ProtectionType,
) -> f64 {
    if underlying_return > 0.0 {
        return underlying_return * participation_rate;
    }
    match protection_type {
        ProtectionType::Buffer => {
            let loss = underlying_return.abs();
            if loss <= protection_level {
                0.0
            } else {
                -(loss - protection_level)
            }
        }
        ProtectionType::Floor => underlying_return.max(-protection_level),
    }
}

fn default_term() -> f64 {
    1.0
}

fn default_underlying() -> String {
    DEFAULT_UNDERLYING.to_string()
}

/// Terms of one structured note issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteTerms {
    #[serde(rename = "year")]
    pub calendar_year: i16,
    pub participation_rate: f64,
    pub protection_level: f64,
    #[serde(default)]
    pub protection_type: ProtectionType,
    #[serde(default = "default_term")]
    pub term: f64,
    #[serde(default = "default_underlying")]
    pub underlying_asset: String,
}

impl NoteTerms {
    /// Terms used when no note is tabulated for a year
    #[must_use]
    pub fn fallback(calendar_year: i16) -> Self {
        NoteTerms {
            calendar_year,
            participation_rate: 1.0,
            protection_level: 0.10,
            protection_type: ProtectionType::Buffer,
            term: default_term(),
            underlying_asset: default_underlying(),
        }
    }

    #[must_use]
    pub fn calculate_return(&self, underlying_return: f64) -> f64 {
        note_return(
            underlying_return,
            self.participation_rate,
            self.protection_level,
            self.protection_type,
        )
    }

    /// Identifier such as `SPX-10BUF-1Y`, stable across years for the same terms
    #[must_use]
    pub fn note_id(&self) -> String {
        let asset = match self.underlying_asset.as_str() {
            "S&P 500" | "SP500" | "SPX" => "SPX".to_string(),
            other => other
                .chars()
                .filter(|c| *c != ' ' && *c != '&')
                .take(3)
                .collect::<String>()
                .to_uppercase(),
        };
        let protection = (self.protection_level * 100.0).round() as i64;
        let term = self.term.round() as i64;
        format!(
            "{asset}-{protection}{}-{term}Y",
            self.protection_type.code()
        )
    }
}

/// Tabulated notes keyed by calendar year, each year in insertion order
#[derive(Debug, Clone, Default)]
pub struct NoteTable {
    by_year: FxHashMap<i16, Vec<NoteTerms>>,
}

impl NoteTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, terms: NoteTerms) {
        self.by_year
            .entry(terms.calendar_year)
            .or_default()
            .push(terms);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_year.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_year.values().map(Vec::len).sum()
    }

    /// Notes available for a year, empty when none are tabulated
    #[must_use]
    pub fn notes_for_year(&self, year: i16) -> &[NoteTerms] {
        self.by_year.get(&year).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn has_year(&self, year: i16) -> bool {
        !self.notes_for_year(year).is_empty()
    }

    /// Participation rate of the first note for `year` at exactly `level`
    #[must_use]
    pub fn participation_for(&self, year: i16, level: f64) -> Option<f64> {
        self.notes_for_year(year)
            .iter()
            .find(|n| (n.protection_level - level).abs() < LEVEL_EPSILON)
            .map(|n| n.participation_rate)
    }
}

impl FromIterator<NoteTerms> for NoteTable {
    fn from_iter<I: IntoIterator<Item = NoteTerms>>(iter: I) -> Self {
        let mut table = NoteTable::new();
        for terms in iter {
            table.insert(terms);
        }
        table
    }
}

/// How the note for a year was chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteResolution {
    PreAssigned,
    ExactMatch,
    Closest,
    FirstAvailable,
    Fallback,
}

/// Chooses the note for each simulated year.
///
/// Order: pre-assigned note, exact protection match, closest protection
/// level (ties go to the first tabulated), then default terms.
#[derive(Debug, Clone, Copy)]
pub struct NoteSelector<'a> {
    table: &'a NoteTable,
    pre_assigned: &'a FxHashMap<i16, NoteTerms>,
    protection_level: Option<f64>,
}

impl<'a> NoteSelector<'a> {
    #[must_use]
    pub fn new(
        table: &'a NoteTable,
        pre_assigned: &'a FxHashMap<i16, NoteTerms>,
        protection_level: Option<f64>,
    ) -> Self {
        NoteSelector {
            table,
            pre_assigned,
            protection_level,
        }
    }

    pub fn resolve(&self, year: i16, observer: &dyn Observer) -> (NoteTerms, NoteResolution) {
        if let Some(terms) = self.pre_assigned.get(&year) {
            return (terms.clone(), NoteResolution::PreAssigned);
        }

        let candidates = self.table.notes_for_year(year);
        let Some(first) = candidates.first() else {
            observer.record(&SimEvent::NoteFallback { year });
            return (NoteTerms::fallback(year), NoteResolution::Fallback);
        };

        let Some(target) = self.protection_level else {
            return (first.clone(), NoteResolution::FirstAvailable);
        };

        if let Some(exact) = candidates
            .iter()
            .find(|n| (n.protection_level - target).abs() < LEVEL_EPSILON)
        {
            return (exact.clone(), NoteResolution::ExactMatch);
        }

        let mut closest = first;
        let mut best = (first.protection_level - target).abs();
        for note in &candidates[1..] {
            let distance = (note.protection_level - target).abs();
            if distance < best {
                best = distance;
                closest = note;
            }
        }
        observer.record(&SimEvent::ClosestNoteSelected {
            year,
            requested: target,
            selected: closest.protection_level,
        });
        (closest.clone(), NoteResolution::Closest)
    }
}

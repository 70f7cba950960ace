//! Asset classes and target allocations

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::observe::{Observer, SimEvent};

/// Allowed deviation of the weight sum from 1.0 before renormalizing
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// The three asset classes a portfolio can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Bonds,
    Notes,
}

impl AssetClass {
    pub const ALL: [AssetClass; 3] = [AssetClass::Equity, AssetClass::Bonds, AssetClass::Notes];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Bonds => "bonds",
            AssetClass::Notes => "notes",
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Target weights per asset class.
///
/// Weights are validated on construction: each must be finite and
/// non-negative, and at least one must be positive. A sum that drifts from
/// 1.0 by more than [`WEIGHT_TOLERANCE`] is rescaled and reported through the
/// observer. Zero weights are dropped so that `holds` reflects real exposure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Allocation {
    weights: BTreeMap<AssetClass, f64>,
}

impl Allocation {
    pub fn new(
        weights: impl IntoIterator<Item = (AssetClass, f64)>,
        observer: &dyn Observer,
    ) -> Result<Self, ConfigError> {
        let mut map = BTreeMap::new();
        for (asset, weight) in weights {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidWeight { asset, weight });
            }
            if weight > 0.0 {
                *map.entry(asset).or_insert(0.0) += weight;
            }
        }

        let sum: f64 = map.values().sum();
        if sum <= 0.0 {
            return Err(ConfigError::EmptyAllocation);
        }
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            observer.record(&SimEvent::AllocationNormalized { original_sum: sum });
            for w in map.values_mut() {
                *w /= sum;
            }
        }

        Ok(Allocation { weights: map })
    }

    /// Build from the three class weights in the order used by sweep configs
    pub fn from_parts(
        equity: f64,
        notes: f64,
        bonds: f64,
        observer: &dyn Observer,
    ) -> Result<Self, ConfigError> {
        Self::new(
            [
                (AssetClass::Equity, equity),
                (AssetClass::Notes, notes),
                (AssetClass::Bonds, bonds),
            ],
            observer,
        )
    }

    /// Weight for an asset class, 0 when not held
    #[must_use]
    pub fn weight(&self, asset: AssetClass) -> f64 {
        self.weights.get(&asset).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetClass, f64)> + '_ {
        self.weights.iter().map(|(&a, &w)| (a, w))
    }

    #[must_use]
    pub fn holds(&self, asset: AssetClass) -> bool {
        self.weights.contains_key(&asset)
    }

    #[must_use]
    pub fn holds_notes(&self) -> bool {
        self.holds(AssetClass::Notes)
    }
}

/// Realized returns for one year, keyed by asset class
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssetReturns {
    returns: BTreeMap<AssetClass, f64>,
}

impl AssetReturns {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, asset: AssetClass, value: f64) -> Self {
        self.returns.insert(asset, value);
        self
    }

    pub fn set(&mut self, asset: AssetClass, value: f64) {
        self.returns.insert(asset, value);
    }

    #[must_use]
    pub fn get(&self, asset: AssetClass) -> Option<f64> {
        self.returns.get(&asset).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::{NullObserver, RecordingObserver};

    #[test]
    fn test_exact_weights_are_kept() {
        let observer = RecordingObserver::new();
        let alloc = Allocation::from_parts(0.5, 0.2, 0.3, &observer).unwrap();
        assert_eq!(alloc.weight(AssetClass::Equity), 0.5);
        assert_eq!(alloc.weight(AssetClass::Notes), 0.2);
        assert_eq!(alloc.weight(AssetClass::Bonds), 0.3);
        assert_eq!(observer.count("allocation_normalized"), 0);
    }

    #[test]
    fn test_drifting_weights_are_normalized_with_event() {
        let observer = RecordingObserver::new();
        let alloc = Allocation::from_parts(0.6, 0.0, 0.6, &observer).unwrap();
        assert!((alloc.weight(AssetClass::Equity) - 0.5).abs() < 1e-12);
        assert!((alloc.weight(AssetClass::Bonds) - 0.5).abs() < 1e-12);
        assert!(!alloc.holds_notes());
        assert_eq!(observer.count("allocation_normalized"), 1);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        assert_eq!(
            Allocation::from_parts(0.0, 0.0, 0.0, &NullObserver),
            Err(ConfigError::EmptyAllocation)
        );
        assert!(matches!(
            Allocation::from_parts(-0.1, 0.5, 0.6, &NullObserver),
            Err(ConfigError::InvalidWeight {
                asset: AssetClass::Equity,
                ..
            })
        ));
        assert!(Allocation::from_parts(f64::NAN, 0.5, 0.5, &NullObserver).is_err());
    }
}

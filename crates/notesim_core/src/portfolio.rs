//! Per-asset-class portfolio state
//!
//! A year advances as rebalance -> apply returns -> withdraw. After each
//! step `current_value` equals the sum of the asset values.

use std::collections::BTreeMap;

use crate::model::{Allocation, AssetClass, AssetReturns};
use crate::observe::{Observer, SimEvent};

/// Values at or below this are treated as an empty portfolio
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    allocation: Allocation,
    current_value: f64,
    previous_value: f64,
    asset_values: BTreeMap<AssetClass, f64>,
}

impl Portfolio {
    /// New portfolio with `initial_value` split according to `allocation`
    #[must_use]
    pub fn new(initial_value: f64, allocation: Allocation) -> Self {
        let mut portfolio = Portfolio {
            allocation,
            current_value: initial_value,
            previous_value: initial_value,
            asset_values: BTreeMap::new(),
        };
        portfolio.rebalance();
        portfolio
    }

    /// Reset every asset to its target weight of the current value
    pub fn rebalance(&mut self) {
        let total = self.current_value;
        self.asset_values = self
            .allocation
            .iter()
            .map(|(asset, weight)| (asset, total * weight))
            .collect();
    }

    /// Grow each held asset by its return. Assets without a return keep
    /// their value and are reported. Returns the new total value.
    pub fn apply_returns(&mut self, returns: &AssetReturns, observer: &dyn Observer) -> f64 {
        self.previous_value = self.current_value;
        for (asset, value) in &mut self.asset_values {
            match returns.get(*asset) {
                Some(r) => *value *= 1.0 + r,
                None => observer.record(&SimEvent::MissingReturn { asset: *asset }),
            }
        }
        self.current_value = self.asset_values.values().sum();
        self.current_value
    }

    /// Withdraw up to `amount`, deducted from each asset in proportion to
    /// its value. Returns the amount actually withdrawn.
    pub fn withdraw(&mut self, amount: f64, observer: &dyn Observer) -> f64 {
        if !(amount > 0.0) || self.current_value <= 0.0 {
            return 0.0;
        }

        if amount > self.current_value {
            observer.record(&SimEvent::WithdrawalShortfall {
                requested: amount,
                available: self.current_value,
            });
        }

        let actual = amount.min(self.current_value);
        if self.current_value - actual <= EPSILON {
            self.asset_values.values_mut().for_each(|v| *v = 0.0);
            self.current_value = 0.0;
            return actual;
        }

        let total = self.current_value;
        for value in self.asset_values.values_mut() {
            *value -= actual * (*value / total);
        }
        self.current_value = self.asset_values.values().sum();
        actual
    }

    /// Return over the last `apply_returns`, 0 when the prior value was empty
    #[must_use]
    pub fn annual_return(&self) -> f64 {
        if self.previous_value.abs() <= EPSILON {
            0.0
        } else {
            self.current_value / self.previous_value - 1.0
        }
    }

    /// Current weight of each held asset, all zero for an empty portfolio
    #[must_use]
    pub fn asset_allocations(&self) -> BTreeMap<AssetClass, f64> {
        let total = self.total_value();
        self.asset_values
            .iter()
            .map(|(&asset, &value)| {
                let weight = if total > EPSILON { value / total } else { 0.0 };
                (asset, weight)
            })
            .collect()
    }

    /// Value held in `asset`, 0 when not held
    #[must_use]
    pub fn asset_value(&self, asset: AssetClass) -> f64 {
        self.asset_values.get(&asset).copied().unwrap_or(0.0)
    }

    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.asset_values.values().sum()
    }

    #[must_use]
    pub fn current_value(&self) -> f64 {
        self.current_value
    }

    #[must_use]
    pub fn previous_value(&self) -> f64 {
        self.previous_value
    }

    #[must_use]
    pub fn allocation(&self) -> &Allocation {
        &self.allocation
    }

    #[must_use]
    pub fn is_depleted(&self) -> bool {
        self.current_value <= EPSILON
    }
}

//! # Multi-Asset Values
//!
//! A [`Value`] is what a UTXO carries: an amount of lovelace plus any number
//! of native assets, each keyed by its unit (policy id followed by the hex
//! asset name, exactly as the provider spells it).
//!
//! Aggregation is a pointwise fold over asset units. It is associative and
//! commutative, so per-address values can be summed in any order, or in
//! parallel, and still produce the same total. All arithmetic is checked:
//! overflowing `u64` is reported, never wrapped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::LOVELACE_UNIT;

/// Errors that can occur while combining values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A sum exceeded `u64::MAX` for the given unit.
    #[error("value overflow while summing unit {unit}")]
    Overflow {
        /// The unit whose running total overflowed.
        unit: String,
    },
}

/// Lovelace plus a map of native asset quantities.
///
/// Zero-quantity assets are never stored, so two values holding the same
/// amounts always compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    /// Native coin, in lovelace.
    pub lovelace: u64,
    /// Native assets by unit.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub assets: BTreeMap<String, u64>,
}

impl Value {
    /// A value holding only lovelace.
    pub fn from_lovelace(lovelace: u64) -> Self {
        Self {
            lovelace,
            assets: BTreeMap::new(),
        }
    }

    /// Adds `quantity` of `unit` to this value, builder style.
    ///
    /// # Errors
    ///
    /// Returns [`ValueError::Overflow`] if the asset total would exceed `u64::MAX`.
    pub fn with_asset(mut self, unit: impl Into<String>, quantity: u64) -> Result<Self, ValueError> {
        self.add_quantity(&unit.into(), quantity)?;
        Ok(self)
    }

    /// Adds a quantity of a single unit. `"lovelace"` goes to the coin field.
    pub fn add_quantity(&mut self, unit: &str, quantity: u64) -> Result<(), ValueError> {
        if unit == LOVELACE_UNIT {
            self.lovelace = self
                .lovelace
                .checked_add(quantity)
                .ok_or_else(|| overflow(unit))?;
            return Ok(());
        }
        if quantity == 0 {
            return Ok(());
        }
        let entry = self.assets.entry(unit.to_string()).or_insert(0);
        *entry = entry.checked_add(quantity).ok_or_else(|| overflow(unit))?;
        Ok(())
    }

    /// Adds every unit of `other` into `self`.
    ///
    /// On error `self` may hold a partial sum; callers that need atomicity
    /// should use [`Value::checked_add`].
    pub fn merge(&mut self, other: &Value) -> Result<(), ValueError> {
        self.add_quantity(LOVELACE_UNIT, other.lovelace)?;
        for (unit, quantity) in &other.assets {
            self.add_quantity(unit, *quantity)?;
        }
        Ok(())
    }

    /// Returns `self + other` without modifying either.
    pub fn checked_add(&self, other: &Value) -> Result<Value, ValueError> {
        let mut sum = self.clone();
        sum.merge(other)?;
        Ok(sum)
    }

    /// Folds any number of values into one.
    pub fn coalesce<'a, I>(values: I) -> Result<Value, ValueError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        values.into_iter().try_fold(Value::default(), |mut acc, v| {
            acc.merge(v)?;
            Ok(acc)
        })
    }

    /// Quantity held of `unit` (lovelace included).
    pub fn quantity_of(&self, unit: &str) -> u64 {
        if unit == LOVELACE_UNIT {
            self.lovelace
        } else {
            self.assets.get(unit).copied().unwrap_or(0)
        }
    }

    /// `true` if there is no lovelace and no assets.
    pub fn is_zero(&self) -> bool {
        self.lovelace == 0 && self.assets.is_empty()
    }
}

fn overflow(unit: &str) -> ValueError {
    ValueError::Overflow {
        unit: unit.to_string(),
    }
}

//! This module contains the types describing how individual slots and whole
//! contracts changed between two snapshots.

use std::fmt::{Display, Formatter};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    semantics::SlotSemanticType,
    utility::{serde_rate, Delta, U256W},
};

/// The direction in which a slot changed.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
    NoChange,
    /// The slot was absent before and present after.
    NewValue,
    /// The slot was present before and absent after.
    RemovedValue,
}

impl Direction {
    /// Gets the direction of a change between the optional `before` and
    /// `after` values.
    #[must_use]
    pub fn between(before: Option<U256>, after: Option<U256>) -> Self {
        match (before, after) {
            (None, Some(_)) => Self::NewValue,
            (Some(_), None) => Self::RemovedValue,
            (Some(b), Some(a)) if a > b => Self::Increase,
            (Some(b), Some(a)) if a < b => Self::Decrease,
            _ => Self::NoChange,
        }
    }
}

/// The size of a relative change, in ascending order.
///
/// The buckets are half-open intervals over the absolute change rate that
/// together cover `[0, ∞]`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    None,
    Tiny,
    Small,
    Medium,
    Large,
    Massive,
    Extreme,
}

impl Magnitude {
    /// Gets the canonical snake-case name of the magnitude.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Tiny => "tiny",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Massive => "massive",
            Self::Extreme => "extreme",
        }
    }
}

impl Display for Magnitude {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The change in a single storage slot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SlotChange {
    pub slot:         U256W,
    pub value_before: U256W,
    pub value_after:  U256W,
    pub direction:    Direction,
    pub magnitude:    Magnitude,

    /// The change relative to the value before, which is infinite when a zero
    /// slot becomes nonzero.
    #[serde(with = "serde_rate")]
    pub change_rate: f64,

    /// The signed difference `after - before`.
    pub absolute_change: Delta,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<SlotSemanticType>,
}

impl SlotChange {
    /// Renders the change rate as a multiplier and a signed percentage, in
    /// the form `"1.50x change, +150.00%"`.
    ///
    /// Infinite rates have no finite rendering and are written as
    /// `"unbounded change"`.
    #[must_use]
    pub fn describe_rate(&self) -> String {
        if self.change_rate.is_finite() {
            let sign = if self.absolute_change.is_negative() { '-' } else { '+' };
            format!(
                "{:.2}x change, {sign}{:.2}%",
                self.change_rate,
                self.change_rate * 100.0
            )
        } else {
            "unbounded change".to_string()
        }
    }

    /// Renders the change as a line of pattern evidence.
    #[must_use]
    pub fn describe(&self, contract: &str) -> String {
        format!(
            "{contract} slot {}: {} -> {} ({})",
            self.slot,
            self.value_before,
            self.value_after,
            self.describe_rate()
        )
    }
}

/// The changes to a single contract.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ContractDiff {
    /// The lowercased address of the contract.
    pub address: String,

    /// The changed slots in ascending slot order.
    pub slot_changes: Vec<SlotChange>,

    pub balance_change: Delta,
    pub nonce_change:   i128,

    pub increased_slots: usize,
    pub decreased_slots: usize,
    pub new_slots:       usize,
    pub removed_slots:   usize,
}

impl ContractDiff {
    /// Constructs the diff for `address` from its slot changes and deltas,
    /// computing the derived counts.
    #[must_use]
    pub fn new(
        address: impl Into<String>,
        slot_changes: Vec<SlotChange>,
        balance_change: Delta,
        nonce_change: i128,
    ) -> Self {
        let count = |d: Direction| slot_changes.iter().filter(|c| c.direction == d).count();
        let increased_slots = count(Direction::Increase);
        let decreased_slots = count(Direction::Decrease);
        let new_slots = count(Direction::NewValue);
        let removed_slots = count(Direction::RemovedValue);

        Self {
            address: address.into(),
            slot_changes,
            balance_change,
            nonce_change,
            increased_slots,
            decreased_slots,
            new_slots,
            removed_slots,
        }
    }

    /// Gets the changes with at least the given `magnitude`.
    pub fn changes_at_least(&self, magnitude: Magnitude) -> impl Iterator<Item = &SlotChange> {
        self.slot_changes.iter().filter(move |c| c.magnitude >= magnitude)
    }

    /// Gets the change to `slot`, if it changed.
    #[must_use]
    pub fn change_at(&self, slot: impl Into<U256W>) -> Option<&SlotChange> {
        let slot = slot.into();
        self.slot_changes.iter().find(|c| c.slot == slot)
    }
}

//! This module contains the built-in detectors, one per [`PatternType`].
//!
//! [`PatternType`]: crate::pattern::PatternType

pub mod flash_change;
pub mod flash_mint;
pub mod massive_transfer;
pub mod monotonic_increase;
pub mod ownership_change;
pub mod price_manipulation;
pub mod ratio_break;
pub mod recursive_call;
pub mod reentrancy_balance;
pub mod zero_value_change;

use crate::{
    diff::{change::SlotChange, SlotReference},
    pattern::{ChangePattern, PatternType, Severity},
};

/// Builds the pattern that aggregates all of `changes` within `contract`.
///
/// Returns [`None`] if `changes` is empty.
#[must_use]
pub fn aggregate(
    pattern_type: PatternType,
    confidence: f64,
    severity: Severity,
    contract: &str,
    changes: &[&SlotChange],
    description: String,
) -> Option<ChangePattern> {
    if changes.is_empty() {
        return None;
    }

    Some(ChangePattern {
        pattern_type,
        confidence,
        severity,
        description,
        evidence: changes.iter().map(|c| c.describe(contract)).collect(),
        contracts: vec![contract.to_string()],
        slots: changes
            .iter()
            .map(|c| SlotReference::new(contract, c.slot))
            .collect(),
    })
}

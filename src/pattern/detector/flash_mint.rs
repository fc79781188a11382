//! This module contains the detector for flash mints, where the total supply
//! of a token balloons within a single transaction.

use crate::{
    diff::{
        change::{Direction, Magnitude},
        DiffReport,
    },
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
    semantics::SlotSemanticType,
};

const CONFIDENCE: f64 = 0.85;

/// Emits one pattern per contract whose total-supply slots increased by an
/// extreme amount.
///
/// Requires the diff to carry semantic annotations, as the total supply can
/// not be told apart from other slots otherwise.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlashMint;

impl Detector for FlashMint {
    fn pattern_type(&self) -> PatternType {
        PatternType::FlashMint
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let minted: Vec<_> = diff
                    .changes_at_least(Magnitude::Extreme)
                    .filter(|c| c.semantic_type == Some(SlotSemanticType::TotalSupply))
                    .filter(|c| c.direction == Direction::Increase)
                    .collect();
                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::Critical,
                    address,
                    &minted,
                    format!("total supply of {address} increased by an extreme amount"),
                )
            })
            .collect()
    }
}

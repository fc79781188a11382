//! This module contains the detector for broken ratios between contracts.

use crate::{
    diff::{relation::RelationType, DiffReport},
    pattern::{ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.8;

/// Emits one pattern per set of contracts whose states changed by large
/// amounts together, which tends to break ratios that should hold between
/// them.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RatioBreak;

impl Detector for RatioBreak {
    fn pattern_type(&self) -> PatternType {
        PatternType::RatioBreak
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .relations_of(RelationType::CorrelatedExtremeChanges)
            .map(|relation| {
                let evidence = relation
                    .slots
                    .iter()
                    .filter_map(|r| {
                        report
                            .contract_diffs
                            .get(&r.contract)
                            .and_then(|d| d.change_at(r.slot))
                            .map(|c| c.describe(&r.contract))
                    })
                    .collect();

                ChangePattern {
                    pattern_type: self.pattern_type(),
                    confidence: CONFIDENCE,
                    severity: Severity::High,
                    description: relation.description.clone(),
                    evidence,
                    contracts: relation.contracts.clone(),
                    slots: relation.slots.clone(),
                }
            })
            .collect()
    }
}

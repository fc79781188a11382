//! This module contains the detector for massive transfers of native value
//! between contracts.

use crate::{
    diff::{relation::RelationType, DiffReport},
    pattern::{ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.8;

/// Emits one pattern per balance transfer found between contracts.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MassiveTransfer;

impl Detector for MassiveTransfer {
    fn pattern_type(&self) -> PatternType {
        PatternType::MassiveTransfer
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .relations_of(RelationType::BalanceTransfer)
            .map(|relation| ChangePattern {
                pattern_type: self.pattern_type(),
                confidence:   CONFIDENCE,
                severity:     Severity::Medium,
                description:  relation.description.clone(),
                evidence:     vec![relation.description.clone()],
                contracts:    relation.contracts.clone(),
                slots:        relation.slots.clone(),
            })
            .collect()
    }
}

//! This module contains the detector for balances drained by reentrancy.

use ethnum::U256;

use crate::{
    constant::ONE_ETHER_WEI,
    diff::DiffReport,
    pattern::{ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.75;

/// Emits one pattern per contract whose native balance dropped by more than
/// one ether.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReentrancyBalance;

impl Detector for ReentrancyBalance {
    fn pattern_type(&self) -> PatternType {
        PatternType::ReentrancyBalance
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        let bound = U256::from(ONE_ETHER_WEI);
        report
            .contract_diffs
            .iter()
            .filter(|(_, d)| d.balance_change.is_negative() && d.balance_change.magnitude() > bound)
            .map(|(address, diff)| ChangePattern {
                pattern_type: self.pattern_type(),
                confidence:   CONFIDENCE,
                severity:     Severity::High,
                description:  format!("balance of {address} was drained"),
                evidence:     vec![format!("{address} balance change: {}", diff.balance_change)],
                contracts:    vec![address.clone()],
                slots:        vec![],
            })
            .collect()
    }
}

//! This module contains the detector for slots that jump from zero to a large
//! value.

use ethnum::U256;

use crate::{
    constant::ONE_ETHER_WEI,
    diff::DiffReport,
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.6;

/// Emits one pattern per contract in which some slot went from zero to more
/// than `1e18`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ZeroValueChange;

impl Detector for ZeroValueChange {
    fn pattern_type(&self) -> PatternType {
        PatternType::ZeroValueChange
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        let bound = U256::from(ONE_ETHER_WEI);
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let filled: Vec<_> = diff
                    .slot_changes
                    .iter()
                    .filter(|c| c.value_before.value() == U256::ZERO && c.value_after.value() > bound)
                    .collect();
                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::Medium,
                    address,
                    &filled,
                    format!("{} empty slots of {address} received large values", filled.len()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use crate::pattern::{
        detector::{util, zero_value_change::ZeroValueChange},
        Detector,
    };

    #[test]
    fn filled_slot_is_flagged() {
        let big = 2_000_000_000_000_000_000u128;
        let patterns = ZeroValueChange.detect(&util::single_change("0xa", 7, 0, big));
        assert_eq!(patterns.len(), 1);
        assert!(patterns[0].evidence[0].contains("unbounded change"));

        assert!(ZeroValueChange.detect(&util::single_change("0xa", 7, 0, 5)).is_empty());
    }
}

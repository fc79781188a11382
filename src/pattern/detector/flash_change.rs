//! This module contains the detector for flash changes: slots that move by an
//! extreme amount within a single transaction.

use crate::{
    diff::{change::Magnitude, DiffReport},
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.9;

/// Emits one pattern per contract that has at least one slot change of
/// extreme magnitude, aggregating all such slots.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct FlashChange;

impl Detector for FlashChange {
    fn pattern_type(&self) -> PatternType {
        PatternType::FlashChange
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let extreme: Vec<_> = diff.changes_at_least(Magnitude::Extreme).collect();
                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::Critical,
                    address,
                    &extreme,
                    format!("{} slots of {address} changed by an extreme amount", extreme.len()),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::pattern::{
        detector::{flash_change::FlashChange, util},
        Detector,
        Detectors,
        PatternType,
        Severity,
    };

    #[test]
    fn fourteen_fold_change_is_a_single_flash_change() {
        let report = util::single_change("0xa", 4, 1_000_000, 15_000_000);

        let patterns = FlashChange.detect(&report);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Critical);
        assert_eq!(patterns[0].slots[0].slot.value(), U256::new(4));
        assert!(patterns[0].evidence[0].contains("14.00x change"));

        let all = Detectors::default().detect(&report);
        let referencing: Vec<_> = all
            .iter()
            .filter(|p| p.slots.iter().any(|s| s.slot.value() == U256::new(4)))
            .collect();
        assert_eq!(referencing.len(), 1);
        assert_eq!(referencing[0].pattern_type, PatternType::FlashChange);
    }

    #[test]
    fn massive_changes_are_not_flash_changes() {
        let report = util::single_change("0xa", 4, 1_000_000, 5_000_000);
        assert!(FlashChange.detect(&report).is_empty());
    }
}

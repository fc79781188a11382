//! This module contains the detector for changes of ownership.

use crate::{
    diff::DiffReport,
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.9;

/// Emits a pattern for each contract whose slot 0 holds an owner and
/// changed.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct OwnershipChange;

impl Detector for OwnershipChange {
    fn pattern_type(&self) -> PatternType {
        PatternType::OwnershipChange
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let change = diff
                    .change_at(0u64)
                    .filter(|c| c.semantic_type.is_some_and(|s| s.is_ownership()))?;
                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::Critical,
                    address,
                    &[change],
                    format!("ownership of {address} changed"),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        input::snapshot::{ContractState, StateSnapshot},
        pattern::{
            detector::{ownership_change::OwnershipChange, util},
            Detector,
            Severity,
        },
        semantics::{SemanticMapping, SlotSemantic, SlotSemanticType},
    };

    #[test]
    fn owner_in_slot_zero_changing_is_critical() {
        let before = StateSnapshot::new()
            .with_contract(ContractState::new("0xa").with_slot(0u64, U256::new(0xaaaa)));
        let after = StateSnapshot::new()
            .with_contract(ContractState::new("0xa").with_slot(0u64, U256::new(0xbbbb)));
        let mut semantics = SemanticMapping::new();
        semantics.insert("0xa", 0u64, SlotSemantic::new(SlotSemanticType::Owner, 0.9, "name"));

        let patterns = OwnershipChange.detect(&util::report(&before, &after, Some(&semantics)));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].severity, Severity::Critical);

        assert!(OwnershipChange.detect(&util::report(&before, &after, None)).is_empty());
    }
}

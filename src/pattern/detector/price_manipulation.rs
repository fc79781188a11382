//! This module contains the detector for price manipulation.

use crate::{
    diff::{change::Magnitude, DiffReport},
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.75;

/// Emits one pattern per contract in which some price-like slot (a price, an
/// oracle, a cumulative price or an exchange rate) moved by at least a large
/// amount.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PriceManipulation;

impl Detector for PriceManipulation {
    fn pattern_type(&self) -> PatternType {
        PatternType::PriceManipulation
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let moved: Vec<_> = diff
                    .changes_at_least(Magnitude::Large)
                    .filter(|c| c.semantic_type.is_some_and(|s| s.is_price()))
                    .collect();
                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::High,
                    address,
                    &moved,
                    format!("price-related slots of {address} moved sharply"),
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
            detector::{price_manipulation::PriceManipulation, util},
            Detector,
        },
        semantics::{SemanticMapping, SlotSemantic, SlotSemanticType},
    };

    #[test]
    fn groups_price_slots_per_contract() {
        let before = StateSnapshot::new().with_contract(
            ContractState::new("0xa")
                .with_slot(0u64, U256::new(1000))
                .with_slot(1u64, U256::new(1000))
                .with_slot(2u64, U256::new(1000)),
        );
        let after = StateSnapshot::new().with_contract(
            ContractState::new("0xa")
                .with_slot(0u64, U256::new(2000))
                .with_slot(1u64, U256::new(1800))
                .with_slot(2u64, U256::new(1001)),
        );
        let mut semantics = SemanticMapping::new();
        for (slot, typ) in [
            (0u64, SlotSemanticType::PriceOracle),
            (1, SlotSemanticType::ExchangeRate),
            (2, SlotSemanticType::PriceCumulative),
        ] {
            semantics.insert("0xa", slot, SlotSemantic::new(typ, 0.9, "name"));
        }

        let patterns = PriceManipulation.detect(&util::report(&before, &after, Some(&semantics)));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].slots.len(), 2);
        assert_eq!(patterns[0].evidence.len(), 2);
    }
}

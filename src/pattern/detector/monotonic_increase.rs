//! This module contains the detector for monotonic increases, where many
//! slots in one contract all grow sharply at once.

use crate::{
    constant::MONOTONIC_INCREASE_MIN_SLOTS,
    diff::{
        change::{Direction, Magnitude},
        DiffReport,
    },
    pattern::{detector::aggregate, ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.7;

/// Emits one pattern per contract with at least
/// [`MONOTONIC_INCREASE_MIN_SLOTS`] slots that increased by a large amount or
/// more.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct MonotonicIncrease;

impl Detector for MonotonicIncrease {
    fn pattern_type(&self) -> PatternType {
        PatternType::MonotonicIncrease
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter_map(|(address, diff)| {
                let increased: Vec<_> = diff
                    .changes_at_least(Magnitude::Large)
                    .filter(|c| c.direction == Direction::Increase)
                    .collect();
                if increased.len() < MONOTONIC_INCREASE_MIN_SLOTS {
                    return None;
                }

                aggregate(
                    self.pattern_type(),
                    CONFIDENCE,
                    Severity::High,
                    address,
                    &increased,
                    format!("{} slots of {address} increased sharply", increased.len()),
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
            detector::{monotonic_increase::MonotonicIncrease, util},
            Detector,
        },
    };

    #[test]
    fn needs_several_increasing_slots() {
        let before = StateSnapshot::new().with_contract(
            ContractState::new("0xa")
                .with_slot(0u64, U256::new(100))
                .with_slot(1u64, U256::new(100)),
        );
        let after = StateSnapshot::new().with_contract(
            ContractState::new("0xa")
                .with_slot(0u64, U256::new(200))
                .with_slot(1u64, U256::new(190)),
        );
        let patterns = MonotonicIncrease.detect(&util::report(&before, &after, None));
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].slots.len(), 2);

        let single = util::single_change("0xa", 0, 100, 200);
        assert!(MonotonicIncrease.detect(&single).is_empty());
    }
}

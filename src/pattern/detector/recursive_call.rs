//! This module contains the detector for recursive calls, recognised by an
//! unusually large jump in a contract's nonce.

use crate::{
    constant::RECURSIVE_CALL_NONCE_DELTA,
    diff::DiffReport,
    pattern::{ChangePattern, Detector, PatternType, Severity},
};

const CONFIDENCE: f64 = 0.85;

/// Emits one pattern per contract whose nonce grew by more than
/// [`RECURSIVE_CALL_NONCE_DELTA`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RecursiveCall;

impl Detector for RecursiveCall {
    fn pattern_type(&self) -> PatternType {
        PatternType::RecursiveCall
    }

    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        report
            .contract_diffs
            .iter()
            .filter(|(_, d)| d.nonce_change > i128::from(RECURSIVE_CALL_NONCE_DELTA))
            .map(|(address, diff)| ChangePattern {
                pattern_type: self.pattern_type(),
                confidence:   CONFIDENCE,
                severity:     Severity::High,
                description:  format!("nonce of {address} jumped by {}", diff.nonce_change),
                evidence:     vec![format!("{address} nonce change: +{}", diff.nonce_change)],
                contracts:    vec![address.clone()],
                slots:        vec![],
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        input::snapshot::{ContractState, StateSnapshot},
        pattern::{
            detector::{recursive_call::RecursiveCall, util},
            Detector,
        },
    };

    #[test]
    fn nonce_jump_beyond_bound_is_recursive() {
        let before = StateSnapshot::new().with_contract(ContractState::new("0xa").with_nonce(1));
        let deep = StateSnapshot::new().with_contract(ContractState::new("0xa").with_nonce(12));
        let shallow = StateSnapshot::new().with_contract(ContractState::new("0xa").with_nonce(11));

        assert_eq!(RecursiveCall.detect(&util::report(&before, &deep, None)).len(), 1);
        assert!(RecursiveCall.detect(&util::report(&before, &shallow, None)).is_empty());
    }
}

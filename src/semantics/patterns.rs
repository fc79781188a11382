//! This module contains the priority-ordered table of variable-name patterns
//! used to recognise the semantic role of a storage slot.
//!
//! The table is consulted top to bottom and the first matching entry wins, so
//! more specific patterns (such as `allowance`) must appear before the more
//! general ones that would also match them (such as `balance`).

use std::sync::LazyLock;

use regex::Regex;

use crate::{layout::types::SolidityType, semantics::SlotSemanticType};

/// A single entry in the name-pattern table.
#[derive(Debug)]
pub struct NamePattern {
    /// The semantic type assigned when the pattern matches.
    pub semantic: SlotSemanticType,

    /// The compiled regexes, any one of which matching is sufficient.
    pub regexes: Vec<Regex>,

    /// The rank of the pattern in `1..=5`, with higher being more specific.
    pub priority: u8,
}

impl NamePattern {
    /// Checks whether any of the pattern's regexes match `name`.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regexes.iter().any(|r| r.is_match(name))
    }

    /// Checks whether the declared `typ` of a variable is consistent with the
    /// semantic type of this pattern.
    #[must_use]
    pub fn corroborated_by(&self, typ: &SolidityType) -> bool {
        corroborates(self.semantic, typ)
    }
}

/// Checks whether a declared `typ` is what one would expect to see for a
/// variable with the given `semantic`.
#[must_use]
pub fn corroborates(semantic: SlotSemanticType, typ: &SolidityType) -> bool {
    use SlotSemanticType as S;
    match semantic {
        S::BalanceMapping => typ.is_address_to_uint_mapping(),
        S::AllowanceMapping => typ.is_nested_address_to_uint_mapping(),
        S::Owner | S::Admin | S::Implementation | S::AddressReference => {
            *typ == SolidityType::Address
        }
        S::Paused => *typ == SolidityType::Bool,
        S::ReentrancyLock => *typ == SolidityType::Bool || typ.is_integer(),
        S::TotalSupply
        | S::Reserve
        | S::PriceCumulative
        | S::Debt
        | S::Collateral
        | S::PriceOracle
        | S::ExchangeRate
        | S::InterestRate
        | S::Timestamp
        | S::Nonce
        | S::Shares
        | S::Liquidity
        | S::RewardAmount
        | S::FeeAmount
        | S::Threshold
        | S::Counter
        | S::Decimals
        | S::TokenAmount => typ.is_integer(),
        S::Unknown => false,
    }
}

/// The process-wide name-pattern table, compiled on first use.
pub static NAME_PATTERNS: LazyLock<Vec<NamePattern>> = LazyLock::new(build_table);

#[allow(clippy::missing_panics_doc)] // The patterns are static and known to be valid
fn build_table() -> Vec<NamePattern> {
    use SlotSemanticType as S;

    let entries: &[(SlotSemanticType, &[&str], u8)] = &[
        (S::AllowanceMapping, &[r"(?i)allowance", r"(?i)^_?allowed$", r"(?i)approvals?$"], 5),
        (S::BalanceMapping, &[r"(?i)balances?(of)?$", r"(?i)^_?balance"], 5),
        (S::TotalSupply, &[r"(?i)total_?supply", r"(?i)^_?supply$"], 5),
        (S::PriceCumulative, &[r"(?i)price\d*_?cumulative", r"(?i)cumulative_?price"], 5),
        (S::Reserve, &[r"(?i)reserve", r"(?i)total_?assets"], 5),
        (S::Implementation, &[r"(?i)implementation", r"(?i)^_?impl$"], 5),
        (S::ReentrancyLock, &[r"(?i)reentran", r"(?i)^_?(un)?locked$", r"(?i)^_?status$"], 5),
        (S::InterestRate, &[r"(?i)interest", r"(?i)borrow_?rate", r"(?i)supply_?rate", r"(?i)ap[ry]$"], 4),
        (S::ExchangeRate, &[r"(?i)exchange_?rate", r"(?i)price_?per_?share", r"(?i)share_?price"], 4),
        (S::Debt, &[r"(?i)debt", r"(?i)borrow"], 4),
        (S::Collateral, &[r"(?i)collateral"], 4),
        (S::Owner, &[r"(?i)owner"], 4),
        (S::Admin, &[r"(?i)admin", r"(?i)governor", r"(?i)guardian"], 4),
        (S::Paused, &[r"(?i)paused?$"], 4),
        (S::PriceOracle, &[r"(?i)oracle", r"(?i)price"], 4),
        (S::Shares, &[r"(?i)shares?$"], 4),
        (S::Liquidity, &[r"(?i)liquidity"], 4),
        (S::RewardAmount, &[r"(?i)reward"], 3),
        (S::FeeAmount, &[r"(?i)fee"], 3),
        (S::Nonce, &[r"(?i)nonce"], 3),
        (S::Timestamp, &[r"(?i)timestamp", r"(?i)last_?update", r"(?i)deadline", r"(?i)_?time$"], 3),
        (S::Decimals, &[r"(?i)decimals"], 3),
        (S::Threshold, &[r"(?i)threshold", r"(?i)limit", r"(?i)cap$", r"(?i)quorum"], 2),
        (S::Counter, &[r"(?i)count", r"(?i)index", r"(?i)length", r"(?i)^_?(next_?)?id$"], 2),
        (
            S::AddressReference,
            &[r"(?i)token\d*$", r"(?i)router", r"(?i)factory", r"(?i)pair$", r"(?i)address"],
            2,
        ),
        (S::TokenAmount, &[r"(?i)amount", r"(?i)deposit", r"(?i)staked?$"], 1),
    ];

    entries
        .iter()
        .map(|(semantic, patterns, priority)| NamePattern {
            semantic: *semantic,
            regexes:  patterns
                .iter()
                .map(|p| Regex::new(p).expect("Name patterns are statically valid"))
                .collect(),
            priority: *priority,
        })
        .collect()
}

/// Finds the first pattern in the table that matches `name`.
#[must_use]
pub fn first_match(name: &str) -> Option<&'static NamePattern> {
    NAME_PATTERNS.iter().find(|p| p.matches(name))
}

#[cfg(test)]
mod test {
    use crate::semantics::{patterns::first_match, SlotSemanticType};

    #[test]
    fn specific_patterns_shadow_general_ones() {
        let allowance = first_match("allowances").unwrap();
        assert_eq!(allowance.semantic, SlotSemanticType::AllowanceMapping);

        let cumulative = first_match("price0CumulativeLast").unwrap();
        assert_eq!(cumulative.semantic, SlotSemanticType::PriceCumulative);

        let rate = first_match("borrowRate").unwrap();
        assert_eq!(rate.semantic, SlotSemanticType::InterestRate);
    }

    #[test]
    fn priorities_are_in_range() {
        assert!(super::NAME_PATTERNS.iter().all(|p| (1..=5).contains(&p.priority)));
    }

    #[test]
    fn anonymous_slot_names_match_nothing() {
        assert!(first_match("slot_3").is_none());
    }
}

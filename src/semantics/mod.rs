//! This module contains the slot semantic classifier, which attaches a
//! semantic role (such as "total supply" or "owner") to anonymous storage
//! slots.
//!
//! # Evidence Sources
//!
//! Classification draws on up to three pieces of evidence, consulted in order
//! of decreasing reliability:
//!
//! 1. The declared name of the variable, matched against the priority-ordered
//!    [`patterns::NAME_PATTERNS`] table. A declared type that agrees with the
//!    guess boosts the confidence.
//! 2. The declared type alone, which is enough to recognise balance and
//!    allowance mappings.
//! 3. The raw value held in the slot, which is checked against the ranges
//!    typical of timestamps, token amounts, and addresses.
//!
//! If none of these yield anything the slot is [`SlotSemanticType::Unknown`].

pub mod patterns;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        ADDRESS_WIDTH_BITS,
        NAME_MATCH_BASE_CONFIDENCE,
        NAME_MATCH_PRIORITY_STEP,
        ONE_ETHER_WEI,
        TIMESTAMP_LOWER_BOUND,
        TIMESTAMP_UPPER_BOUND,
        TOKEN_AMOUNT_UPPER_BOUND,
        TYPE_CORROBORATION_BOOST,
        TYPE_INFERENCE_CONFIDENCE,
        UNKNOWN_SEMANTIC_CONFIDENCE,
        VALUE_ADDRESS_CONFIDENCE,
        VALUE_TIMESTAMP_CONFIDENCE,
        VALUE_TOKEN_AMOUNT_CONFIDENCE,
    },
    input::snapshot::StateSnapshot,
    layout::{hashed::SlotHashes, types::SolidityType, ContractLayout},
    utility::{round2, U256W},
};

/// The closed set of semantic roles that a storage slot can play.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSemanticType {
    TotalSupply,
    BalanceMapping,
    AllowanceMapping,
    Reserve,
    PriceCumulative,
    Debt,
    Collateral,
    PriceOracle,
    ExchangeRate,
    InterestRate,
    Owner,
    Admin,
    Implementation,
    Paused,
    ReentrancyLock,
    Timestamp,
    Nonce,
    Shares,
    Liquidity,
    RewardAmount,
    FeeAmount,
    Threshold,
    Counter,
    Decimals,
    AddressReference,
    TokenAmount,
    Unknown,
}

impl SlotSemanticType {
    /// Gets the canonical snake-case name of the semantic type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TotalSupply => "total_supply",
            Self::BalanceMapping => "balance_mapping",
            Self::AllowanceMapping => "allowance_mapping",
            Self::Reserve => "reserve",
            Self::PriceCumulative => "price_cumulative",
            Self::Debt => "debt",
            Self::Collateral => "collateral",
            Self::PriceOracle => "price_oracle",
            Self::ExchangeRate => "exchange_rate",
            Self::InterestRate => "interest_rate",
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Implementation => "implementation",
            Self::Paused => "paused",
            Self::ReentrancyLock => "reentrancy_lock",
            Self::Timestamp => "timestamp",
            Self::Nonce => "nonce",
            Self::Shares => "shares",
            Self::Liquidity => "liquidity",
            Self::RewardAmount => "reward_amount",
            Self::FeeAmount => "fee_amount",
            Self::Threshold => "threshold",
            Self::Counter => "counter",
            Self::Decimals => "decimals",
            Self::AddressReference => "address_reference",
            Self::TokenAmount => "token_amount",
            Self::Unknown => "unknown",
        }
    }

    /// Checks whether the semantic type describes some kind of price.
    #[must_use]
    pub fn is_price(self) -> bool {
        matches!(self, Self::PriceOracle | Self::ExchangeRate | Self::PriceCumulative)
    }

    /// Checks whether the semantic type describes ownership of the contract.
    #[must_use]
    pub fn is_ownership(self) -> bool {
        self.as_str().contains("owner")
    }
}

impl Display for SlotSemanticType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The semantic label attached to a single slot.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SlotSemantic {
    /// The semantic role of the slot.
    pub semantic_type: SlotSemanticType,

    /// How confident the classifier is in the role, in `[0, 1]`.
    pub confidence: f64,

    /// A human-readable explanation of how the role was arrived at.
    pub reason: String,
}

impl SlotSemantic {
    /// Constructs a new semantic label.
    #[must_use]
    pub fn new(semantic_type: SlotSemanticType, confidence: f64, reason: impl Into<String>) -> Self {
        let confidence = confidence.clamp(0.0, 1.0);
        let reason = reason.into();
        Self {
            semantic_type,
            confidence,
            reason,
        }
    }

    /// Constructs the label for a slot about which nothing is known.
    #[must_use]
    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::new(SlotSemanticType::Unknown, UNKNOWN_SEMANTIC_CONFIDENCE, reason)
    }
}

/// Classifies the variable called `name`, with the declared type `typ` and
/// holding the raw `value`, where known.
#[must_use]
pub fn classify(name: &str, typ: Option<&SolidityType>, value: Option<U256>) -> SlotSemantic {
    if let Some(pattern) = patterns::first_match(name) {
        let mut confidence =
            NAME_MATCH_BASE_CONFIDENCE + f64::from(pattern.priority) * NAME_MATCH_PRIORITY_STEP;
        let mut reason = format!("name `{name}` matches the {} pattern", pattern.semantic);

        if let Some(typ) = typ.filter(|t| pattern.corroborated_by(t)) {
            confidence += TYPE_CORROBORATION_BOOST;
            reason.push_str(&format!(", corroborated by type `{typ}`"));
        }

        return SlotSemantic::new(pattern.semantic, round2(confidence.min(1.0)), reason);
    }

    if let Some(semantic) = typ.and_then(infer_from_type) {
        return semantic;
    }

    if let Some(semantic) = value.and_then(infer_from_value) {
        return semantic;
    }

    SlotSemantic::unknown(format!("no evidence for the role of `{name}`"))
}

/// Infers the semantic role of a slot from its declared type alone.
fn infer_from_type(typ: &SolidityType) -> Option<SlotSemantic> {
    let semantic = if typ.is_nested_address_to_uint_mapping() {
        SlotSemanticType::AllowanceMapping
    } else if typ.is_address_to_uint_mapping() {
        SlotSemanticType::BalanceMapping
    } else if *typ == SolidityType::Address {
        SlotSemanticType::AddressReference
    } else {
        return None;
    };

    Some(SlotSemantic::new(
        semantic,
        TYPE_INFERENCE_CONFIDENCE,
        format!("declared type `{typ}` suggests {semantic}"),
    ))
}

/// Infers the semantic role of a slot from the range its raw value falls in.
///
/// Timestamps and token amounts are both numerically below the address bound,
/// so the narrower ranges are checked first.
fn infer_from_value(value: U256) -> Option<SlotSemantic> {
    let timestamps = U256::new(TIMESTAMP_LOWER_BOUND)..=U256::new(TIMESTAMP_UPPER_BOUND);
    let token_amounts = U256::new(ONE_ETHER_WEI)..=U256::new(TOKEN_AMOUNT_UPPER_BOUND);
    let address_bound = U256::ONE << ADDRESS_WIDTH_BITS as u32;

    if timestamps.contains(&value) {
        Some(SlotSemantic::new(
            SlotSemanticType::Timestamp,
            VALUE_TIMESTAMP_CONFIDENCE,
            format!("value {value} lies in the unix timestamp range"),
        ))
    } else if token_amounts.contains(&value) {
        Some(SlotSemantic::new(
            SlotSemanticType::TokenAmount,
            VALUE_TOKEN_AMOUNT_CONFIDENCE,
            format!("value {value} lies in the 18-decimal token amount range"),
        ))
    } else if value > U256::ZERO && value < address_bound {
        Some(SlotSemantic::new(
            SlotSemanticType::AddressReference,
            VALUE_ADDRESS_CONFIDENCE,
            format!("value {value} fits in an address"),
        ))
    } else {
        None
    }
}

/// A single input to [`classify_batch`].
pub type ClassificationInput<'a> = (&'a str, Option<&'a SolidityType>, Option<U256>);

/// Classifies each of the `entries` independently, returning the results
/// keyed by name.
///
/// If a name appears more than once the last entry for it wins.
#[must_use]
pub fn classify_batch(entries: &[ClassificationInput<'_>]) -> BTreeMap<String, SlotSemantic> {
    entries
        .iter()
        .map(|(name, typ, value)| ((*name).to_string(), classify(name, *typ, *value)))
        .collect()
}

/// The semantic labels for every slot of every contract in a snapshot, keyed
/// by contract address and then slot.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SemanticMapping {
    contracts: BTreeMap<String, BTreeMap<U256W, SlotSemantic>>,
}

impl SemanticMapping {
    /// Constructs an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `semantic` as the label of `slot` in `contract`.
    pub fn insert(&mut self, contract: impl Into<String>, slot: impl Into<U256W>, semantic: SlotSemantic) {
        self.contracts
            .entry(contract.into().to_lowercase())
            .or_default()
            .insert(slot.into(), semantic);
    }

    /// Gets the label of `slot` in `contract`, if there is one.
    #[must_use]
    pub fn get(&self, contract: &str, slot: impl Into<U256W>) -> Option<&SlotSemantic> {
        self.contracts
            .get(&contract.to_lowercase())
            .and_then(|slots| slots.get(&slot.into()))
    }

    /// Gets the labels of all slots in `contract`.
    #[must_use]
    pub fn slots_of(&self, contract: &str) -> Option<&BTreeMap<U256W, SlotSemantic>> {
        self.contracts.get(&contract.to_lowercase())
    }

    /// Iterates over the contracts in address order.
    pub fn contracts(&self) -> impl Iterator<Item = (&String, &BTreeMap<U256W, SlotSemantic>)> {
        self.contracts.iter()
    }

    /// Groups the slots of `contract` by their semantic type, excluding those
    /// whose type is unknown.
    ///
    /// The slots for each type are in ascending order.
    #[must_use]
    pub fn slots_by_type(&self, contract: &str) -> BTreeMap<SlotSemanticType, Vec<U256W>> {
        let mut by_type: BTreeMap<SlotSemanticType, Vec<U256W>> = BTreeMap::new();
        if let Some(slots) = self.slots_of(contract) {
            for (slot, semantic) in slots {
                if semantic.semantic_type != SlotSemanticType::Unknown {
                    by_type.entry(semantic.semantic_type).or_default().push(*slot);
                }
            }
        }
        by_type
    }

    /// Counts the occurrences of each semantic type across all contracts.
    #[must_use]
    pub fn type_counts(&self) -> BTreeMap<SlotSemanticType, usize> {
        let mut counts = BTreeMap::new();
        for semantic in self.contracts.values().flat_map(BTreeMap::values) {
            *counts.entry(semantic.semantic_type).or_insert(0) += 1;
        }
        counts
    }

    /// Gets the total number of labelled slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.values().map(BTreeMap::len).sum()
    }

    /// Checks if no slots are labelled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Computes the fraction of labelled slots whose type is not unknown.
    ///
    /// An empty mapping has a coverage of zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)] // Slot counts are far below 2^52
    pub fn coverage(&self) -> f64 {
        let total = self.len();
        if total == 0 {
            return 0.0;
        }
        let known = self
            .contracts
            .values()
            .flat_map(BTreeMap::values)
            .filter(|s| s.semantic_type != SlotSemanticType::Unknown)
            .count();
        known as f64 / total as f64
    }
}

/// Labels every slot of every contract in `snapshot`.
///
/// Where `layout` describes a contract, the declared name and type of the
/// variable placed at a slot are used as evidence. Slots recognised as the
/// first data slot of a dynamic array are labelled using the array's element
/// type where that is known. All other slots are classified on their raw
/// value alone.
#[must_use]
pub fn label_snapshot(snapshot: &StateSnapshot, layout: Option<&ContractLayout>) -> SemanticMapping {
    let mut mapping = SemanticMapping::new();
    let hashes = SlotHashes::shared();

    for (address, state) in snapshot.contracts() {
        let layout = layout.filter(|l| l.describes(address)).map(|l| &l.layout);

        for (slot, value) in state.storage() {
            let value = value.value();
            let declared = layout.and_then(|l| {
                l.primary_at(*slot).or_else(|| l.variables_at(*slot).into_iter().next())
            });

            let semantic = if let Some(info) = declared {
                classify(&info.name, Some(&info.typ), Some(value))
            } else if let Some(base) = hashes.base_slot_of(slot.value()) {
                let array = layout.and_then(|l| l.primary_at(base)).filter(|i| i.is_array);
                let inner = match array {
                    Some(info) => classify(
                        &info.name,
                        info.array_element_type.as_ref(),
                        Some(value),
                    ),
                    None => classify(&format!("slot_{base}"), None, Some(value)),
                };
                let reason = format!("first element of the array at slot {base}; {}", inner.reason);
                SlotSemantic::new(inner.semantic_type, inner.confidence, reason)
            } else {
                classify(&format!("slot_{slot}"), None, Some(value))
            };

            mapping.insert(address.as_str(), *slot, semantic);
        }
    }

    tracing::debug!(
        slots = mapping.len(),
        coverage = mapping.coverage(),
        "labelled snapshot"
    );
    mapping
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        input::snapshot::{ContractState, StateSnapshot},
        layout::{calculate_layout, types::SolidityType, ContractLayout, StateVariable},
        semantics::{classify, classify_batch, label_snapshot, SlotSemanticType},
    };

    #[test]
    fn name_match_with_corroborating_type() {
        let typ = SolidityType::parse("uint256");
        let semantic = classify("totalSupply", Some(&typ), None);
        assert_eq!(semantic.semantic_type, SlotSemanticType::TotalSupply);
        assert!((semantic.confidence - 1.0).abs() < f64::EPSILON);

        let semantic = classify("totalSupply", None, None);
        assert!((semantic.confidence - 1.0).abs() < f64::EPSILON);

        let semantic = classify("feeRecipientCount", None, None);
        assert_eq!(semantic.semantic_type, SlotSemanticType::FeeAmount);
        assert!((semantic.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn falls_back_to_declared_type() {
        let typ = SolidityType::parse("mapping(address => mapping(address => uint256))");
        let semantic = classify("_data", Some(&typ), None);
        assert_eq!(semantic.semantic_type, SlotSemanticType::AllowanceMapping);

        let typ = SolidityType::parse("mapping(address => uint256)");
        let semantic = classify("_data", Some(&typ), None);
        assert_eq!(semantic.semantic_type, SlotSemanticType::BalanceMapping);
    }

    #[test]
    fn falls_back_to_value_ranges() {
        let ts = classify("x", None, Some(U256::new(1_700_000_000)));
        assert_eq!(ts.semantic_type, SlotSemanticType::Timestamp);

        let amount = classify("x", None, Some(U256::new(5_000_000_000_000_000_000)));
        assert_eq!(amount.semantic_type, SlotSemanticType::TokenAmount);

        let address = classify("x", None, Some(U256::from_words(0xdead, 0)));
        assert_eq!(address.semantic_type, SlotSemanticType::AddressReference);

        let unknown = classify("x", None, Some(U256::ZERO));
        assert_eq!(unknown.semantic_type, SlotSemanticType::Unknown);
        assert!((unknown.confidence - 0.1).abs() < f64::EPSILON);

        let unknown = classify("x", None, Some(U256::MAX));
        assert_eq!(unknown.semantic_type, SlotSemanticType::Unknown);
    }

    #[test]
    fn batch_entries_do_not_interact() {
        let typ = SolidityType::Address;
        let results = classify_batch(&[
            ("owner", Some(&typ), None),
            ("reserve0", None, None),
            ("mystery", None, None),
        ]);
        assert_eq!(results.len(), 3);
        assert_eq!(results["owner"].semantic_type, SlotSemanticType::Owner);
        assert_eq!(results["reserve0"].semantic_type, SlotSemanticType::Reserve);
        assert_eq!(results["mystery"].semantic_type, SlotSemanticType::Unknown);
    }

    #[test]
    fn labels_snapshot_with_layout() {
        let variables = vec![
            StateVariable::new("owner", "address"),
            StateVariable::new("totalSupply", "uint256"),
            StateVariable::new("balances", "mapping(address => uint256)"),
        ];
        let layout = ContractLayout {
            contract: Some("0xabc".into()),
            layout:   calculate_layout(&variables, U256::ZERO),
        };
        let snapshot = StateSnapshot::new()
            .with_contract(
                ContractState::new("0xABC")
                    .with_slot(U256::ZERO, U256::new(0xdead))
                    .with_slot(U256::ONE, U256::new(1_000))
                    .with_slot(U256::new(7), U256::ZERO),
            )
            .with_contract(ContractState::new("0xdef").with_slot(U256::ONE, U256::new(1_000)));

        let mapping = label_snapshot(&snapshot, Some(&layout));
        assert_eq!(mapping.len(), 4);
        assert_eq!(
            mapping.get("0xabc", U256::ZERO).unwrap().semantic_type,
            SlotSemanticType::Owner
        );
        assert_eq!(
            mapping.get("0xabc", U256::ONE).unwrap().semantic_type,
            SlotSemanticType::TotalSupply
        );
        assert_eq!(
            mapping.get("0xabc", U256::new(7)).unwrap().semantic_type,
            SlotSemanticType::Unknown
        );
        assert_eq!(
            mapping.get("0xdef", U256::ONE).unwrap().semantic_type,
            SlotSemanticType::AddressReference
        );
        assert!((mapping.coverage() - 0.75).abs() < f64::EPSILON);
    }
}

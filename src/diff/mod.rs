//! This module contains the state diff engine, which compares a before and an
//! after snapshot and describes what changed, how much, and which changes in
//! different contracts appear to be related.

pub mod change;
pub mod relation;

use std::collections::{BTreeMap, BTreeSet};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        BALANCE_TRANSFER_SCORE,
        CORRELATED_CHANGES_MIN_CONTRACTS,
        CORRELATED_CHANGES_SCORE,
        GAS_TOLERANCE,
        MAGNITUDE_LARGE_BOUND,
        MAGNITUDE_MASSIVE_BOUND,
        MAGNITUDE_MEDIUM_BOUND,
        MAGNITUDE_SMALL_BOUND,
        MAGNITUDE_TINY_BOUND,
    },
    diff::{
        change::{ContractDiff, Direction, Magnitude, SlotChange},
        relation::{CrossContractRelation, RelationType},
    },
    input::snapshot::{ContractState, StateSnapshot},
    semantics::SemanticMapping,
    utility::{Delta, U256W},
};

/// A reference to a single slot of a single contract.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SlotReference {
    pub contract: String,
    pub slot:     U256W,
}

impl SlotReference {
    /// Constructs a reference to `slot` in `contract`.
    #[must_use]
    pub fn new(contract: impl Into<String>, slot: impl Into<U256W>) -> Self {
        Self {
            contract: contract.into(),
            slot:     slot.into(),
        }
    }
}

/// A change together with the contract it occurred in.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LocatedChange {
    pub contract: String,
    pub change:   SlotChange,
}

/// The complete description of the differences between two snapshots.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct DiffReport {
    /// The contracts that changed, keyed by lowercased address.
    pub contract_diffs: BTreeMap<String, ContractDiff>,

    pub cross_contract_relations: Vec<CrossContractRelation>,

    pub total_contracts_changed: usize,
    pub total_slots_changed:     usize,

    /// Every change of magnitude massive or extreme.
    pub extreme_changes: Vec<LocatedChange>,

    /// Human-readable descriptions of the extreme changes.
    pub anomalies: Vec<String>,
}

impl DiffReport {
    /// Gets the relations of the given `relation_type`.
    pub fn relations_of(&self, relation_type: RelationType) -> impl Iterator<Item = &CrossContractRelation> {
        self.cross_contract_relations
            .iter()
            .filter(move |r| r.relation_type == relation_type)
    }

    /// Checks if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contract_diffs.is_empty()
    }
}

/// The configuration for the diff engine.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The exclusive upper bounds of the `tiny`, `small`, `medium`, `large`
    /// and `massive` buckets, in ascending order.
    ///
    /// Defaults to the `MAGNITUDE_*_BOUND` constants.
    pub magnitude_bounds: [f64; 5],

    /// The relative difference below which two opposite balance deltas are
    /// considered the same transfer.
    ///
    /// Defaults to [`GAS_TOLERANCE`].
    pub gas_tolerance: f64,

    /// The score given to detected balance transfers.
    ///
    /// Defaults to [`BALANCE_TRANSFER_SCORE`].
    pub balance_transfer_score: f64,

    /// The score given to correlated large changes.
    ///
    /// Defaults to [`CORRELATED_CHANGES_SCORE`].
    pub correlated_changes_score: f64,

    /// The number of contracts that must see large changes for them to be
    /// considered correlated.
    ///
    /// Defaults to [`CORRELATED_CHANGES_MIN_CONTRACTS`].
    pub correlated_changes_min_contracts: usize,
}

impl Config {
    /// Sets the `magnitude_bounds` config parameter to `value`.
    #[must_use]
    pub fn with_magnitude_bounds(mut self, value: [f64; 5]) -> Self {
        self.magnitude_bounds = value;
        self
    }

    /// Sets the `gas_tolerance` config parameter to `value`.
    #[must_use]
    pub fn with_gas_tolerance(mut self, value: f64) -> Self {
        self.gas_tolerance = value;
        self
    }

    /// Sets the `balance_transfer_score` config parameter to `value`.
    #[must_use]
    pub fn with_balance_transfer_score(mut self, value: f64) -> Self {
        self.balance_transfer_score = value;
        self
    }

    /// Sets the `correlated_changes_score` config parameter to `value`.
    #[must_use]
    pub fn with_correlated_changes_score(mut self, value: f64) -> Self {
        self.correlated_changes_score = value;
        self
    }

    /// Sets the `correlated_changes_min_contracts` config parameter to
    /// `value`.
    #[must_use]
    pub fn with_correlated_changes_min_contracts(mut self, value: usize) -> Self {
        self.correlated_changes_min_contracts = value;
        self
    }

    /// Buckets the absolute `rate` of a change.
    #[must_use]
    pub fn classify_magnitude(&self, rate: f64) -> Magnitude {
        const BUCKETS: [Magnitude; 5] = [
            Magnitude::Tiny,
            Magnitude::Small,
            Magnitude::Medium,
            Magnitude::Large,
            Magnitude::Massive,
        ];

        let rate = rate.abs();
        if rate == 0.0 {
            return Magnitude::None;
        }
        self.magnitude_bounds
            .iter()
            .zip(BUCKETS)
            .find(|(bound, _)| rate < **bound)
            .map_or(Magnitude::Extreme, |(_, magnitude)| magnitude)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            magnitude_bounds:                 [
                MAGNITUDE_TINY_BOUND,
                MAGNITUDE_SMALL_BOUND,
                MAGNITUDE_MEDIUM_BOUND,
                MAGNITUDE_LARGE_BOUND,
                MAGNITUDE_MASSIVE_BOUND,
            ],
            gas_tolerance:                    GAS_TOLERANCE,
            balance_transfer_score:           BALANCE_TRANSFER_SCORE,
            correlated_changes_score:         CORRELATED_CHANGES_SCORE,
            correlated_changes_min_contracts: CORRELATED_CHANGES_MIN_CONTRACTS,
        }
    }
}

/// Buckets the absolute `rate` of a change using the default bounds.
#[must_use]
pub fn classify_magnitude(rate: f64) -> Magnitude {
    Config::default().classify_magnitude(rate)
}

/// Computes the relative change from `before` to `after`.
///
/// This is infinite when `before` is zero and `after` is not.
#[must_use]
pub fn change_rate(before: U256, after: U256) -> f64 {
    if before == U256::ZERO {
        if after == U256::ZERO {
            0.0
        } else {
            f64::INFINITY
        }
    } else {
        before.abs_diff(after).as_f64() / before.as_f64()
    }
}

/// Computes the differences between the `before` and `after` snapshots.
///
/// Where `semantics` is provided, each slot change is annotated with the
/// semantic type of its slot.
#[must_use]
pub fn diff(
    before: &StateSnapshot,
    after: &StateSnapshot,
    semantics: Option<&SemanticMapping>,
    config: &Config,
) -> DiffReport {
    let addresses: BTreeSet<&String> = before.addresses().chain(after.addresses()).collect();
    let mut report = DiffReport::default();

    for address in addresses {
        let contract_before = before.get(address);
        let contract_after = after.get(address);
        if let Some(contract_diff) =
            diff_contract(address, contract_before, contract_after, semantics, config)
        {
            report.contract_diffs.insert(address.clone(), contract_diff);
        }
    }

    for (address, contract_diff) in &report.contract_diffs {
        for change in contract_diff.changes_at_least(Magnitude::Massive) {
            report.anomalies.push(format!(
                "{address} slot {}: {} ({})",
                change.slot,
                change.magnitude,
                change.describe_rate()
            ));
            report.extreme_changes.push(LocatedChange {
                contract: address.clone(),
                change:   change.clone(),
            });
        }
    }

    report.total_contracts_changed = report.contract_diffs.len();
    report.total_slots_changed = report.contract_diffs.values().map(|d| d.slot_changes.len()).sum();
    report.cross_contract_relations = relation::find_relations(&report.contract_diffs, config);

    tracing::debug!(
        contracts = report.total_contracts_changed,
        slots = report.total_slots_changed,
        extreme = report.extreme_changes.len(),
        relations = report.cross_contract_relations.len(),
        "computed state diff"
    );
    report
}

/// Computes the diff of a single contract, returning [`None`] if nothing
/// about it changed.
fn diff_contract(
    address: &str,
    before: Option<&ContractState>,
    after: Option<&ContractState>,
    semantics: Option<&SemanticMapping>,
    config: &Config,
) -> Option<ContractDiff> {
    let empty = BTreeMap::new();
    let storage_before = before.map_or(&empty, ContractState::storage);
    let storage_after = after.map_or(&empty, ContractState::storage);
    let slots: BTreeSet<&U256W> = storage_before.keys().chain(storage_after.keys()).collect();

    let mut changes = vec![];
    for slot in slots {
        let value_before = storage_before.get(slot).map(U256W::value);
        let value_after = storage_after.get(slot).map(U256W::value);
        let direction = Direction::between(value_before, value_after);
        if direction == Direction::NoChange {
            continue;
        }

        let b = value_before.unwrap_or(U256::ZERO);
        let a = value_after.unwrap_or(U256::ZERO);
        let change_rate = change_rate(b, a);

        changes.push(SlotChange {
            slot: *slot,
            value_before: b.into(),
            value_after: a.into(),
            direction,
            magnitude: config.classify_magnitude(change_rate),
            change_rate,
            absolute_change: Delta::between(b, a),
            semantic_type: semantics
                .and_then(|s| s.get(address, *slot))
                .map(|s| s.semantic_type),
        });
    }

    let balance_change = Delta::between(
        before.map_or(U256::ZERO, ContractState::balance),
        after.map_or(U256::ZERO, ContractState::balance),
    );
    let nonce_change = i128::from(after.map_or(0, ContractState::nonce))
        - i128::from(before.map_or(0, ContractState::nonce));

    if changes.is_empty() && balance_change.is_zero() && nonce_change == 0 {
        return None;
    }

    Some(ContractDiff::new(address, changes, balance_change, nonce_change))
}

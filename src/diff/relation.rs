//! This module contains the detection of relationships between the changes in
//! different contracts.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    diff::{
        change::{ContractDiff, Magnitude},
        Config,
        SlotReference,
    },
    utility::Delta,
};

/// The kinds of relationship between contracts.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// Value left one contract and arrived at another.
    BalanceTransfer,

    /// Several contracts saw large changes at once.
    CorrelatedExtremeChanges,
}

/// A relationship between the changes of two or more contracts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct CrossContractRelation {
    pub relation_type:     RelationType,
    pub contracts:         Vec<String>,
    pub slots:             Vec<SlotReference>,
    pub correlation_score: f64,
    pub description:       String,
}

/// Finds all relationships between the contracts in `diffs`.
#[must_use]
pub fn find_relations(
    diffs: &BTreeMap<String, ContractDiff>,
    config: &Config,
) -> Vec<CrossContractRelation> {
    let mut relations = find_balance_transfers(diffs, config);
    relations.extend(find_correlated_changes(diffs, config));
    relations
}

/// Finds every pair of contracts whose balances moved by nearly the same
/// amount in opposite directions.
fn find_balance_transfers(
    diffs: &BTreeMap<String, ContractDiff>,
    config: &Config,
) -> Vec<CrossContractRelation> {
    let moved: Vec<(&String, Delta)> = diffs
        .iter()
        .filter(|(_, d)| !d.balance_change.is_zero())
        .map(|(a, d)| (a, d.balance_change))
        .collect();

    moved
        .iter()
        .tuple_combinations()
        .filter(|((_, l), (_, r))| l.is_negative() != r.is_negative())
        .filter(|((_, l), (_, r))| {
            let (l, r) = (l.magnitude(), r.magnitude());
            let larger = l.max(r).as_f64();
            l.abs_diff(r).as_f64() / larger < config.gas_tolerance
        })
        .map(|((left, l), (right, r))| {
            let (from, to, amount) = if l.is_negative() {
                (left, right, l.magnitude())
            } else {
                (right, left, r.magnitude())
            };
            CrossContractRelation {
                relation_type:     RelationType::BalanceTransfer,
                contracts:         vec![(*left).clone(), (*right).clone()],
                slots:             vec![],
                correlation_score: config.balance_transfer_score,
                description:       format!("{amount} wei moved from {from} to {to}"),
            }
        })
        .collect()
}

/// Finds contracts that all saw at least one change of large magnitude or
/// more, reporting them as a single relation.
fn find_correlated_changes(
    diffs: &BTreeMap<String, ContractDiff>,
    config: &Config,
) -> Option<CrossContractRelation> {
    let mut contracts = vec![];
    let mut slots = vec![];
    for (address, diff) in diffs {
        let large: Vec<_> = diff.changes_at_least(Magnitude::Large).collect();
        if !large.is_empty() {
            contracts.push(address.clone());
            slots.extend(large.iter().map(|c| SlotReference::new(address.as_str(), c.slot)));
        }
    }

    (contracts.len() >= config.correlated_changes_min_contracts).then(|| {
        let description = format!(
            "{} contracts changed by large amounts together: {}",
            contracts.len(),
            contracts.join(", ")
        );
        CrossContractRelation {
            relation_type: RelationType::CorrelatedExtremeChanges,
            contracts,
            slots,
            correlation_score: config.correlated_changes_score,
            description,
        }
    })
}

//! This module contains the protocol classifier, which decides what kind of
//! DeFi protocol a set of contracts implements by fusing several weak and
//! independent signals.
//!
//! # Signal Sources
//!
//! | Source    | Weight | Evidence                                      |
//! | --------- | ------ | --------------------------------------------- |
//! | ABI       | 0.4    | Function names, in core/supporting/admin tiers |
//! | Events    | 0.3    | Event names, in weighted groups               |
//! | Layout    | 0.2    | Counts of slot semantic types                 |
//! | Name      | 0.1    | Keywords in the project name                  |
//!
//! Only the sources that are actually supplied take part, and their weights
//! are renormalised to sum to one.

pub mod catalogue;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        ABI_ADMIN_FUNCTION_SCORE,
        ABI_CORE_FUNCTION_SCORE,
        ABI_SOURCE_WEIGHT,
        ABI_SUPPORTING_FUNCTION_SCORE,
        EVENT_SOURCE_WEIGHT,
        LAYOUT_SOURCE_WEIGHT,
        NAME_KEYWORD_SCORE,
        NAME_SOURCE_WEIGHT,
    },
    input::abi::AbiDocument,
    semantics::SlotSemanticType,
};

/// The closed set of protocol types that can be detected.
///
/// The declaration order is significant, as it breaks ties between equally
/// scored types.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    Vault,
    Amm,
    Lending,
    Staking,
    Bridge,
    NftMarketplace,
    Governance,
    Erc20,
    Unknown,
}

impl ProtocolType {
    /// All protocol types other than [`Self::Unknown`], in tie-break order.
    pub const KNOWN: [ProtocolType; 8] = [
        Self::Vault,
        Self::Amm,
        Self::Lending,
        Self::Staking,
        Self::Bridge,
        Self::NftMarketplace,
        Self::Governance,
        Self::Erc20,
    ];

    /// Gets the canonical snake-case name of the protocol type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Vault => "vault",
            Self::Amm => "amm",
            Self::Lending => "lending",
            Self::Staking => "staking",
            Self::Bridge => "bridge",
            Self::NftMarketplace => "nft_marketplace",
            Self::Governance => "governance",
            Self::Erc20 => "erc20",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ProtocolType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The sources of evidence for protocol classification.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Abi,
    Events,
    Layout,
    Name,
}

impl SignalSource {
    /// Gets the base weight of the source before renormalisation.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            Self::Abi => ABI_SOURCE_WEIGHT,
            Self::Events => EVENT_SOURCE_WEIGHT,
            Self::Layout => LAYOUT_SOURCE_WEIGHT,
            Self::Name => NAME_SOURCE_WEIGHT,
        }
    }
}

/// A per-protocol-type score vector.
pub type Scores = BTreeMap<ProtocolType, f64>;

/// The outcome of protocol classification.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ProtocolResult {
    /// The winning protocol type.
    pub detected_type: ProtocolType,

    /// The fused score of the winner before normalisation, in `[0, 1]`.
    pub confidence: f64,

    /// The fused scores of every known type, normalised so that the winner
    /// scores `1.0`.
    pub scores: Scores,

    /// One line of evidence per source that took part.
    pub evidence: Vec<String>,

    /// The sources that took part.
    pub sources_used: Vec<SignalSource>,
}

impl ProtocolResult {
    /// The result when nothing could be determined.
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            detected_type: ProtocolType::Unknown,
            confidence:    0.0,
            scores:        Scores::new(),
            evidence:      vec![],
            sources_used:  vec![],
        }
    }
}

/// The signals available for classifying a protocol. Any of them may be
/// absent.
#[derive(Clone, Copy, Debug, Default)]
pub struct Signals<'a> {
    pub abi:          Option<&'a AbiDocument>,
    pub events:       Option<&'a [&'a str]>,
    pub layout:       Option<&'a BTreeMap<SlotSemanticType, usize>>,
    pub project_name: Option<&'a str>,
}

/// Classifies the protocol described by `signals`.
#[must_use]
pub fn detect(signals: &Signals<'_>) -> ProtocolResult {
    let mut sources: Vec<(SignalSource, Scores, String)> = vec![];

    if let Some(abi) = signals.abi {
        let functions = abi.function_names();
        let scores = score_abi(&functions);
        let line = format!("abi: {} functions, {}", functions.len(), describe_best(&scores));
        sources.push((SignalSource::Abi, scores, line));
    }

    if let Some(events) = signals.events {
        let scores = score_events(events);
        let line = format!("events: {} events, {}", events.len(), describe_best(&scores));
        sources.push((SignalSource::Events, scores, line));
    }

    if let Some(counts) = signals.layout {
        let scores = score_layout(counts);
        let line = format!(
            "layout: {} semantic types, {}",
            counts.len(),
            describe_best(&scores)
        );
        sources.push((SignalSource::Layout, scores, line));
    }

    if let Some(name) = signals.project_name {
        let scores = score_name(name);
        let line = format!("name: `{name}`, {}", describe_best(&scores));
        sources.push((SignalSource::Name, scores, line));
    }

    if sources.is_empty() {
        tracing::debug!("no protocol signals supplied");
        return ProtocolResult::unknown();
    }

    let total_weight: f64 = sources.iter().map(|(s, _, _)| s.weight()).sum();
    let mut fused: Scores = ProtocolType::KNOWN.iter().map(|p| (*p, 0.0)).collect();
    for (source, scores, _) in &sources {
        let weight = source.weight() / total_weight;
        for (protocol, score) in scores {
            *fused.entry(*protocol).or_insert(0.0) += score * weight;
        }
    }

    let evidence = sources.iter().map(|(_, _, line)| line.clone()).collect();
    let sources_used = sources.iter().map(|(s, _, _)| *s).collect();

    // `KNOWN` is in tie-break order, so the first maximum wins.
    let (winner, best) = ProtocolType::KNOWN
        .iter()
        .map(|p| (*p, fused[p]))
        .fold((ProtocolType::Unknown, 0.0_f64), |acc, (p, s)| if s > acc.1 { (p, s) } else { acc });

    if best <= 0.0 {
        return ProtocolResult {
            evidence,
            sources_used,
            ..ProtocolResult::unknown()
        };
    }

    tracing::debug!(
        protocol = %winner,
        confidence = best,
        scores = %format_scores(&fused),
        "classified protocol"
    );
    let scores = fused.into_iter().map(|(p, s)| (p, s / best)).collect();

    ProtocolResult {
        detected_type: winner,
        confidence: best.min(1.0),
        scores,
        evidence,
        sources_used,
    }
}

/// Describes the best-scoring type in `scores` for an evidence line.
fn describe_best(scores: &Scores) -> String {
    let best = ProtocolType::KNOWN
        .iter()
        .filter_map(|p| scores.get(p).map(|s| (*p, *s)))
        .fold(None::<(ProtocolType, f64)>, |acc, (p, s)| match acc {
            Some((_, best)) if best >= s => acc,
            _ => Some((p, s)),
        });
    match best {
        Some((protocol, score)) if score > 0.0 => format!("best match {protocol} ({score:.2})"),
        _ => "no match".to_string(),
    }
}

/// Scores each protocol type by the tiers of its functions that occur in
/// `functions`.
#[must_use]
pub fn score_abi(functions: &[&str]) -> Scores {
    let present = functions.iter().map(|f| f.to_lowercase()).collect::<Vec<_>>();
    let count = |names: &[&str]| {
        names
            .iter()
            .filter(|n| present.contains(&n.to_lowercase()))
            .count()
    };

    ProtocolType::KNOWN
        .iter()
        .map(|protocol| {
            let tiers = catalogue::function_tiers(*protocol);
            #[allow(clippy::cast_precision_loss)] // Tier sizes are tiny
            let score = count(tiers.core) as f64 * ABI_CORE_FUNCTION_SCORE
                + count(tiers.supporting) as f64 * ABI_SUPPORTING_FUNCTION_SCORE
                + count(tiers.admin) as f64 * ABI_ADMIN_FUNCTION_SCORE;
            (*protocol, score.min(1.0))
        })
        .collect()
}

/// Scores each protocol type by the fraction of each of its event groups that
/// occur in `events`.
#[must_use]
pub fn score_events(events: &[&str]) -> Scores {
    ProtocolType::KNOWN
        .iter()
        .map(|protocol| {
            let score: f64 = catalogue::event_groups(*protocol)
                .iter()
                .map(|group| {
                    let matched = group.events.iter().filter(|e| events.contains(e)).count();
                    #[allow(clippy::cast_precision_loss)] // Group sizes are tiny
                    let fraction = matched as f64 / group.events.len() as f64;
                    fraction * group.weight
                })
                .sum();
            (*protocol, score.min(1.0))
        })
        .collect()
}

/// Scores each protocol type by fixed heuristics over the number of slots of
/// each semantic type.
#[must_use]
pub fn score_layout(counts: &BTreeMap<SlotSemanticType, usize>) -> Scores {
    use SlotSemanticType as S;

    let count = |t: S| counts.get(&t).copied().unwrap_or(0);
    let has = |t: S| count(t) > 0;

    let mut scores: Scores = ProtocolType::KNOWN.iter().map(|p| (*p, 0.0)).collect();
    let mut bump = |p: ProtocolType, by: f64| {
        if let Some(score) = scores.get_mut(&p) {
            *score = (*score + by).min(1.0);
        }
    };

    if count(S::Reserve) >= 2 {
        bump(ProtocolType::Amm, 0.7);
    }
    if has(S::PriceCumulative) {
        bump(ProtocolType::Amm, 0.3);
    }
    if has(S::Debt) || has(S::Collateral) {
        bump(ProtocolType::Lending, 0.7);
    }
    if has(S::InterestRate) {
        bump(ProtocolType::Lending, 0.2);
    }
    if has(S::RewardAmount) {
        bump(ProtocolType::Staking, 0.6);
    }
    if has(S::Shares) || (has(S::TotalSupply) && has(S::ExchangeRate)) {
        bump(ProtocolType::Vault, 0.6);
    }
    if has(S::TotalSupply) && has(S::BalanceMapping) && has(S::AllowanceMapping) {
        bump(ProtocolType::Erc20, 0.6);
    }
    if has(S::Nonce) && has(S::Threshold) {
        bump(ProtocolType::Bridge, 0.5);
    }
    if has(S::Threshold) {
        bump(ProtocolType::Governance, 0.3);
    }

    scores
}

/// Scores each protocol type by the keywords that occur in the project
/// `name`.
#[must_use]
pub fn score_name(name: &str) -> Scores {
    ProtocolType::KNOWN
        .iter()
        .map(|protocol| {
            let matches = catalogue::name_keyword_matches(*protocol, name);
            #[allow(clippy::cast_precision_loss)] // Keyword counts are tiny
            let score = (matches as f64 * NAME_KEYWORD_SCORE).min(1.0);
            (*protocol, score)
        })
        .collect()
}

/// Renders `scores` as a compact, ordered string for logging.
#[must_use]
pub fn format_scores(scores: &Scores) -> String {
    scores
        .iter()
        .filter(|(_, s)| **s > 0.0)
        .map(|(p, s)| format!("{p}={s:.2}"))
        .join(", ")
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use crate::{
        input::abi::{AbiDocument, AbiItem},
        protocol::{detect, score_name, ProtocolType, SignalSource, Signals},
        semantics::SlotSemanticType,
    };

    fn erc20_abi() -> AbiDocument {
        AbiDocument::new(
            ["transfer", "transferFrom", "approve", "balanceOf", "totalSupply", "allowance"]
                .into_iter()
                .map(AbiItem::function)
                .collect::<Vec<_>>(),
        )
    }

    #[test]
    fn no_sources_means_unknown() {
        let result = detect(&Signals::default());
        assert_eq!(result.detected_type, ProtocolType::Unknown);
        assert!(result.confidence.abs() < f64::EPSILON);
        assert!(result.sources_used.is_empty());
    }

    #[test]
    fn standard_erc20_abi_is_erc20() {
        let abi = erc20_abi();
        let result = detect(&Signals {
            abi: Some(&abi),
            ..Signals::default()
        });

        assert_eq!(result.detected_type, ProtocolType::Erc20);
        assert!(result.confidence > 0.0);
        assert!((result.scores[&ProtocolType::Erc20] - 1.0).abs() < f64::EPSILON);
        assert_eq!(result.sources_used, vec![SignalSource::Abi]);
        assert_eq!(result.evidence.len(), 1);
    }

    #[test]
    fn only_supplied_sources_carry_weight() {
        let abi = erc20_abi();
        let events = ["Swap", "Sync", "Mint", "Burn"];
        let result = detect(&Signals {
            abi: Some(&abi),
            events: Some(&events[..]),
            ..Signals::default()
        });

        // ABI: erc20 = 1.0 at weight 4/7; events: amm = 1.0 at weight 3/7.
        assert_eq!(result.detected_type, ProtocolType::Erc20);
        assert!((result.confidence - 4.0 / 7.0).abs() < 1e-9);
        assert!((result.scores[&ProtocolType::Amm] - 0.75).abs() < 1e-9);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let counts: BTreeMap<_, _> = [(SlotSemanticType::Shares, 1), (SlotSemanticType::Debt, 1)]
            .into_iter()
            .collect();
        let result = detect(&Signals {
            layout: Some(&counts),
            ..Signals::default()
        });
        // Lending scores 0.7 and vault 0.6, so lending wins outright.
        assert_eq!(result.detected_type, ProtocolType::Lending);

        let counts: BTreeMap<_, _> =
            [(SlotSemanticType::Reserve, 2)].into_iter().collect();
        let result = detect(&Signals {
            layout: Some(&counts),
            project_name: Some("lending"),
            ..Signals::default()
        });
        // amm = 0.7 * 2/3, lending = 0.3 * 1/3: amm wins.
        assert_eq!(result.detected_type, ProtocolType::Amm);
    }

    #[test]
    fn equal_scores_prefer_earlier_types() {
        let result = detect(&Signals {
            project_name: Some("vault-swap"),
            ..Signals::default()
        });
        assert_eq!(result.detected_type, ProtocolType::Vault);
        assert!((result.scores[&ProtocolType::Amm] - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unmatched_signals_are_unknown() {
        let result = detect(&Signals {
            project_name: Some("zzz"),
            ..Signals::default()
        });
        assert_eq!(result.detected_type, ProtocolType::Unknown);
        assert_eq!(result.sources_used, vec![SignalSource::Name]);
    }

    #[test]
    fn name_scores_are_capped() {
        let scores = score_name("uniswap-sushi-pancake-curve-dex");
        assert!((scores[&ProtocolType::Amm] - 1.0).abs() < f64::EPSILON);
    }
}

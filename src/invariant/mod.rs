//! This module contains the invariant synthesizer, which turns the protocol
//! type, slot semantics, state diff and attack patterns into concrete
//! invariant rules with calibrated thresholds.
//!
//! # Passes
//!
//! Synthesis consists of three independent passes whose outputs are
//! concatenated in order:
//!
//! 1. **Templates**, which instantiates the static catalogue in
//!    [`templates`] for every contract carrying the required slots.
//! 2. **Patterns**, which derives one invariant per sufficiently severe
//!    [`ChangePattern`], with a threshold computed by [`threshold`].
//! 3. **Cross-contract**, which derives a conservation invariant for every
//!    balance transfer between contracts.
//!
//! The later passes only run when their inputs are available, so a single
//! snapshot still produces the template invariants.

pub mod templates;
pub mod threshold;

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{
        CONSERVATION_TOLERANCE,
        DIRECT_SLOT_BOUND,
        EXTREME_RATE_CLIP,
        EXTREME_RATE_MULTIPLIER,
        FALLBACK_THRESHOLD_CLIP,
        HIGH_RATE_CLIP,
        HIGH_RATE_MULTIPLIER,
        LOW_RATE_CLIP,
        LOW_RATE_MULTIPLIER,
        MAX_INITIAL_VALUE_DIVISOR,
    },
    diff::{relation::RelationType, DiffReport, SlotReference},
    invariant::templates::{templates_for, InvariantTemplate},
    pattern::{ChangePattern, PatternType, Severity},
    protocol::{ProtocolResult, ProtocolType},
    semantics::{SemanticMapping, SlotSemanticType},
    utility::{clip, round2, U256W},
};

/// The shapes of rule that an invariant can take.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantType {
    /// The value may only move by a bounded fraction of its prior value.
    BoundedValue,

    /// The value may only grow by a bounded fraction of its prior value.
    BoundedGrowth,

    /// The ratio between two values may only move by a bounded fraction.
    RatioStability,

    /// A previously-empty value may only be filled up to a bound.
    ValueRange,

    /// The value must not change at all.
    AccessControl,

    /// Related quantities must cancel out or sum to a known total.
    BalanceConservation,
}

impl InvariantType {
    /// Gets the canonical snake-case name of the invariant type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BoundedValue => "bounded_value",
            Self::BoundedGrowth => "bounded_growth",
            Self::RatioStability => "ratio_stability",
            Self::ValueRange => "value_range",
            Self::AccessControl => "access_control",
            Self::BalanceConservation => "balance_conservation",
        }
    }

    /// Gets the category that invariants of this type fall into when no
    /// template says otherwise.
    #[must_use]
    pub fn category(self) -> InvariantCategory {
        match self {
            Self::BoundedValue | Self::ValueRange => InvariantCategory::StateBounds,
            Self::BoundedGrowth => InvariantCategory::RateLimit,
            Self::RatioStability => InvariantCategory::PriceStability,
            Self::AccessControl => InvariantCategory::AccessControl,
            Self::BalanceConservation => InvariantCategory::Conservation,
        }
    }
}

impl Display for InvariantType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The broad areas of protocol health that invariants protect.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvariantCategory {
    Solvency,
    PriceStability,
    SupplyIntegrity,
    AccessControl,
    Conservation,
    StateBounds,
    RateLimit,
}

impl InvariantCategory {
    /// Gets the canonical snake-case name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Solvency => "solvency",
            Self::PriceStability => "price_stability",
            Self::SupplyIntegrity => "supply_integrity",
            Self::AccessControl => "access_control",
            Self::Conservation => "conservation",
            Self::StateBounds => "state_bounds",
            Self::RateLimit => "rate_limit",
        }
    }
}

impl Display for InvariantCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much an invariant is trusted, and why.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ConfidenceBreakdown {
    /// The mean confidence of the semantics of the slots used, absent when
    /// no labelled slots were used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic: Option<f64>,

    /// The confidence of the protocol classification.
    pub protocol: f64,

    /// The confidence of the pattern or relation the invariant was derived
    /// from, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<f64>,

    /// The mean of the components that are present, to two decimal places.
    pub overall: f64,
}

impl ConfidenceBreakdown {
    /// Constructs the breakdown from its components, computing the overall
    /// confidence.
    #[must_use]
    pub fn new(semantic: Option<f64>, protocol: f64, pattern: Option<f64>) -> Self {
        let present: Vec<f64> = [semantic, Some(protocol), pattern].into_iter().flatten().collect();
        #[allow(clippy::cast_precision_loss)] // At most three components
        let overall = round2(present.iter().sum::<f64>() / present.len() as f64);

        Self {
            semantic,
            protocol,
            pattern,
            overall,
        }
    }
}

/// A concrete invariant rule over the storage and balances of one or more
/// contracts.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ComplexInvariant {
    /// The identifier, unique and deterministic within one synthesis.
    pub id: String,

    /// The name of the template or archetype that produced the invariant.
    pub name: String,

    #[serde(rename = "type")]
    pub invariant_type: InvariantType,

    pub category:    InvariantCategory,
    pub description: String,

    /// The rule itself, with the threshold already substituted.
    pub formula: String,

    pub threshold: f64,
    pub severity:  Severity,
    pub contracts: Vec<String>,

    /// The slots the formula refers to, keyed by the name the formula uses
    /// for them.
    pub slots: BTreeMap<String, SlotReference>,

    pub confidence: ConfidenceBreakdown,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_type: Option<ProtocolType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_pattern: Option<PatternType>,
}

/// Allocates invariant identifiers of the form `<SCOPE>_<name>_<NNN>`, where
/// the counter is kept separately for each scope and name.
///
/// An allocator lives for exactly one synthesis, so identifiers depend only
/// on the inputs of that synthesis.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct IdAllocator {
    counters: BTreeMap<String, usize>,
}

impl IdAllocator {
    /// Constructs an allocator with every counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next identifier for `name` within `scope`.
    pub fn next(&mut self, scope: &str, name: &str) -> String {
        let prefix = format!("{scope}_{name}");
        let counter = self.counters.entry(prefix.clone()).or_insert(0);
        *counter += 1;
        format!("{prefix}_{counter:03}")
    }
}

/// The configuration for the invariant synthesizer.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The multipliers applied to extracted rates of at least `10`, in
    /// `[1, 10)` and below `1` respectively.
    ///
    /// Defaults to the `*_RATE_MULTIPLIER` constants.
    pub rate_multipliers: [f64; 3],

    /// The ranges into which the scaled rates are clipped, matching
    /// `rate_multipliers`.
    ///
    /// Defaults to the `*_RATE_CLIP` constants.
    pub rate_clips: [(f64, f64); 3],

    /// The range into which thresholds derived from protocol defaults are
    /// clipped.
    ///
    /// Defaults to [`FALLBACK_THRESHOLD_CLIP`].
    pub fallback_clip: (f64, f64),

    /// The divisor applied to the smallest observed fill of an empty slot.
    ///
    /// Defaults to [`MAX_INITIAL_VALUE_DIVISOR`].
    pub max_initial_value_divisor: f64,

    /// The tolerance within which balance transfers must cancel out.
    ///
    /// Defaults to [`CONSERVATION_TOLERANCE`].
    pub conservation_tolerance: f64,

    /// The least severe pattern that produces an invariant.
    ///
    /// Defaults to [`Severity::High`].
    pub severity_floor: Severity,
}

impl Config {
    /// Sets the `rate_multipliers` config parameter to `value`.
    #[must_use]
    pub fn with_rate_multipliers(mut self, value: [f64; 3]) -> Self {
        self.rate_multipliers = value;
        self
    }

    /// Sets the `rate_clips` config parameter to `value`.
    #[must_use]
    pub fn with_rate_clips(mut self, value: [(f64, f64); 3]) -> Self {
        self.rate_clips = value;
        self
    }

    /// Sets the `fallback_clip` config parameter to `value`.
    #[must_use]
    pub fn with_fallback_clip(mut self, value: (f64, f64)) -> Self {
        self.fallback_clip = value;
        self
    }

    /// Sets the `max_initial_value_divisor` config parameter to `value`.
    #[must_use]
    pub fn with_max_initial_value_divisor(mut self, value: f64) -> Self {
        self.max_initial_value_divisor = value;
        self
    }

    /// Sets the `conservation_tolerance` config parameter to `value`.
    #[must_use]
    pub fn with_conservation_tolerance(mut self, value: f64) -> Self {
        self.conservation_tolerance = value;
        self
    }

    /// Sets the `severity_floor` config parameter to `value`.
    #[must_use]
    pub fn with_severity_floor(mut self, value: Severity) -> Self {
        self.severity_floor = value;
        self
    }

    /// Scales and clips an extracted change `rate` into a threshold.
    #[must_use]
    pub fn threshold_from_rate(&self, rate: f64) -> f64 {
        let band = if rate >= 10.0 {
            0
        } else if rate >= 1.0 {
            1
        } else {
            2
        };
        clip(rate * self.rate_multipliers[band], self.rate_clips[band])
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rate_multipliers:          [
                EXTREME_RATE_MULTIPLIER,
                HIGH_RATE_MULTIPLIER,
                LOW_RATE_MULTIPLIER,
            ],
            rate_clips:                [EXTREME_RATE_CLIP, HIGH_RATE_CLIP, LOW_RATE_CLIP],
            fallback_clip:             FALLBACK_THRESHOLD_CLIP,
            max_initial_value_divisor: MAX_INITIAL_VALUE_DIVISOR,
            conservation_tolerance:    CONSERVATION_TOLERANCE,
            severity_floor:            Severity::High,
        }
    }
}

/// Synthesizes the invariants for a protocol classified as `protocol` whose
/// slots are labelled by `semantics`.
///
/// The pattern pass only runs if `patterns` is provided, and the
/// cross-contract pass only runs if `diff` is provided.
#[must_use]
pub fn synthesize(
    protocol: &ProtocolResult,
    semantics: &SemanticMapping,
    diff: Option<&DiffReport>,
    patterns: Option<&[ChangePattern]>,
    config: &Config,
) -> Vec<ComplexInvariant> {
    let mut ids = IdAllocator::new();

    let mut invariants = template_pass(protocol, semantics, &mut ids);
    let from_templates = invariants.len();

    if let Some(patterns) = patterns {
        invariants.extend(pattern_pass(protocol, semantics, patterns, config, &mut ids));
    }
    let from_patterns = invariants.len() - from_templates;

    if let Some(diff) = diff {
        invariants.extend(cross_contract_pass(protocol, diff, config, &mut ids));
    }
    let from_relations = invariants.len() - from_templates - from_patterns;

    tracing::debug!(
        templates = from_templates,
        patterns = from_patterns,
        relations = from_relations,
        "synthesized invariants"
    );
    invariants
}

/// Instantiates every applicable template for every contract that carries
/// all of its required slots.
fn template_pass(
    protocol: &ProtocolResult,
    semantics: &SemanticMapping,
    ids: &mut IdAllocator,
) -> Vec<ComplexInvariant> {
    let by_contract: Vec<(&String, BTreeMap<SlotSemanticType, Vec<U256W>>)> = semantics
        .contracts()
        .map(|(address, _)| (address, semantics.slots_by_type(address)))
        .collect();

    let mut invariants = vec![];
    for template in templates_for(protocol.detected_type) {
        for (address, by_type) in &by_contract {
            if let Some(invariant) = instantiate(template, address, by_type, protocol, semantics, ids) {
                invariants.push(invariant);
            }
        }
    }
    invariants
}

/// Instantiates `template` for the contract at `address`, returning [`None`]
/// if any of its required slots are missing.
///
/// Each role takes the slots of its type in slot order, so a type required
/// twice needs two distinct slots.
fn instantiate(
    template: &InvariantTemplate,
    address: &str,
    by_type: &BTreeMap<SlotSemanticType, Vec<U256W>>,
    protocol: &ProtocolResult,
    semantics: &SemanticMapping,
    ids: &mut IdAllocator,
) -> Option<ComplexInvariant> {
    let slots: BTreeMap<String, SlotReference> = template
        .roles()
        .into_iter()
        .map(|(role, typ, nth)| {
            let slot = by_type.get(&typ)?.get(nth)?;
            Some((role, SlotReference::new(address, *slot)))
        })
        .collect::<Option<_>>()?;

    Some(ComplexInvariant {
        id:             ids.next("TEMPLATE", template.name),
        name:           template.name.to_string(),
        invariant_type: template.invariant_type,
        category:       template.category,
        description:    template.description.to_string(),
        formula:        template.formula(template.threshold),
        threshold:      template.threshold,
        severity:       template.severity,
        contracts:      vec![address.to_string()],
        confidence:     ConfidenceBreakdown::new(
            semantic_confidence(&slots, semantics),
            protocol.confidence,
            None,
        ),
        slots,
        protocol_type:  Some(protocol.detected_type),
        attack_pattern: None,
    })
}

/// Derives one invariant per pattern at or above the configured severity
/// floor.
fn pattern_pass(
    protocol: &ProtocolResult,
    semantics: &SemanticMapping,
    patterns: &[ChangePattern],
    config: &Config,
    ids: &mut IdAllocator,
) -> Vec<ComplexInvariant> {
    patterns
        .iter()
        .filter(|p| p.severity >= config.severity_floor)
        .map(|pattern| {
            let archetype = archetype(pattern.pattern_type);
            let threshold = match archetype {
                InvariantType::AccessControl => 0.0,
                InvariantType::ValueRange => threshold::max_initial_value(pattern, config),
                _ => threshold::dynamic_threshold(pattern, protocol.detected_type, config),
            };
            let slots = select_slots(&pattern.slots);
            let subjects = subjects(pattern, &slots);

            ComplexInvariant {
                id: ids.next("PATTERN", pattern.pattern_type.as_str()),
                name: format!("{}_{archetype}", pattern.pattern_type),
                invariant_type: archetype,
                category: archetype.category(),
                description: format!(
                    "{archetype} guard against {}: {}",
                    pattern.pattern_type, pattern.description
                ),
                formula: formula(archetype, &subjects, threshold),
                threshold,
                severity: pattern.severity,
                contracts: pattern.contracts.clone(),
                confidence: ConfidenceBreakdown::new(
                    semantic_confidence(&slots, semantics),
                    protocol.confidence,
                    Some(pattern.confidence),
                ),
                slots,
                protocol_type: Some(protocol.detected_type),
                attack_pattern: Some(pattern.pattern_type),
            }
        })
        .collect()
}

/// Derives a conservation invariant for every balance transfer in `diff`.
fn cross_contract_pass(
    protocol: &ProtocolResult,
    diff: &DiffReport,
    config: &Config,
    ids: &mut IdAllocator,
) -> Vec<ComplexInvariant> {
    let archetype = InvariantType::BalanceConservation;
    diff.relations_of(RelationType::BalanceTransfer)
        .map(|relation| {
            let terms: Vec<String> = relation
                .contracts
                .iter()
                .map(|c| format!("delta(balance({c}))"))
                .collect();
            let first = terms.first().cloned().unwrap_or_default();
            let formula = format!(
                "abs({}) <= {} * abs({first})",
                terms.join(" + "),
                config.conservation_tolerance
            );

            ComplexInvariant {
                id: ids.next("CROSS", archetype.as_str()),
                name: archetype.as_str().to_string(),
                invariant_type: archetype,
                category: archetype.category(),
                description: format!("Balance transfers must be conserved: {}", relation.description),
                formula,
                threshold: config.conservation_tolerance,
                severity: Severity::High,
                contracts: relation.contracts.clone(),
                slots: BTreeMap::new(),
                confidence: ConfidenceBreakdown::new(
                    None,
                    protocol.confidence,
                    Some(relation.correlation_score),
                ),
                protocol_type: Some(protocol.detected_type),
                attack_pattern: None,
            }
        })
        .collect()
}

/// Maps each pattern type to the shape of invariant that guards against it.
#[must_use]
pub fn archetype(pattern: PatternType) -> InvariantType {
    match pattern {
        PatternType::RatioBreak => InvariantType::RatioStability,
        PatternType::MonotonicIncrease => InvariantType::BoundedGrowth,
        PatternType::ZeroValueChange => InvariantType::ValueRange,
        PatternType::OwnershipChange => InvariantType::AccessControl,
        // Recursive calls have no dedicated archetype, so the generic one
        // applies.
        PatternType::FlashChange
        | PatternType::FlashMint
        | PatternType::PriceManipulation
        | PatternType::ReentrancyBalance
        | PatternType::MassiveTransfer
        | PatternType::RecursiveCall => InvariantType::BoundedValue,
    }
}

/// Chooses and labels the slots of a pattern that the invariant will refer
/// to.
///
/// Direct slots are preferred over slots derived from mappings and arrays.
/// Among direct slots, the conventional reserve slots `8` and `9` are
/// preferred exclusively where present.
#[must_use]
pub fn select_slots(slots: &[SlotReference]) -> BTreeMap<String, SlotReference> {
    let bound = U256::from(DIRECT_SLOT_BOUND);
    let (direct, derived): (Vec<_>, Vec<_>) =
        slots.iter().partition(|r| r.slot.value() < bound);

    let mut selected = BTreeMap::new();
    if direct.is_empty() {
        for (k, reference) in derived.into_iter().enumerate() {
            selected.insert(format!("derived_slot_{k}"), reference.clone());
        }
        return selected;
    }

    let reserves: Vec<_> = direct
        .iter()
        .filter_map(|r| match r.slot.as_small() {
            Some(8) => Some(("reserve0_slot".to_string(), *r)),
            Some(9) => Some(("reserve1_slot".to_string(), *r)),
            _ => None,
        })
        .collect();

    let labelled: Vec<(String, &SlotReference)> = if reserves.is_empty() {
        direct.iter().map(|r| (format!("slot_{}", r.slot), *r)).collect()
    } else {
        reserves
    };
    for (label, reference) in labelled {
        selected.entry(label).or_insert_with(|| reference.clone());
    }
    selected
}

/// Gets the names that the formula of the invariant for `pattern` refers
/// to, which are the selected slot labels or, for patterns without slots,
/// the balance or nonce of each implicated contract.
fn subjects(pattern: &ChangePattern, slots: &BTreeMap<String, SlotReference>) -> Vec<String> {
    if !slots.is_empty() {
        return slots.keys().cloned().collect();
    }

    let quantity = if pattern.pattern_type == PatternType::RecursiveCall {
        "nonce"
    } else {
        "balance"
    };
    pattern.contracts.iter().map(|c| format!("{quantity}({c})")).collect()
}

/// Renders the formula for an invariant of type `archetype` over `subjects`.
fn formula(archetype: InvariantType, subjects: &[String], threshold: f64) -> String {
    let each = |render: &dyn Fn(&String) -> String| {
        subjects.iter().map(render).collect::<Vec<_>>().join(" && ")
    };

    match (archetype, subjects) {
        (InvariantType::RatioStability, [a, b, ..]) => format!(
            "abs({a} / {b} - before({a}) / before({b})) <= {threshold} * before({a}) / before({b})"
        ),
        (InvariantType::BoundedGrowth, _) => {
            each(&|s| format!("{s} - before({s}) <= {threshold} * before({s})"))
        }
        (InvariantType::ValueRange, _) => each(&|s| format!("before({s}) != 0 || {s} <= {threshold}")),
        (InvariantType::AccessControl, _) => each(&|s| format!("{s} == before({s})")),
        _ => each(&|s| format!("abs({s} - before({s})) <= {threshold} * before({s})")),
    }
}

/// Computes the mean confidence of the semantics of `slots`, if any are
/// labelled.
#[allow(clippy::cast_precision_loss)] // Slot counts are small
fn semantic_confidence(
    slots: &BTreeMap<String, SlotReference>,
    semantics: &SemanticMapping,
) -> Option<f64> {
    let confidences: Vec<f64> = slots
        .values()
        .filter_map(|r| semantics.get(&r.contract, r.slot))
        .map(|s| s.confidence)
        .collect();

    (!confidences.is_empty())
        .then(|| round2(confidences.iter().sum::<f64>() / confidences.len() as f64))
}

//! This module contains the pattern detector, which recognises the signatures
//! of known attacks in a [`DiffReport`].
//!
//! Each kind of signature is recognised by an independent [`Detector`], and
//! the set of detectors to run is held in an ordered [`Detectors`] registry.
//! Detectors never see each other's output.

pub mod detector;

use std::{
    any::{Any, TypeId},
    fmt::{Debug, Display, Formatter},
    ops::Deref,
};

use derivative::Derivative;
use downcast_rs::Downcast;
use serde::{Deserialize, Serialize};

use crate::{
    diff::{DiffReport, SlotReference},
    pattern::detector::{
        flash_change::FlashChange,
        flash_mint::FlashMint,
        massive_transfer::MassiveTransfer,
        monotonic_increase::MonotonicIncrease,
        ownership_change::OwnershipChange,
        price_manipulation::PriceManipulation,
        ratio_break::RatioBreak,
        recursive_call::RecursiveCall,
        reentrancy_balance::ReentrancyBalance,
        zero_value_change::ZeroValueChange,
    },
};

/// The closed set of attack signatures that can be recognised.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    FlashChange,
    FlashMint,
    PriceManipulation,
    RatioBreak,
    MonotonicIncrease,
    RecursiveCall,
    ReentrancyBalance,
    OwnershipChange,
    ZeroValueChange,
    MassiveTransfer,
}

impl PatternType {
    /// Gets the canonical snake-case name of the pattern type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlashChange => "flash_change",
            Self::FlashMint => "flash_mint",
            Self::PriceManipulation => "price_manipulation",
            Self::RatioBreak => "ratio_break",
            Self::MonotonicIncrease => "monotonic_increase",
            Self::RecursiveCall => "recursive_call",
            Self::ReentrancyBalance => "reentrancy_balance",
            Self::OwnershipChange => "ownership_change",
            Self::ZeroValueChange => "zero_value_change",
            Self::MassiveTransfer => "massive_transfer",
        }
    }
}

impl Display for PatternType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How serious a finding is, in ascending order.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{name}")
    }
}

/// A recognised attack signature.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ChangePattern {
    pub pattern_type: PatternType,
    pub confidence:   f64,
    pub severity:     Severity,
    pub description:  String,

    /// One line per piece of evidence, naming the slots and the rates at
    /// which they changed.
    pub evidence: Vec<String>,

    pub contracts: Vec<String>,
    pub slots:     Vec<SlotReference>,
}

/// A recogniser for a single kind of attack signature.
pub trait Detector
where
    Self: Any + Debug + Downcast + Send + Sync,
{
    /// The kind of pattern this detector emits.
    fn pattern_type(&self) -> PatternType;

    /// Scans `report` for the signature, returning every occurrence.
    fn detect(&self, report: &DiffReport) -> Vec<ChangePattern>;
}

/// An ordered registry of detectors, holding at most one of each type.
#[derive(Debug)]
pub struct Detectors {
    detectors: Vec<DetectorItem>,
}

impl Detectors {
    /// Constructs an empty registry.
    #[must_use]
    pub fn new() -> Self {
        let detectors = vec![];
        Self { detectors }
    }

    /// Adds `detector` to the end of the ordering.
    ///
    /// If a detector of the given type is already registered, it will not be
    /// added.
    pub fn add<D: Detector>(&mut self, detector: D) {
        let item = DetectorItem::new(detector);
        if !self.detectors.contains(&item) {
            self.detectors.push(item);
        }
    }

    /// Removes the detector of the given type, returning whether it was
    /// present.
    pub fn remove<D: Detector>(&mut self) -> bool {
        let before = self.detectors.len();
        self.detectors.retain(|d| d.hash_key != TypeId::of::<D>());
        self.detectors.len() != before
    }

    /// Gets a reference to the detector of the given type, if it is
    /// registered.
    #[must_use]
    pub fn get<D: Detector>(&self) -> Option<&D> {
        self.detectors
            .iter()
            .find_map(|d| d.detector.as_ref().as_any().downcast_ref::<D>())
    }

    /// Gets the number of registered detectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    /// Checks if no detectors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Runs every registered detector in order on `report`, concatenating
    /// their findings.
    #[must_use]
    pub fn detect(&self, report: &DiffReport) -> Vec<ChangePattern> {
        let patterns: Vec<_> = self.detectors.iter().flat_map(|d| d.detect(report)).collect();
        tracing::debug!(patterns = patterns.len(), "detected change patterns");
        patterns
    }
}

impl Default for Detectors {
    fn default() -> Self {
        let mut detectors = Self::new();
        detectors.add(FlashChange);
        detectors.add(FlashMint);
        detectors.add(PriceManipulation);
        detectors.add(RatioBreak);
        detectors.add(MonotonicIncrease);
        detectors.add(RecursiveCall);
        detectors.add(ReentrancyBalance);
        detectors.add(OwnershipChange);
        detectors.add(ZeroValueChange);
        detectors.add(MassiveTransfer);

        detectors
    }
}

/// An internal type that identifies a detector by its concrete type.
#[derive(Debug, Derivative)]
#[derivative(Eq, PartialEq)]
struct DetectorItem {
    /// The type of the detector.
    pub hash_key: TypeId,

    /// The detector itself.
    #[derivative(PartialEq = "ignore")]
    pub detector: Box<dyn Detector>,
}

impl DetectorItem {
    /// Constructs a new registry item.
    pub fn new<D: Detector>(detector: D) -> Self {
        let hash_key = TypeId::of::<D>();
        let detector = Box::new(detector);

        Self { hash_key, detector }
    }
}

/// Allow deref-coercions from the item to the detector it contains.
impl Deref for DetectorItem {
    type Target = Box<dyn Detector>;

    fn deref(&self) -> &Self::Target {
        &self.detector
    }
}

#[cfg(test)]
mod test {
    use crate::pattern::{
        detector::{flash_change::FlashChange, ratio_break::RatioBreak},
        Detectors,
        PatternType,
        Severity,
    };

    #[test]
    fn registry_rejects_duplicates() {
        let mut detectors = Detectors::new();
        detectors.add(FlashChange);
        detectors.add(FlashChange);
        assert_eq!(detectors.len(), 1);
    }

    #[test]
    fn registry_supports_lookup_and_removal() {
        let mut detectors = Detectors::default();
        assert_eq!(detectors.len(), 10);
        assert!(detectors.get::<RatioBreak>().is_some());

        assert!(detectors.remove::<RatioBreak>());
        assert!(!detectors.remove::<RatioBreak>());
        assert!(detectors.get::<RatioBreak>().is_none());
        assert_eq!(detectors.len(), 9);
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::Medium > Severity::Low);
        assert_eq!(PatternType::FlashChange.to_string(), "flash_change");
    }
}

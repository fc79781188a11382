//! This module contains the output document produced for each protocol.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    diff::DiffReport,
    error::{Error, Result},
    invariant::{ComplexInvariant, InvariantCategory},
    pattern::{ChangePattern, PatternType, Severity},
    protocol::{ProtocolResult, ProtocolType},
    semantics::SemanticMapping,
    utility::round2,
};

/// The summary of what changed between the two snapshots.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateChangeSummary {
    pub contracts_changed: usize,
    pub slots_changed:     usize,
    pub extreme_changes:   usize,
}

impl From<&DiffReport> for StateChangeSummary {
    fn from(report: &DiffReport) -> Self {
        Self {
            contracts_changed: report.total_contracts_changed,
            slots_changed:     report.total_slots_changed,
            extreme_changes:   report.extreme_changes.len(),
        }
    }
}

/// The summary of a single detected attack pattern.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct PatternSummary {
    #[serde(rename = "type")]
    pub pattern_type: PatternType,
    pub severity:     Severity,
    pub confidence:   f64,
    pub description:  String,
}

impl From<&ChangePattern> for PatternSummary {
    fn from(pattern: &ChangePattern) -> Self {
        Self {
            pattern_type: pattern.pattern_type,
            severity:     pattern.severity,
            confidence:   pattern.confidence,
            description:  pattern.description.clone(),
        }
    }
}

/// Counts of the synthesized invariants.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Statistics {
    pub total_invariants: usize,
    pub by_category:      BTreeMap<InvariantCategory, usize>,
    pub by_severity:      BTreeMap<Severity, usize>,
}

impl Statistics {
    /// Counts `invariants` by category and severity.
    #[must_use]
    pub fn of(invariants: &[ComplexInvariant]) -> Self {
        let mut statistics = Self {
            total_invariants: invariants.len(),
            ..Self::default()
        };
        for invariant in invariants {
            *statistics.by_category.entry(invariant.category).or_default() += 1;
            *statistics.by_severity.entry(invariant.severity).or_default() += 1;
        }
        statistics
    }
}

/// The complete result of analysing one protocol.
///
/// The `state_changes` and `attack_patterns` fields are only present when an
/// after-snapshot was available to diff against.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct InvariantDocument {
    pub protocol_type:             ProtocolType,
    pub protocol_confidence:       f64,
    pub semantic_mapping_coverage: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_changes: Option<StateChangeSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attack_patterns: Option<Vec<PatternSummary>>,

    pub invariants: Vec<ComplexInvariant>,
    pub statistics: Statistics,
}

impl InvariantDocument {
    /// Assembles the document from the outputs of each analysis stage.
    #[must_use]
    pub fn new(
        protocol: &ProtocolResult,
        semantics: &SemanticMapping,
        diff: Option<&DiffReport>,
        patterns: Option<&[ChangePattern]>,
        invariants: Vec<ComplexInvariant>,
    ) -> Self {
        Self {
            protocol_type: protocol.detected_type,
            protocol_confidence: round2(protocol.confidence),
            semantic_mapping_coverage: round2(semantics.coverage()),
            state_changes: diff.map(StateChangeSummary::from),
            attack_patterns: patterns.map(|ps| ps.iter().map(PatternSummary::from).collect()),
            statistics: Statistics::of(&invariants),
            invariants,
        }
    }

    /// Encodes the document as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if serialization fails.
    pub fn to_json_string(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Decodes a document from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `text` is not an invariant document.
    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Writes the document to the file at `path`, replacing any existing
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the document cannot be encoded or written.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = self.to_json_string().map_err(|e| Error::json(path, &e))?;
        std::fs::write(path, text).map_err(|e| Error::io(path, &e))
    }
}

#[cfg(test)]
mod test {
    use crate::{
        invariant::{
            ComplexInvariant,
            ConfidenceBreakdown,
            InvariantCategory,
            InvariantType,
        },
        pattern::{ChangePattern, PatternType, Severity},
        protocol::{ProtocolResult, ProtocolType},
        report::InvariantDocument,
        semantics::SemanticMapping,
    };

    fn invariant(id: &str, category: InvariantCategory, severity: Severity) -> ComplexInvariant {
        ComplexInvariant {
            id: id.into(),
            name: "supply_stability".into(),
            invariant_type: InvariantType::BoundedValue,
            category,
            description: "test".into(),
            formula: "x <= 1".into(),
            threshold: 0.1,
            severity,
            contracts: vec!["0xa".into()],
            slots: Default::default(),
            confidence: ConfidenceBreakdown::new(Some(0.9), 0.5, None),
            protocol_type: Some(ProtocolType::Erc20),
            attack_pattern: None,
        }
    }

    #[test]
    fn counts_by_category_and_severity() {
        let invariants = vec![
            invariant("A", InvariantCategory::Solvency, Severity::High),
            invariant("B", InvariantCategory::Solvency, Severity::Critical),
            invariant("C", InvariantCategory::AccessControl, Severity::Critical),
        ];
        let document = InvariantDocument::new(
            &ProtocolResult::unknown(),
            &SemanticMapping::new(),
            None,
            None,
            invariants,
        );

        assert_eq!(document.statistics.total_invariants, 3);
        assert_eq!(document.statistics.by_category[&InvariantCategory::Solvency], 2);
        assert_eq!(document.statistics.by_severity[&Severity::Critical], 2);
        assert!(document.state_changes.is_none());
    }

    #[test]
    fn documents_round_trip_and_omit_absent_sections() -> anyhow::Result<()> {
        let pattern = ChangePattern {
            pattern_type: PatternType::FlashChange,
            confidence:   0.9,
            severity:     Severity::Critical,
            description:  "flash".into(),
            evidence:     vec![],
            contracts:    vec![],
            slots:        vec![],
        };
        let document = InvariantDocument::new(
            &ProtocolResult::unknown(),
            &SemanticMapping::new(),
            None,
            Some(&[pattern][..]),
            vec![invariant("A", InvariantCategory::StateBounds, Severity::High)],
        );

        let text = document.to_json_string()?;
        assert!(!text.contains("state_changes"));
        assert!(text.contains("\"attack_patterns\""));
        assert!(text.contains("\"state_bounds\": 1"));

        assert_eq!(InvariantDocument::from_json_str(&text)?, document);
        Ok(())
    }
}

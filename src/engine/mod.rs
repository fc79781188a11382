//! This module contains the definition of the engine, which runs every
//! analysis stage for a single protocol in order.

pub mod state;

use crate::{
    diff,
    engine::state::State,
    input::ProtocolInput,
    invariant::{self, ComplexInvariant},
    layout::ContractLayout,
    pattern::Detectors,
    protocol::{self, Signals},
    report::InvariantDocument,
    semantics,
};

/// The configuration for every stage of the engine.
#[derive(Debug, Default)]
pub struct Config {
    /// The configuration for the diff stage.
    pub diff: diff::Config,

    /// The configuration for the synthesis stage.
    pub invariant: invariant::Config,

    /// The detectors run by the pattern stage.
    pub detectors: Detectors,
}

impl Config {
    /// Sets the `diff` config parameter to `value`.
    #[must_use]
    pub fn with_diff(mut self, value: diff::Config) -> Self {
        self.diff = value;
        self
    }

    /// Sets the `invariant` config parameter to `value`.
    #[must_use]
    pub fn with_invariant(mut self, value: invariant::Config) -> Self {
        self.invariant = value;
        self
    }

    /// Sets the `detectors` config parameter to `value`.
    #[must_use]
    pub fn with_detectors(mut self, value: Detectors) -> Self {
        self.detectors = value;
        self
    }
}

/// Creates a new engine over the provided `input`, configured by `config`.
#[must_use]
pub fn new<'a>(input: &'a ProtocolInput, config: &'a Config) -> Engine<'a, state::Loaded> {
    Engine {
        input,
        config,
        state: state::Loaded,
    }
}

/// The engine is responsible for taking the inputs of one protocol through
/// every stage of the analysis to produce its invariant document.
///
/// # Enforcing Valid State Transitions
///
/// The engine enforces that the stages run in order through use of structs
/// that carry exactly the outputs available at any given point. Stages whose
/// inputs are absent (a diff with no after-snapshot, patterns with no diff)
/// still transition, recording that their output is absent.
///
/// There is the [`Self::state`] function that provides access to the state
/// data of whichever state the engine is currently in.
#[derive(Debug)]
pub struct Engine<'a, S: State> {
    /// The inputs being analysed.
    input: &'a ProtocolInput,

    /// The configuration of each stage.
    config: &'a Config,

    /// The internal state of the engine.
    state: S,
}

/// The safe operations available in all states.
impl<'a, S: State> Engine<'a, S> {
    /// Gets the inputs being analysed.
    #[must_use]
    pub fn input(&self) -> &'a ProtocolInput {
        self.input
    }

    /// Gets an immutable reference to the current state of the engine.
    #[must_use]
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Moves the engine into the state `NS` created by applying `transform`
    /// to its current state.
    fn transform_state<NS: State>(self, transform: impl FnOnce(S) -> NS) -> Engine<'a, NS> {
        Engine {
            input:  self.input,
            config: self.config,
            state:  transform(self.state),
        }
    }
}

/// A type that allows the user to easily name the initial state of the
/// engine.
pub type InitialEngine<'a> = Engine<'a, state::Loaded>;

/// Operations available on a newly-created engine.
impl<'a> Engine<'a, state::Loaded> {
    /// Executes every stage from beginning to end, returning the invariant
    /// document.
    #[must_use]
    pub fn run(self) -> InvariantDocument {
        let name = self.input.name.clone();
        let document = self.label().classify().diff().detect().synthesize().document();
        tracing::debug!(
            protocol = %name,
            invariants = document.invariants.len(),
            "analysed protocol"
        );
        document
    }

    /// Labels every slot of the before-snapshot, using the declared variables
    /// where they are available.
    #[must_use]
    pub fn label(self) -> Engine<'a, state::Labelled> {
        let layout: Option<ContractLayout> =
            self.input.variables.as_ref().map(|v| v.layout());
        let semantics = semantics::label_snapshot(&self.input.before, layout.as_ref());
        self.transform_state(|_| state::Labelled { semantics })
    }
}

/// Operations available on an engine that has labelled the slots.
impl<'a> Engine<'a, state::Labelled> {
    /// Classifies the protocol from its ABI, events, slot semantics and name.
    #[must_use]
    pub fn classify(self) -> Engine<'a, state::Classified> {
        let input = self.input;
        let events: Vec<&str> = input.abi.as_ref().map(|a| a.event_names()).unwrap_or_default();
        let counts = self.state.semantics.type_counts();

        let signals = Signals {
            abi:          input.abi.as_ref(),
            events:       (!events.is_empty()).then_some(events.as_slice()),
            layout:       (!counts.is_empty()).then_some(&counts),
            project_name: Some(input.name.as_str()),
        };
        let protocol = protocol::detect(&signals);

        self.transform_state(|old_state| state::Classified {
            semantics: old_state.semantics,
            protocol,
        })
    }
}

/// Operations available on an engine that has classified the protocol.
impl<'a> Engine<'a, state::Classified> {
    /// Compares the snapshots, skipping the comparison if there is no
    /// after-snapshot.
    #[must_use]
    pub fn diff(self) -> Engine<'a, state::Diffed> {
        let config = &self.config.diff;
        let diff = self.input.after.as_ref().map(|after| {
            diff::diff(&self.input.before, after, Some(&self.state.semantics), config)
        });
        if diff.is_none() {
            tracing::debug!(protocol = %self.input.name, "no after-snapshot, skipping diff");
        }

        self.transform_state(|old_state| state::Diffed {
            semantics: old_state.semantics,
            protocol: old_state.protocol,
            diff,
        })
    }
}

/// Operations available on an engine that has compared the snapshots.
impl<'a> Engine<'a, state::Diffed> {
    /// Runs the configured detectors over the diff, if there is one.
    #[must_use]
    pub fn detect(self) -> Engine<'a, state::Detected> {
        let detectors = &self.config.detectors;
        let patterns = self.state.diff.as_ref().map(|d| detectors.detect(d));

        self.transform_state(|old_state| state::Detected {
            semantics: old_state.semantics,
            protocol: old_state.protocol,
            diff: old_state.diff,
            patterns,
        })
    }
}

/// Operations available on an engine that has scanned for patterns.
impl<'a> Engine<'a, state::Detected> {
    /// Synthesizes the invariants from everything gathered so far.
    #[must_use]
    pub fn synthesize(self) -> Engine<'a, state::Synthesized> {
        let current = &self.state;
        let invariants = invariant::synthesize(
            &current.protocol,
            &current.semantics,
            current.diff.as_ref(),
            current.patterns.as_deref(),
            &self.config.invariant,
        );

        self.transform_state(|old_state| state::Synthesized {
            semantics: old_state.semantics,
            protocol: old_state.protocol,
            diff: old_state.diff,
            patterns: old_state.patterns,
            invariants,
        })
    }
}

/// Operations available on an engine that has completed synthesis.
impl<'a> Engine<'a, state::Synthesized> {
    /// Gets the synthesized invariants.
    #[must_use]
    pub fn invariants(&self) -> &[ComplexInvariant] {
        &self.state.invariants
    }

    /// Assembles the invariant document.
    #[must_use]
    pub fn document(self) -> InvariantDocument {
        let done = self.state;
        InvariantDocument::new(
            &done.protocol,
            &done.semantics,
            done.diff.as_ref(),
            done.patterns.as_deref(),
            done.invariants,
        )
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::{
        engine::{self, Config},
        input::{
            snapshot::{ContractState, StateSnapshot},
            DeclaredVariables,
            ProtocolInput,
        },
        layout::{types::SolidityType, StateVariable},
        pattern::PatternType,
        protocol::ProtocolType,
    };

    fn vault_input() -> ProtocolInput {
        let before = StateSnapshot::new().with_contract(
            ContractState::new("0xVault")
                .with_slot(0u64, U256::new(1_000_000))
                .with_slot(1u64, U256::new(2_000_000)),
        );
        let after = StateSnapshot::new().with_contract(
            ContractState::new("0xVault")
                .with_slot(0u64, U256::new(1_000_000))
                .with_slot(1u64, U256::new(30_000_000)),
        );
        let variables = DeclaredVariables {
            contract:  Some("0xvault".into()),
            variables: vec![
                StateVariable::new("totalSupply", SolidityType::UInt { size: 256 }),
                StateVariable::new("totalAssets", SolidityType::UInt { size: 256 }),
            ],
        };

        ProtocolInput::new("yield_vault", before)
            .with_after(after)
            .with_variables(variables)
    }

    #[test]
    fn stages_run_in_order() {
        let input = vault_input();
        let config = Config::default();

        let engine = engine::new(&input, &config).label();
        assert_eq!(engine.state().semantics.len(), 2);

        let engine = engine.classify();
        assert_eq!(engine.state().protocol.detected_type, ProtocolType::Vault);

        let engine = engine.diff().detect();
        let patterns = engine.state().patterns.as_ref().expect("diff was available");
        assert!(patterns.iter().any(|p| p.pattern_type == PatternType::FlashChange));

        let document = engine.synthesize().document();
        assert!(document.invariants.iter().any(|i| i.name == "share_price_stability"));
        assert!(document.invariants.iter().any(|i| i.id == "PATTERN_flash_change_001"));
        assert_eq!(document.state_changes.map(|s| s.slots_changed), Some(1));
    }

    #[test]
    fn single_snapshot_only_produces_templates() {
        let input = ProtocolInput {
            after: None,
            ..vault_input()
        };
        let document = engine::new(&input, &Config::default()).run();

        assert!(document.state_changes.is_none());
        assert!(document.attack_patterns.is_none());
        assert!(document.invariants.iter().all(|i| i.id.starts_with("TEMPLATE_")));
        assert!(!document.invariants.is_empty());
    }
}

//! This module contains the state tracking functionality for the engine.

use std::fmt::Debug;

use crate::{
    diff::DiffReport,
    invariant::ComplexInvariant,
    pattern::ChangePattern,
    protocol::ProtocolResult,
    semantics::SemanticMapping,
};

/// A marker trait that says that the type implementing it is an engine state.
///
/// Engine states can be transitioned between as part of the
/// [`crate::engine::Engine`] state machine, and are intended to enforce that
/// the stages run in order.
pub trait State
where
    Self: Debug + Sized,
{
}

/// The initial state, in which the inputs have been loaded and nothing has
/// been analysed.
#[derive(Debug)]
pub struct Loaded;
impl State for Loaded {}

/// Every slot of the before-snapshot has been given a semantic label.
#[derive(Debug)]
pub struct Labelled {
    pub semantics: SemanticMapping,
}
impl State for Labelled {}

/// The protocol type has been decided.
#[derive(Debug)]
pub struct Classified {
    pub semantics: SemanticMapping,
    pub protocol:  ProtocolResult,
}
impl State for Classified {}

/// The snapshots have been compared, if there were two of them.
#[derive(Debug)]
pub struct Diffed {
    pub semantics: SemanticMapping,
    pub protocol:  ProtocolResult,
    pub diff:      Option<DiffReport>,
}
impl State for Diffed {}

/// The diff has been scanned for attack patterns, if there was a diff.
#[derive(Debug)]
pub struct Detected {
    pub semantics: SemanticMapping,
    pub protocol:  ProtocolResult,
    pub diff:      Option<DiffReport>,
    pub patterns:  Option<Vec<ChangePattern>>,
}
impl State for Detected {}

/// The invariants have been synthesized.
#[derive(Debug)]
pub struct Synthesized {
    pub semantics:  SemanticMapping,
    pub protocol:   ProtocolResult,
    pub diff:       Option<DiffReport>,
    pub patterns:   Option<Vec<ChangePattern>>,
    pub invariants: Vec<ComplexInvariant>,
}
impl State for Synthesized {}

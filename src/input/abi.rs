//! This module contains the representation of a contract ABI document, to the
//! extent needed to classify the protocol the contract implements.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The kinds of entry that can appear in an ABI document.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbiItemKind {
    Function,
    Event,
    Constructor,
    Fallback,
    Receive,
    Error,

    /// Any kind not listed above. Such entries are kept but never scored.
    #[serde(other)]
    Unknown,
}

/// A named, typed parameter of an ABI entry.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default)]
    pub typ: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indexed: Option<bool>,
}

/// A single entry in an ABI document.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiItem {
    /// The kind of entry.
    #[serde(rename = "type")]
    pub kind: AbiItemKind,

    /// The name of the function or event, absent for some entry kinds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub inputs: Vec<AbiParam>,

    #[serde(default)]
    pub outputs: Vec<AbiParam>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_mutability: Option<String>,
}

impl AbiItem {
    /// Constructs a function entry with no parameters.
    #[must_use]
    pub fn function(name: impl Into<String>) -> Self {
        Self::named(AbiItemKind::Function, name)
    }

    /// Constructs an event entry with no parameters.
    #[must_use]
    pub fn event(name: impl Into<String>) -> Self {
        Self::named(AbiItemKind::Event, name)
    }

    fn named(kind: AbiItemKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: Some(name.into()),
            inputs: vec![],
            outputs: vec![],
            state_mutability: None,
        }
    }
}

/// An ordered ABI document.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AbiDocument {
    items: Vec<AbiItem>,
}

impl AbiDocument {
    /// Constructs a document from its `items`.
    #[must_use]
    pub fn new(items: impl Into<Vec<AbiItem>>) -> Self {
        Self {
            items: items.into(),
        }
    }

    /// Gets the entries of the document in order.
    #[must_use]
    pub fn items(&self) -> &[AbiItem] {
        &self.items
    }

    /// Gets the names of all functions in the document.
    #[must_use]
    pub fn function_names(&self) -> Vec<&str> {
        self.names_of(AbiItemKind::Function)
    }

    /// Gets the names of all events in the document.
    #[must_use]
    pub fn event_names(&self) -> Vec<&str> {
        self.names_of(AbiItemKind::Event)
    }

    fn names_of(&self, kind: AbiItemKind) -> Vec<&str> {
        self.items
            .iter()
            .filter(|i| i.kind == kind)
            .filter_map(|i| i.name.as_deref())
            .collect()
    }

    /// Reads and decodes the ABI document in the file at `path`.
    ///
    /// Both a bare list of entries and an object with an `abi` field (as
    /// emitted by most build tools) are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be read or decoded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Bare(AbiDocument),
            Wrapped { abi: AbiDocument },
        }

        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;
        let shape: Shape = serde_json::from_str(&text).map_err(|e| Error::json(path, &e))?;
        Ok(match shape {
            Shape::Bare(document) | Shape::Wrapped { abi: document } => document,
        })
    }
}

//! This module contains the loaders for the inputs of a single protocol
//! analysis.
//!
//! A protocol is described by a directory containing:
//!
//! - [`BEFORE_STATE_FILE_NAME`]: the storage snapshot from before the exploit
//!   (required).
//! - [`AFTER_STATE_FILE_NAME`]: the storage snapshot from after the exploit.
//! - [`ABI_FILE_NAME`]: the ABI of the protocol's main contract.
//! - [`LAYOUT_FILE_NAME`]: the declared state variables of the main contract.
//!
//! Only the before-state is required. Missing optional inputs are logged and
//! the stages that depend on them are skipped during analysis.

pub mod abi;
pub mod snapshot;

use std::path::{Path, PathBuf};

use ethnum::U256;
use serde::{Deserialize, Serialize};

use crate::{
    constant::{ABI_FILE_NAME, AFTER_STATE_FILE_NAME, BEFORE_STATE_FILE_NAME, LAYOUT_FILE_NAME},
    error::{Error, Result},
    input::{abi::AbiDocument, snapshot::StateSnapshot},
    layout::{calculate_layout, ContractLayout, StateVariable},
};

/// The declared state variables of a contract, in declaration order.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct DeclaredVariables {
    /// The address of the contract the variables belong to, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,

    /// The variables themselves.
    pub variables: Vec<StateVariable>,
}

impl DeclaredVariables {
    /// Computes the storage layout of the variables starting at slot zero.
    #[must_use]
    pub fn layout(&self) -> ContractLayout {
        ContractLayout {
            contract: self.contract.as_ref().map(|c| c.to_lowercase()),
            layout:   calculate_layout(&self.variables, U256::ZERO),
        }
    }

    /// Reads the declared variables in the file at `path`.
    ///
    /// Both a bare list of variables and an object with `contract` and
    /// `variables` fields are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be read or decoded.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Bare(Vec<StateVariable>),
            Full(DeclaredVariables),
        }

        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;
        let shape: Shape = serde_json::from_str(&text).map_err(|e| Error::json(path, &e))?;
        Ok(match shape {
            Shape::Bare(variables) => Self {
                contract: None,
                variables,
            },
            Shape::Full(declared) => declared,
        })
    }
}

/// All of the inputs needed to analyse a single protocol.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProtocolInput {
    /// The name of the protocol.
    pub name: String,

    /// The ABI of the protocol's main contract.
    pub abi: Option<AbiDocument>,

    /// The state before the exploit.
    pub before: StateSnapshot,

    /// The state after the exploit.
    pub after: Option<StateSnapshot>,

    /// The declared state variables of the protocol's main contract.
    pub variables: Option<DeclaredVariables>,
}

impl ProtocolInput {
    /// Constructs the input for the protocol called `name` from only its
    /// before-state.
    #[must_use]
    pub fn new(name: impl Into<String>, before: StateSnapshot) -> Self {
        Self {
            name: name.into(),
            before,
            ..Self::default()
        }
    }

    /// Attaches the after-state.
    #[must_use]
    pub fn with_after(mut self, after: StateSnapshot) -> Self {
        self.after = Some(after);
        self
    }

    /// Attaches the ABI of the main contract.
    #[must_use]
    pub fn with_abi(mut self, abi: AbiDocument) -> Self {
        self.abi = Some(abi);
        self
    }

    /// Attaches the declared variables of the main contract.
    #[must_use]
    pub fn with_variables(mut self, variables: DeclaredVariables) -> Self {
        self.variables = Some(variables);
        self
    }

    /// Loads the inputs for the protocol described by the directory at `dir`,
    /// naming the protocol after the directory.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the before-state is missing, or if any file that is
    /// present cannot be read or decoded.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let name = protocol_name(dir);

        let before_path = dir.join(BEFORE_STATE_FILE_NAME);
        if !before_path.is_file() {
            return Err(Error::missing(before_path));
        }
        let before = StateSnapshot::load(&before_path)?;

        let after = optional(dir.join(AFTER_STATE_FILE_NAME), &name, |p| StateSnapshot::load(p))?;
        let abi = optional(dir.join(ABI_FILE_NAME), &name, |p| AbiDocument::load(p))?;
        let variables = optional(dir.join(LAYOUT_FILE_NAME), &name, |p| {
            DeclaredVariables::load(p)
        })?;

        tracing::debug!(
            protocol = %name,
            contracts = before.len(),
            has_after = after.is_some(),
            has_abi = abi.is_some(),
            has_layout = variables.is_some(),
            "loaded protocol inputs"
        );

        Ok(Self {
            name,
            abi,
            before,
            after,
            variables,
        })
    }
}

/// Gets the name of the protocol described by the directory at `dir`.
#[must_use]
pub fn protocol_name(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Loads the optional input at `path` using `load` if the file exists.
fn optional<T>(
    path: PathBuf,
    protocol: &str,
    load: impl FnOnce(&Path) -> Result<T>,
) -> Result<Option<T>> {
    if path.is_file() {
        load(&path).map(Some)
    } else {
        tracing::warn!(protocol = %protocol, path = %path.display(), "optional input missing");
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use crate::{
        constant::{ABI_FILE_NAME, BEFORE_STATE_FILE_NAME, LAYOUT_FILE_NAME},
        error::Error,
        input::{DeclaredVariables, ProtocolInput},
    };

    #[test]
    fn requires_only_the_before_state() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let protocol = dir.path().join("tiny");
        fs::create_dir(&protocol)?;
        fs::write(
            protocol.join(BEFORE_STATE_FILE_NAME),
            r#"{"addresses": {"0x01": {"storage": {"0x0": "0x1"}}}}"#,
        )?;

        let input = ProtocolInput::from_dir(&protocol)?;
        assert_eq!(input.name, "tiny");
        assert_eq!(input.before.len(), 1);
        assert!(input.after.is_none());
        assert!(input.abi.is_none());
        assert!(input.variables.is_none());
        Ok(())
    }

    #[test]
    fn abi_with_unfamiliar_entries_still_loads() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(BEFORE_STATE_FILE_NAME),
            r#"{"addresses": {"0x01": {"storage": {"0x0": "0x1"}}}}"#,
        )?;
        fs::write(
            dir.path().join(ABI_FILE_NAME),
            r#"{"abi": [
                {"type": "function", "name": "totalSupply"},
                {"type": "errorSelector", "name": "Custom"}
            ]}"#,
        )?;

        let input = ProtocolInput::from_dir(dir.path())?;
        let abi = input.abi.expect("ABI was provided");
        assert_eq!(abi.items().len(), 2);
        assert_eq!(abi.function_names(), vec!["totalSupply"]);
        Ok(())
    }

    #[test]
    fn missing_before_state_is_an_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let result = ProtocolInput::from_dir(dir.path());
        assert!(matches!(result, Err(Error::MissingInput { .. })));
        Ok(())
    }

    #[test]
    fn reads_both_layout_shapes() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;

        let bare = dir.path().join("bare.json");
        fs::write(&bare, r#"[{"name": "owner", "type": "address"}]"#)?;
        let declared = DeclaredVariables::load(&bare)?;
        assert!(declared.contract.is_none());
        assert_eq!(declared.variables.len(), 1);

        let full = dir.path().join(LAYOUT_FILE_NAME);
        fs::write(
            &full,
            r#"{"contract": "0xABC", "variables": [
                {"name": "FEE", "type": "uint256", "constant": true},
                {"name": "owner", "type": "address"}
            ]}"#,
        )?;
        let declared = DeclaredVariables::load(&full)?;
        let layout = declared.layout();
        assert_eq!(layout.contract.as_deref(), Some("0xabc"));
        assert_eq!(layout.layout.len(), 1);
        Ok(())
    }
}

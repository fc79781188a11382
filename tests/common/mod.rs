//! This module contains common utilities for simplifying the writing of
//! integration tests for this library.

#![cfg(test)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use storage_invariant_engine as sie;
use storage_invariant_engine::{engine, input::ProtocolInput, InvariantDocument};

/// Gets the path to the fixture protocol directory called `name`.
#[must_use]
pub fn protocol_dir(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("asset")
        .join("protocols")
        .join(name)
}

/// Loads the inputs of the fixture protocol called `name`.
#[allow(unused)] // It is actually
pub fn load_protocol(name: &str) -> anyhow::Result<ProtocolInput> {
    Ok(ProtocolInput::from_dir(protocol_dir(name))?)
}

/// Analyses the fixture protocol called `name` with the default
/// configuration.
#[allow(unused)] // It is actually
pub fn analyse(name: &str) -> anyhow::Result<InvariantDocument> {
    let input = load_protocol(name)?;
    let config = engine::Config::default();
    Ok(sie::new(&input, &config).run())
}

/// Copies the fixture protocol called `name` into `root`, returning the path
/// of the copy.
#[allow(unused)] // It is actually
pub fn copy_protocol(name: &str, root: &Path) -> anyhow::Result<PathBuf> {
    let target = root.join(name);
    fs::create_dir_all(&target)?;
    for entry in fs::read_dir(protocol_dir(name))? {
        let entry = entry?;
        fs::copy(entry.path(), target.join(entry.file_name()))?;
    }
    Ok(target)
}

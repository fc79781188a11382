//! This module contains the primary error type for the engine's interface.
//!
//! Note that the analysis components themselves never fail: missing inputs
//! degrade to skipped stages and unrecognised data degrades to `unknown`
//! classifications. The errors here describe the I/O boundary, namely
//! loading protocol inputs and writing output documents.

pub mod container;

use std::path::Path;

use thiserror::Error;

/// The interface result type for the library.
///
/// Any function considered to be part of the public interface of the library
/// that can fail should return this result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The interface error type for the library.
///
/// All errors returned from the library interface (and hence encountered by
/// the clients of the library) should be members of this enum.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    /// A file could not be read or written.
    #[error("I/O failure on {path}: {reason}")]
    Io { path: String, reason: String },

    /// A file was read but did not contain the expected JSON document.
    #[error("Invalid JSON in {path}: {reason}")]
    Json { path: String, reason: String },

    /// A required input was not present.
    #[error("Required input {path} is missing")]
    MissingInput { path: String },

    /// The worker pool for batch processing could not be constructed.
    #[error("Could not build worker pool: {_0}")]
    WorkerPool(String),

    /// Processing of a unit panicked, and the panic was contained.
    #[error("Processing panicked: {_0}")]
    Panicked(String),

    /// An unknown error, represented as a string.
    #[error("Unknown Error: {_0:?}")]
    Other(String),
}

impl Error {
    /// Constructs an unknown error with the provided `message`.
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Constructs an I/O error for the file at `path`.
    pub fn io(path: impl AsRef<Path>, error: &std::io::Error) -> Self {
        Self::Io {
            path:   path.as_ref().display().to_string(),
            reason: error.to_string(),
        }
    }

    /// Constructs a JSON decoding error for the file at `path`.
    pub fn json(path: impl AsRef<Path>, error: &serde_json::Error) -> Self {
        Self::Json {
            path:   path.as_ref().display().to_string(),
            reason: error.to_string(),
        }
    }

    /// Constructs a missing input error for the file at `path`.
    pub fn missing(path: impl AsRef<Path>) -> Self {
        Self::MissingInput {
            path: path.as_ref().display().to_string(),
        }
    }
}

/// Make it possible to attach the name of the unit being processed to these
/// errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, unit: impl Into<String>) -> Self::Located {
        container::Located {
            location: unit.into(),
            payload:  self,
        }
    }
}

/// A library error with the name of the protocol it occurred in.
pub type LocatedError = container::Located<Error>;

/// A container of errors that may occur across a batch.
pub type Errors = container::Errors<LocatedError>;

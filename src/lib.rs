//! This library synthesizes machine-checkable invariants from snapshots of
//! [EVM](https://ethereum.org/en/developers/docs/evm/) contract storage taken
//! before and after an exploit. The invariants are bounded arithmetic rules
//! over storage slots and balances that a monitor can evaluate to flag
//! similar attacks in the future. It is a _best effort_ analysis: the
//! invariants are heuristic detectors, not proofs.
//!
//! Note that this library never executes bytecode. It only reasons over
//! storage, ABI and event data that has already been collected.
//!
//! # How it Works
//!
//! From a very high level, the synthesis process is performed as follows:
//!
//! 1. The declared state variables, if known, are placed into slots by
//!    [`layout::calculate_layout`] following the Solidity packing rules.
//! 2. Every slot of the before-snapshot is given a semantic label (a total
//!    supply, a reserve, an owner, and so on) by
//!    [`semantics::label_snapshot`].
//! 3. The kind of protocol is decided by [`protocol::detect`], which fuses
//!    evidence from the ABI, events, slot semantics and project name.
//! 4. The two snapshots are compared by [`diff::diff`], which buckets the
//!    size of each change and relates changes across contracts.
//! 5. The [`pattern::Detectors`] scan the diff for known attack signatures.
//! 6. [`invariant::synthesize`] turns all of the above into invariants with
//!    calibrated thresholds, which are collected into a
//!    [`report::InvariantDocument`].
//!
//! Stages whose inputs are absent are skipped rather than failing, so a
//! single snapshot with no ABI still produces the template invariants.
//!
//! # Basic Usage
//!
//! For the most basic usage of the library, it is sufficient to construct a
//! [`input::ProtocolInput`] and call `.run` on a new engine.
//!
//! ```
//! use ethnum::U256;
//! use storage_invariant_engine as sie;
//! use storage_invariant_engine::{
//!     engine,
//!     input::{
//!         snapshot::{ContractState, StateSnapshot},
//!         ProtocolInput,
//!     },
//! };
//!
//! let before = StateSnapshot::new()
//!     .with_contract(ContractState::new("0xa").with_slot(4u64, U256::new(1_000_000)));
//! let after = StateSnapshot::new()
//!     .with_contract(ContractState::new("0xa").with_slot(4u64, U256::new(15_000_000)));
//! let input = ProtocolInput::new("example", before).with_after(after);
//!
//! let config = engine::Config::default();
//! let document = sie::new(&input, &config).run();
//!
//! assert_eq!(document.state_changes.map(|s| s.extreme_changes), Some(1));
//! ```

#![warn(clippy::all, clippy::cargo, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Allows for better API naming

pub mod batch;
pub mod constant;
pub mod diff;
pub mod engine;
pub mod error;
pub mod input;
pub mod invariant;
pub mod layout;
pub mod pattern;
pub mod protocol;
pub mod report;
pub mod semantics;
pub mod utility;
pub mod watchdog;

// Re-exports to provide the library interface.
pub use engine::new;
pub use layout::StorageLayout;
pub use report::InvariantDocument;

//! This module contains constants that are needed throughout the codebase.
//!
//! # Calibration Knobs
//!
//! Many of the numeric thresholds below (magnitude bucket bounds, the
//! rate-to-threshold multipliers, the gas tolerance, and so on) were chosen
//! empirically against historical exploits. They are not derived from first
//! principles, and are exposed through the relevant `Config` types so that
//! they can be re-tuned without touching the algorithms.

/// The width of a word on the EVM in bits.
pub const WORD_SIZE_BITS: usize = 256;

/// The width of a byte on the EVM (and most other places) in bits.
pub const BYTE_SIZE_BITS: usize = 8;

/// The width of a word on the EVM in bytes, and hence the size of a storage
/// slot.
pub const WORD_SIZE_BYTES: usize = WORD_SIZE_BITS / BYTE_SIZE_BITS;

/// The bit-width of an address type.
pub const ADDRESS_WIDTH_BITS: usize = 160;

/// The byte-width of an address type.
pub const ADDRESS_WIDTH_BYTES: usize = ADDRESS_WIDTH_BITS / BYTE_SIZE_BITS;

/// The byte-width of a bool type.
pub const BOOL_WIDTH_BYTES: usize = 1;

/// The number of storage indices whose keccak256 hashes are precomputed so
/// that the data regions of dynamic arrays can be recognised in raw storage.
pub const HASHED_SLOT_COUNT: usize = 1000;

/// Slot indices below this bound are considered to be "direct" slots, while
/// those at or above it are assumed to be derived from a mapping or array.
pub const DIRECT_SLOT_BOUND: u64 = 1000;

/// The number of wei in one ether, used as the scale for token amounts.
pub const ONE_ETHER_WEI: u128 = 1_000_000_000_000_000_000;

/// The upper bound on raw values considered plausible token amounts (1e27).
pub const TOKEN_AMOUNT_UPPER_BOUND: u128 = 1_000_000_000_000_000_000_000_000_000;

/// The lower bound on raw values considered plausible unix timestamps.
pub const TIMESTAMP_LOWER_BOUND: u128 = 1_600_000_000;

/// The upper bound on raw values considered plausible unix timestamps.
pub const TIMESTAMP_UPPER_BOUND: u128 = 2_000_000_000;

/// The confidence given to a raw value that looks like an address.
pub const VALUE_ADDRESS_CONFIDENCE: f64 = 0.7;

/// The confidence given to a raw value that looks like a token amount.
pub const VALUE_TOKEN_AMOUNT_CONFIDENCE: f64 = 0.5;

/// The confidence given to a raw value that looks like a timestamp.
pub const VALUE_TIMESTAMP_CONFIDENCE: f64 = 0.6;

/// The confidence given to a slot that nothing could be inferred about.
pub const UNKNOWN_SEMANTIC_CONFIDENCE: f64 = 0.1;

/// The confidence given to a semantic inferred only from a declared type.
pub const TYPE_INFERENCE_CONFIDENCE: f64 = 0.6;

/// The base confidence for a name-pattern match, before the priority is added.
pub const NAME_MATCH_BASE_CONFIDENCE: f64 = 0.5;

/// The confidence added per point of name-pattern priority.
pub const NAME_MATCH_PRIORITY_STEP: f64 = 0.1;

/// The confidence boost applied when the declared type corroborates the
/// semantic inferred from a name.
pub const TYPE_CORROBORATION_BOOST: f64 = 0.2;

/// The weight of the ABI-function scorer in protocol classification.
pub const ABI_SOURCE_WEIGHT: f64 = 0.4;

/// The weight of the event-name scorer in protocol classification.
pub const EVENT_SOURCE_WEIGHT: f64 = 0.3;

/// The weight of the storage-layout scorer in protocol classification.
pub const LAYOUT_SOURCE_WEIGHT: f64 = 0.2;

/// The weight of the project-name scorer in protocol classification.
pub const NAME_SOURCE_WEIGHT: f64 = 0.1;

/// The score added for each matched core function of a protocol.
pub const ABI_CORE_FUNCTION_SCORE: f64 = 0.3;

/// The score added for each matched supporting function of a protocol.
pub const ABI_SUPPORTING_FUNCTION_SCORE: f64 = 0.1;

/// The score added for each matched administrative function of a protocol.
pub const ABI_ADMIN_FUNCTION_SCORE: f64 = 0.05;

/// The score added for each keyword matched in the project name.
pub const NAME_KEYWORD_SCORE: f64 = 0.3;

/// The upper bound (exclusive) on the change rate of a `tiny` change.
pub const MAGNITUDE_TINY_BOUND: f64 = 0.001;

/// The upper bound (exclusive) on the change rate of a `small` change.
pub const MAGNITUDE_SMALL_BOUND: f64 = 0.01;

/// The upper bound (exclusive) on the change rate of a `medium` change.
pub const MAGNITUDE_MEDIUM_BOUND: f64 = 0.1;

/// The upper bound (exclusive) on the change rate of a `large` change.
pub const MAGNITUDE_LARGE_BOUND: f64 = 0.5;

/// The upper bound (exclusive) on the change rate of a `massive` change.
///
/// Anything at or beyond this bound is `extreme`.
pub const MAGNITUDE_MASSIVE_BOUND: f64 = 10.0;

/// The relative difference below which two opposite balance deltas are
/// considered to be the same transfer, allowing for gas costs.
pub const GAS_TOLERANCE: f64 = 0.01;

/// The correlation score given to a detected balance transfer.
pub const BALANCE_TRANSFER_SCORE: f64 = 0.95;

/// The correlation score given to correlated extreme changes across
/// contracts.
pub const CORRELATED_CHANGES_SCORE: f64 = 0.8;

/// The minimum number of contracts that must see large changes for those
/// changes to be considered correlated.
pub const CORRELATED_CHANGES_MIN_CONTRACTS: usize = 2;

/// The nonce delta beyond which a contract is considered to have been
/// called recursively.
pub const RECURSIVE_CALL_NONCE_DELTA: u64 = 10;

/// The minimum number of large increases in a single contract needed to
/// report a monotonic increase.
pub const MONOTONIC_INCREASE_MIN_SLOTS: usize = 2;

/// The multiplier applied to extracted change rates of `10` or more.
pub const EXTREME_RATE_MULTIPLIER: f64 = 0.1;

/// The clip range applied to thresholds derived from rates of `10` or more.
pub const EXTREME_RATE_CLIP: (f64, f64) = (0.5, 5.0);

/// The multiplier applied to extracted change rates in `[1, 10)`.
pub const HIGH_RATE_MULTIPLIER: f64 = 0.5;

/// The clip range applied to thresholds derived from rates in `[1, 10)`.
pub const HIGH_RATE_CLIP: (f64, f64) = (0.2, 2.0);

/// The multiplier applied to extracted change rates below `1`.
pub const LOW_RATE_MULTIPLIER: f64 = 0.8;

/// The clip range applied to thresholds derived from rates below `1`.
pub const LOW_RATE_CLIP: (f64, f64) = (0.05, 0.5);

/// The clip range applied to thresholds derived from protocol defaults.
pub const FALLBACK_THRESHOLD_CLIP: (f64, f64) = (0.01, 1.0);

/// The divisor applied to the smallest observed post-change value to obtain
/// the maximum plausible initial value for a previously-empty slot.
pub const MAX_INITIAL_VALUE_DIVISOR: f64 = 10.0;

/// The relative tolerance within which the balance deltas of a transfer must
/// cancel out for a conservation invariant to hold.
pub const CONSERVATION_TOLERANCE: f64 = 0.01;

/// The default number of worker threads used by the batch driver.
pub const DEFAULT_BATCH_THREADS: usize = 4;

/// The file name of the ABI document in a protocol directory.
pub const ABI_FILE_NAME: &str = "abi.json";

/// The file name of the before-state snapshot in a protocol directory.
pub const BEFORE_STATE_FILE_NAME: &str = "state_before.json";

/// The file name of the after-state snapshot in a protocol directory.
pub const AFTER_STATE_FILE_NAME: &str = "state_after.json";

/// The file name of the declared-variable list in a protocol directory.
pub const LAYOUT_FILE_NAME: &str = "layout.json";

/// The suffix appended to the protocol name to form the output file name.
pub const OUTPUT_FILE_SUFFIX: &str = "_invariants.json";

//! This module contains the representation of a storage snapshot: the state of
//! a set of contracts at a single point in time.
//!
//! Snapshots are decoded leniently. Storage keys that cannot be parsed are
//! dropped, and storage values or balances that cannot be parsed are read as
//! zero, each with a logged warning. Addresses are compared ignoring case, so
//! of two entries that differ only in case the one sorting last is kept,
//! again with a warning.

use std::{collections::BTreeMap, path::Path};

use ethnum::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    utility::{parse_word, to_hex_word, U256W},
};

/// The state of a single contract.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ContractState {
    address: String,
    storage: BTreeMap<U256W, U256W>,
    balance: U256W,
    nonce:   u64,
    code:    Option<String>,
}

impl ContractState {
    /// Constructs the state of a contract at `address` with empty storage and
    /// zero balance.
    ///
    /// The address is normalised to lowercase.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into().to_lowercase(),
            ..Self::default()
        }
    }

    /// Sets the value of the storage `slot` to `value`.
    #[must_use]
    pub fn with_slot(mut self, slot: impl Into<U256W>, value: impl Into<U256W>) -> Self {
        self.storage.insert(slot.into(), value.into());
        self
    }

    /// Sets the balance of the contract in wei.
    #[must_use]
    pub fn with_balance(mut self, balance: impl Into<U256W>) -> Self {
        self.balance = balance.into();
        self
    }

    /// Sets the nonce of the contract.
    #[must_use]
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Sets the deployed code of the contract.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Gets the lowercased address of the contract.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Gets the contract's storage.
    #[must_use]
    pub fn storage(&self) -> &BTreeMap<U256W, U256W> {
        &self.storage
    }

    /// Gets the value of `slot`, if it is present in the snapshot.
    #[must_use]
    pub fn slot(&self, slot: impl Into<U256W>) -> Option<U256> {
        self.storage.get(&slot.into()).map(U256W::value)
    }

    /// Gets the contract's balance in wei.
    #[must_use]
    pub fn balance(&self) -> U256 {
        self.balance.value()
    }

    /// Gets the contract's nonce.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Gets the contract's deployed code, if it was captured.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// The state of a set of contracts at a single point in time, keyed by
/// lowercased address.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StateSnapshot {
    contracts: BTreeMap<String, ContractState>,
}

impl StateSnapshot {
    /// Constructs an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `state` to the snapshot, replacing any state for the same address.
    #[must_use]
    pub fn with_contract(mut self, state: ContractState) -> Self {
        self.contracts.insert(state.address.clone(), state);
        self
    }

    /// Gets the state of the contract at `address`.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&ContractState> {
        self.contracts.get(&address.to_lowercase())
    }

    /// Iterates over the contracts in address order.
    pub fn contracts(&self) -> impl Iterator<Item = (&String, &ContractState)> {
        self.contracts.iter()
    }

    /// Gets the addresses of all contracts in the snapshot.
    pub fn addresses(&self) -> impl Iterator<Item = &String> {
        self.contracts.keys()
    }

    /// Gets the number of contracts in the snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Checks if the snapshot contains no contracts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Decodes a snapshot from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if `text` is not a JSON document of the snapshot shape.
    /// Individual keys and values that cannot be parsed are not errors.
    pub fn from_json_str(text: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: RawSnapshot = serde_json::from_str(text)?;
        Ok(Self::from(raw))
    }

    /// Reads and decodes the snapshot in the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the file cannot be read or is not a valid snapshot
    /// document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, &e))?;
        Self::from_json_str(&text).map_err(|e| Error::json(path, &e))
    }

    /// Encodes the snapshot into the same JSON shape it is read from.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if serialization fails.
    pub fn to_json_string(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&RawSnapshot::from(self))
    }
}

/// The on-disk shape of a snapshot document.
#[derive(Debug, Deserialize, Serialize)]
struct RawSnapshot {
    #[serde(default)]
    addresses: BTreeMap<String, RawContract>,
}

/// The on-disk shape of a single contract within a snapshot document.
#[derive(Debug, Deserialize, Serialize)]
struct RawContract {
    #[serde(default)]
    storage: BTreeMap<String, Value>,

    #[serde(default)]
    balance_wei: Option<Value>,

    #[serde(default)]
    nonce: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

/// Reads a 256-bit word from a JSON value that may be a hex string, a decimal
/// string, or a number.
///
/// Numbers beyond `u64` are only available to us as `f64`, so they are exact
/// up to 2^53 and rounded beyond it. Strings are always exact.
fn word_from_json(value: &Value) -> Option<U256> {
    match value {
        Value::String(text) => parse_word(text),
        Value::Number(number) => number.as_u64().map(U256::from).or_else(|| {
            let float = number.as_f64().filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)?;
            tracing::warn!(value = %number, "numeric word exceeds u64, reading through f64");
            parse_word(&format!("{float:.0}"))
        }),
        Value::Null => Some(U256::ZERO),
        _ => None,
    }
}

impl From<RawSnapshot> for StateSnapshot {
    fn from(raw: RawSnapshot) -> Self {
        let mut snapshot = StateSnapshot::new();

        for (address, contract) in raw.addresses {
            let mut state = ContractState::new(address);

            for (key, value) in contract.storage {
                let Some(slot) = parse_word(&key) else {
                    tracing::warn!(address = %state.address, key = %key, "skipping unparsable storage key");
                    continue;
                };
                let value = word_from_json(&value).unwrap_or_else(|| {
                    tracing::warn!(
                        address = %state.address,
                        slot = %slot,
                        value = %value,
                        "unparsable storage value, reading as zero"
                    );
                    U256::ZERO
                });
                state.storage.insert(slot.into(), value.into());
            }

            if let Some(balance) = contract.balance_wei {
                let balance = word_from_json(&balance).unwrap_or_else(|| {
                    tracing::warn!(address = %state.address, "unparsable balance, reading as zero");
                    U256::ZERO
                });
                state.balance = balance.into();
            }

            state.nonce = contract.nonce.unwrap_or_default();
            state.code = contract.code;
            let address = state.address.clone();
            if snapshot.contracts.insert(address.clone(), state).is_some() {
                tracing::warn!(
                    address = %address,
                    "address appears more than once ignoring case, keeping the last entry"
                );
            }
        }

        snapshot
    }
}

impl From<&StateSnapshot> for RawSnapshot {
    fn from(snapshot: &StateSnapshot) -> Self {
        let addresses = snapshot
            .contracts
            .iter()
            .map(|(address, state)| {
                let storage = state
                    .storage
                    .iter()
                    .map(|(k, v)| (to_hex_word(k.value()), Value::String(to_hex_word(v.value()))))
                    .collect();
                let contract = RawContract {
                    storage,
                    balance_wei: Some(Value::String(state.balance.to_string())),
                    nonce: Some(state.nonce),
                    code: state.code.clone(),
                };
                (address.clone(), contract)
            })
            .collect();
        Self { addresses }
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::input::snapshot::StateSnapshot;

    const DOCUMENT: &str = r#"{
        "addresses": {
            "0xAbCd000000000000000000000000000000000001": {
                "storage": {
                    "0x2": "0x0de0b6b3a7640000",
                    "3": "12",
                    "0x4": "garbage",
                    "not-a-slot": "0x1"
                },
                "balance_wei": "1000",
                "nonce": 7,
                "code": "0x6080"
            }
        }
    }"#;

    #[test]
    fn decodes_leniently() -> anyhow::Result<()> {
        let snapshot = StateSnapshot::from_json_str(DOCUMENT)?;
        let state = snapshot
            .get("0xabcd000000000000000000000000000000000001")
            .expect("Address was normalised");

        assert_eq!(state.storage().len(), 3);
        assert_eq!(state.slot(U256::new(2)), Some(U256::new(1_000_000_000_000_000_000)));
        assert_eq!(state.slot(U256::new(3)), Some(U256::new(12)));
        assert_eq!(state.slot(U256::new(4)), Some(U256::ZERO));
        assert_eq!(state.balance(), U256::new(1000));
        assert_eq!(state.nonce(), 7);
        assert_eq!(state.code(), Some("0x6080"));
        Ok(())
    }

    #[test]
    fn survives_re_encoding() -> anyhow::Result<()> {
        let snapshot = StateSnapshot::from_json_str(DOCUMENT)?;
        let text = snapshot.to_json_string()?;
        assert_eq!(StateSnapshot::from_json_str(&text)?, snapshot);
        Ok(())
    }

    #[test]
    fn numbers_beyond_u64_keep_their_value() -> anyhow::Result<()> {
        let snapshot = StateSnapshot::from_json_str(
            r#"{"addresses": {"0x1": {
                "storage": {"0x0": 20000000000000000000, "0x1": 7, "0x2": -3},
                "balance_wei": 50000000000000000000
            }}}"#,
        )?;
        let state = snapshot.get("0x1").expect("Contract is present");

        assert_eq!(state.slot(U256::ZERO), Some(U256::new(20_000_000_000_000_000_000)));
        assert_eq!(state.slot(U256::ONE), Some(U256::new(7)));
        assert_eq!(state.slot(U256::new(2)), Some(U256::ZERO));
        assert_eq!(state.balance(), U256::new(50_000_000_000_000_000_000));
        Ok(())
    }

    #[test]
    fn case_colliding_addresses_keep_the_last_entry() -> anyhow::Result<()> {
        let snapshot = StateSnapshot::from_json_str(
            r#"{"addresses": {
                "0xAB": {"storage": {"0x0": "1"}},
                "0xab": {"storage": {"0x0": "2"}}
            }}"#,
        )?;

        assert_eq!(snapshot.len(), 1);
        let state = snapshot.get("0xAb").expect("Address was normalised");
        assert_eq!(state.slot(U256::ZERO), Some(U256::new(2)));
        Ok(())
    }

    #[test]
    fn missing_fields_default() -> anyhow::Result<()> {
        let snapshot = StateSnapshot::from_json_str(r#"{"addresses": {"0x1": {}}}"#)?;
        let state = snapshot.get("0x1").unwrap();
        assert!(state.storage().is_empty());
        assert_eq!(state.balance(), U256::ZERO);
        assert_eq!(state.nonce(), 0);
        Ok(())
    }
}

//! This module contains the storage layout engine, which reproduces the rules
//! that the Solidity compiler uses to place state variables into storage.
//!
//! # Placement Rules
//!
//! - Constant and immutable variables are not placed in storage at all.
//! - Mappings and dynamic arrays always begin a new slot, occupy exactly that
//!   one base slot, and never share it with their neighbours.
//! - Elementary types are packed left-to-right into the current slot while
//!   they fit, and otherwise begin the next slot.
//!
//! The elements of mappings and dynamic arrays live at slots derived from the
//! base slot via keccak256, which can be computed with
//! [`calculate_mapping_slot`] and [`calculate_array_element_slot`].

pub mod hashed;
pub mod types;

use std::collections::BTreeMap;

use ethnum::U256;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::{constant::WORD_SIZE_BYTES, layout::types::SolidityType, utility::U256Wrapper};

/// A state variable as declared in a contract.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateVariable {
    /// The name of the variable.
    pub name: String,

    /// The declared type of the variable.
    #[serde(rename = "type")]
    pub typ: SolidityType,

    /// Whether the variable is declared `constant`.
    #[serde(default, alias = "constant")]
    pub is_constant: bool,

    /// Whether the variable is declared `immutable`.
    #[serde(default, alias = "immutable")]
    pub is_immutable: bool,
}

impl StateVariable {
    /// Constructs a new mutable state variable called `name` with the type
    /// described by `typ`.
    #[must_use]
    pub fn new(name: impl Into<String>, typ: impl Into<SolidityType>) -> Self {
        Self {
            name:         name.into(),
            typ:          typ.into(),
            is_constant:  false,
            is_immutable: false,
        }
    }

    /// Marks the variable as `constant`.
    #[must_use]
    pub fn constant(mut self) -> Self {
        self.is_constant = true;
        self
    }

    /// Marks the variable as `immutable`.
    #[must_use]
    pub fn immutable(mut self) -> Self {
        self.is_immutable = true;
        self
    }

    /// Checks whether the variable occupies storage.
    #[must_use]
    pub fn occupies_storage(&self) -> bool {
        !(self.is_constant || self.is_immutable)
    }
}

/// The placement of a single state variable in storage.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SlotInfo {
    /// The name of the variable placed here.
    pub name: String,

    /// The slot in which the variable begins.
    pub slot: U256Wrapper,

    /// The byte offset of the variable within the slot, counting from the
    /// low-order end of the word.
    pub offset: usize,

    /// The number of bytes the variable occupies in the slot.
    pub size: usize,

    /// The declared type of the variable.
    #[serde(rename = "type")]
    pub typ: SolidityType,

    /// Whether the variable is a mapping.
    pub is_mapping: bool,

    /// Whether the variable is a dynamic array.
    pub is_array: bool,

    /// The key type, if the variable is a mapping.
    pub mapping_key_type: Option<SolidityType>,

    /// The element type, if the variable is a dynamic array.
    pub array_element_type: Option<SolidityType>,
}

/// The computed storage layout for a sequence of state variables.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageLayout {
    slots: BTreeMap<String, SlotInfo>,
}

impl StorageLayout {
    /// Adds the placement `info` to the layout, replacing any placement with
    /// the same variable name.
    pub fn add(&mut self, info: SlotInfo) {
        self.slots.insert(info.name.clone(), info);
    }

    /// Gets the placement of the variable called `name`, if it exists.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SlotInfo> {
        self.slots.get(name)
    }

    /// Gets all placements ordered by slot index and then offset within the
    /// slot.
    #[must_use]
    pub fn by_slot(&self) -> Vec<&SlotInfo> {
        let mut infos: Vec<_> = self.slots.values().collect();
        infos.sort_by_key(|s| (s.slot, s.offset));
        infos
    }

    /// Gets all variables that share the slot `slot`, ordered by offset.
    #[must_use]
    pub fn variables_at(&self, slot: impl Into<U256Wrapper>) -> Vec<&SlotInfo> {
        let slot = slot.into();
        self.by_slot().into_iter().filter(|s| s.slot == slot).collect()
    }

    /// Gets the variable that begins at offset zero of `slot`, if any.
    #[must_use]
    pub fn primary_at(&self, slot: impl Into<U256Wrapper>) -> Option<&SlotInfo> {
        let slot = slot.into();
        self.slots.values().find(|s| s.slot == slot && s.offset == 0)
    }

    /// Gets the number of placed variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Checks if no variables were placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// A computed layout together with the contract it describes.
///
/// When `contract` is [`None`] the layout is taken to describe every contract
/// it is applied to.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ContractLayout {
    /// The lowercased address of the described contract, if known.
    pub contract: Option<String>,

    /// The placements of the contract's declared variables.
    pub layout: StorageLayout,
}

impl ContractLayout {
    /// Checks whether this layout describes the contract at `address`.
    #[must_use]
    pub fn describes(&self, address: &str) -> bool {
        self.contract
            .as_deref()
            .map_or(true, |contract| contract.eq_ignore_ascii_case(address))
    }
}

/// Computes the storage placement of `variables`, in declaration order,
/// beginning at `start_slot`.
///
/// This never fails. Types without a known in-slot size are assumed to
/// occupy a whole word, and a warning is logged for each of them.
#[must_use]
pub fn calculate_layout(variables: &[StateVariable], start_slot: U256) -> StorageLayout {
    let mut layout = StorageLayout::default();
    let mut slot = start_slot;
    let mut offset = 0_usize;

    for variable in variables.iter().filter(|v| v.occupies_storage()) {
        let typ = &variable.typ;

        if typ.is_mapping() || typ.is_dyn_array() {
            if offset > 0 {
                slot = slot.wrapping_add(U256::ONE);
                offset = 0;
            }
            layout.add(SlotInfo {
                name: variable.name.clone(),
                slot: slot.into(),
                offset: 0,
                size: WORD_SIZE_BYTES,
                typ: typ.clone(),
                is_mapping: typ.is_mapping(),
                is_array: typ.is_dyn_array(),
                mapping_key_type: typ.mapping_key().cloned(),
                array_element_type: typ.element_type().cloned(),
            });
            slot = slot.wrapping_add(U256::ONE);
            continue;
        }

        let size = typ.packed_size_bytes().unwrap_or_else(|| {
            tracing::warn!(
                variable = %variable.name,
                typ = %typ,
                "no known storage size, assuming a full word"
            );
            WORD_SIZE_BYTES
        });

        if offset + size > WORD_SIZE_BYTES {
            slot = slot.wrapping_add(U256::ONE);
            offset = 0;
        }

        layout.add(SlotInfo {
            name: variable.name.clone(),
            slot: slot.into(),
            offset,
            size,
            typ: typ.clone(),
            is_mapping: false,
            is_array: false,
            mapping_key_type: None,
            array_element_type: None,
        });

        offset += size;
        if offset >= WORD_SIZE_BYTES {
            slot = slot.wrapping_add(U256::ONE);
            offset = 0;
        }
    }

    tracing::debug!(variables = layout.len(), "computed storage layout");
    layout
}

/// Calculates the keccak256 hash of the provided `words` in order, using
/// big-endian byte encoding internally to match the EVM.
#[allow(clippy::missing_panics_doc)] // Panics are guarded as to never happen
#[must_use]
pub fn keccak_words(words: &[U256]) -> U256 {
    let mut hasher = Keccak256::new();

    for word in words {
        hasher.update(word.to_be_bytes());
    }

    let hash = hasher.finalize().to_vec();
    U256::from_be_bytes(
        hash.as_slice()
            .try_into()
            .expect("The number of bytes in the hash output was not 32"),
    )
}

/// Calculates the slot holding the value for `key` in a mapping whose base
/// slot is `base_slot`.
///
/// Only keys that are encoded left-padded (addresses and unsigned integers)
/// are supported. Returns [`None`] for any other `key_type`, or for a `key`
/// that does not fit in the width of `key_type`.
///
/// For nested mappings, call this again with the result as the `base_slot`,
/// or use [`calculate_nested_mapping_slot`].
#[must_use]
pub fn calculate_mapping_slot(key: U256, base_slot: U256, key_type: &SolidityType) -> Option<U256> {
    let width_bits = match key_type {
        SolidityType::Address => crate::constant::ADDRESS_WIDTH_BITS,
        SolidityType::UInt { size } => *size,
        _ => {
            tracing::debug!(key_type = %key_type, "unsupported mapping key type");
            return None;
        }
    };

    let fits = width_bits >= crate::constant::WORD_SIZE_BITS || (key >> width_bits as u32) == U256::ZERO;
    if !fits {
        return None;
    }

    Some(keccak_words(&[key, base_slot]))
}

/// Calculates the slot for the value reached by indexing the (possibly
/// nested) mapping of type `typ` at `base_slot` successively by `keys`.
///
/// Returns [`None`] if there are more keys than levels of mapping, or if any
/// key cannot be encoded.
#[must_use]
pub fn calculate_nested_mapping_slot(
    keys: &[U256],
    base_slot: U256,
    typ: &SolidityType,
) -> Option<U256> {
    let mut slot = base_slot;
    let mut current = typ;

    for key in keys {
        let SolidityType::Mapping {
            key_type,
            value_type,
        } = current
        else {
            return None;
        };
        slot = calculate_mapping_slot(*key, slot, key_type)?;
        current = value_type;
    }

    Some(slot)
}

/// Calculates the slot holding element `index` of a dynamic array whose
/// length is stored at `base_slot`.
///
/// Slot arithmetic wraps at 2^256, as it does on the EVM.
#[must_use]
pub fn calculate_array_element_slot(index: U256, base_slot: U256) -> U256 {
    keccak_words(&[base_slot]).wrapping_add(index)
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::layout::{
        calculate_array_element_slot,
        calculate_layout,
        calculate_mapping_slot,
        calculate_nested_mapping_slot,
        types::SolidityType,
        StateVariable,
    };

    fn word(hex: &str) -> U256 {
        U256::from_str_radix(hex, 16).expect("Test vector was not valid hex")
    }

    #[test]
    fn constants_and_immutables_take_no_slots() {
        let variables = vec![
            StateVariable::new("FEE", "uint256").constant(),
            StateVariable::new("token", "address").immutable(),
            StateVariable::new("NAME", "string").constant(),
        ];
        let layout = calculate_layout(&variables, U256::ZERO);
        assert!(layout.is_empty());
    }

    #[test]
    fn packs_address_and_bool_into_one_slot() {
        let variables = vec![
            StateVariable::new("owner", "address"),
            StateVariable::new("paused", "bool"),
        ];
        let layout = calculate_layout(&variables, U256::ZERO);

        let owner = layout.get("owner").unwrap();
        assert_eq!((owner.slot.value(), owner.offset, owner.size), (U256::ZERO, 0, 20));

        let paused = layout.get("paused").unwrap();
        assert_eq!((paused.slot.value(), paused.offset, paused.size), (U256::ZERO, 20, 1));
    }

    #[test]
    fn overflowing_variable_starts_next_slot() {
        let variables = vec![
            StateVariable::new("a", "uint128"),
            StateVariable::new("b", "uint128"),
            StateVariable::new("c", "uint8"),
        ];
        let layout = calculate_layout(&variables, U256::ZERO);

        let placed: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|n| {
                let info = layout.get(n).unwrap();
                (info.slot.value().as_u64(), info.offset, info.size)
            })
            .collect();
        assert_eq!(placed, vec![(0, 0, 16), (0, 16, 16), (1, 0, 1)]);
    }

    #[test]
    fn mappings_and_arrays_never_pack() {
        let variables = vec![
            StateVariable::new("flag", "bool"),
            StateVariable::new("balances", "mapping(address => uint256)"),
            StateVariable::new("small", "uint8"),
            StateVariable::new("holders", "address[]"),
            StateVariable::new("tail", "uint8"),
        ];
        let layout = calculate_layout(&variables, U256::ZERO);

        let balances = layout.get("balances").unwrap();
        assert_eq!((balances.slot.value().as_u64(), balances.offset), (1, 0));
        assert!(balances.is_mapping);
        assert_eq!(balances.mapping_key_type, Some(SolidityType::Address));

        assert_eq!(layout.get("small").unwrap().slot.value().as_u64(), 2);

        let holders = layout.get("holders").unwrap();
        assert_eq!((holders.slot.value().as_u64(), holders.offset), (3, 0));
        assert!(holders.is_array);
        assert_eq!(holders.array_element_type, Some(SolidityType::Address));

        assert_eq!(layout.get("tail").unwrap().slot.value().as_u64(), 4);
        assert_eq!(layout.variables_at(2_usize).len(), 1);
    }

    #[test]
    fn unknown_types_assume_a_full_word() {
        let variables = vec![
            StateVariable::new("x", "uint8"),
            StateVariable::new("pos", "Position"),
            StateVariable::new("y", "uint8"),
        ];
        let layout = calculate_layout(&variables, U256::ZERO);
        assert_eq!(layout.get("pos").unwrap().slot.value().as_u64(), 1);
        assert_eq!(layout.get("pos").unwrap().size, 32);
        assert_eq!(layout.get("y").unwrap().slot.value().as_u64(), 2);
    }

    #[test]
    fn respects_start_slot() {
        let variables = vec![StateVariable::new("x", "uint256")];
        let layout = calculate_layout(&variables, U256::new(5));
        assert_eq!(layout.primary_at(5_usize).unwrap().name, "x");
    }

    #[test]
    fn computes_known_mapping_slots() {
        let usdt = word("dAC17F958D2ee523a2206206994597C13D831ec7");

        let slot = calculate_mapping_slot(usdt, U256::ONE, &SolidityType::Address);
        assert_eq!(
            slot,
            Some(word("591a3b2777bc31889c69fb5cad740ac457874aa5ce74c0ad08912df8ad7d112c"))
        );

        let slot = calculate_mapping_slot(U256::new(7), U256::new(3), &SolidityType::UInt { size: 256 });
        assert_eq!(
            slot,
            Some(word("f2c49132ed1cee2a7e75bde50d332a2f81f1d01e5456d8a19d1df09bd561dbd2"))
        );
    }

    #[test]
    fn mapping_slots_are_deterministic_and_depend_on_base() {
        let key = U256::new(0xdead);
        let first = calculate_mapping_slot(key, U256::new(2), &SolidityType::Address);
        let second = calculate_mapping_slot(key, U256::new(2), &SolidityType::Address);
        let other = calculate_mapping_slot(key, U256::new(3), &SolidityType::Address);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn rejects_unsupported_or_oversized_keys() {
        assert_eq!(calculate_mapping_slot(U256::ONE, U256::ZERO, &SolidityType::String), None);
        assert_eq!(calculate_mapping_slot(U256::MAX, U256::ZERO, &SolidityType::Address), None);
        assert_eq!(
            calculate_mapping_slot(U256::new(256), U256::ZERO, &SolidityType::UInt { size: 8 }),
            None
        );
    }

    #[test]
    fn resolves_nested_mappings_recursively() {
        let owner = word("dAC17F958D2ee523a2206206994597C13D831ec7");
        let spender = word("dEaD");
        let typ = SolidityType::parse("mapping(address => mapping(address => uint256))");

        let nested = calculate_nested_mapping_slot(&[owner, spender], U256::new(2), &typ);
        let manual = calculate_mapping_slot(owner, U256::new(2), &SolidityType::Address)
            .and_then(|inner| calculate_mapping_slot(spender, inner, &SolidityType::Address));

        assert_eq!(nested, manual);
        assert_eq!(
            nested,
            Some(word("2c19035ebed1b396575cec0c20668676d213c7aa73df712c4aaec2993f6a3ed1"))
        );
        assert_eq!(
            calculate_nested_mapping_slot(&[owner, spender, spender], U256::new(2), &typ),
            None
        );
    }

    #[test]
    fn computes_array_element_slots() {
        let slot = calculate_array_element_slot(U256::new(2), U256::new(5));
        assert_eq!(
            slot,
            word("36b6384b5eca791c62761152d0c79bb0604c104a5fb6f4eb0703f3154bb3db2")
        );
    }
}

//! This module contains the definition of the Solidity types that the layout
//! engine is capable of placing in storage.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::constant::{ADDRESS_WIDTH_BYTES, BOOL_WIDTH_BYTES, BYTE_SIZE_BITS, WORD_SIZE_BITS};

/// Solidity types as written in declarations.
///
/// Parsing a type string never fails. Anything that is not recognised (struct
/// names, user-defined value types, malformed text) becomes
/// [`Self::Unknown`], which the layout engine treats as occupying a full
/// word.
///
/// # Invariants
///
/// - `UInt` and `Int` sizes are in bits, with `8 <= size <= 256 && size % 8 ==
///   0`.
/// - `Bytes` lengths are in bytes, with `0 < length <= 32`.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum SolidityType {
    /// Unsigned integers of a given `size` in bits.
    UInt { size: usize },

    /// Signed (two's complement) integers of a given `size` in bits.
    Int { size: usize },

    /// Addresses, including contract and interface types.
    Address,

    /// Booleans.
    Bool,

    /// Byte arrays of a fixed `length`.
    Bytes { length: usize },

    /// A dynamically-sized byte array.
    DynBytes,

    /// A dynamically-sized UTF-8 string.
    String,

    /// A mapping from `key_type` to `value_type`.
    Mapping {
        key_type:   Box<SolidityType>,
        value_type: Box<SolidityType>,
    },

    /// A dynamically-sized array of elements of type `tp`.
    DynArray { tp: Box<SolidityType> },

    /// A fixed-`size` array of elements of type `tp`.
    Array { size: usize, tp: Box<SolidityType> },

    /// A type that could not be recognised, carrying its source text.
    Unknown { name: String },
}

impl SolidityType {
    /// Parses the type written as `text`.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();

        if let Some(inner) = text
            .strip_prefix("mapping")
            .map(str::trim_start)
            .and_then(|rest| rest.strip_prefix('('))
            .and_then(|rest| rest.strip_suffix(')'))
        {
            return match split_top_level_arrow(inner) {
                Some((key, value)) => Self::Mapping {
                    key_type:   Box::new(Self::parse(key)),
                    value_type: Box::new(Self::parse(value)),
                },
                None => Self::unknown(text),
            };
        }

        if let Some(without_close) = text.strip_suffix(']') {
            return match without_close.rfind('[') {
                Some(open) => {
                    let element = Self::parse(&without_close[..open]);
                    let size_text = without_close[open + 1..].trim();
                    if size_text.is_empty() {
                        Self::DynArray {
                            tp: Box::new(element),
                        }
                    } else {
                        match size_text.parse::<usize>() {
                            Ok(size) => Self::Array {
                                size,
                                tp: Box::new(element),
                            },
                            Err(_) => Self::unknown(text),
                        }
                    }
                }
                None => Self::unknown(text),
            };
        }

        let mut words = text.split_whitespace();
        let head = words.next().unwrap_or_default();
        match head {
            "address" => Self::Address,
            "contract" | "interface" => Self::Address,
            "enum" => Self::UInt { size: 8 },
            "bool" => Self::Bool,
            "string" => Self::String,
            "bytes" => Self::DynBytes,
            "byte" => Self::Bytes { length: 1 },
            "uint" => Self::UInt { size: WORD_SIZE_BITS },
            "int" => Self::Int { size: WORD_SIZE_BITS },
            _ => Self::parse_sized(head).unwrap_or_else(|| Self::unknown(text)),
        }
    }

    /// Parses the sized elementary types `uintN`, `intN` and `bytesN`.
    fn parse_sized(head: &str) -> Option<Self> {
        let valid_bits = |bits: usize| bits > 0 && bits <= WORD_SIZE_BITS && bits % BYTE_SIZE_BITS == 0;

        if let Some(bits) = head.strip_prefix("uint") {
            let size = bits.parse::<usize>().ok().filter(|b| valid_bits(*b))?;
            Some(Self::UInt { size })
        } else if let Some(bits) = head.strip_prefix("int") {
            let size = bits.parse::<usize>().ok().filter(|b| valid_bits(*b))?;
            Some(Self::Int { size })
        } else if let Some(length) = head.strip_prefix("bytes") {
            let length = length.parse::<usize>().ok().filter(|l| *l > 0 && *l <= 32)?;
            Some(Self::Bytes { length })
        } else {
            None
        }
    }

    fn unknown(text: &str) -> Self {
        Self::Unknown {
            name: text.to_string(),
        }
    }

    /// Gets the number of bytes that a value of this type occupies when
    /// packed into storage, if the type has a fixed in-slot size.
    ///
    /// Returns [`None`] for types that do not pack (strings, dynamic bytes,
    /// collections, and unknown types).
    #[must_use]
    pub fn packed_size_bytes(&self) -> Option<usize> {
        match self {
            Self::UInt { size } | Self::Int { size } => Some(size / BYTE_SIZE_BITS),
            Self::Address => Some(ADDRESS_WIDTH_BYTES),
            Self::Bool => Some(BOOL_WIDTH_BYTES),
            Self::Bytes { length } => Some(*length),
            Self::DynBytes
            | Self::String
            | Self::Mapping { .. }
            | Self::DynArray { .. }
            | Self::Array { .. }
            | Self::Unknown { .. } => None,
        }
    }

    /// Checks if the type is a mapping.
    #[must_use]
    pub fn is_mapping(&self) -> bool {
        matches!(self, Self::Mapping { .. })
    }

    /// Checks if the type is a dynamically-sized array.
    #[must_use]
    pub fn is_dyn_array(&self) -> bool {
        matches!(self, Self::DynArray { .. })
    }

    /// Checks if the type is an unsigned integer of any width.
    #[must_use]
    pub fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt { .. })
    }

    /// Checks if the type is an integer of any width or signedness.
    #[must_use]
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::UInt { .. } | Self::Int { .. })
    }

    /// Gets the key type if the type is a mapping.
    #[must_use]
    pub fn mapping_key(&self) -> Option<&SolidityType> {
        match self {
            Self::Mapping { key_type, .. } => Some(key_type),
            _ => None,
        }
    }

    /// Gets the value type if the type is a mapping.
    #[must_use]
    pub fn mapping_value(&self) -> Option<&SolidityType> {
        match self {
            Self::Mapping { value_type, .. } => Some(value_type),
            _ => None,
        }
    }

    /// Gets the element type if the type is an array of either kind.
    #[must_use]
    pub fn element_type(&self) -> Option<&SolidityType> {
        match self {
            Self::DynArray { tp } | Self::Array { tp, .. } => Some(tp),
            _ => None,
        }
    }

    /// Checks if this type is `mapping(address => uintN)`.
    #[must_use]
    pub fn is_address_to_uint_mapping(&self) -> bool {
        match self {
            Self::Mapping {
                key_type,
                value_type,
            } => **key_type == Self::Address && value_type.is_unsigned(),
            _ => false,
        }
    }

    /// Checks if this type is `mapping(address => mapping(address => uintN))`.
    #[must_use]
    pub fn is_nested_address_to_uint_mapping(&self) -> bool {
        match self {
            Self::Mapping {
                key_type,
                value_type,
            } => **key_type == Self::Address && value_type.is_address_to_uint_mapping(),
            _ => false,
        }
    }
}

/// Splits the body of a mapping type at its top-level `=>`, skipping any
/// arrows nested inside the parentheses of inner mappings.
fn split_top_level_arrow(body: &str) -> Option<(&str, &str)> {
    let mut depth = 0_i32;
    let bytes = body.as_bytes();
    for i in 0..bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth -= 1,
            b'=' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
                return Some((&body[..i], &body[i + 2..]));
            }
            _ => (),
        }
    }
    None
}

impl Display for SolidityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UInt { size } => write!(f, "uint{size}"),
            Self::Int { size } => write!(f, "int{size}"),
            Self::Address => write!(f, "address"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes { length } => write!(f, "bytes{length}"),
            Self::DynBytes => write!(f, "bytes"),
            Self::String => write!(f, "string"),
            Self::Mapping {
                key_type,
                value_type,
            } => write!(f, "mapping({key_type} => {value_type})"),
            Self::DynArray { tp } => write!(f, "{tp}[]"),
            Self::Array { size, tp } => write!(f, "{tp}[{size}]"),
            Self::Unknown { name } => write!(f, "{name}"),
        }
    }
}

impl From<String> for SolidityType {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for SolidityType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<SolidityType> for String {
    fn from(value: SolidityType) -> Self {
        value.to_string()
    }
}

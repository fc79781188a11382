//! This module contains a precomputed table of the keccak256 hashes of the
//! first [`HASHED_SLOT_COUNT`] storage slot indices.
//!
//! The data region of a dynamic array declared at slot `n` begins at
//! `keccak256(n)`, so a raw storage key found in this table can be attributed
//! to the array rooted at the corresponding small slot.

use std::sync::LazyLock;

use bimap::BiMap;
use ethnum::U256;

use crate::{constant::HASHED_SLOT_COUNT, layout::keccak_words};

/// The process-wide table of slot hashes, built on first use.
static SLOT_HASHES: LazyLock<SlotHashes> = LazyLock::new(|| SlotHashes::new(HASHED_SLOT_COUNT));

/// A bidirectional mapping between small slot indices and their hashes.
#[derive(Clone, Debug)]
pub struct SlotHashes {
    hashes: BiMap<U256, usize>,
}

impl SlotHashes {
    /// Generates the slot hashes for the first `count` slots, assuming
    /// big-endian (network) byte ordering.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut hashes = BiMap::new();

        for slot_ix in 0..count {
            let key = keccak_words(&[U256::from(slot_ix as u64)]);
            hashes.insert(key, slot_ix);
        }

        Self { hashes }
    }

    /// Gets the shared table covering the first [`HASHED_SLOT_COUNT`] slots.
    #[must_use]
    pub fn shared() -> &'static Self {
        &SLOT_HASHES
    }

    /// Gets the slot index whose hash is `key`, if it is in the table.
    #[must_use]
    pub fn base_slot_of(&self, key: U256) -> Option<usize> {
        self.hashes.get_by_left(&key).copied()
    }

    /// Gets the hash of the slot index `slot`, if it is in the table.
    #[must_use]
    pub fn hash_of(&self, slot: usize) -> Option<U256> {
        self.hashes.get_by_right(&slot).copied()
    }

    /// Gets the number of hashes in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    /// Checks if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod test {
    use ethnum::U256;

    use crate::layout::hashed::SlotHashes;

    #[test]
    #[allow(clippy::needless_range_loop)] // Clearer way to write it for the test
    fn computes_first_five_hashes_correctly() {
        let hashes = [
            "290decd9548b62a8d60345a988386fc84ba6bc95484008f6362f93160ef3e563",
            "b10e2d527612073b26eecdfd717e6a320cf44b4afac2b0732d9fcbe2b7fa0cf6",
            "405787fa12a823e0f2b7631cc41b3ba8828b3321ca811111fa75cd3aa3bb5ace",
            "c2575a0e9e593c00f959f8c92f12db2869c3395a3b0502d05e2516446f71f85b",
            "8a35acfbc15ff81a39ae7d344fd709f28e8600b4aa8c65c6b64bfe7fe36bd19b",
        ];

        let table = SlotHashes::new(5);
        assert_eq!(table.len(), 5);

        for index in 0..5 {
            let expected = util::hash_from_be_hex_string(hashes[index]);
            assert_eq!(table.hash_of(index), Some(expected));
            assert_eq!(table.base_slot_of(expected), Some(index));
        }
    }

    #[test]
    fn shared_table_recognises_array_data_slots() {
        let key = util::hash_from_be_hex_string(
            "c2575a0e9e593c00f959f8c92f12db2869c3395a3b0502d05e2516446f71f85b",
        );
        assert_eq!(SlotHashes::shared().base_slot_of(key), Some(3));
        assert_eq!(SlotHashes::shared().base_slot_of(key + U256::ONE), None);
    }

    mod util {
        use ethnum::U256;

        pub fn hash_from_be_hex_string(string: impl Into<String>) -> U256 {
            let bytes = hex::decode(string.into()).expect("Hash was not valid as text");
            assert_eq!(bytes.len(), 32);
            U256::from_be_bytes(bytes.as_slice().try_into().expect("Wrong number of decoded bytes"))
        }
    }
}

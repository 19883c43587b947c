//! Sparse in-memory address space

use std::cell::Cell;
use std::collections::BTreeMap;

use super::{decode_pointer, MemoryReader};
use crate::domain::{Address, InspectError};

/// Byte regions keyed by start address
///
/// Regions never overlap: writing a pointer either extends nothing or lands
/// fully inside an existing region.
#[derive(Debug, Clone)]
pub struct MemoryImage {
    regions: BTreeMap<u64, Vec<u8>>,
    pointer_size: u8,
    little_endian: bool,
    reads: Cell<usize>,
}

impl MemoryImage {
    /// Empty little-endian image with the given pointer width
    ///
    /// # Panics
    /// Panics if `pointer_size` is not 4 or 8.
    #[must_use]
    pub fn new(pointer_size: u8) -> Self {
        assert!(pointer_size == 4 || pointer_size == 8, "pointer size must be 4 or 8");
        Self { regions: BTreeMap::new(), pointer_size, little_endian: true, reads: Cell::new(0) }
    }

    /// Switch the image to big-endian pointer encoding
    #[must_use]
    pub fn big_endian(mut self) -> Self {
        self.little_endian = false;
        self
    }

    /// Map `bytes` at `start`, replacing any region that starts at the same address
    pub fn map(&mut self, start: Address, bytes: Vec<u8>) {
        self.regions.insert(start.0, bytes);
    }

    /// Store a pointer at `address`
    ///
    /// Writes into the region containing `address` when there is one,
    /// otherwise maps a new pointer-sized region.
    pub fn write_pointer(&mut self, address: Address, value: Address) {
        let encoded = self.encode(value.0);
        if let Some((start, bytes)) = self.regions.range_mut(..=address.0).next_back() {
            let offset = usize::try_from(address.0 - *start).unwrap_or(usize::MAX);
            if let Some(dst) = offset
                .checked_add(encoded.len())
                .and_then(|end| bytes.get_mut(offset..end))
            {
                dst.copy_from_slice(&encoded);
                return;
            }
        }
        self.regions.insert(address.0, encoded);
    }

    /// Store consecutive pointers starting at `address` (a vtable, for instance)
    pub fn write_pointers(&mut self, address: Address, values: &[Address]) {
        let mut bytes = Vec::with_capacity(values.len() * usize::from(self.pointer_size));
        for value in values {
            bytes.extend(self.encode(value.0));
        }
        self.map(address, bytes);
    }

    /// Remove the region starting at `start`, simulating an unmapped page
    pub fn unmap(&mut self, start: Address) -> Option<Vec<u8>> {
        self.regions.remove(&start.0)
    }

    /// Number of `read_pointer` calls served so far, failed ones included
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    fn encode(&self, value: u64) -> Vec<u8> {
        match (self.pointer_size, self.little_endian) {
            #[allow(clippy::cast_possible_truncation)]
            (4, true) => (value as u32).to_le_bytes().to_vec(),
            #[allow(clippy::cast_possible_truncation)]
            (4, false) => (value as u32).to_be_bytes().to_vec(),
            (_, true) => value.to_le_bytes().to_vec(),
            (_, false) => value.to_be_bytes().to_vec(),
        }
    }
}

impl MemoryReader for MemoryImage {
    fn address_byte_size(&self) -> u8 {
        self.pointer_size
    }

    fn read_pointer(&self, address: Address) -> Result<Address, InspectError> {
        self.reads.set(self.reads.get() + 1);
        let size = usize::from(self.pointer_size);
        let unmapped =
            || InspectError::MemoryAccess { address, reason: "address not mapped".to_string() };

        let (start, bytes) = self.regions.range(..=address.0).next_back().ok_or_else(unmapped)?;
        let offset = usize::try_from(address.0 - start).map_err(|_| unmapped())?;
        let word = offset
            .checked_add(size)
            .and_then(|end| bytes.get(offset..end))
            .ok_or_else(unmapped)?;
        Ok(Address(decode_pointer(word, self.little_endian)))
    }
}

//! # Debuggee Memory Access
//!
//! The vtable engine never touches a process directly. It reads
//! pointer-sized words through the [`MemoryReader`] trait, which has two
//! implementations:
//!
//! - [`ProcessMemory`]: positional reads from `/proc/<pid>/mem` of a stopped
//!   process. Pointer width and byte order come from the ELF header of
//!   `/proc/<pid>/exe`.
//! - [`MemoryImage`]: a sparse in-memory copy of an address space, used for
//!   offline snapshots and tests.
//!
//! Reads are only meaningful while the debuggee is stopped (see
//! [`crate::stop_session::StopSession`]). Nothing read here is cached: every call
//! goes to the target.

pub mod image;
pub mod process;

pub use image::MemoryImage;
pub use process::ProcessMemory;

use crate::domain::{Address, InspectError};

/// Pointer-sized reads against a target address space
pub trait MemoryReader {
    /// Pointer width of the target in bytes (4 or 8)
    fn address_byte_size(&self) -> u8;

    /// Read one pointer-sized word at `address`
    ///
    /// # Errors
    /// Returns [`InspectError::MemoryAccess`] if any byte of the word cannot be
    /// read. A failed read is never reported as a zero value.
    fn read_pointer(&self, address: Address) -> Result<Address, InspectError>;
}

impl<T: MemoryReader + ?Sized> MemoryReader for &T {
    fn address_byte_size(&self) -> u8 {
        (**self).address_byte_size()
    }

    fn read_pointer(&self, address: Address) -> Result<Address, InspectError> {
        (**self).read_pointer(address)
    }
}

/// Decode a 4- or 8-byte pointer in the target's byte order
pub(crate) fn decode_pointer(bytes: &[u8], little_endian: bool) -> u64 {
    match (bytes.len(), little_endian) {
        (4, true) => u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        (4, false) => u64::from(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
        (_, true) => {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            u64::from_le_bytes(word)
        }
        (_, false) => {
            let mut word = [0u8; 8];
            word.copy_from_slice(&bytes[..8]);
            u64::from_be_bytes(word)
        }
    }
}

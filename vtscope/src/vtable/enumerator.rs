//! Vtable slot enumeration

use log::debug;
use thiserror::Error;

use super::model::{RuntimeType, VtableEntry};
use crate::domain::{Address, InspectError};
use crate::memory::MemoryReader;

/// A slot read failed part-way through the vtable
///
/// `entries` holds every slot read before the failing one, in order. The
/// caller decides whether a partial vtable is still useful.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{error} ({} entries read before the failure)", .entries.len())]
pub struct PartialEnumeration {
    pub entries: Vec<VtableEntry>,
    #[source]
    pub error: InspectError,
}

/// Read the function pointers of a vtable in memory order
///
/// Slot `i` lives at `vtable_address + i * pointer_size`. The two Itanium
/// destructor slots (complete and deleting) are ordinary entries.
///
/// # Errors
/// Returns a [`PartialEnumeration`] whose error is
/// [`InspectError::VtableEntryRead`], tagged with the failing index.
pub fn enumerate<M: MemoryReader + ?Sized>(
    memory: &M,
    vtable_address: Address,
    runtime_type: &RuntimeType,
) -> Result<Vec<VtableEntry>, PartialEnumeration> {
    let pointer_size = u64::from(memory.address_byte_size());
    let mut entries = Vec::with_capacity(runtime_type.slot_count);

    for index in 0..runtime_type.slot_count {
        let slot = (index as u64)
            .checked_mul(pointer_size)
            .and_then(|offset| vtable_address.offset(offset));
        let Some(slot) = slot else {
            let error = InspectError::VtableEntryRead {
                index,
                address: vtable_address,
                reason: "slot address overflows the address space".to_string(),
            };
            return Err(PartialEnumeration { entries, error });
        };

        match memory.read_pointer(slot) {
            Ok(raw_value) => entries.push(VtableEntry::unresolved(index, raw_value)),
            Err(e) => {
                let reason = match e {
                    InspectError::MemoryAccess { reason, .. } => reason,
                    other => other.to_string(),
                };
                let error = InspectError::VtableEntryRead { index, address: slot, reason };
                return Err(PartialEnumeration { entries, error });
            }
        }
    }

    debug!(
        "Read {} slots of vtable for {} at {}",
        entries.len(),
        runtime_type.name,
        vtable_address
    );
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;

    fn rectangle(slots: usize) -> RuntimeType {
        RuntimeType { name: "Rectangle".to_string(), slot_count: slots }
    }

    #[test]
    fn test_entries_in_memory_order() {
        let mut image = MemoryImage::new(8);
        let slots = [Address(0x1a10), Address(0x1a30), Address(0x1a50), Address(0x1a70)];
        image.write_pointers(Address(0x3d10), &slots);

        let entries = enumerate(&image, Address(0x3d10), &rectangle(4)).unwrap();
        assert_eq!(entries.len(), 4);
        for (i, entry) in entries.iter().enumerate() {
            assert_eq!(entry.index, i);
            assert_eq!(entry.raw_value, slots[i]);
        }
    }

    #[test]
    fn test_32_bit_stride() {
        let mut image = MemoryImage::new(4);
        image.write_pointers(Address(0x100), &[Address(0x10), Address(0x20)]);

        let entries = enumerate(&image, Address(0x100), &rectangle(2)).unwrap();
        assert_eq!(entries[1].raw_value, Address(0x20));
    }

    #[test]
    fn test_partial_failure_keeps_earlier_entries() {
        let mut image = MemoryImage::new(8);
        // Only three of four slots are mapped
        image.write_pointers(Address(0x3d10), &[Address(1), Address(2), Address(3)]);

        let partial = enumerate(&image, Address(0x3d10), &rectangle(4)).unwrap_err();
        assert_eq!(partial.entries.len(), 3);
        assert_eq!(partial.entries[2].raw_value, Address(3));
        match partial.error {
            InspectError::VtableEntryRead { index, address, .. } => {
                assert_eq!(index, 3);
                assert_eq!(address, Address(0x3d28));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_runtime_type() {
        let image = MemoryImage::new(8);
        let entries = enumerate(&image, Address(0x3d10), &rectangle(0)).unwrap();
        assert!(entries.is_empty());
        assert_eq!(image.read_count(), 0);
    }
}

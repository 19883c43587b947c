//! Vtable pointer lookup

use log::debug;

use super::model::TargetObject;
use crate::domain::{Address, InspectError};
use crate::memory::MemoryReader;

/// Address of the object's vtable, or `None` for non-polymorphic types
///
/// Non-polymorphic objects short-circuit: no memory is read for them.
///
/// # Errors
/// Returns [`InspectError::MemoryAccess`] if the object's first word cannot
/// be read.
pub fn locate<M: MemoryReader + ?Sized>(
    memory: &M,
    object: &TargetObject,
) -> Result<Option<Address>, InspectError> {
    if !object.static_type.polymorphic {
        debug!("{} is not polymorphic, no vtable at {}", object.static_type.name, object.address);
        return Ok(None);
    }

    // Itanium ABI: the vtable pointer is the first word of the object
    let vtable = memory.read_pointer(object.address)?;
    debug!("{} at {} has vtable pointer {}", object.static_type.name, object.address, vtable);
    Ok(Some(vtable))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryImage;
    use crate::vtable::TypeDescriptor;

    #[test]
    fn test_locate_reads_first_word() {
        let mut image = MemoryImage::new(8);
        image.write_pointers(Address(0x8000), &[Address(0x3d10), Address(42)]);

        let obj = TargetObject::new(Address(0x8000), TypeDescriptor::polymorphic("Shape"));
        assert_eq!(locate(&image, &obj).unwrap(), Some(Address(0x3d10)));
    }

    #[test]
    fn test_non_polymorphic_reads_nothing() {
        let image = MemoryImage::new(8);
        let obj = TargetObject::new(Address(0x8000), TypeDescriptor::plain("NotSubclass"));

        assert_eq!(locate(&image, &obj).unwrap(), None);
        assert_eq!(image.read_count(), 0);
    }

    #[test]
    fn test_unreadable_object_is_an_error() {
        let image = MemoryImage::new(8);
        let obj = TargetObject::new(Address(0xdead_0000), TypeDescriptor::polymorphic("Shape"));

        let err = locate(&image, &obj).unwrap_err();
        assert!(matches!(err, InspectError::MemoryAccess { address: Address(0xdead_0000), .. }));
    }
}

//! Objects, runtime types and vtable snapshots

use serde::Serialize;

use crate::domain::{Address, InspectError};
use crate::memory::MemoryReader;
use crate::symbolization::{DataSymbol, ResolvedFunction};

/// Demangled prefix of every Itanium vtable symbol (`_ZTV...`)
pub const VTABLE_PREFIX: &str = "vtable for ";

/// Static (declared) type of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeDescriptor {
    pub name: String,
    /// Has virtual functions of its own or through a base
    pub polymorphic: bool,
}

impl TypeDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, polymorphic: bool) -> Self {
        Self { name: name.into(), polymorphic }
    }

    #[must_use]
    pub fn polymorphic(name: impl Into<String>) -> Self {
        Self::new(name, true)
    }

    #[must_use]
    pub fn plain(name: impl Into<String>) -> Self {
        Self::new(name, false)
    }
}

/// A live object in the debuggee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetObject {
    pub address: Address,
    pub static_type: TypeDescriptor,
}

impl TargetObject {
    #[must_use]
    pub fn new(address: Address, static_type: TypeDescriptor) -> Self {
        Self { address, static_type }
    }

    /// The object a pointer variable currently points to
    ///
    /// The pointer is read now. Call this again after every stop: a base
    /// class pointer can point somewhere else once the debuggee has run.
    ///
    /// # Errors
    /// Returns [`InspectError::MemoryAccess`] if the pointer cannot be read and
    /// [`InspectError::NullPointer`] if it is null.
    pub fn from_pointer<M: MemoryReader + ?Sized>(
        memory: &M,
        pointer_address: Address,
        pointee_type: TypeDescriptor,
    ) -> Result<Self, InspectError> {
        let address = memory.read_pointer(pointer_address)?;
        if address.is_null() {
            return Err(InspectError::NullPointer { address: pointer_address });
        }
        Ok(Self::new(address, pointee_type))
    }
}

/// Most-derived type of an object, as named by its vtable symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeType {
    pub name: String,
    /// Function-pointer slots from the vtable address to the end of the symbol
    pub slot_count: usize,
}

impl RuntimeType {
    /// Derive the runtime type from the symbol containing `vtable_address`
    ///
    /// Itanium vtable symbols start with the offset-to-top and typeinfo
    /// words; the address stored in objects points past them, at slot 0.
    ///
    /// # Errors
    /// Returns [`InspectError::NotAVtable`] if the symbol is not a vtable.
    pub fn from_vtable_symbol(
        symbol: &DataSymbol,
        vtable_address: Address,
        pointer_size: u8,
    ) -> Result<Self, InspectError> {
        let Some(name) = symbol.name.strip_prefix(VTABLE_PREFIX) else {
            return Err(InspectError::NotAVtable {
                address: vtable_address,
                symbol: symbol.name.clone(),
            });
        };
        let remaining = symbol.end().0.saturating_sub(vtable_address.0);
        let slot_count = usize::try_from(remaining / u64::from(pointer_size)).unwrap_or(0);
        Ok(Self { name: name.to_string(), slot_count })
    }
}

/// One function-pointer slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VtableEntry {
    /// 0-based slot number, memory order
    pub index: usize,
    /// Function pointer stored in the slot
    pub raw_value: Address,
    pub summary: String,
    /// Absent when the pointer targets code without symbols
    pub function: Option<ResolvedFunction>,
}

impl VtableEntry {
    /// Entry as read from memory, before symbolization
    #[must_use]
    pub fn unresolved(index: usize, raw_value: Address) -> Self {
        Self { index, raw_value, summary: format!("[{index}] = {raw_value}"), function: None }
    }

    /// Rendered type of the resolved function, e.g. `double ()`
    #[must_use]
    pub fn function_type(&self) -> Option<&str> {
        self.function.as_ref().and_then(|f| f.function_type.as_deref())
    }
}

/// Snapshot of one object's vtable at one stop of the debuggee
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vtable {
    /// Address stored in the object's first word
    pub address: Address,
    pub runtime_type: RuntimeType,
    pub pointer_size: u8,
    pub entries: Vec<VtableEntry>,
}

impl Vtable {
    /// `vtable for <RuntimeTypeName>`
    #[must_use]
    pub fn name(&self) -> String {
        format!("{VTABLE_PREFIX}{}", self.runtime_type.name)
    }

    /// Same as [`Vtable::name`]; vtables have no separate type name
    #[must_use]
    pub fn type_name(&self) -> String {
        self.name()
    }

    /// Address stored in the object's first word
    #[must_use]
    pub fn address(&self) -> Address {
        self.address
    }

    /// Entries in memory order
    #[must_use]
    pub fn entries(&self) -> &[VtableEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

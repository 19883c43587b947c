//! Inspection requests
//!
//! Every request walks the same state machine:
//!
//! ```text
//!               static type not polymorphic
//!  Unresolved ────────────────────────────────▶ Absent
//!      │
//!      │ first word read, vtable symbol found, slots read
//!      ▼
//!  Resolved(Vtable)
//! ```
//!
//! `Absent` and `Resolved` are terminal. A hard error leaves the request in
//! `Unresolved` and is returned to the caller. Nothing is reused between
//! requests: after the debuggee resumes and stops again, a new request reads
//! everything again, so a base class pointer that now points at another
//! subclass reports the new runtime type.

use log::{debug, info};

use super::enumerator::{self, PartialEnumeration};
use super::model::{RuntimeType, TargetObject, Vtable, VtableEntry};
use super::{locator, presenter};
use crate::domain::{Address, InspectError};
use crate::memory::MemoryReader;
use crate::symbolization::SymbolResolver;

/// Progress of one inspection request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VtableState {
    Unresolved,
    /// The static type has no vtable
    Absent,
    Resolved(Vtable),
}

impl VtableState {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    #[must_use]
    pub fn vtable(&self) -> Option<&Vtable> {
        match self {
            Self::Resolved(vtable) => Some(vtable),
            _ => None,
        }
    }
}

/// One request for one object's vtable
#[derive(Debug, Clone)]
pub struct VtableRequest {
    object: TargetObject,
    state: VtableState,
}

impl VtableRequest {
    #[must_use]
    pub fn new(object: TargetObject) -> Self {
        Self { object, state: VtableState::Unresolved }
    }

    #[must_use]
    pub fn object(&self) -> &TargetObject {
        &self.object
    }

    #[must_use]
    pub fn state(&self) -> &VtableState {
        &self.state
    }

    /// Drive the request to a terminal state
    ///
    /// A request that already finished returns its state without reading
    /// memory again.
    ///
    /// # Errors
    /// Returns the first hard error; the request stays `Unresolved`.
    pub fn run<M, S>(
        &mut self,
        inspector: &VtableInspector<M, S>,
    ) -> Result<&VtableState, InspectError>
    where
        M: MemoryReader,
        S: SymbolResolver,
    {
        if !self.state.is_terminal() {
            self.state = inspector.resolve(&self.object)?;
        }
        Ok(&self.state)
    }

    #[must_use]
    pub fn into_state(self) -> VtableState {
        self.state
    }
}

/// Vtable inspection over a memory reader and a symbol resolver
pub struct VtableInspector<M, S> {
    memory: M,
    symbols: S,
}

impl<M: MemoryReader, S: SymbolResolver> VtableInspector<M, S> {
    pub fn new(memory: M, symbols: S) -> Self {
        Self { memory, symbols }
    }

    pub fn memory(&self) -> &M {
        &self.memory
    }

    pub fn symbols(&self) -> &S {
        &self.symbols
    }

    /// Vtable of `object` at this stop, or `None` if its type has none
    ///
    /// # Errors
    /// Returns [`InspectError::MemoryAccess`] or
    /// [`InspectError::VtableEntryRead`] when the debuggee's memory cannot be
    /// read, and [`InspectError::UnknownVtable`] or
    /// [`InspectError::NotAVtable`] when the object's first word is not a
    /// vtable pointer.
    pub fn get_vtable(&self, object: &TargetObject) -> Result<Option<Vtable>, InspectError> {
        let mut request = VtableRequest::new(object.clone());
        request.run(self)?;
        match request.into_state() {
            VtableState::Resolved(vtable) => Ok(Some(vtable)),
            _ => Ok(None),
        }
    }

    /// See [`locator::locate`]
    ///
    /// # Errors
    /// Returns [`InspectError::MemoryAccess`] if the object cannot be read
    pub fn locate(&self, object: &TargetObject) -> Result<Option<Address>, InspectError> {
        locator::locate(&self.memory, object)
    }

    /// Runtime type named by the vtable symbol containing `vtable_address`
    ///
    /// # Errors
    /// Returns [`InspectError::UnknownVtable`] if no symbol contains the
    /// address and [`InspectError::NotAVtable`] if the symbol is not a vtable.
    pub fn runtime_type(&self, vtable_address: Address) -> Result<RuntimeType, InspectError> {
        let symbol = self
            .symbols
            .resolve_data_symbol(vtable_address)
            .ok_or(InspectError::UnknownVtable { address: vtable_address })?;
        RuntimeType::from_vtable_symbol(&symbol, vtable_address, self.memory.address_byte_size())
    }

    /// See [`enumerator::enumerate`]
    ///
    /// # Errors
    /// Returns the entries read before a failing slot along with the error
    pub fn enumerate(
        &self,
        vtable_address: Address,
        runtime_type: &RuntimeType,
    ) -> Result<Vec<VtableEntry>, PartialEnumeration> {
        enumerator::enumerate(&self.memory, vtable_address, runtime_type)
    }

    /// See [`presenter::describe`]
    #[must_use]
    pub fn describe(&self, entry: VtableEntry) -> VtableEntry {
        presenter::describe(&self.symbols, entry)
    }

    fn resolve(&self, object: &TargetObject) -> Result<VtableState, InspectError> {
        let Some(address) = self.locate(object)? else {
            return Ok(VtableState::Absent);
        };

        let runtime_type = self.runtime_type(address)?;
        debug!(
            "Object at {} ({}) has runtime type {} with {} slots",
            object.address, object.static_type.name, runtime_type.name, runtime_type.slot_count
        );

        let entries = self.enumerate(address, &runtime_type).map_err(|partial| partial.error)?;
        let entries: Vec<VtableEntry> = entries.into_iter().map(|e| self.describe(e)).collect();
        let resolved = entries.iter().filter(|e| e.function.is_some()).count();
        info!(
            "vtable for {} at {}: {} entries, {} resolved",
            runtime_type.name,
            address,
            entries.len(),
            resolved
        );

        Ok(VtableState::Resolved(Vtable {
            address,
            runtime_type,
            pointer_size: self.memory.address_byte_size(),
            entries,
        }))
    }
}

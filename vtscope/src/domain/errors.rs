//! Structured error types for vtscope
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::{Address, Pid, Tid};
use thiserror::Error;

/// Hard failures of a single vtable inspection request.
///
/// Symbol misses and non-polymorphic objects are not errors: they show up as
/// an absent resolved function and an absent vtable respectively.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InspectError {
    #[error("failed to read memory at {address}: {reason}")]
    MemoryAccess { address: Address, reason: String },

    #[error("failed to read vtable entry [{index}] at {address}: {reason}")]
    VtableEntryRead { index: usize, address: Address, reason: String },

    #[error("pointer at {address} is null")]
    NullPointer { address: Address },

    #[error("unable to resolve address {address} to a vtable symbol")]
    UnknownVtable { address: Address },

    #[error("{address} is in '{symbol}', which is not a vtable")]
    NotAVtable { address: Address, symbol: String },

    #[error("unknown type '{0}'")]
    UnknownType(String),
}

impl InspectError {
    /// The target address the error refers to, if any
    #[must_use]
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::MemoryAccess { address, .. }
            | Self::VtableEntryRead { address, .. }
            | Self::NullPointer { address }
            | Self::UnknownVtable { address }
            | Self::NotAVtable { address, .. } => Some(*address),
            Self::UnknownType(_) => None,
        }
    }
}

/// Failures while stopping or resuming the debuggee
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Process {0} not found")]
    ProcessNotFound(Pid),

    #[error("Failed to attach to {tid}: {source}")]
    AttachFailed {
        tid: Tid,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed waiting for {tid} to stop: {source}")]
    WaitFailed {
        tid: Tid,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} exited while being stopped")]
    ThreadExited(Tid),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! # Vtable Inspection Engine
//!
//! Finds, reads and symbolizes the Itanium C++ virtual-dispatch table of an
//! object in a stopped debuggee.
//!
//! ## Data Flow
//!
//! ```text
//! TargetObject (address, static type)
//!      │
//!      ▼
//! ┌──────────────┐  first word of the object
//! │   Locator    │──────────────────────────────▶ vtable address
//! └──────────────┘                                      │
//!                                                       ▼
//!                          data symbol containing it: "vtable for Rectangle"
//!                          → runtime type + slot count
//!                                                       │
//!                                                       ▼
//! ┌──────────────┐  slot i at vtable + i * pointer size
//! │  Enumerator  │──────────────────────────────▶ ordered entries
//! └──────────────┘                                      │
//!                                                       ▼
//! ┌──────────────┐  function, type, file:line
//! │  Presenter   │──────────────────────────────▶ summaries
//! └──────────────┘
//! ```
//!
//! ## Itanium Vtable Layout
//!
//! ```text
//! _ZTV9Rectangle:  [offset-to-top][typeinfo ptr][slot 0][slot 1][slot 2][slot 3]
//!                                               ▲
//!                                               └── value stored in every Rectangle
//! ```
//!
//! A class with two virtual methods and a virtual destructor has four slots:
//! the destructor occupies two (complete-object and deleting).
//!
//! ## Snapshot Semantics
//!
//! A [`Vtable`] is valid for the stop it was read in. The engine keeps no
//! state between requests; see [`inspector`] for the request state machine.

pub mod enumerator;
pub mod inspector;
pub mod locator;
pub mod model;
pub mod presenter;

pub use enumerator::{enumerate, PartialEnumeration};
pub use inspector::{VtableInspector, VtableRequest, VtableState};
pub use locator::locate;
pub use model::{RuntimeType, TargetObject, TypeDescriptor, Vtable, VtableEntry, VTABLE_PREFIX};
pub use presenter::{describe, format_summary};

//! # Symbol Resolution and Address Translation
//!
//! This module turns raw addresses read out of a debuggee into the names a
//! human expects to see next to a vtable entry:
//! - **Function**: `Rectangle::Area()`
//! - **Function type**: `double ()`
//! - **Source location**: `shapes.cpp:14`
//! - **Module**: `shapes`
//!
//! It also answers the two questions the vtable engine needs beyond entry
//! symbolization:
//! - *Which data symbol contains this address?* A vtable pointer lands inside
//!   the `_ZTV<type>` symbol, demangled as `vtable for <type>`. That symbol
//!   names the object's runtime type and bounds the number of slots.
//! - *Is this class polymorphic?* Answered from DWARF type information.
//!
//! ## Key Concepts
//!
//! ### DWARF Debug Information
//!
//! **DWARF** is the debugging data format embedded in ELF binaries compiled
//! with `-g`. It contains:
//! - Mapping from instruction addresses → function names
//! - Source file paths and line numbers
//! - Type information (return types, parameters, class layouts)
//!
//! **Libraries used**:
//! - `gimli`: Low-level DWARF parser (function types, class polymorphism)
//! - `addr2line`: High-level symbolization library built on gimli
//! - `object`: ELF binary parser (symbol tables, sections)
//!
//! ### PIE (Position Independent Executable) and shared objects
//!
//! DWARF and the ELF symbol table use **file-relative addresses**; a running
//! process sees **load addresses**. For position-independent objects:
//!
//! ```text
//! Load Address  = Load Bias + File Address
//! File Address  = Load Address - Load Bias
//! ```
//!
//! The load bias of every file-backed module comes from `/proc/<pid>/maps`.
//! Fixed-address executables (`ET_EXEC`) have a bias of zero.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Vtable slot read from the debuggee
//!    raw value: 0x55f3a2b4d780
//!
//! 2. /proc/<pid>/maps: which module contains it?
//!    /tmp/shapes mapped 0x55f3a2b4c000 - 0x55f3a2b51000, bias 0x55f3a2b4c000
//!
//! 3. File address = 0x55f3a2b4d780 - 0x55f3a2b4c000 = 0x1780
//!
//! 4. DWARF lookup of 0x1780
//!    Rectangle::Area() at shapes.cpp:14, type double ()
//! ```
//!
//! ## Module Structure
//!
//! - **`memory_maps`**: `/proc/<pid>/maps` parsing into per-module ranges
//! - **`symbolizer`**: per-ELF-file resolution (addr2line, symbol table)
//! - **`dwarf_index`**: gimli-based function type and class type index
//! - **`process_symbols`**: address-space-wide resolver routing addresses to
//!   the right module's symbolizer
//!
//! Debug information is static, so symbolizers and their per-address caches
//! live as long as the process being inspected. Memory contents are never
//! cached here.

pub mod dwarf_index;
pub mod memory_maps;
pub mod process_symbols;
pub mod symbolizer;

pub use dwarf_index::DwarfIndex;
pub use memory_maps::{parse_memory_maps, parse_maps_content, MemoryRange, ModuleMapping};
pub use process_symbols::ProcessSymbols;
pub use symbolizer::Symbolizer;

use serde::Serialize;

use crate::domain::Address;

/// Source-level description of the function containing a code address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFunction {
    /// Rendered function type, e.g. `double ()`; `this` is not listed
    pub function_type: Option<String>,
    /// Demangled name, e.g. `Rectangle::Area()`
    pub display_name: String,
    /// Source file path as recorded in the line table
    pub file: Option<String>,
    /// Line of the function's first instruction
    pub line: Option<u32>,
    /// File name of the owning module, e.g. `a.out` or `libc.so.6`
    pub module: String,
}

impl ResolvedFunction {
    /// Last path component of the source file
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.file.as_deref().map(|f| f.rsplit('/').next().unwrap_or(f))
    }
}

/// ELF data symbol covering an address range
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSymbol {
    /// Demangled name, e.g. `vtable for Rectangle`
    pub name: String,
    /// Load address of the first byte
    pub address: Address,
    pub size: u64,
}

impl DataSymbol {
    /// One past the last byte of the symbol
    #[must_use]
    pub fn end(&self) -> Address {
        Address(self.address.0.saturating_add(self.size))
    }

    /// Check if an address falls within this symbol
    #[must_use]
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.address && addr < self.end()
    }
}

/// Address-to-symbol lookups the vtable engine consumes
pub trait SymbolResolver {
    /// Function containing a code address, or `None` when nothing covers it
    fn resolve_function(&self, address: Address) -> Option<ResolvedFunction>;

    /// Data symbol containing an address, or `None` when nothing covers it
    fn resolve_data_symbol(&self, address: Address) -> Option<DataSymbol>;
}

impl<T: SymbolResolver + ?Sized> SymbolResolver for &T {
    fn resolve_function(&self, address: Address) -> Option<ResolvedFunction> {
        (**self).resolve_function(address)
    }

    fn resolve_data_symbol(&self, address: Address) -> Option<DataSymbol> {
        (**self).resolve_data_symbol(address)
    }
}

use addr2line::Context;
use anyhow::{Context as _, Result};
use gimli::{EndianRcSlice, RunTimeEndian};
use log::{debug, warn};
use object::{Object, ObjectKind, ObjectSection, ObjectSymbol, SymbolKind};
use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::dwarf_index::DwarfIndex;
use super::memory_maps::module_name;
use super::ResolvedFunction;
use crate::domain::Address;
use crate::vtable::TypeDescriptor;

/// Sized ELF symbol at a file address
#[derive(Debug, Clone, PartialEq, Eq)]
struct ElfSymbol {
    name: String,
    address: u64,
    size: u64,
}

/// Symbolizer for one ELF file (executable or shared library)
///
/// All addresses taken and returned here are file addresses; translating to
/// and from load addresses is the caller's job (see
/// [`ProcessSymbols`](super::ProcessSymbols)).
///
/// Includes a cache to avoid re-resolving the same addresses repeatedly,
/// since every object of a class shares one vtable.
pub struct Symbolizer {
    path: PathBuf,
    module: String,
    ctx: Context<EndianRcSlice<RunTimeEndian>>,
    index: DwarfIndex,
    /// Data symbols sorted by address (vtables, typeinfo, globals)
    data_symbols: Vec<ElfSymbol>,
    /// Function symbols sorted by address, used when DWARF has no answer
    text_symbols: Vec<ElfSymbol>,
    position_independent: bool,
    has_debug_info: bool,
    /// Cache of resolved functions by file address
    cache: RefCell<HashMap<u64, Option<ResolvedFunction>>>,
}

impl Symbolizer {
    /// Create a new symbolizer for the given binary
    ///
    /// A binary without DWARF is accepted: functions then resolve from the
    /// ELF symbol table with no type or source location.
    ///
    /// # Errors
    /// Returns an error if the binary file cannot be read or parsed
    pub fn new<P: AsRef<Path>>(binary_path: P) -> Result<Self> {
        let path = binary_path.as_ref().to_path_buf();
        let binary_data = fs::read(&path)
            .with_context(|| format!("Failed to read binary file {}", path.display()))?;

        let obj_file = object::File::parse(&*binary_data).context("Failed to parse object file")?;

        // Load DWARF debug info
        let endian =
            if obj_file.is_little_endian() { RunTimeEndian::Little } else { RunTimeEndian::Big };

        let load_section =
            |id: gimli::SectionId| -> Result<EndianRcSlice<RunTimeEndian>, gimli::Error> {
                let data = obj_file
                    .section_by_name(id.name())
                    .and_then(|section| section.uncompressed_data().ok())
                    .unwrap_or(std::borrow::Cow::Borrowed(&[][..]));
                Ok(EndianRcSlice::new(Rc::from(&*data), endian))
            };

        let dwarf = gimli::Dwarf::load(&load_section)?;
        let has_debug_info = obj_file.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);

        let index = DwarfIndex::build(&dwarf).unwrap_or_else(|e| {
            warn!("Malformed DWARF in {}: {e}; function types unavailable", path.display());
            DwarfIndex::default()
        });
        let ctx = Context::from_dwarf(dwarf).context("Failed to load DWARF debug information")?;

        let (data_symbols, text_symbols) = collect_symbols(&obj_file);
        debug!(
            "{}: {} data symbols, {} function symbols, debug info: {has_debug_info}",
            path.display(),
            data_symbols.len(),
            text_symbols.len()
        );

        Ok(Self {
            module: module_name(&path),
            path,
            ctx,
            index,
            data_symbols,
            text_symbols,
            position_independent: obj_file.kind() != ObjectKind::Executable,
            has_debug_info,
            cache: RefCell::new(HashMap::new()),
        })
    }

    /// Path the symbols were loaded from
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Module name printed in entry summaries
    #[must_use]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// False for fixed-address (`ET_EXEC`) executables, whose file addresses
    /// are their load addresses
    #[must_use]
    pub fn is_position_independent(&self) -> bool {
        self.position_independent
    }

    #[must_use]
    pub fn has_debug_info(&self) -> bool {
        self.has_debug_info
    }

    /// Resolve a code address to the function containing it
    ///
    /// Uses a cache to avoid re-resolving the same address multiple times.
    pub fn resolve_function(&self, addr: u64) -> Option<ResolvedFunction> {
        // Check cache first
        if let Some(cached) = self.cache.borrow().get(&addr) {
            return cached.clone();
        }

        // Cache miss - perform actual resolution
        let resolved = self.resolve_from_dwarf(addr).or_else(|| self.resolve_from_symtab(addr));

        // Store in cache
        self.cache.borrow_mut().insert(addr, resolved.clone());

        resolved
    }

    fn resolve_from_dwarf(&self, addr: u64) -> Option<ResolvedFunction> {
        let mut frame_iter = self.ctx.find_frames(addr).skip_all_loads().ok()?;
        let frame = frame_iter.next().ok()??;

        let display_name = frame.function.and_then(|f| f.demangle().ok().map(|s| s.to_string()))?;
        let (file, line) = frame
            .location
            .map_or((None, None), |loc| (loc.file.map(std::string::ToString::to_string), loc.line));

        Some(ResolvedFunction {
            function_type: self.index.function_type(addr).map(str::to_string),
            display_name,
            file,
            line,
            module: self.module.clone(),
        })
    }

    fn resolve_from_symtab(&self, addr: u64) -> Option<ResolvedFunction> {
        let symbol = find_symbol(&self.text_symbols, addr)?;
        Some(ResolvedFunction {
            function_type: None,
            display_name: symbol.name.clone(),
            file: None,
            line: None,
            module: self.module.clone(),
        })
    }

    /// Data symbol containing a file address, as `(name, start, size)`
    #[must_use]
    pub fn resolve_data_symbol(&self, addr: u64) -> Option<(String, Address, u64)> {
        find_symbol(&self.data_symbols, addr).map(|s| (s.name.clone(), Address(s.address), s.size))
    }

    /// Class or struct described in this file's DWARF
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<TypeDescriptor> {
        self.index.lookup_type(name).cloned()
    }

    /// Demangle a C++ or Rust symbol name, returning it unchanged otherwise
    ///
    /// Itanium special names come out as `vtable for T`, `VTT for T`,
    /// `typeinfo for T` and `typeinfo name for T`.
    #[must_use]
    pub fn demangle_symbol(symbol: &str) -> String {
        for (prefix, label) in SPECIAL_NAMES {
            if let Some(type_name) = symbol.strip_prefix(prefix) {
                // `_ZTV9Rectangle` names the type `_Z9Rectangle` would
                let demangled = demangle(&format!("_Z{type_name}"));
                if !demangled.starts_with("_Z") {
                    return format!("{label} {demangled}");
                }
            }
        }
        demangle(symbol)
    }
}

/// Itanium special-name prefixes and how they read when demangled
const SPECIAL_NAMES: [(&str, &str); 4] = [
    ("_ZTV", "vtable for"),
    ("_ZTT", "VTT for"),
    ("_ZTI", "typeinfo for"),
    ("_ZTS", "typeinfo name for"),
];

fn demangle(symbol: &str) -> String {
    addr2line::demangle_auto(Cow::Borrowed(symbol), None).into_owned()
}

/// Split the static and dynamic symbol tables into data and function
/// symbols, demangled and sorted by address
fn collect_symbols(obj_file: &object::File<'_>) -> (Vec<ElfSymbol>, Vec<ElfSymbol>) {
    let mut data = Vec::new();
    let mut text = Vec::new();

    for symbol in obj_file.symbols().chain(obj_file.dynamic_symbols()) {
        if symbol.is_undefined() || symbol.size() == 0 {
            continue;
        }
        let Ok(name) = symbol.name() else {
            continue;
        };
        let target = match symbol.kind() {
            SymbolKind::Data => &mut data,
            SymbolKind::Text => &mut text,
            _ => continue,
        };
        target.push(ElfSymbol {
            name: Symbolizer::demangle_symbol(name),
            address: symbol.address(),
            size: symbol.size(),
        });
    }

    for symbols in [&mut data, &mut text] {
        symbols.sort_by(|a, b| a.address.cmp(&b.address).then_with(|| a.name.cmp(&b.name)));
        symbols.dedup();
    }
    (data, text)
}

/// Symbol whose `[address, address + size)` contains `addr`
fn find_symbol(symbols: &[ElfSymbol], addr: u64) -> Option<&ElfSymbol> {
    let idx = symbols.partition_point(|s| s.address <= addr);
    // Aliases share a start address; any of them may be the sized one
    symbols[..idx]
        .iter()
        .rev()
        .take_while(|s| s.address == symbols[idx - 1].address)
        .find(|s| addr - s.address < s.size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(name: &str, address: u64, size: u64) -> ElfSymbol {
        ElfSymbol { name: name.to_string(), address, size }
    }

    #[test]
    fn test_find_symbol() {
        let symbols = vec![
            sym("vtable for Shape", 0x3d00, 48),
            sym("vtable for Rectangle", 0x3d30, 48),
            sym("global_counter", 0x4010, 4),
        ];
        assert_eq!(find_symbol(&symbols, 0x3d10).unwrap().name, "vtable for Shape");
        assert_eq!(find_symbol(&symbols, 0x3d40).unwrap().name, "vtable for Rectangle");
        assert!(find_symbol(&symbols, 0x3d60).is_none());
        assert!(find_symbol(&symbols, 0x3cff).is_none());
        assert!(find_symbol(&symbols, 0x4014).is_none());
    }

    #[test]
    fn test_demangle_vtable_symbol() {
        assert_eq!(Symbolizer::demangle_symbol("_ZTV9Rectangle"), "vtable for Rectangle");
        assert_eq!(
            Symbolizer::demangle_symbol("_ZTVN6shapes6CircleE"),
            "vtable for shapes::Circle"
        );
        assert_eq!(Symbolizer::demangle_symbol("_ZTI5Shape"), "typeinfo for Shape");
        assert_eq!(Symbolizer::demangle_symbol("_ZTS5Shape"), "typeinfo name for Shape");
        assert_eq!(Symbolizer::demangle_symbol("_ZNK9Rectangle4AreaEv"), "Rectangle::Area() const");
        assert_eq!(Symbolizer::demangle_symbol("main"), "main");
    }

    #[test]
    fn test_symbolizer_rejects_missing_file() {
        assert!(Symbolizer::new("/nonexistent/path/to/binary").is_err());
    }
}

//! Address-space-wide symbol resolution
//!
//! Routes a load address to the module mapped there, translates it to a file
//! address, and asks that module's [`Symbolizer`]. Symbolizers for shared
//! libraries are loaded the first time one of their addresses shows up.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::memory_maps::{find_module, parse_memory_maps, ModuleMapping};
use super::{DataSymbol, ResolvedFunction, SymbolResolver, Symbolizer};
use crate::domain::{Address, Pid};
use crate::vtable::TypeDescriptor;

/// Symbols of every file-backed module of one process
pub struct ProcessSymbols {
    modules: Vec<ModuleMapping>,
    main_path: PathBuf,
    main: Rc<Symbolizer>,
    /// Symbolizers by mapped path; `None` records a file that failed to load
    loaded: RefCell<HashMap<PathBuf, Option<Rc<Symbolizer>>>>,
}

impl ProcessSymbols {
    /// Read the module map of `pid` and load the executable's symbols
    ///
    /// `symbol_file` replaces `exe_path` as the source of the executable's
    /// symbols (an unstripped copy of a stripped binary, for instance).
    ///
    /// # Errors
    /// Returns an error if the memory maps cannot be read or the executable's
    /// symbols cannot be loaded
    pub fn load(pid: Pid, exe_path: &Path, symbol_file: Option<&Path>) -> Result<Self> {
        let modules = parse_memory_maps(pid)?;
        let symbols_from = symbol_file.unwrap_or(exe_path);
        let main = Symbolizer::new(symbols_from).with_context(|| {
            format!("Failed to create symbolizer for {}", symbols_from.display())
        })?;
        info!("Loaded symbols for {} from {}", exe_path.display(), symbols_from.display());
        Ok(Self::from_parts(modules, exe_path.to_path_buf(), main))
    }

    /// Assemble from an already-parsed module map and executable symbolizer
    #[must_use]
    pub fn from_parts(modules: Vec<ModuleMapping>, main_path: PathBuf, main: Symbolizer) -> Self {
        let main = Rc::new(main);
        let mut loaded = HashMap::new();
        loaded.insert(main_path.clone(), Some(Rc::clone(&main)));
        Self { modules, main_path, main, loaded: RefCell::new(loaded) }
    }

    /// Re-read `/proc/<pid>/maps`
    ///
    /// Libraries can be loaded or unloaded while the process runs, so the map
    /// is refreshed on every stop. Already loaded symbolizers are kept: a
    /// file's debug info does not change.
    ///
    /// # Errors
    /// Returns an error if the memory maps cannot be read
    pub fn refresh_maps(&mut self, pid: Pid) -> Result<()> {
        self.modules = parse_memory_maps(pid)?;
        Ok(())
    }

    #[must_use]
    pub fn modules(&self) -> &[ModuleMapping] {
        &self.modules
    }

    /// Symbolizer of the main executable
    #[must_use]
    pub fn main(&self) -> &Symbolizer {
        &self.main
    }

    /// Static type by name, searched in the executable first and then in
    /// every mapped library, loading their symbols as needed
    #[must_use]
    pub fn lookup_type(&self, name: &str) -> Option<TypeDescriptor> {
        if let Some(found) = self.main.lookup_type(name) {
            return Some(found);
        }
        self.modules
            .iter()
            .filter_map(|module| self.symbolizer_for(module))
            .find_map(|symbolizer| symbolizer.lookup_type(name))
    }

    /// Symbolizer and file address for a load address
    fn locate(&self, addr: Address) -> Option<(Rc<Symbolizer>, u64)> {
        let module = find_module(&self.modules, addr)?;
        let symbolizer = self.symbolizer_for(module)?;
        let bias = if symbolizer.is_position_independent() { module.load_bias } else { 0 };
        Some((symbolizer, bias))
    }

    fn symbolizer_for(&self, module: &ModuleMapping) -> Option<Rc<Symbolizer>> {
        if module.path == self.main_path {
            return Some(Rc::clone(&self.main));
        }
        if let Some(cached) = self.loaded.borrow().get(&module.path) {
            return cached.clone();
        }

        let loaded = match Symbolizer::new(&module.path) {
            Ok(symbolizer) => {
                debug!("Loaded symbols for {}", module.path.display());
                Some(Rc::new(symbolizer))
            }
            Err(e) => {
                warn!("No symbols for {}: {e:#}", module.path.display());
                None
            }
        };
        self.loaded.borrow_mut().insert(module.path.clone(), loaded.clone());
        loaded
    }
}

impl SymbolResolver for ProcessSymbols {
    fn resolve_function(&self, address: Address) -> Option<ResolvedFunction> {
        let (symbolizer, bias) = self.locate(address)?;
        symbolizer.resolve_function(address.0.wrapping_sub(bias))
    }

    fn resolve_data_symbol(&self, address: Address) -> Option<DataSymbol> {
        let (symbolizer, bias) = self.locate(address)?;
        let (name, start, size) = symbolizer.resolve_data_symbol(address.0.wrapping_sub(bias))?;
        Some(DataSymbol { name, address: Address(start.0.wrapping_add(bias)), size })
    }
}

//! Memory mapping utilities for process address space analysis
//!
//! This module parses /proc/pid/maps to determine where each file-backed
//! module (the executable and its shared libraries) is loaded, which is
//! essential for symbolizing addresses in position-independent code.

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{Address, Pid};

/// Memory range of a loaded module in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// All mappings of one file, merged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMapping {
    pub path: PathBuf,
    /// Lowest start to highest end over every mapping of the file
    pub range: MemoryRange,
    /// Load address minus file address for position-independent objects
    pub load_bias: u64,
}

impl ModuleMapping {
    /// File name used when printing `module`function`
    #[must_use]
    pub fn name(&self) -> String {
        module_name(&self.path)
    }
}

/// Display name of a module path (its last component)
#[must_use]
pub fn module_name(path: &Path) -> String {
    path.file_name().map_or_else(
        || path.to_string_lossy().into_owned(),
        |n| n.to_string_lossy().into_owned(),
    )
}

/// Parse /proc/pid/maps into one entry per mapped file
///
/// # Arguments
/// * `pid` - The process ID to query
///
/// # Errors
/// Returns an error if /proc/pid/maps cannot be read or contains a malformed range
pub fn parse_memory_maps(pid: Pid) -> Result<Vec<ModuleMapping>> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    let maps = fs::read_to_string(&maps_path).context(format!("Failed to read {maps_path}"))?;
    let modules = parse_maps_content(&maps)?;
    info!("Found {} file-backed modules in {}", modules.len(), pid);
    Ok(modules)
}

/// Parse the text of a maps file
///
/// Anonymous mappings and pseudo-files such as `[heap]` or `[vdso]` are skipped.
///
/// # Errors
/// Returns an error if an address range or file offset is not valid hex
pub fn parse_maps_content(maps: &str) -> Result<Vec<ModuleMapping>> {
    let mut modules: Vec<ModuleMapping> = Vec::new();

    for line in maps.lines() {
        // Parse the line: "start-end perms offset dev inode pathname"
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 6 {
            continue;
        }
        // Paths may contain spaces
        let path = parts[5..].join(" ");
        if path.starts_with('[') {
            continue;
        }

        let Some((start, end)) = parts[0].split_once('-') else {
            continue;
        };
        let start = u64::from_str_radix(start, 16).context("Failed to parse range start")?;
        let end = u64::from_str_radix(end, 16).context("Failed to parse range end")?;
        let offset = u64::from_str_radix(parts[2], 16).context("Failed to parse file offset")?;
        let bias = start.saturating_sub(offset);

        if let Some(module) = modules.iter_mut().find(|m| m.path.as_os_str() == path.as_str()) {
            // Track the minimum start and maximum end
            module.range.start = module.range.start.min(start);
            module.range.end = module.range.end.max(end);
            module.load_bias = module.load_bias.min(bias);
        } else {
            debug!("Module {path} at 0x{start:x} (bias 0x{bias:x})");
            modules.push(ModuleMapping {
                path: PathBuf::from(path),
                range: MemoryRange { start, end },
                load_bias: bias,
            });
        }
    }

    Ok(modules)
}

/// Module whose merged range contains `addr`
#[must_use]
pub fn find_module(modules: &[ModuleMapping], addr: Address) -> Option<&ModuleMapping> {
    modules.iter().find(|m| m.range.contains(addr.0))
}

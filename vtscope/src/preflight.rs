//! Pre-flight checks for vtscope
//!
//! Validates that the target process can be stopped and read before the
//! first ptrace call. Provides clear, actionable error messages when
//! requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use object::{Object, ObjectSection};
use std::path::Path;

use crate::domain::Pid;

const PTRACE_SCOPE_PATH: &str = "/proc/sys/kernel/yama/ptrace_scope";

/// Run all pre-flight checks before attaching
pub fn run_preflight_checks(pid: Pid, symbol_path: &Path, quiet: bool) -> Result<()> {
    check_process_exists(pid)?;
    check_proc_access(pid)?;
    check_ptrace_scope()?;
    check_binary_exists(symbol_path)?;
    check_debug_symbols(symbol_path, quiet)?;
    Ok(())
}

/// Check that Yama allows us to attach to a non-child process
fn check_ptrace_scope() -> Result<()> {
    // No Yama LSM: classic ptrace permission rules apply
    let Ok(scope) = std::fs::read_to_string(PTRACE_SCOPE_PATH) else {
        return Ok(());
    };
    let is_root = unsafe { libc::geteuid() } == 0;
    ptrace_scope_verdict(scope.trim(), is_root)
}

fn ptrace_scope_verdict(scope: &str, is_root: bool) -> Result<()> {
    match scope {
        "0" => Ok(()),
        "1" | "2" if is_root => Ok(()),
        "1" => bail!(
            "Permission denied: kernel.yama.ptrace_scope is 1 (restricted).\n\n\
             Only parent processes may attach. Either:\n  \
             sudo vtscope ...\n  \
             sudo sysctl kernel.yama.ptrace_scope=0"
        ),
        "2" => bail!(
            "Permission denied: kernel.yama.ptrace_scope is 2 (admin-only).\n\n\
             Run with: sudo vtscope ..."
        ),
        "3" => bail!(
            "Permission denied: kernel.yama.ptrace_scope is 3 (no attach).\n\n\
             ptrace attach is disabled until reboot."
        ),
        // Unknown value, let the attach itself report the problem
        _ => Ok(()),
    }
}

/// Check if the symbol file exists and is readable
fn check_binary_exists(target_path: &Path) -> Result<()> {
    if !target_path.exists() {
        bail!(
            "Binary not found: {}\n\n\
             Make sure the path is correct and the binary exists.",
            target_path.display()
        );
    }
    if !target_path.is_file() {
        bail!(
            "Not a file: {}\n\n\
             --target must point to an executable file, not a directory.",
            target_path.display()
        );
    }
    Ok(())
}

/// Check if the binary has debug symbols for type and source resolution
fn check_debug_symbols(target_path: &Path, quiet: bool) -> Result<()> {
    if quiet {
        return Ok(());
    }

    let file_data = std::fs::read(target_path)
        .with_context(|| format!("Failed to read binary: {}", target_path.display()))?;

    let Ok(obj) = object::File::parse(&*file_data) else {
        // Not a valid object file, let later stages handle it
        return Ok(());
    };

    // Check for .debug_info section (DWARF debug info)
    let has_debug_info = obj.section_by_name(".debug_info").is_some_and(|s| s.size() > 0);

    // Check for .symtab (symbol table - present in non-stripped binaries)
    let has_symtab = obj.section_by_name(".symtab").is_some_and(|s| s.size() > 0);

    if !has_debug_info && !has_symtab {
        eprintln!("warning: binary stripped, vtable types and entries will not resolve");
    } else if !has_debug_info {
        eprintln!("warning: no DWARF debug info, function types and source locations unavailable");
    }

    Ok(())
}

/// Check if the target process exists
pub fn check_process_exists(pid: Pid) -> Result<()> {
    let proc_path = format!("/proc/{}", pid.0);
    if !Path::new(&proc_path).exists() {
        bail!(
            "Process {} not found.\n\n\
             Is the process still running? Check with: ps -p {}",
            pid.0,
            pid.0
        );
    }
    Ok(())
}

/// Check if we can read the process's memory maps
pub fn check_proc_access(pid: Pid) -> Result<()> {
    let maps_path = format!("/proc/{}/maps", pid.0);
    std::fs::read_to_string(&maps_path).with_context(|| {
        format!(
            "Cannot read {maps_path}\n\n\
             This usually means:\n\
             - The process doesn't exist (check: ps -p {})\n\
             - Permission denied (run with sudo)\n\
             - /proc is not mounted",
            pid.0
        )
    })?;
    Ok(())
}

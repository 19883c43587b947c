//! Find the target process by name

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Pid;

/// A process we could attach to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub exe_path: PathBuf,
    /// `/proc/<pid>/comm`
    pub command: String,
}

impl ProcessInfo {
    fn exe_name(&self) -> &str {
        self.exe_path.file_name().and_then(|n| n.to_str()).unwrap_or("")
    }
}

/// Find a process by command or executable name
///
/// An exact match on the command name or executable basename wins over
/// substring matches, so `shapes` picks `shapes` even while `shapes-server`
/// runs. Our own process never matches.
///
/// # Errors
/// Fails when no process matches, or when several match equally well.
pub fn find_process_by_name(name: &str) -> Result<ProcessInfo> {
    select(name, list_processes()?)
}

/// Resolve binary path from PID via `/proc/<pid>/exe`.
///
/// # Errors
/// Returns error if the process doesn't exist or `/proc/<pid>/exe` is not readable.
pub fn resolve_exe_path(pid: Pid) -> Result<PathBuf> {
    let exe_link = format!("/proc/{}/exe", pid.0);
    fs::read_link(&exe_link).with_context(|| format!("Cannot read {exe_link}"))
}

/// Every other process whose executable we can see
fn list_processes() -> Result<Vec<ProcessInfo>> {
    let own_pid = std::process::id();
    let mut processes = Vec::new();

    for entry in fs::read_dir("/proc").context("Failed to read /proc")?.flatten() {
        let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
            continue;
        };
        let Ok(raw) = i32::try_from(pid) else {
            continue;
        };
        if pid == own_pid {
            continue;
        }
        // Kernel threads have no exe; other users' processes are unreadable
        let Ok(exe_path) = resolve_exe_path(Pid(raw)) else {
            continue;
        };
        let Ok(command) = fs::read_to_string(format!("/proc/{pid}/comm")) else {
            continue;
        };
        processes.push(ProcessInfo { pid: Pid(raw), exe_path, command: command.trim().into() });
    }
    Ok(processes)
}

fn select(name: &str, candidates: Vec<ProcessInfo>) -> Result<ProcessInfo> {
    let wanted = Path::new(name).file_name().and_then(|n| n.to_str()).unwrap_or(name);

    let (exact, partial): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .filter(|p| p.command.contains(wanted) || p.exe_name().contains(wanted))
        .partition(|p| p.command == wanted || p.exe_name() == wanted);
    let mut matches = if exact.is_empty() { partial } else { exact };

    match matches.len() {
        0 => bail!(
            "No process matching '{name}' found.\n\
             Check running processes with: ps aux | grep {wanted}"
        ),
        1 => Ok(matches.remove(0)),
        _ => {
            matches.sort_by_key(|m| m.pid.0);
            let list: Vec<String> =
                matches.iter().map(|m| format!("  {} ({})", m.pid.0, m.command)).collect();
            bail!(
                "Multiple processes match '{name}':\n{}\n\n\
                 Specify PID explicitly: vtscope --pid <PID>",
                list.join("\n")
            )
        }
    }
}

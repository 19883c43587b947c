//! # vtscope - Main Entry Point
//!
//! Supports two operational modes:
//! - **One-shot** (`vtscope <PROCESS>` or `--pid <PID>`): stop the process,
//!   print the object's vtable, resume
//! - **Watch** (`--watch SECS`): repeat the one-shot inspection until Ctrl+C,
//!   `--count` inspections, or the process exits

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use vtscope::cli::{Args, OutputFormat};
use vtscope::domain::{InspectError, Pid};
use vtscope::export::{write_json, write_text};
use vtscope::memory::ProcessMemory;
use vtscope::preflight::run_preflight_checks;
use vtscope::process_lookup::{find_process_by_name, resolve_exe_path};
use vtscope::stop_session::StopSession;
use vtscope::symbolization::ProcessSymbols;
use vtscope::vtable::{TargetObject, TypeDescriptor, Vtable, VtableInspector};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NO_VTABLE: i32 = 3;
const EXIT_NOPERM: i32 = 77;

/// Result of the last inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Found,
    NoVtable,
    Failed,
}

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(Outcome::Found) => EXIT_SUCCESS,
        Ok(Outcome::NoVtable) => EXIT_NO_VTABLE,
        Ok(Outcome::Failed) => EXIT_ERROR,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied")
        || msg.contains("operation not permitted")
        || msg.contains("requires root")
    {
        EXIT_NOPERM
    } else if msg.contains("missing required argument") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

/// Where to attach and where to read symbols from
struct Target {
    pid: Pid,
    exe_path: PathBuf,
    /// `--target`, canonicalized
    symbol_file: Option<PathBuf>,
}

impl Target {
    fn symbol_path(&self) -> &Path {
        self.symbol_file.as_deref().unwrap_or(&self.exe_path)
    }
}

/// Resolve PID and binary paths from CLI arguments.
///
/// Supports three modes:
/// - `vtscope shapes` - find process by name, auto-detect binary
/// - `vtscope --pid 1234` - explicit PID, auto-detect binary from /proc
/// - `vtscope --pid 1234 --target ./shapes.debug` - explicit PID, symbols from another file
fn resolve_target(args: &Args) -> Result<Target> {
    let symbol_file = args
        .target
        .as_ref()
        .map(|t| {
            std::fs::canonicalize(t)
                .with_context(|| format!("Failed to resolve path: {}", t.display()))
        })
        .transpose()?;

    // Mode A: Process name provided
    if let Some(ref name) = args.process {
        if args.pid.is_some() {
            anyhow::bail!(
                "Cannot use PROCESS argument with --pid.\n\n\
                 Use either:\n  \
                 vtscope shapes ...        (auto-detect)\n  \
                 vtscope --pid 1234 ...    (explicit PID)"
            );
        }
        let info = find_process_by_name(name)?;
        return Ok(Target { pid: info.pid, exe_path: info.exe_path, symbol_file });
    }

    // Mode B: Explicit PID provided
    if let Some(pid) = args.pid {
        let pid = Pid(pid);
        let exe_path = resolve_exe_path(pid)?;
        return Ok(Target { pid, exe_path, symbol_file });
    }

    anyhow::bail!(
        "Missing required argument: PROCESS or --pid\n\n\
         Usage:\n  \
         vtscope shapes --address ADDR --type TYPE       Auto-detect PID and binary\n  \
         vtscope --pid 1234 --address ADDR --type TYPE   Explicit PID, auto-detect binary\n\n\
         Run 'vtscope --help' for more options"
    )
}

/// Stop the process, read the vtable, resume the process
///
/// Runs entirely on the calling thread: ptrace requires attach, reads and
/// detach to come from one thread.
fn inspect_once(
    pid: Pid,
    symbols: &ProcessSymbols,
    args: &Args,
    static_type: &TypeDescriptor,
) -> Result<Option<Vtable>> {
    let session = StopSession::attach(pid)?;
    let memory = ProcessMemory::open(pid)?;

    let object = if args.deref {
        TargetObject::from_pointer(&memory, args.address, static_type.clone())?
    } else {
        TargetObject::new(args.address, static_type.clone())
    };
    debug!("Inspecting {} object at {}", object.static_type.name, object.address);

    let inspector = VtableInspector::new(&memory, symbols);
    let vtable = inspector.get_vtable(&object)?;
    drop(session);
    Ok(vtable)
}

fn print_result(args: &Args, vtable: Option<&Vtable>) -> Result<Outcome> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let Some(vtable) = vtable else {
        match args.format {
            OutputFormat::Text => writeln!(out, "{} has no vtable", args.object_type())?,
            OutputFormat::Json => writeln!(out, "null")?,
        }
        return Ok(Outcome::NoVtable);
    };

    match args.format {
        OutputFormat::Text => write_text(&mut out, vtable)?,
        OutputFormat::Json => write_json(&mut out, vtable)?,
    }
    out.flush()?;
    Ok(Outcome::Found)
}

#[tokio::main]
async fn run() -> Result<Outcome> {
    let args = Args::parse();

    let target = resolve_target(&args)?;
    let pid = target.pid;

    // Run pre-flight checks before anything else
    run_preflight_checks(pid, target.symbol_path(), args.quiet)?;

    // Headers would corrupt JSON on stdout
    let chatty = !args.quiet && args.format == OutputFormat::Text;
    if chatty {
        println!("vtscope v{}", env!("CARGO_PKG_VERSION"));
        println!("target: {}", target.exe_path.display());
        if let Some(ref symbol_file) = target.symbol_file {
            println!("symbols: {}", symbol_file.display());
        }
        println!("pid: {}", pid.0);
    }

    let mut symbols = ProcessSymbols::load(pid, &target.exe_path, target.symbol_file.as_deref())?;
    let static_type = symbols
        .lookup_type(args.object_type())
        .ok_or_else(|| InspectError::UnknownType(args.object_type().to_string()))?;
    info!(
        "Static type {} is {}polymorphic",
        static_type.name,
        if static_type.polymorphic { "" } else { "not " }
    );

    let Some(secs) = args.watch else {
        let vtable = inspect_once(pid, &symbols, &args, &static_type)?;
        return print_result(&args, vtable.as_ref());
    };

    // Setup Ctrl+C handler
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let proc_path = format!("/proc/{}", pid.0);
    let mut inspections: u64 = 0;
    let mut outcome = Outcome::Failed;
    let mut exit_reason = "interrupted";

    loop {
        if !Path::new(&proc_path).exists() {
            exit_reason = "process exited";
            break;
        }

        // Libraries may have been loaded since the last stop
        symbols.refresh_maps(pid)?;

        if inspections > 0 && args.format == OutputFormat::Text {
            println!();
        }
        outcome = match inspect_once(pid, &symbols, &args, &static_type) {
            Ok(vtable) => print_result(&args, vtable.as_ref())?,
            // The object may be mid-update; report and try again next tick
            Err(e) if e.downcast_ref::<InspectError>().is_some() => {
                eprintln!("error: {e:#}");
                Outcome::Failed
            }
            Err(e) => return Err(e),
        };
        inspections += 1;

        if args.count > 0 && inspections >= args.count {
            exit_reason = "count reached";
            break;
        }

        // Use select to handle both sleep and Ctrl+C
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(secs)) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    if !args.quiet {
        eprintln!("\n{exit_reason}: {inspections} inspections");
    }
    Ok(outcome)
}

//! # vtscope - C++ Vtable Inspector for Live Processes
//!
//! vtscope shows the virtual-dispatch table of a C++ object in a running
//! Linux process: the object's runtime (most-derived) type and, for every
//! virtual function slot, the raw function pointer and the function it
//! points to.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Target Process                           │
//! │                 (C++, Itanium ABI, Linux ELF)                   │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ ptrace stop, /proc/<pid>/mem, /proc/<pid>/maps
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      vtscope (This Crate)                       │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │ StopSession  │   │    Memory    │   │ Symbolization│        │
//! │  │  (ptrace)    │   │ (MemoryReader│   │ (DWARF / ELF │        │
//! │  └──────────────┘   │  over mem)   │   │  per module) │        │
//! │                     └──────┬───────┘   └──────┬───────┘        │
//! │                            │                  │                │
//! │                            ▼                  ▼                │
//! │                     ┌─────────────────────────────┐            │
//! │                     │  Vtable Inspection Engine   │            │
//! │                     │locate → enumerate → describe│            │
//! │                     └──────────────┬──────────────┘            │
//! │                                    ▼                           │
//! │                     ┌──────────────┐                           │
//! │                     │ Text / JSON  │                           │
//! │                     └──────────────┘                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`vtable`]: the inspection engine. Works against two traits only,
//!   [`memory::MemoryReader`] and [`symbolization::SymbolResolver`], so it
//!   can run over a live process or an in-memory image.
//!
//! - [`memory`]: pointer reads from `/proc/<pid>/mem`, plus
//!   [`memory::MemoryImage`] for building address spaces by hand
//!
//! - [`symbolization`]: addresses to functions and data symbols
//!   - Uses DWARF debug information via `addr2line` and `gimli`
//!   - Handles PIE (Position Independent Executable) address adjustment
//!   - Loads shared library symbols on first use
//!
//! - [`stop_session`]: stop every thread with ptrace for the duration of one
//!   inspection
//!
//! - [`export`]: text and JSON output
//!
//! - [`cli`]: Command-line argument parsing
//!
//! - [`preflight`], [`process_lookup`]: checks and PID/binary detection
//!   before attaching
//!
//! - [`domain`]: Core domain types (Pid, Tid, Address) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Object of static type Shape at a known address
//! vtscope shapes --address 0x7ffd1c2a3b40 --type Shape
//!
//! # Follow a `Shape *` variable, re-inspecting every second
//! vtscope --pid 1234 --address 0x55d0c0a1e2b0 --type Shape --deref --watch 1
//! ```
//!
//! ## Key Concepts
//!
//! - **Vtable pointer**: first word of every polymorphic object
//! - **Runtime type**: taken from the vtable symbol (`vtable for Rectangle`)
//! - **Snapshot**: results describe one stop and are never cached
//! - **PIE/ASLR**: symbol lookups subtract each module's load bias

pub mod cli;
pub mod domain;
pub mod export;
pub mod memory;
pub mod preflight;
pub mod process_lookup;
pub mod stop_session;
pub mod symbolization;
pub mod vtable;

//! Text and JSON output of vtable snapshots
//!
//! In JSON, addresses are written as `0x`-prefixed hex strings so they survive
//! consumers that parse numbers as doubles.

use serde::Serialize;
use std::io::Write;

use crate::domain::Address;
use crate::symbolization::ResolvedFunction;
use crate::vtable::{RuntimeType, Vtable, VtableEntry};

/// Serializable view of a [`Vtable`]
#[derive(Debug, Serialize)]
pub struct VtableReport<'a> {
    pub name: String,
    pub type_name: String,
    pub address: String,
    pub pointer_size: u8,
    pub runtime_type: &'a RuntimeType,
    pub entries: Vec<EntryReport<'a>>,
}

#[derive(Debug, Serialize)]
pub struct EntryReport<'a> {
    pub index: usize,
    pub raw_value: String,
    pub summary: &'a str,
    pub function: Option<&'a ResolvedFunction>,
}

impl<'a> VtableReport<'a> {
    #[must_use]
    pub fn new(vtable: &'a Vtable) -> Self {
        Self {
            name: vtable.name(),
            type_name: vtable.type_name(),
            address: hex(vtable.address),
            pointer_size: vtable.pointer_size,
            runtime_type: &vtable.runtime_type,
            entries: vtable.entries.iter().map(EntryReport::new).collect(),
        }
    }
}

impl<'a> EntryReport<'a> {
    fn new(entry: &'a VtableEntry) -> Self {
        Self {
            index: entry.index,
            raw_value: hex(entry.raw_value),
            summary: &entry.summary,
            function: entry.function.as_ref(),
        }
    }
}

fn hex(address: Address) -> String {
    format!("{:#x}", address.0)
}

/// Write `vtable` as one pretty-printed JSON document
///
/// # Errors
/// Returns an error if serialization or the write fails
pub fn write_json<W: Write>(mut writer: W, vtable: &Vtable) -> serde_json::Result<()> {
    serde_json::to_writer_pretty(&mut writer, &VtableReport::new(vtable))?;
    writeln!(writer).map_err(serde_json::Error::io)
}

/// Write `vtable` as a header line followed by one summary per entry
///
/// # Errors
/// Returns an error if the write fails
pub fn write_text<W: Write>(mut writer: W, vtable: &Vtable) -> std::io::Result<()> {
    writeln!(writer, "{} @ {}", vtable.name(), vtable.address)?;
    for entry in &vtable.entries {
        writeln!(writer, "  {}", entry.summary)?;
    }
    Ok(())
}

//! `/proc/<pid>/mem` reader
//!
//! Linux exposes a process's address space as a file whose offsets are
//! virtual addresses. Unmapped pages fail with `EIO`, which surfaces as a
//! [`InspectError::MemoryAccess`].

use anyhow::{bail, Context, Result};
use log::debug;
use std::fs::File;
use std::io::Read;
use std::os::unix::fs::FileExt;

use super::{decode_pointer, MemoryReader};
use crate::domain::{Address, InspectError, Pid};

/// Memory of a live process
#[derive(Debug)]
pub struct ProcessMemory {
    pid: Pid,
    mem: File,
    pointer_size: u8,
    little_endian: bool,
}

impl ProcessMemory {
    /// Open the address space of `pid`
    ///
    /// Requires ptrace access to the process (same user and a permissive
    /// `kernel.yama.ptrace_scope`, or an attached tracer).
    ///
    /// # Errors
    /// Returns an error if `/proc/<pid>/mem` or `/proc/<pid>/exe` cannot be
    /// opened, or if the executable is not an ELF file.
    pub fn open(pid: Pid) -> Result<Self> {
        let (pointer_size, little_endian) = elf_layout(pid)?;
        let mem_path = format!("/proc/{}/mem", pid.0);
        let mem = File::open(&mem_path).with_context(|| format!("Failed to open {mem_path}"))?;
        debug!("Opened {mem_path}: {pointer_size}-byte pointers, little endian: {little_endian}");
        Ok(Self { pid, mem, pointer_size, little_endian })
    }

    /// Process whose memory this reader accesses
    #[must_use]
    pub fn pid(&self) -> Pid {
        self.pid
    }
}

impl MemoryReader for ProcessMemory {
    fn address_byte_size(&self) -> u8 {
        self.pointer_size
    }

    fn read_pointer(&self, address: Address) -> Result<Address, InspectError> {
        let mut buf = [0u8; 8];
        let word = &mut buf[..usize::from(self.pointer_size)];
        self.mem.read_exact_at(word, address.0).map_err(|e| InspectError::MemoryAccess {
            address,
            reason: e.to_string(),
        })?;
        Ok(Address(decode_pointer(word, self.little_endian)))
    }
}

/// Size of `e_ident` and the offsets of its class and data bytes
const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

/// Pointer width and byte order from the ELF identification bytes
fn elf_layout(pid: Pid) -> Result<(u8, bool)> {
    let exe_path = format!("/proc/{}/exe", pid.0);
    let mut ident = [0u8; EI_NIDENT];
    File::open(&exe_path)
        .and_then(|mut f| f.read_exact(&mut ident))
        .with_context(|| format!("Failed to read ELF header of {exe_path}"))?;
    parse_ident(&ident).with_context(|| format!("{exe_path} is not an ELF executable"))
}

fn parse_ident(ident: &[u8; EI_NIDENT]) -> Result<(u8, bool)> {
    if ident[..4] != object::elf::ELFMAG {
        bail!("bad ELF magic");
    }
    let pointer_size = match ident[EI_CLASS] {
        object::elf::ELFCLASS32 => 4,
        object::elf::ELFCLASS64 => 8,
        other => bail!("unknown ELF class {other}"),
    };
    let little_endian = match ident[EI_DATA] {
        object::elf::ELFDATA2LSB => true,
        object::elf::ELFDATA2MSB => false,
        other => bail!("unknown ELF data encoding {other}"),
    };
    Ok((pointer_size, little_endian))
}

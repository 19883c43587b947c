//! CLI argument definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::domain::Address;

#[derive(Parser, Debug)]
#[command(
    name = "vtscope",
    version,
    about = "Show the C++ vtable of an object in a running process",
    after_help = "\
EXAMPLES:
    vtscope shapes --address 0x7ffd1c2a3b40 --type Shape
    vtscope --pid 1234 --address 0x55d0c0a1e2b0 --type 'Shape *' --deref
    vtscope --pid 1234 --target ./shapes.debug --address 0x7ffd1c2a3b40 --type Rectangle --format json
    vtscope shapes --address 0x55d0c0a1e2b0 --type Shape --deref --watch 1 --count 5"
)]
pub struct Args {
    /// Process name to inspect (auto-detects PID and binary)
    #[arg(value_name = "PROCESS")]
    pub process: Option<String>,

    /// Process ID to inspect (binary path auto-detected from /proc)
    #[arg(short, long)]
    pub pid: Option<i32>,

    /// Binary to read symbols from (defaults to the process executable)
    #[arg(short, long)]
    pub target: Option<PathBuf>,

    /// Object address, hex (0x...) or decimal
    #[arg(short, long, value_name = "ADDR")]
    pub address: Address,

    /// Static type of the object, e.g. `Shape` or `ns::Widget`
    #[arg(long = "type", value_name = "TYPE")]
    pub type_name: String,

    /// Treat --address as the address of a `TYPE *` variable
    #[arg(long)]
    pub deref: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Inspect again every SECS seconds until Ctrl+C
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub watch: Option<u64>,

    /// Stop watching after N inspections (0 = unlimited)
    #[arg(long, default_value = "0", requires = "watch")]
    pub count: u64,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Args {
    /// Static type name with a trailing `*` removed
    ///
    /// `--type 'Shape *' --deref` and `--type Shape --deref` mean the same.
    #[must_use]
    pub fn object_type(&self) -> &str {
        let name = self.type_name.trim();
        if self.deref {
            name.strip_suffix('*').map_or(name, str::trim_end)
        } else {
            name
        }
    }
}

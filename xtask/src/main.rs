use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::Command;

const FIXTURE_SOURCE: &str = "vtscope/tests/fixtures/shapes.cpp";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Compile the C++ demo program used to try vtscope by hand
    BuildFixture {
        #[arg(long, default_value = "target/fixtures/shapes")]
        out: PathBuf,
        #[arg(long, default_value = "c++")]
        compiler: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildFixture { out, compiler } => build_fixture(&out, &compiler)?,
    }

    Ok(())
}

fn build_fixture(out: &Path, compiler: &str) -> Result<()> {
    if let Some(dir) = out.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
    }

    // -O0 keeps every virtual call and the vtables intact; -g for types and lines
    let status = Command::new(compiler)
        .args(["-g", "-O0", "-o"])
        .arg(out)
        .arg(FIXTURE_SOURCE)
        .status()
        .with_context(|| format!("Failed to run {compiler}"))?;

    if !status.success() {
        anyhow::bail!("Failed to compile {FIXTURE_SOURCE}");
    }

    println!("✓ fixture built successfully");
    println!("  Output: {}", out.display());
    println!("  Run it, then: vtscope --pid <PID> --address <ADDR> --type Shape");

    Ok(())
}

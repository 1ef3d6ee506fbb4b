//! Plain text test runner: the raw UART bytes are the output.

use std::path::Path;

use anyhow::{Context, Result};

use crate::qemu::run_qemu;
use crate::runner::{RunOptions, check_expected};

/// Run a text test.
pub fn run_text(example: &str, elf_path: &Path, opts: &RunOptions) -> Result<bool> {
    println!("Running in QEMU...");
    let output = run_qemu(elf_path)?;
    let uart = String::from_utf8(output.uart).context("UART output is not UTF-8")?;

    if opts.verbose {
        print!("{uart}");
        println!("--- QEMU run end ---");
        return Ok(true);
    }

    check_expected(example, &uart, opts)
}

//! defmt test runner: the UART stream must decode to the same log as the
//! semihosting mirror, and both must match the expected file.

use std::path::Path;

use anyhow::Result;

use crate::defmt;
use crate::qemu::run_qemu;
use crate::runner::{RunOptions, check_expected};

/// Run a defmt test.
pub fn run_standard(example: &str, elf_path: &Path, opts: &RunOptions) -> Result<bool> {
    println!("Running in QEMU...");
    let output = run_qemu(elf_path)?;
    let semihosting = defmt::decode_output(elf_path, &output.semihosting)?;
    let uart = defmt::decode_output(elf_path, &output.uart)?;

    if semihosting != uart {
        println!("  FAIL: semihosting and UART output differ");
        println!("--- semihosting ---");
        print!("{semihosting}");
        println!("--- uart ---");
        print!("{uart}");
        return Ok(false);
    }

    if opts.verbose {
        print!("{uart}");
        println!("--- QEMU run end ---");
        println!("PASS: Semihosting and UART output is equal");
        return Ok(true);
    }

    check_expected(example, &uart, opts)
}

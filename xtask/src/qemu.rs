//! QEMU runner for Cortex-M3 emulation.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{Context, Result, bail};
use tempfile::NamedTempFile;

/// Output from running QEMU.
pub struct QemuOutput {
    /// Semihosting stdout (defmt mirror, when the example logs through defmt).
    pub semihosting: Vec<u8>,
    /// Everything the driver sent through UART0.
    pub uart: Vec<u8>,
}

/// Run an ELF in QEMU on the LM3S6965 evaluation board.
pub fn run_qemu(elf_path: &Path) -> Result<QemuOutput> {
    let uart_file = NamedTempFile::new().context("Failed to create temp file for UART0")?;
    let uart_path = uart_file.path();

    let output = Command::new("qemu-system-arm")
        .arg("-cpu")
        .arg("cortex-m3")
        .arg("-machine")
        .arg("lm3s6965evb")
        .arg("-nographic")
        .arg("-monitor")
        .arg("none")
        .arg("-semihosting-config")
        .arg("enable=on,target=native")
        .arg("-serial")
        .arg(format!("file:{}", uart_path.display()))
        .arg("-kernel")
        .arg(elf_path)
        .stdin(Stdio::null())
        .output()
        .context("Failed to run QEMU")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "QEMU exited with error: {:?}\n{}",
            output.status.code(),
            stderr
        );
    }

    let uart = fs::read(uart_path).context("Failed to read UART0 output")?;

    Ok(QemuOutput {
        semihosting: output.stdout,
        uart,
    })
}

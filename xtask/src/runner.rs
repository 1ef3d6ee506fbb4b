//! Test runner dispatch and common types.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::build::{build_example, project_root};
use crate::standard::run_standard;
use crate::text::run_text;

/// Test mode detected from file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestMode {
    /// defmt test: decode semihosting and UART streams, both must match.
    Standard,
    /// Plain text test: the raw UART stream is compared as-is.
    Text,
}

/// Options for running an example.
pub struct RunOptions {
    /// Print verbose output (for `qemu` command).
    pub verbose: bool,
    /// Update expected files instead of comparing (for `test --bless`).
    pub bless: bool,
    /// Build in release mode.
    pub release: bool,
}

/// Detect test mode from file header.
///
/// Looks for `@test-mode: <mode>` in the first few lines.
fn detect_test_mode(example_path: &Path) -> TestMode {
    if let Ok(content) = fs::read_to_string(example_path) {
        for line in content.lines().take(10) {
            if let Some(mode) = line.strip_prefix("//! @test-mode:") {
                if mode.trim() == "text" {
                    return TestMode::Text;
                }
            }
        }
    }
    TestMode::Standard
}

/// Path of the expected output file for `example`.
pub fn expected_path(example: &str) -> PathBuf {
    project_root()
        .join("testsuite")
        .join("expected")
        .join(format!("{example}.expected"))
}

/// Compare `actual` against the expected file, or write it when blessing.
///
/// Returns `Ok(true)` if the output matched (or was blessed).
pub fn check_expected(example: &str, actual: &str, opts: &RunOptions) -> Result<bool> {
    let expected_path = expected_path(example);

    if opts.bless {
        let filename = expected_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        let status = if expected_path.exists() {
            let existing = fs::read_to_string(&expected_path)?;
            if existing == actual {
                "No change"
            } else {
                fs::write(&expected_path, actual)?;
                "Updated"
            }
        } else {
            if let Some(dir) = expected_path.parent() {
                fs::create_dir_all(dir)?;
            }
            fs::write(&expected_path, actual)?;
            "Created"
        };
        println!("  {filename}: {status}");
        return Ok(true);
    }

    if !expected_path.exists() {
        println!("  No expected output file, run with --bless to create");
        println!("--- output ---");
        print!("{actual}");
        return Ok(false);
    }

    let expected = fs::read_to_string(&expected_path)
        .with_context(|| format!("Failed to read {}", expected_path.display()))?;
    if actual == expected {
        println!("  PASS");
        Ok(true)
    } else {
        println!("  FAIL: output differs from expected");
        println!("--- expected ---");
        print!("{expected}");
        println!("--- actual ---");
        print!("{actual}");
        Ok(false)
    }
}

/// Run an example with the given options.
///
/// Returns `Ok(true)` if the test passed, `Ok(false)` if it failed.
pub fn run_example(example: &str, opts: &RunOptions) -> Result<bool> {
    let example_path = project_root()
        .join("testsuite")
        .join("examples")
        .join(format!("{example}.rs"));
    let test_mode = detect_test_mode(&example_path);

    println!("Building '{example}'...");
    let elf_path = build_example(example, opts.release)?;

    match test_mode {
        TestMode::Standard => run_standard(example, &elf_path, opts),
        TestMode::Text => run_text(example, &elf_path, opts),
    }
}

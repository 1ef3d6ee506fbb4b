//! Semihosting output for QEMU testing.
//!
//! When the `qemu-test` feature is enabled, every encoded defmt byte is also
//! written to semihosting stdout, so a test harness can compare what went out
//! over the UART against a reference stream.

use core::cell::UnsafeCell;
use cortex_m_semihosting::hio::{self, HostStream};

static STDOUT: SyncCell<Option<HostStream>> = SyncCell(UnsafeCell::new(None));

struct SyncCell<T>(UnsafeCell<T>);

// SAFETY: Only accessed inside the critical section taken in `write`.
unsafe impl<T> Sync for SyncCell<T> {}

/// Writes bytes to semihosting stdout.
pub(crate) fn write(bytes: &[u8]) {
    critical_section::with(|_| {
        // SAFETY: We are in a critical section and the reference does not escape it.
        let handle = unsafe { &mut *STDOUT.0.get() };

        // Lazily open stdout once, reopening would truncate the host file.
        if handle.is_none() {
            *handle = hio::hstdout().ok();
        }

        if let Some(stdout) = handle {
            let _ = stdout.write_all(bytes);
        }
    });
}

#![no_std]
#![warn(missing_docs)]
#![doc = include_str!("../README.md")]

#[cfg(test)]
extern crate std;

pub use buffer::{AppendError, FillState};
pub use driver::{PingPong, Symbol, Writer};
pub use state::{Slot, TxState};
pub use transmit::Transmit;

#[cfg(feature = "async-await")]
pub(crate) mod atomic_waker;
mod buffer;
mod driver;
#[cfg(feature = "defmt-logger")]
pub(crate) mod logger;
mod state;
mod transmit;

/// Error returned by [`init`] when initialization fails.
#[cfg(feature = "defmt-logger")]
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum InitError {
    /// [`init`] has already been called.
    AlreadyInitialized,
}

/// Route defmt output through `driver`.
///
/// Every defmt log becomes one message: its encoded bytes are staged in the
/// driver and handed to the hardware when the log statement ends.
///
/// Log only from contexts that the driver's completion interrupt can preempt.
/// When both buffers are full the logging context waits for that interrupt.
///
/// # Errors
///
/// Returns [`InitError::AlreadyInitialized`] if called more than once.
#[cfg(feature = "defmt-logger")]
pub fn init<T: Transmit + Send + 'static, const N: usize>(
    driver: &'static PingPong<T, N>,
) -> Result<(), InitError> {
    use core::sync::atomic::{AtomicBool, Ordering};

    static INITIALIZED: AtomicBool = AtomicBool::new(false);

    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(InitError::AlreadyInitialized);
    }

    // SAFETY: The atomic swap guarantees this is called only once.
    unsafe { logger::LOGGER_STATE.initialize(driver) };

    Ok(())
}

use crate::{PingPong, Transmit};
use core::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};
use defmt::Encoder;

#[cfg(feature = "qemu-test")]
mod semihosting;

/// Type-erased driver, so the logger state does not depend on the driver's
/// hardware type or capacity.
pub(crate) trait FrameSink: Sync {
    fn write(&self, bytes: &[u8]);
    fn end_frame(&self);
}

impl<T: Transmit + Send, const N: usize> FrameSink for PingPong<T, N> {
    #[inline]
    fn write(&self, bytes: &[u8]) {
        PingPong::write(self, bytes);
    }

    #[inline]
    fn end_frame(&self) {
        self.end_message();
    }
}

#[defmt::global_logger]
struct Logger;

pub(crate) struct LoggerState {
    sink: UnsafeCell<MaybeUninit<&'static dyn FrameSink>>,
    encoder: UnsafeCell<Encoder>,
    initialized: AtomicBool,
    /// Reentrancy depth counter. 0 = not logging, 1 = logging (owner), 2+ = reentrant.
    /// Reentrant calls (from an interrupt preempting a log, or a panic during
    /// logging) are silently dropped.
    depth: AtomicUsize,
}

impl LoggerState {
    pub(crate) const fn new() -> Self {
        Self {
            sink: UnsafeCell::new(MaybeUninit::uninit()),
            encoder: UnsafeCell::new(Encoder::new()),
            initialized: AtomicBool::new(false),
            depth: AtomicUsize::new(0),
        }
    }

    /// # Safety
    ///
    /// Must only be called once per program execution.
    pub(crate) unsafe fn initialize(&self, sink: &'static dyn FrameSink) {
        // SAFETY: The caller guarantees this is called only once, so there is no data race
        // on the `sink` field.
        unsafe { self.sink.get().write(MaybeUninit::new(sink)) };
        // Release: ensures the write to `sink` is visible before `initialized` becomes true.
        self.initialized.store(true, Ordering::Release);
    }

    #[inline]
    fn sink(&self) -> Option<&'static dyn FrameSink> {
        // Acquire: synchronizes with the Release store in `initialize`.
        if self.initialized.load(Ordering::Acquire) {
            // SAFETY: The Acquire load ensures `sink` is initialized, and it is
            // never written again.
            Some(unsafe { self.sink.get().read().assume_init() })
        } else {
            None
        }
    }

    /// Writes encoded data to the driver and, for QEMU tests, to semihosting.
    #[inline(always)]
    fn write_all(&self, data: &[u8]) {
        if let Some(sink) = self.sink() {
            sink.write(data);
        }
        #[cfg(feature = "qemu-test")]
        semihosting::write(data);
    }

    #[inline]
    fn end_frame(&self) {
        if let Some(sink) = self.sink() {
            sink.end_frame();
        }
    }

    fn acquire(&self) {
        let was_depth = self.depth.fetch_add(1, Ordering::Acquire);
        if was_depth > 0 {
            return;
        }

        // SAFETY: depth 1 grants exclusive access to `encoder`.
        unsafe { &mut *self.encoder.get() }.start_frame(|b| self.write_all(b));
    }

    /// # Safety
    ///
    /// Must be called between `acquire` and `release`.
    unsafe fn flush(&self) {
        if self.depth.load(Ordering::Relaxed) != 1 {
            return;
        }

        // Hand whatever is staged to the hardware now.
        self.end_frame();
    }

    /// # Safety
    ///
    /// Must be paired with a preceding `acquire`.
    unsafe fn release(&self) {
        // The frame is finished before giving up ownership, so a context that
        // acquires right after the decrement starts on a clean encoder.
        if self.depth.load(Ordering::Relaxed) == 1 {
            // SAFETY: depth 1 grants exclusive access to `encoder`.
            unsafe { &mut *self.encoder.get() }.end_frame(|b| self.write_all(b));
            self.end_frame();
        }

        self.depth.fetch_sub(1, Ordering::Release);
    }

    /// # Safety
    ///
    /// Must be called between `acquire` and `release`.
    unsafe fn write(&self, bytes: &[u8]) {
        if self.depth.load(Ordering::Relaxed) != 1 {
            return;
        }

        // SAFETY: depth 1 grants exclusive access to `encoder`.
        unsafe { &mut *self.encoder.get() }.write(bytes, |b| self.write_all(b));
    }
}

// SAFETY:
// - `sink` is written once before `initialized` is set and only read afterwards.
// - `encoder` is only touched by the context holding depth 1, and nothing else
//   runs that context's code while it is preempted.
unsafe impl Sync for LoggerState {}

pub(crate) static LOGGER_STATE: LoggerState = LoggerState::new();

// SAFETY: This impl upholds the `defmt::Logger` safety contract:
// - Only the context that raised `depth` from 0 to 1 touches the encoder or the driver.
// - Any other context entering while a log is in progress sees depth > 1 and is dropped.
//
// No critical section is held across a log: the driver may wait for its
// completion interrupt when both buffers are full.
unsafe impl defmt::Logger for Logger {
    fn acquire() {
        LOGGER_STATE.acquire();
    }

    unsafe fn flush() {
        // SAFETY: defmt calls this between acquire() and release().
        unsafe { LOGGER_STATE.flush() };
    }

    unsafe fn release() {
        // SAFETY: defmt pairs every release() with an acquire().
        unsafe { LOGGER_STATE.release() };
    }

    unsafe fn write(bytes: &[u8]) {
        // SAFETY: defmt calls this between acquire() and release().
        unsafe { LOGGER_STATE.write(bytes) };
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::vec::Vec;

    static STARTED: StdMutex<Vec<Vec<u8>>> = StdMutex::new(Vec::new());

    struct RecordingUart;

    impl Transmit for RecordingUart {
        fn start_tx(&mut self, bytes: &[u8]) {
            STARTED.lock().unwrap().push(bytes.to_vec());
        }

        fn stop_tx(&mut self) {}
    }

    static DRIVER: PingPong<RecordingUart, 64> = PingPong::new(RecordingUart);

    #[test]
    fn nested_log_is_dropped() {
        let state = LoggerState::new();
        // SAFETY: `state` is local and initialized once.
        unsafe { state.initialize(&DRIVER) };

        state.acquire();
        // SAFETY: Calls are correctly nested between acquire and release.
        unsafe {
            state.write(&[1, 2, 3]);

            // A preempting log.
            state.acquire();
            state.write(&[9, 9, 9, 9]);
            state.release();

            state.write(&[4]);
            state.release();
        }

        let frames = STARTED.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].is_empty());
        assert!(!frames[0].contains(&9));
        assert_eq!(state.depth.load(Ordering::SeqCst), 0);
    }
}

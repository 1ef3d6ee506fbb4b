//! The ping/pong coordinator.
//!
//! One producer (foreground code, one call per output byte) fills the staging
//! buffer while the peripheral drains the active one. The completion interrupt
//! retires the active buffer and, if the staging buffer has been sealed in the
//! meantime, starts it right away, so transmissions strictly alternate between
//! the two slots.

use crate::buffer::{FillState, TxBuffer};
use crate::state::{AtomicTxState, Slot, TxState};
use crate::transmit::Transmit;
use core::{cell::RefCell, fmt};
use critical_section::Mutex;

/// One unit of producer input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Symbol {
    /// An output byte.
    Byte(u8),
    /// No more bytes belong to the current message: hand it to the hardware.
    EndOfMessage,
}

struct Shared<T, const N: usize> {
    buffers: [TxBuffer<N>; 2],
    hw: T,
}

/// Outcome of one attempt to place a byte.
enum Step {
    Appended,
    /// The staging buffer was sealed and started; retry against the new one.
    Rotated,
    /// Both buffers are taken, wait for the hardware to leave this state.
    Wait(TxState),
}

/// Double-buffered transmit driver with two buffers of `N` bytes.
///
/// Meant to live in a `static` so that both the producer and the peripheral's
/// interrupt handler can reach it:
///
/// ```ignore
/// static UART: PingPong<MyUarte, 128> = PingPong::new(MyUarte);
///
/// #[interrupt]
/// fn UARTE0() {
///     // after clearing the ENDTX event
///     UART.on_transmit_complete();
/// }
///
/// UART.print(format_args!("t = {}\n", now));
/// ```
///
/// Only a single context may produce at a time. The driver never loses or
/// reorders bytes, but interleaved producers would interleave their messages.
pub struct PingPong<T, const N: usize> {
    shared: Mutex<RefCell<Shared<T, N>>>,
    state: AtomicTxState,
    #[cfg(feature = "async-await")]
    waker: crate::atomic_waker::AtomicWaker,
}

impl<T: Transmit, const N: usize> PingPong<T, N> {
    /// Creates a driver with both buffers empty and the hardware idle.
    pub const fn new(hw: T) -> Self {
        const { assert!(N > 0, "buffer capacity must be non-zero") };
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                buffers: [TxBuffer::new(), TxBuffer::new()],
                hw,
            })),
            state: AtomicTxState::new(TxState::PingDone),
            #[cfg(feature = "async-await")]
            waker: crate::atomic_waker::AtomicWaker::new(),
        }
    }

    /// Capacity of each of the two buffers.
    pub const fn capacity(&self) -> usize {
        N
    }

    /// Producer entry point: feed one byte or end the current message.
    pub fn sink(&self, symbol: Symbol) {
        match symbol {
            Symbol::Byte(byte) => self.push(byte),
            Symbol::EndOfMessage => self.end_message(),
        }
    }

    /// Feeds every byte of `bytes`, without ending the message.
    pub fn write(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(byte);
        }
    }

    /// Formats `args` and ends the message.
    ///
    /// The message is handed to the hardware even if a `Display` impl fails
    /// part way; the error is still returned.
    pub fn print(&self, args: fmt::Arguments<'_>) -> fmt::Result {
        let res = fmt::Write::write_fmt(&mut self.writer(), args);
        self.end_message();
        res
    }

    /// A [`fmt::Write`] adapter. Call [`PingPong::end_message`] when done.
    pub fn writer(&self) -> Writer<'_, T, N> {
        Writer { driver: self }
    }

    /// Seals the staging buffer.
    ///
    /// If the hardware is idle the transmission starts right away, otherwise
    /// the completion handler picks the buffer up. Does nothing if no bytes
    /// have been staged since the last message.
    pub fn end_message(&self) {
        critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);
            let state = self.state.load();
            let staging = state.staging();

            let buf = &mut shared.buffers[staging.index()];
            if buf.state() != FillState::Filling {
                return;
            }
            buf.mark_filled();

            if state.is_idle() {
                self.begin_transmission(&mut shared, staging);
            }
        });
    }

    /// Stages one byte.
    ///
    /// When the staging buffer has no room this seals it and either starts it
    /// (hardware idle) or spins until the completion interrupt has retired the
    /// active buffer, then retries against the freed slot.
    fn push(&self, byte: u8) {
        loop {
            let step = critical_section::with(|cs| {
                let mut shared = self.shared.borrow_ref_mut(cs);
                let state = self.state.load();
                let staging = state.staging();

                let buf = &mut shared.buffers[staging.index()];
                if buf.append(byte).is_ok() {
                    return Step::Appended;
                }
                buf.mark_filled();

                if state.is_idle() {
                    self.begin_transmission(&mut shared, staging);
                    Step::Rotated
                } else {
                    Step::Wait(state)
                }
            });

            match step {
                Step::Appended => return,
                Step::Rotated => {}
                Step::Wait(busy) => self.wait_while(busy),
            }
        }
    }

    /// Spins outside of any critical section so the completion interrupt can run.
    fn wait_while(&self, busy: TxState) {
        while self.state.load() == busy {
            core::hint::spin_loop();
        }
    }

    /// Hands `slot` to the hardware and marks it active.
    ///
    /// `slot` must be [`FillState::Filled`].
    fn begin_transmission(&self, shared: &mut Shared<T, N>, slot: Slot) {
        let Shared { buffers, hw } = shared;
        let buf = &buffers[slot.index()];

        debug_assert_eq!(
            buf.state(),
            FillState::Filled,
            "transmission started from an unsealed buffer"
        );
        if buf.state() != FillState::Filled {
            return;
        }

        hw.start_tx(buf.as_bytes());
        self.state.store(TxState::transmitting(slot));
    }

    /// Completion handler, call once per finished transmission from the
    /// peripheral's interrupt.
    ///
    /// Retires the active buffer, then either starts the other one if it was
    /// sealed meanwhile or idles the peripheral. A call while the hardware is
    /// already idle is ignored.
    pub fn on_transmit_complete(&self) {
        let idled = critical_section::with(|cs| {
            let state = self.state.load();
            if state.is_idle() {
                return false;
            }
            let current = state.slot();
            let other = current.other();

            let mut shared = self.shared.borrow_ref_mut(cs);
            shared.buffers[current.index()].reset();

            if shared.buffers[other.index()].state() == FillState::Filled {
                self.begin_transmission(&mut shared, other);
                false
            } else {
                self.state.store(TxState::done(current));
                shared.hw.stop_tx();
                true
            }
        });

        if idled {
            #[cfg(feature = "async-await")]
            self.waker.wake();
        }
    }

    /// Current coordinator state.
    #[inline]
    pub fn state(&self) -> TxState {
        self.state.load()
    }

    /// `true` if no transmission is in flight.
    #[inline]
    pub fn hardware_idle(&self) -> bool {
        self.state.load().is_idle()
    }

    /// Fill state of one of the two buffers.
    pub fn fill_state(&self, slot: Slot) -> FillState {
        critical_section::with(|cs| self.shared.borrow_ref(cs).buffers[slot.index()].state())
    }

    /// Number of bytes held by one of the two buffers.
    pub fn staged_len(&self, slot: Slot) -> usize {
        critical_section::with(|cs| self.shared.borrow_ref(cs).buffers[slot.index()].len())
    }

    /// `true` once the hardware is idle and nothing is staged.
    pub fn is_drained(&self) -> bool {
        critical_section::with(|cs| {
            let state = self.state.load();
            state.is_idle()
                && self.shared.borrow_ref(cs).buffers[state.staging().index()].state()
                    == FillState::Empty
        })
    }

    #[cfg(feature = "async-await")]
    /// Waits until everything handed to the hardware has been transmitted.
    ///
    /// Bytes of an unfinished message keep this pending, end the message first.
    pub async fn drained(&self) {
        core::future::poll_fn(|cx| {
            self.waker.register(cx.waker());

            if self.is_drained() {
                core::task::Poll::Ready(())
            } else {
                core::task::Poll::Pending
            }
        })
        .await
    }
}

/// [`fmt::Write`] adapter returned by [`PingPong::writer`].
pub struct Writer<'a, T, const N: usize> {
    driver: &'a PingPong<T, N>,
}

impl<T: Transmit, const N: usize> fmt::Write for Writer<'_, T, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.driver.write(s.as_bytes());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::vec::Vec;

    /// Records what the driver asked the peripheral to do.
    #[derive(Default)]
    struct Wire {
        /// Buffer address and contents of every started transmission.
        starts: StdMutex<Vec<(usize, Vec<u8>)>>,
        stops: AtomicUsize,
    }

    impl Wire {
        fn started(&self) -> usize {
            self.starts.lock().unwrap().len()
        }

        fn payloads(&self) -> Vec<Vec<u8>> {
            self.starts
                .lock()
                .unwrap()
                .iter()
                .map(|(_, bytes)| bytes.clone())
                .collect()
        }

        fn stops(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }

        fn assert_alternating(&self) {
            let starts = self.starts.lock().unwrap();
            for pair in starts.windows(2) {
                assert_ne!(pair[0].0, pair[1].0, "same slot transmitted twice in a row");
            }
        }
    }

    struct MockUart<'a>(&'a Wire);

    impl Transmit for MockUart<'_> {
        fn start_tx(&mut self, bytes: &[u8]) {
            assert!(!bytes.is_empty(), "zero length transmission");
            self.0
                .starts
                .lock()
                .unwrap()
                .push((bytes.as_ptr() as usize, bytes.to_vec()));
        }

        fn stop_tx(&mut self) {
            self.0.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Acts as the peripheral: completes every started transmission until
    /// `done` is set and nothing is in flight.
    fn run_hardware<const N: usize>(
        drv: &PingPong<MockUart<'_>, N>,
        wire: &Wire,
        done: &AtomicBool,
    ) {
        let mut completed = 0;
        loop {
            if completed < wire.started() {
                drv.on_transmit_complete();
                completed += 1;
            } else if done.load(Ordering::SeqCst) {
                break;
            } else {
                std::thread::yield_now();
            }
        }
    }

    #[test]
    fn first_message_starts_immediately() {
        let wire = Wire::default();
        let drv = PingPong::<_, 128>::new(MockUart(&wire));

        drv.write(b"HELLO");
        assert_eq!(wire.started(), 0);
        drv.end_message();

        assert_eq!(wire.payloads(), [b"HELLO".to_vec()]);
        assert_eq!(drv.state(), TxState::PongTx);
        assert_eq!(drv.fill_state(Slot::Pong), FillState::Filled);
        assert_eq!(drv.staged_len(Slot::Pong), 5);
        assert!(!drv.hardware_idle());
    }

    #[test]
    fn full_buffer_flushes_before_next_byte() {
        let wire = Wire::default();
        let drv = PingPong::<_, 4>::new(MockUart(&wire));

        drv.write(b"abcd");
        assert_eq!(wire.started(), 0);
        assert_eq!(drv.staged_len(Slot::Pong), 4);

        drv.sink(Symbol::Byte(b'e'));
        assert_eq!(wire.payloads(), [b"abcd".to_vec()]);
        assert_eq!(drv.state(), TxState::PongTx);
        assert_eq!(drv.fill_state(Slot::Ping), FillState::Filling);
        assert_eq!(drv.staged_len(Slot::Ping), 1);
    }

    #[test]
    fn message_waits_for_active_buffer() {
        let wire = Wire::default();
        let drv = PingPong::<_, 128>::new(MockUart(&wire));

        drv.write(b"HELLO");
        drv.sink(Symbol::EndOfMessage);
        drv.write(b"WORLD");
        drv.sink(Symbol::EndOfMessage);

        assert_eq!(wire.started(), 1);
        assert_eq!(drv.fill_state(Slot::Ping), FillState::Filled);
        assert_eq!(drv.state(), TxState::PongTx);

        drv.on_transmit_complete();
        assert_eq!(wire.payloads(), [b"HELLO".to_vec(), b"WORLD".to_vec()]);
        assert_eq!(drv.state(), TxState::PingTx);
        assert_eq!(drv.fill_state(Slot::Pong), FillState::Empty);
        assert_eq!(drv.staged_len(Slot::Pong), 0);
        assert_eq!(wire.stops(), 0);

        drv.on_transmit_complete();
        assert_eq!(drv.state(), TxState::PingDone);
        assert_eq!(wire.stops(), 1);
        assert!(drv.is_drained());
    }

    #[test]
    fn idle_driver_never_stops_peripheral() {
        let wire = Wire::default();
        let drv = PingPong::<_, 8>::new(MockUart(&wire));

        drv.end_message();
        drv.on_transmit_complete();

        assert_eq!(wire.started(), 0);
        assert_eq!(wire.stops(), 0);
        assert_eq!(drv.state(), TxState::PingDone);
        assert!(drv.is_drained());
    }

    #[test]
    fn empty_message_while_busy_is_ignored() {
        let wire = Wire::default();
        let drv = PingPong::<_, 8>::new(MockUart(&wire));

        drv.write(b"x");
        drv.end_message();
        drv.end_message();
        assert_eq!(drv.fill_state(Slot::Ping), FillState::Empty);

        drv.on_transmit_complete();
        assert_eq!(wire.payloads(), [b"x".to_vec()]);
        assert_eq!(wire.stops(), 1);
    }

    #[test]
    fn idle_then_resume_uses_other_slot() {
        let wire = Wire::default();
        let drv = PingPong::<_, 8>::new(MockUart(&wire));

        for msg in [&b"one"[..], &b"two"[..], &b"three"[..]] {
            drv.write(msg);
            drv.end_message();
            drv.on_transmit_complete();
            assert!(drv.hardware_idle());
        }

        assert_eq!(
            wire.payloads(),
            [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
        assert_eq!(wire.stops(), 3);
        wire.assert_alternating();
        assert_eq!(drv.state(), TxState::PongDone);
    }

    #[test]
    fn print_formats_and_sends() {
        let wire = Wire::default();
        let drv = PingPong::<_, 16>::new(MockUart(&wire));

        drv.print(format_args!("x={} y={:02}", 42, 7)).unwrap();

        assert_eq!(wire.payloads(), [b"x=42 y=07".to_vec()]);
    }

    #[test]
    fn producer_stalls_until_completion() {
        let wire = Wire::default();
        let drv = PingPong::<_, 4>::new(MockUart(&wire));

        drv.write(b"ab");
        drv.end_message();
        assert_eq!(drv.state(), TxState::PongTx);

        std::thread::scope(|s| {
            s.spawn(|| {
                // Complete only once the producer has filled the other buffer
                // and is about to stall.
                while drv.staged_len(Slot::Ping) < 4 {
                    std::thread::yield_now();
                }
                std::thread::sleep(std::time::Duration::from_millis(20));
                drv.on_transmit_complete();
            });

            drv.write(b"cdefg");
        });

        assert_eq!(wire.payloads(), [b"ab".to_vec(), b"cdef".to_vec()]);
        assert_eq!(drv.state(), TxState::PingTx);
        assert_eq!(drv.fill_state(Slot::Pong), FillState::Filling);
        assert_eq!(drv.staged_len(Slot::Pong), 1);
    }

    #[test]
    fn byte_after_sealed_message_waits_for_completion() {
        let wire = Wire::default();
        let drv = PingPong::<_, 4>::new(MockUart(&wire));

        drv.write(b"ab");
        drv.end_message();
        drv.write(b"cd");
        drv.end_message();
        assert_eq!(drv.state(), TxState::PongTx);
        assert_eq!(drv.fill_state(Slot::Ping), FillState::Filled);

        let released = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(20));
                released.store(true, Ordering::SeqCst);
                drv.on_transmit_complete();
            });

            drv.sink(Symbol::Byte(b'e'));
            assert!(released.load(Ordering::SeqCst));
        });

        assert_eq!(wire.payloads(), [b"ab".to_vec(), b"cd".to_vec()]);
        assert_eq!(drv.state(), TxState::PingTx);
        assert_eq!(drv.fill_state(Slot::Pong), FillState::Filling);
        assert_eq!(drv.staged_len(Slot::Pong), 1);
        assert_eq!(wire.stops(), 0);
    }

    /// A detached buffer pair, so `begin_transmission` can be called without
    /// going through the driver's own buffers.
    fn detached<'a>(wire: &'a Wire) -> Shared<MockUart<'a>, 4> {
        Shared {
            buffers: [TxBuffer::new(), TxBuffer::new()],
            hw: MockUart(wire),
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "unsealed buffer")]
    fn starting_unsealed_buffer_panics_in_debug() {
        let wire = Wire::default();
        let drv = PingPong::<_, 4>::new(MockUart(&wire));
        let mut shared = detached(&wire);

        drv.begin_transmission(&mut shared, Slot::Ping);
    }

    #[cfg(not(debug_assertions))]
    #[test]
    fn starting_unsealed_buffer_is_skipped_in_release() {
        let wire = Wire::default();
        let drv = PingPong::<_, 4>::new(MockUart(&wire));
        let mut shared = detached(&wire);

        drv.begin_transmission(&mut shared, Slot::Ping);

        assert_eq!(wire.started(), 0);
        assert_eq!(drv.state(), TxState::PingDone);
    }

    #[test]
    fn stream_is_delivered_in_order() {
        let wire = Wire::default();
        let drv = PingPong::<_, 8>::new(MockUart(&wire));
        let done = AtomicBool::new(false);

        let mut sent = Vec::new();
        std::thread::scope(|s| {
            s.spawn(|| run_hardware(&drv, &wire, &done));

            let mut seed: u32 = 0x1234_5678;
            for _ in 0..5000 {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let r = (seed >> 16) as u8;
                if r % 13 == 0 {
                    drv.sink(Symbol::EndOfMessage);
                } else {
                    drv.sink(Symbol::Byte(r));
                    sent.push(r);
                }
            }
            drv.end_message();

            while !drv.is_drained() {
                std::thread::yield_now();
            }
            done.store(true, Ordering::SeqCst);
        });

        let received: Vec<u8> = wire.payloads().concat();
        assert_eq!(received, sent);
        assert!(wire.payloads().iter().all(|p| p.len() <= 8));
        wire.assert_alternating();
    }

    #[cfg(feature = "async-await")]
    #[test]
    fn drained_resolves_after_last_completion() {
        use core::future::Future;
        use core::pin::pin;
        use core::task::{Context, Poll, Waker};

        let wire = Wire::default();
        let drv = PingPong::<_, 8>::new(MockUart(&wire));
        let mut cx = Context::from_waker(Waker::noop());

        drv.write(b"hi");
        drv.end_message();

        let mut fut = pin!(drv.drained());
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Pending);

        drv.on_transmit_complete();
        assert_eq!(fut.as_mut().poll(&mut cx), Poll::Ready(()));
    }
}

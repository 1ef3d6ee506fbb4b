//! UART0 of the LM3S6965 (QEMU) dressed up as a DMA transmitter.
//!
//! The LM3S6965 has no UART DMA, so `start_tx` pushes the bytes through the
//! transmit FIFO right away and then arms SysTick. Its exception plays the
//! "transmission complete" interrupt, which fires a while later, so the
//! producer really does run ahead of the hardware.
//!
//! QEMU serial port mapping: `qemu-system-arm ... -serial <uart0>`.

use core::ptr::{with_exposed_provenance, with_exposed_provenance_mut};
use core::sync::atomic::{AtomicUsize, Ordering};
use cortex_m::peripheral::syst::SystClkSource;
use pingpong_uart::Transmit;

const UART0_BASE: usize = 0x4000_C000;

const UART_DR_OFFSET: usize = 0x000; // Data Register
const UART_FR_OFFSET: usize = 0x018; // Flag Register
const UART_FR_TXFF: u32 = 0x20; // Transmit FIFO Full

/// Core clock cycles between `start_tx` and the completion exception.
const COMPLETION_DELAY: u32 = 20_000;

static STARTS: AtomicUsize = AtomicUsize::new(0);
static STOPS: AtomicUsize = AtomicUsize::new(0);

fn write_byte(byte: u8) {
    let dr = with_exposed_provenance_mut::<u32>(UART0_BASE + UART_DR_OFFSET);
    let fr = with_exposed_provenance::<u32>(UART0_BASE + UART_FR_OFFSET);
    unsafe {
        while fr.read_volatile() & UART_FR_TXFF != 0 {}
        dr.write_volatile(byte as u32);
    }
}

/// UART0 transmitter whose completion is signalled through SysTick.
pub struct QemuUart;

impl QemuUart {
    pub const fn new() -> Self {
        QemuUart
    }
}

impl Transmit for QemuUart {
    fn start_tx(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            write_byte(byte);
        }
        STARTS.fetch_add(1, Ordering::Relaxed);

        // SAFETY: SysTick is used by nothing but this transmitter.
        let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
        syst.set_clock_source(SystClkSource::Core);
        syst.set_reload(COMPLETION_DELAY);
        syst.clear_current();
        syst.enable_interrupt();
        syst.enable_counter();
    }

    fn stop_tx(&mut self) {
        STOPS.fetch_add(1, Ordering::Relaxed);
    }
}

/// Disarms SysTick, call first thing in the SysTick exception.
pub fn completion_fired() {
    // SAFETY: SysTick is used by nothing but this transmitter.
    let mut syst = unsafe { cortex_m::Peripherals::steal() }.SYST;
    syst.disable_interrupt();
    syst.disable_counter();
}

/// Number of transmissions started so far.
pub fn starts() -> usize {
    STARTS.load(Ordering::Relaxed)
}

/// Number of times the driver idled the peripheral.
pub fn stops() -> usize {
    STOPS.load(Ordering::Relaxed)
}

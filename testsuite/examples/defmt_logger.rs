//! Logs through the defmt global logger backed by the driver.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use testsuite::{UART, exit_success, wait_drained};

#[exception]
fn SysTick() {
    testsuite::on_systick();
}

#[entry]
fn main() -> ! {
    pingpong_uart::init(&UART).unwrap();

    defmt::info!("Hello from pingpong-uart!");
    defmt::debug!("capacity = {}", UART.capacity());
    for i in 0..3u32 {
        defmt::trace!("iteration {}", i);
    }
    defmt::warn!("spans several buffers: {}", [1u8, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);

    wait_drained();
    exit_success();
}

//! @test-mode: text
//!
//! Prints a handful of messages, the first one longer than a buffer.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use testsuite::{UART, exit_failure, exit_success, uart, wait_drained};

#[exception]
fn SysTick() {
    testsuite::on_systick();
}

#[entry]
fn main() -> ! {
    UART.print(format_args!("Hello from pingpong-uart!\n")).ok();
    for i in 0..3 {
        UART.print(format_args!("message {i} of 3\n")).ok();
    }

    wait_drained();

    // The peripheral has been idled at least once the queue ran dry.
    if uart::stops() == 0 {
        exit_failure();
    }
    exit_success();
}

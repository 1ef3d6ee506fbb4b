//! @test-mode: text
//!
//! A single message many times the buffer capacity. The producer outruns the
//! UART and has to wait for completions; every byte must still come out once,
//! in order, in transmissions of exactly one buffer each.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use testsuite::{CAPACITY, UART, exit_failure, exit_success, uart, wait_drained};

const LINE: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz\n";
const LINES: usize = 8;

#[exception]
fn SysTick() {
    testsuite::on_systick();
}

#[entry]
fn main() -> ! {
    for _ in 0..LINES {
        UART.write(LINE);
    }
    UART.end_message();

    wait_drained();

    let starts = uart::starts();
    if starts != (LINE.len() * LINES).div_ceil(CAPACITY) {
        exit_failure();
    }

    UART.print(format_args!("{starts} transmissions\n")).ok();
    wait_drained();
    exit_success();
}

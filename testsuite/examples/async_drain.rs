//! @test-mode: text
//!
//! Awaits `PingPong::drained` while another task keeps producing.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception};
use testsuite::{UART, block_on, exit_failure, exit_success, join, yield_once};

#[exception]
fn SysTick() {
    testsuite::on_systick();
}

async fn writer_task() {
    for i in 0..3 {
        UART.print(format_args!("async message {i}\n")).ok();
        yield_once().await;
    }
}

async fn waiter_task() {
    // Let the writer get ahead before waiting.
    yield_once().await;
    UART.drained().await;
}

#[entry]
fn main() -> ! {
    block_on(join(writer_task(), waiter_task()));
    block_on(UART.drained());

    UART.print(format_args!("all drained\n")).ok();
    block_on(UART.drained());

    if !UART.is_drained() {
        exit_failure();
    }
    exit_success();
}

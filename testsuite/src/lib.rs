#![no_std]

pub mod uart;

use core::future::Future;
use core::pin::pin;
use core::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};
use cortex_m_semihosting::debug::{self, EXIT_FAILURE, EXIT_SUCCESS};
use pingpong_uart::PingPong;
use panic_semihosting as _;

pub use cortex_m_rt::{entry, exception};
pub use uart::QemuUart;

/// Buffer capacity used by the examples. Small, so that ordinary messages
/// overflow the staging buffer and exercise the stall path.
pub const CAPACITY: usize = 16;

/// The driver under test. Examples must forward SysTick to [`on_systick`].
pub static UART: PingPong<QemuUart, CAPACITY> = PingPong::new(QemuUart::new());

/// Body of the SysTick exception: the simulated "transmission complete" interrupt.
pub fn on_systick() {
    uart::completion_fired();
    UART.on_transmit_complete();
}

/// Spin until every staged message has left the UART.
pub fn wait_drained() {
    while !UART.is_drained() {
        cortex_m::asm::nop();
    }
}

pub fn exit_success() -> ! {
    debug::exit(EXIT_SUCCESS);
    #[allow(clippy::empty_loop)]
    loop {}
}

pub fn exit_failure() -> ! {
    debug::exit(EXIT_FAILURE);
    #[allow(clippy::empty_loop)]
    loop {}
}

/// Yield once to allow other tasks to run.
pub async fn yield_once() {
    let mut yielded = false;
    core::future::poll_fn(|_cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            Poll::Pending
        }
    })
    .await
}

/// Minimal block_on executor for testing.
pub fn block_on<F: Future>(fut: F) -> F::Output {
    let mut fut = pin!(fut);

    // Create a no-op waker.
    const VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(core::ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    let raw_waker = RawWaker::new(core::ptr::null(), &VTABLE);
    let waker = unsafe { Waker::from_raw(raw_waker) };
    let mut cx = Context::from_waker(&waker);

    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(val) => return val,
            Poll::Pending => {
                cortex_m::asm::nop();
            }
        }
    }
}

/// Join two futures, polling them alternately until both complete.
pub async fn join<A, B, T, U>(a: A, b: B) -> (T, U)
where
    A: Future<Output = T>,
    B: Future<Output = U>,
{
    let mut a = pin!(a);
    let mut b = pin!(b);
    let mut a_done: Option<T> = None;
    let mut b_done: Option<U> = None;

    core::future::poll_fn(|cx| {
        if a_done.is_none() {
            if let Poll::Ready(val) = a.as_mut().poll(cx) {
                a_done = Some(val);
            }
        }
        if b_done.is_none() {
            if let Poll::Ready(val) = b.as_mut().poll(cx) {
                b_done = Some(val);
            }
        }
        if a_done.is_some() && b_done.is_some() {
            Poll::Ready((a_done.take().unwrap(), b_done.take().unwrap()))
        } else {
            Poll::Pending
        }
    })
    .await
}

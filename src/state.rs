//! Coordinator state shared between the producer and the completion interrupt.

use core::sync::atomic::{AtomicU8, Ordering};

/// One of the two buffer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum Slot {
    /// The first buffer.
    Ping = 0,
    /// The second buffer.
    Pong = 1,
}

impl Slot {
    /// The slot that is not `self`.
    #[inline]
    pub const fn other(self) -> Self {
        match self {
            Slot::Ping => Slot::Pong,
            Slot::Pong => Slot::Ping,
        }
    }

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

/// Which slot, if any, the hardware is currently draining.
///
/// `*Done` names the slot that was retired last; the hardware is idle. `*Tx`
/// names the slot under transmission. In both cases the producer stages into
/// the *other* slot, see [`TxState::staging`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum TxState {
    /// Idle, ping retired last (also the reset state).
    PingDone = 0,
    /// Transmitting from ping.
    PingTx = 1,
    /// Idle, pong retired last.
    PongDone = 2,
    /// Transmitting from pong.
    PongTx = 3,
}

impl TxState {
    #[inline]
    pub(crate) const fn transmitting(slot: Slot) -> Self {
        match slot {
            Slot::Ping => TxState::PingTx,
            Slot::Pong => TxState::PongTx,
        }
    }

    #[inline]
    pub(crate) const fn done(slot: Slot) -> Self {
        match slot {
            Slot::Ping => TxState::PingDone,
            Slot::Pong => TxState::PongDone,
        }
    }

    /// The slot this state refers to, the active one or the one retired last.
    #[inline]
    pub const fn slot(self) -> Slot {
        match self {
            TxState::PingDone | TxState::PingTx => Slot::Ping,
            TxState::PongDone | TxState::PongTx => Slot::Pong,
        }
    }

    /// The slot the producer appends into.
    ///
    /// While idle the slot named by `*Done` has just been reset (or was never
    /// used), so staging into the other one can never target a buffer that
    /// still belongs to the hardware.
    #[inline]
    pub const fn staging(self) -> Slot {
        self.slot().other()
    }

    /// `true` for the `*Done` states.
    #[inline]
    pub const fn is_idle(self) -> bool {
        matches!(self, TxState::PingDone | TxState::PongDone)
    }

    #[inline]
    const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => TxState::PingDone,
            1 => TxState::PingTx,
            2 => TxState::PongDone,
            _ => TxState::PongTx,
        }
    }
}

/// A [`TxState`] behind an atomic cell.
///
/// Only plain loads and stores are used, so this works on cores without
/// compare-and-swap. Writers are serialized by critical sections; the stall
/// loop reads without one.
pub(crate) struct AtomicTxState(AtomicU8);

impl AtomicTxState {
    pub(crate) const fn new(state: TxState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> TxState {
        // Acquire: pairs with the Release in `store` so the buffer contents
        // written before a transition are visible.
        TxState::from_bits(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, state: TxState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

//! Fixed-capacity transmit buffer.

/// Fill state of a [`TxBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum FillState {
    /// No bytes staged.
    Empty,
    /// The producer is appending bytes.
    Filling,
    /// Sealed. The length no longer changes until the buffer is reset.
    Filled,
}

/// Error returned by [`TxBuffer::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, defmt::Format)]
pub enum AppendError {
    /// The buffer already holds `N` bytes.
    Overflow,
    /// The buffer is [`FillState::Filled`] and waits for (or is in) transmission.
    Sealed,
}

/// A buffer of up to `N` bytes plus its fill state.
///
/// The invariants are:
/// - `len == 0` whenever the state is [`FillState::Empty`].
/// - `len` only grows while [`FillState::Filling`].
/// - `len` is frozen while [`FillState::Filled`], until [`TxBuffer::reset`].
pub(crate) struct TxBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
    state: FillState,
}

impl<const N: usize> TxBuffer<N> {
    pub(crate) const fn new() -> Self {
        Self {
            bytes: [0; N],
            len: 0,
            state: FillState::Empty,
        }
    }

    /// Stores `byte` after the already staged ones.
    #[inline]
    pub(crate) fn append(&mut self, byte: u8) -> Result<(), AppendError> {
        if self.state == FillState::Filled {
            return Err(AppendError::Sealed);
        }
        if self.len == N {
            return Err(AppendError::Overflow);
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        self.state = FillState::Filling;
        Ok(())
    }

    /// Seals the buffer. Sealing an empty buffer is a no-op.
    #[inline]
    pub(crate) fn mark_filled(&mut self) {
        if self.state == FillState::Filling {
            self.state = FillState::Filled;
        }
    }

    #[inline]
    pub(crate) fn reset(&mut self) {
        self.len = 0;
        self.state = FillState::Empty;
    }

    #[inline]
    pub(crate) fn state(&self) -> FillState {
        self.state
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// The staged bytes, in append order.
    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

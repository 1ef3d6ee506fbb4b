/// The peripheral side of the driver.
///
/// Implementations start an asynchronous (typically DMA driven) transmission
/// and arrange for [`crate::PingPong::on_transmit_complete`] to be called,
/// from the peripheral's interrupt, exactly once per started transmission.
///
/// Both methods are called from within a critical section, either by the
/// producer or by the completion handler.
pub trait Transmit {
    /// Begins transmitting `bytes` and returns immediately.
    ///
    /// `bytes` points into the driver's buffer and is left untouched until
    /// the completion for this transmission has been handled, so it is safe
    /// to hand its address and length to a DMA engine.
    fn start_tx(&mut self, bytes: &[u8]);

    /// Idles the peripheral, called when nothing more is pending.
    fn stop_tx(&mut self);
}

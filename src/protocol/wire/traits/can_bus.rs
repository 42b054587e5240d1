//! Minimal abstraction for an asynchronous CAN bus. Allows the engine to
//! plug into various implementations (embedded HAL, desktop driver, test
//! double).
use crate::protocol::wire::can_frame::CanFrame;
use futures_util::Future;

/// Contract to send and receive CAN frames asynchronously.
///
/// `send` is try-send semantics: implementations should fail fast (bus off,
/// full TX FIFO) rather than block; the command queue re-asserts failed
/// requests on the next service tick.
pub trait CanBus {
    type Error: core::fmt::Debug;
    /// Emit a frame on the bus. Asynchronous to accommodate non-blocking
    /// drivers; must not wait indefinitely on a faulty bus.
    fn send<'a>(
        &'a mut self,
        frame: &'a CanFrame,
    ) -> impl Future<Output = Result<(), Self::Error>> + 'a;
    /// Retrieve the next available frame. Asynchronously waits until data
    /// arrives. Implementations should be cancellation-safe: a frame must
    /// not be lost when the returned future is dropped before completion.
    fn recv<'a>(&'a mut self) -> impl Future<Output = Result<CanFrame, Self::Error>> + 'a;
}

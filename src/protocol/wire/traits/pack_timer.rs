//! Timer abstraction providing the timing primitives required by the
//! schedulers and timeout monitors.

/// Asynchronous delay plus a monotonic millisecond tick.
///
/// The tick is expected to wrap; every deadline comparison inside the
/// engine uses wrapping arithmetic, so a 32-bit rollover must not produce
/// spurious timeouts.
pub trait PackTimer {
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(&'a mut self, millis: u32) -> impl core::future::Future<Output = ()> + 'a;

    /// Milliseconds since an arbitrary epoch, monotonic, wrapping.
    fn now_ms(&self) -> u32;
}

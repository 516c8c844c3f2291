//! Timer abstraction providing the clock and delay primitives required by the
//! polling loop.
use embassy_time::Instant;

/// Timer trait abstraction; must remain thread-safe when applicable.
pub trait KorriTimer {
    /// Current time on a monotonic clock. Polling deadlines are compared against it.
    fn now(&self) -> Instant;
    /// Asynchronously wait for `millis` milliseconds.
    fn delay_ms<'a>(
        &'a mut self,
        millis: u32,
    ) -> impl core::future::Future<Output = ()> + 'a;
}

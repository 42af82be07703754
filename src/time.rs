//! Injected clock and cooperative-yield contracts.
//!
//! The engine never touches a platform clock or scheduler directly; both are
//! handed to [`Endpoint::new`](crate::Endpoint::new), which keeps the core
//! deterministic under test.

/// A monotonic millisecond clock.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin. Must never go backwards.
    fn now_ms(&self) -> u64;
}

/// Cooperative yield to other tasks.
///
/// Only [`Endpoint::acquire`](crate::Endpoint::acquire) and
/// [`RequestHandle::wait`](crate::RequestHandle::wait) call this; all other
/// operations return without yielding. On an RTOS this is a task delay, on a
/// bare-metal superloop it can simply return.
pub trait Delay {
    /// Relinquish the current task for roughly `ms` milliseconds.
    fn delay_ms(&self, ms: u32);
}

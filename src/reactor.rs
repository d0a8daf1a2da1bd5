//! Reactor abstraction consumed by the reader.
//!
//! The reader never talks to the operating system's readiness facility
//! directly; it goes through the [`Reactor`] trait. A production embedder
//! backs this with its event loop (epoll, kqueue, libev bindings, ...); the
//! [`lab`](crate::lab) module backs it with a deterministic virtual loop for
//! tests.
//!
//! # Model
//!
//! The trait captures the four capabilities the reader needs and nothing
//! more:
//!
//! | Capability | Purpose |
//! |------------|---------|
//! | [`arm_readable`](Reactor::arm_readable) | watch an fd, invoke the callback when it becomes readable |
//! | [`disarm_readable`](Reactor::disarm_readable) | stop watching an fd |
//! | [`schedule_next_turn`](Reactor::schedule_next_turn) | run a callback once, on a future loop turn |
//! | [`schedule_after`](Reactor::schedule_after) | run a callback once, after a delay (harness use) |
//!
//! All methods are invoked from the loop thread; implementations are free to
//! use interior mutability without locking. Callbacks registered here may
//! re-enter the reactor (arm, disarm, schedule), so implementations must not
//! hold internal borrows across a callback invocation.

use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Deferred work item, runs exactly once.
pub type TurnCallback = Box<dyn FnOnce()>;

/// Readiness callback, runs once per readability notification while armed.
pub type ReadableCallback = Rc<dyn Fn()>;

/// Event-loop capabilities the reader depends on.
///
/// Single-threaded by contract: every method is called from the loop thread,
/// and callbacks fire on that same thread. `schedule_next_turn` callbacks
/// must fire before readiness dispatch of the turn they run in, so a drain
/// continuation is never overtaken by a fresh socket read.
pub trait Reactor {
    /// Starts watching `fd` for readability.
    ///
    /// `callback` is invoked once per readability notification until
    /// [`disarm_readable`](Self::disarm_readable) is called. Re-arming an
    /// already-armed fd replaces the callback.
    fn arm_readable(&self, fd: RawFd, callback: ReadableCallback);

    /// Stops watching `fd` for readability.
    ///
    /// No further readiness callbacks fire for `fd` after this returns.
    /// Disarming an fd that is not armed is a no-op. Pending readiness is
    /// not forgotten by the kernel-side analogue, so implementations should
    /// keep undelivered notifications for a later re-arm.
    fn disarm_readable(&self, fd: RawFd);

    /// Schedules `callback` to run once on a future loop turn.
    ///
    /// Never runs synchronously inside this call, and never runs more than
    /// once. Within the turn it runs in, it fires before new I/O dispatch.
    fn schedule_next_turn(&self, callback: TurnCallback);

    /// Schedules `callback` to run once after `delay`.
    ///
    /// The reader's normal path never uses this; it exists for diagnostic
    /// and test harnesses that need "observe the state a little later".
    fn schedule_after(&self, delay: Duration, callback: TurnCallback);
}

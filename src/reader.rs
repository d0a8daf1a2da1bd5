//! Evented buffered reader with consumer-driven flow control.
//!
//! This module provides [`BufferedReader`], the engine that turns transport
//! readability notifications into ordered data deliveries while honoring the
//! consumer's backpressure.
//!
//! # State model
//!
//! The reader tracks the consumer's *intent* (`desired_running`, toggled by
//! [`start`](BufferedReader::start) / [`stop`](BufferedReader::stop))
//! separately from the watcher's *actual* state (`watcher_armed`). The two
//! are reconciled after every state-affecting event by a single rule:
//!
//! ```text
//! should_watch = desired_running && !ended && !errored && backlog.is_empty()
//! ```
//!
//! The transport is watched for new bytes only while nothing buffered awaits
//! delivery. A consumer that under-consumes an offer gets the watcher
//! disarmed and the same remaining bytes re-offered on a later loop turn via
//! a deferred continuation, never by recursing into the consumer from its
//! own callback.
//!
//! # Delivery channels
//!
//! Normal bytes and end-of-stream share the data callback (EOF is an empty
//! view), so consumers have one code path for "stream progress, possibly
//! ending". Transport failures go through the error callback with the
//! platform error code and are never mixed with EOF. Both conditions are
//! terminal: the reader is permanently paused and later `start()` calls are
//! accepted but do nothing.

use crate::error::TransportError;
use crate::reactor::Reactor;
use crate::tracing_compat::{debug, trace};
use crate::transport::Transport;
use std::cell::{Cell, RefCell};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

/// Default bounded read size per readability notification.
pub const DEFAULT_READ_CHUNK: usize = 8192;

/// Data callback: offered a view of the backlog, returns the number of
/// leading bytes accepted. An empty view signals end-of-stream and its
/// return value is ignored.
pub type DataCallback<T> = Box<dyn FnMut(&BufferedReader<T>, &[u8]) -> usize>;

/// Error callback: invoked at most once, with the terminal transport error.
pub type ErrorCallback<T> = Box<dyn FnMut(&BufferedReader<T>, TransportError)>;

/// After-drain hook: invoked once per drain pass, after the data callback's
/// consumption has been applied and flow-control state reconciled.
pub type DrainHook<T> = Box<dyn FnMut(&BufferedReader<T>)>;

struct Callbacks<T: Transport> {
    on_data: Option<DataCallback<T>>,
    on_error: Option<ErrorCallback<T>>,
    on_drain_pass: Option<DrainHook<T>>,
}

struct Inner<T: Transport> {
    reactor: Rc<dyn Reactor>,
    transport: RefCell<T>,
    fd: RawFd,
    /// Scratch buffer for bounded reads, reused across notifications.
    scratch: RefCell<Vec<u8>>,
    /// Bytes read from the transport but not yet accepted by the consumer,
    /// in stream order.
    backlog: RefCell<Vec<u8>>,
    /// Consumer intent ("isStarted").
    desired_running: Cell<bool>,
    /// Actual readability-registration state; written only by reconcile.
    watcher_armed: Cell<bool>,
    ended: Cell<bool>,
    errored: Cell<bool>,
    error_code: Cell<i32>,
    /// At most one scheduled drain continuation outstanding.
    continuation_pending: Cell<bool>,
    /// Guards against nested delivery; also marks the window in which the
    /// data callback is checked out of its slot.
    delivering: Cell<bool>,
    callbacks: RefCell<Callbacks<T>>,
}

impl<T: Transport> Drop for Inner<T> {
    fn drop(&mut self) {
        if self.watcher_armed.get() {
            self.reactor.disarm_readable(self.fd);
        }
    }
}

/// Buffered, flow-controlled reader over one transport endpoint.
///
/// A cheaply clonable handle; clones share state. All methods must be called
/// from the reactor's thread; exclusivity is structural (the type is
/// `!Send`), not lock-based.
///
/// Callbacks receive the handle as their first argument and may call
/// [`start`](Self::start) / [`stop`](Self::stop) reentrantly; those calls
/// only set intent and perform idempotent scheduling and arming.
///
/// # Lifecycle
///
/// Created paused, bound to one transport for life. Configure callbacks,
/// then [`start`](Self::start). After end-of-stream or a transport error the
/// reader is permanently paused.
pub struct BufferedReader<T: Transport> {
    inner: Rc<Inner<T>>,
}

impl<T: Transport> Clone for BufferedReader<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Transport> BufferedReader<T> {
    /// Creates a reader with the default read chunk size.
    #[must_use]
    pub fn new(reactor: Rc<dyn Reactor>, transport: T) -> Self {
        Self::with_read_chunk(reactor, transport, DEFAULT_READ_CHUNK)
    }

    /// Creates a reader performing bounded reads of at most `read_chunk`
    /// bytes per readability notification.
    ///
    /// # Panics
    ///
    /// Panics if `read_chunk` is zero.
    #[must_use]
    pub fn with_read_chunk(reactor: Rc<dyn Reactor>, transport: T, read_chunk: usize) -> Self {
        assert!(read_chunk > 0, "read chunk must be non-zero");
        let fd = transport.raw_fd();
        Self {
            inner: Rc::new(Inner {
                reactor,
                transport: RefCell::new(transport),
                fd,
                scratch: RefCell::new(vec![0u8; read_chunk]),
                backlog: RefCell::new(Vec::new()),
                desired_running: Cell::new(false),
                watcher_armed: Cell::new(false),
                ended: Cell::new(false),
                errored: Cell::new(false),
                error_code: Cell::new(0),
                continuation_pending: Cell::new(false),
                delivering: Cell::new(false),
                callbacks: RefCell::new(Callbacks {
                    on_data: None,
                    on_error: None,
                    on_drain_pass: None,
                }),
            }),
        }
    }

    /// Sets the data callback. Must be configured before [`start`](Self::start).
    pub fn set_on_data(&self, callback: impl FnMut(&Self, &[u8]) -> usize + 'static) {
        self.inner.callbacks.borrow_mut().on_data = Some(Box::new(callback));
    }

    /// Sets the error callback.
    pub fn set_on_error(&self, callback: impl FnMut(&Self, TransportError) + 'static) {
        self.inner.callbacks.borrow_mut().on_error = Some(Box::new(callback));
    }

    /// Sets the optional after-drain hook.
    pub fn set_on_drain_pass(&self, hook: impl FnMut(&Self) + 'static) {
        self.inner.callbacks.borrow_mut().on_drain_pass = Some(Box::new(hook));
    }

    /// Resumes delivery.
    ///
    /// No-op if already running or if the stream has ended or errored. If
    /// buffered bytes await delivery, drainage resumes on a later loop turn,
    /// never synchronously inside this call; with an empty backlog the
    /// transport watcher is armed immediately.
    ///
    /// # Panics
    ///
    /// Panics if no data callback has been configured.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.desired_running.get() || inner.ended.get() || inner.errored.get() {
            return;
        }
        assert!(
            inner.delivering.get() || inner.callbacks.borrow().on_data.is_some(),
            "on_data must be configured before start()"
        );
        inner.desired_running.set(true);
        trace!(fd = inner.fd, "reader started");
        self.reconcile();
    }

    /// Pauses delivery.
    ///
    /// Disarms the transport watcher; buffered bytes are retained and
    /// re-offered after a later [`start`](Self::start). Does not interrupt a
    /// consumer call already in progress.
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.desired_running.get() {
            return;
        }
        inner.desired_running.set(false);
        trace!(fd = inner.fd, "reader stopped");
        self.reconcile();
    }

    /// Returns the consumer's running intent.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.inner.desired_running.get()
    }

    /// Returns whether the transport readability watcher is currently armed.
    #[must_use]
    pub fn is_watcher_armed(&self) -> bool {
        self.inner.watcher_armed.get()
    }

    /// Returns whether the transport signalled end-of-stream.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.inner.ended.get()
    }

    /// Returns whether a transport read failed.
    #[must_use]
    pub fn is_errored(&self) -> bool {
        self.inner.errored.get()
    }

    /// Returns the platform error code of the terminal read failure, if any.
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.inner.errored.get().then(|| self.inner.error_code.get())
    }

    /// Returns the number of buffered bytes not yet accepted by the consumer.
    #[must_use]
    pub fn buffered_len(&self) -> usize {
        self.inner.backlog.borrow().len()
    }

    /// One readability notification: perform a bounded read, then drain.
    fn handle_readable(&self) {
        let inner = &self.inner;
        if !inner.watcher_armed.get() {
            // Stale notification delivered after a same-turn disarm.
            return;
        }
        debug_assert!(
            inner.backlog.borrow().is_empty(),
            "armed watcher implies empty backlog"
        );
        let result = {
            let mut scratch = inner.scratch.borrow_mut();
            let mut transport = inner.transport.borrow_mut();
            transport.read(scratch.as_mut_slice())
        };
        match result {
            Ok(0) => {
                trace!(fd = inner.fd, "end of stream");
                inner.ended.set(true);
                inner.desired_running.set(false);
                self.deliver_eof();
                self.reconcile();
            }
            Ok(n) => {
                trace!(fd = inner.fd, bytes = n, "read");
                {
                    let scratch = inner.scratch.borrow();
                    inner.backlog.borrow_mut().extend_from_slice(&scratch[..n]);
                }
                self.drain_pass();
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                // No data yet; stay armed and wait for the next notification.
                trace!(fd = inner.fd, "spurious readiness");
            }
            Err(e) => {
                let err = TransportError::from_io(e);
                debug!(fd = inner.fd, code = err.code(), "transport read failed");
                inner.errored.set(true);
                inner.error_code.set(err.code());
                inner.desired_running.set(false);
                self.deliver_error(err);
                self.reconcile();
            }
        }
    }

    /// One drain pass: offer the whole backlog to the consumer, apply its
    /// consumption, reconcile, and run the after-drain hook.
    ///
    /// Invoked directly after a successful read, or as a scheduled
    /// continuation when resuming drainage. Never loops synchronously: if
    /// bytes remain and the consumer is still willing, reconciliation has
    /// already scheduled the next pass on a future turn.
    fn drain_pass(&self) {
        let inner = &self.inner;
        if inner.backlog.borrow().is_empty() {
            self.reconcile();
            return;
        }
        if !inner.desired_running.get() {
            // Paused with bytes in hand: keep the backlog intact and make
            // no consumer call. A continuation that fired after a stop()
            // lands here and degenerates to a no-op.
            self.reconcile();
            return;
        }
        debug_assert!(!inner.delivering.get(), "delivery must not nest");
        let mut on_data = inner
            .callbacks
            .borrow_mut()
            .on_data
            .take()
            .expect("on_data must be configured before start()");
        inner.delivering.set(true);
        let consumed = {
            let view = inner.backlog.borrow();
            let offered = view.len();
            let consumed = on_data(self, &view);
            assert!(
                consumed <= offered,
                "on_data consumed {consumed} bytes of a {offered}-byte offer"
            );
            consumed
        };
        inner.delivering.set(false);
        self.restore_on_data(on_data);
        inner.backlog.borrow_mut().drain(..consumed);
        debug!(
            fd = inner.fd,
            consumed,
            remaining = inner.backlog.borrow().len(),
            "drain pass"
        );
        self.reconcile();
        self.run_drain_hook();
    }

    /// Recomputes the watcher state and continuation scheduling from
    /// `(desired_running, ended, errored, backlog.is_empty())`.
    ///
    /// Invoked after every state-affecting event: read completion, consumer
    /// return, start/stop, error, EOF.
    fn reconcile(&self) {
        let inner = &self.inner;
        let terminal = inner.ended.get() || inner.errored.get();
        let backlog_empty = inner.backlog.borrow().is_empty();
        let should_watch = inner.desired_running.get() && !terminal && backlog_empty;
        if should_watch != inner.watcher_armed.get() {
            if should_watch {
                let weak = Rc::downgrade(&self.inner);
                inner.reactor.arm_readable(
                    inner.fd,
                    Rc::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            Self { inner }.handle_readable();
                        }
                    }),
                );
            } else {
                inner.reactor.disarm_readable(inner.fd);
            }
            inner.watcher_armed.set(should_watch);
            trace!(fd = inner.fd, armed = should_watch, "watcher reconciled");
        }
        if inner.desired_running.get()
            && !terminal
            && !backlog_empty
            && !inner.continuation_pending.get()
        {
            inner.continuation_pending.set(true);
            trace!(fd = inner.fd, "drain continuation scheduled");
            let weak = Rc::downgrade(&self.inner);
            inner.reactor.schedule_next_turn(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.continuation_pending.set(false);
                    Self { inner }.drain_pass();
                }
            }));
        }
    }

    /// Delivers the terminal empty chunk through the data channel.
    ///
    /// Bypasses the backlog: end-of-stream can only be observed while the
    /// watcher is armed, which implies nothing is buffered.
    fn deliver_eof(&self) {
        let inner = &self.inner;
        debug_assert!(!inner.delivering.get(), "delivery must not nest");
        let Some(mut on_data) = inner.callbacks.borrow_mut().on_data.take() else {
            return;
        };
        inner.delivering.set(true);
        let _ = on_data(self, &[]);
        inner.delivering.set(false);
        self.restore_on_data(on_data);
    }

    fn deliver_error(&self, err: TransportError) {
        let inner = &self.inner;
        let Some(mut on_error) = inner.callbacks.borrow_mut().on_error.take() else {
            debug!(fd = inner.fd, "no error callback configured; dropping error");
            return;
        };
        on_error(self, err);
        let mut callbacks = inner.callbacks.borrow_mut();
        if callbacks.on_error.is_none() {
            callbacks.on_error = Some(on_error);
        }
    }

    fn run_drain_hook(&self) {
        let hook = self.inner.callbacks.borrow_mut().on_drain_pass.take();
        if let Some(mut hook) = hook {
            hook(self);
            let mut callbacks = self.inner.callbacks.borrow_mut();
            if callbacks.on_drain_pass.is_none() {
                callbacks.on_drain_pass = Some(hook);
            }
        }
    }

    /// Puts the data callback back unless the consumer replaced it from
    /// inside its own invocation.
    fn restore_on_data(&self, on_data: DataCallback<T>) {
        let mut callbacks = self.inner.callbacks.borrow_mut();
        if callbacks.on_data.is_none() {
            callbacks.on_data = Some(on_data);
        }
    }
}

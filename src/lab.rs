//! Deterministic lab reactor and pipe for testing.
//!
//! The [`LabReactor`] implements the [`Reactor`] seam without touching the
//! operating system: readiness is injected by test code, deferred callbacks
//! run in FIFO order one turn later, and time is virtual. Same injected
//! events + same turn sequence = same results, so every scenario in the test
//! suites is reproducible on a single thread.
//!
//! [`lab_pipe`] supplies the matching transport double: an in-memory pipe
//! whose write end lets tests feed data, close the stream, and inject read
//! errors deterministically.
//!
//! # Turn model
//!
//! One [`turn`](LabReactor::turn) runs, in order:
//!
//! 1. deferred callbacks that were queued before the turn began (anything
//!    they queue lands on a later turn)
//! 2. timers whose virtual deadline has been reached
//! 3. readiness notifications for fds that are both marked readable and
//!    armed, in ascending fd order
//!
//! This gives `schedule_next_turn` priority over new I/O within a turn,
//! which the reader relies on: a drain continuation is never overtaken by a
//! fresh socket read.

use crate::reactor::{Reactor, ReadableCallback, TurnCallback};
use crate::tracing_compat::trace;
use crate::transport::Transport;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, BinaryHeap, HashMap, VecDeque};
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::time::Duration;

/// Turn budget for [`LabReactor::run_until_idle`]; exceeding it means the
/// system under test is livelocked (for example, rescheduling itself every
/// turn without making progress).
const MAX_IDLE_TURNS: usize = 100_000;

/// A delayed callback in virtual time.
///
/// Ordered by deadline, with sequence numbers breaking ties so same-deadline
/// timers fire in submission order.
struct LabTimer {
    deadline: Duration,
    sequence: u64,
    callback: TurnCallback,
}

impl PartialEq for LabTimer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for LabTimer {}

impl PartialOrd for LabTimer {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LabTimer {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Min-heap: earliest deadline first, then by sequence.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct LabState {
    watchers: HashMap<RawFd, ReadableCallback>,
    /// Undelivered readiness notifications. Surviving disarm/re-arm cycles
    /// mirrors the kernel keeping an fd readable until it is drained.
    pending: BTreeSet<RawFd>,
    next_turn: VecDeque<TurnCallback>,
    timers: BinaryHeap<LabTimer>,
}

/// Virtual single-threaded reactor for deterministic tests.
pub struct LabReactor {
    state: RefCell<LabState>,
    now: Cell<Duration>,
    next_fd: Cell<RawFd>,
    sequence: Cell<u64>,
}

impl Default for LabReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl LabReactor {
    /// Creates an idle reactor at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RefCell::new(LabState {
                watchers: HashMap::new(),
                pending: BTreeSet::new(),
                next_turn: VecDeque::new(),
                timers: BinaryHeap::new(),
            }),
            now: Cell::new(Duration::ZERO),
            // Arbitrary base, far from real descriptors.
            next_fd: Cell::new(700),
            sequence: Cell::new(0),
        }
    }

    /// Returns the current virtual time.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Marks `fd` as readable.
    ///
    /// The notification is delivered on a future turn once `fd` is armed;
    /// it is retained while `fd` is disarmed.
    pub fn mark_readable(&self, fd: RawFd) {
        self.state.borrow_mut().pending.insert(fd);
    }

    /// Runs one turn. Returns whether any callback ran.
    pub fn turn(&self) -> bool {
        let mut progress = false;

        // Phase 1: deferred callbacks queued before this turn.
        let deferred: Vec<TurnCallback> = {
            let mut state = self.state.borrow_mut();
            state.next_turn.drain(..).collect()
        };
        for callback in deferred {
            progress = true;
            callback();
        }

        // Phase 2: due timers.
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let now = self.now.get();
                if state.timers.peek().is_some_and(|t| t.deadline <= now) {
                    state.timers.pop().map(|t| t.callback)
                } else {
                    None
                }
            };
            let Some(callback) = due else { break };
            progress = true;
            callback();
        }

        // Phase 3: readiness dispatch, ascending fd order for determinism.
        let ready: Vec<(RawFd, ReadableCallback)> = {
            let mut state = self.state.borrow_mut();
            let fds: Vec<RawFd> = state
                .pending
                .iter()
                .copied()
                .filter(|fd| state.watchers.contains_key(fd))
                .collect();
            for fd in &fds {
                state.pending.remove(fd);
            }
            fds.into_iter()
                .map(|fd| (fd, Rc::clone(&state.watchers[&fd])))
                .collect()
        };
        for (fd, callback) in ready {
            progress = true;
            trace!(fd, "readiness dispatched");
            callback();
        }

        progress
    }

    /// Runs turns until a full turn makes no progress.
    ///
    /// Timers with deadlines in the virtual future do not count as progress;
    /// use [`advance`](Self::advance) to reach them.
    ///
    /// # Panics
    ///
    /// Panics if the system fails to go idle within the turn budget.
    pub fn run_until_idle(&self) {
        for _ in 0..MAX_IDLE_TURNS {
            if !self.turn() {
                return;
            }
        }
        panic!("lab reactor failed to go idle within {MAX_IDLE_TURNS} turns");
    }

    /// Advances virtual time by `delta`, then runs until idle.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
        self.run_until_idle();
    }

    fn allocate_fd(&self) -> RawFd {
        let fd = self.next_fd.get();
        self.next_fd.set(fd + 1);
        fd
    }

    fn next_sequence(&self) -> u64 {
        let sequence = self.sequence.get();
        self.sequence.set(sequence + 1);
        sequence
    }
}

impl Reactor for LabReactor {
    fn arm_readable(&self, fd: RawFd, callback: ReadableCallback) {
        self.state.borrow_mut().watchers.insert(fd, callback);
    }

    fn disarm_readable(&self, fd: RawFd) {
        self.state.borrow_mut().watchers.remove(&fd);
    }

    fn schedule_next_turn(&self, callback: TurnCallback) {
        self.state.borrow_mut().next_turn.push_back(callback);
    }

    fn schedule_after(&self, delay: Duration, callback: TurnCallback) {
        let timer = LabTimer {
            deadline: self.now.get() + delay,
            sequence: self.next_sequence(),
            callback,
        };
        self.state.borrow_mut().timers.push(timer);
    }
}

// ============================================================================
// Lab pipe
// ============================================================================

struct PipeShared {
    data: VecDeque<u8>,
    closed: bool,
    read_error: Option<i32>,
}

/// Read end of a lab pipe; implements [`Transport`].
pub struct LabPipe {
    shared: Rc<RefCell<PipeShared>>,
    reactor: Rc<LabReactor>,
    fd: RawFd,
}

/// Write end of a lab pipe, held by test code.
pub struct LabPipeWriter {
    shared: Rc<RefCell<PipeShared>>,
    reactor: Rc<LabReactor>,
    fd: RawFd,
}

/// Creates a connected in-memory pipe registered with `reactor`.
///
/// Returns the write end (test side) and the read end (to hand to a
/// [`BufferedReader`](crate::BufferedReader)).
#[must_use]
pub fn lab_pipe(reactor: &Rc<LabReactor>) -> (LabPipeWriter, LabPipe) {
    let shared = Rc::new(RefCell::new(PipeShared {
        data: VecDeque::new(),
        closed: false,
        read_error: None,
    }));
    let fd = reactor.allocate_fd();
    let writer = LabPipeWriter {
        shared: Rc::clone(&shared),
        reactor: Rc::clone(reactor),
        fd,
    };
    let pipe = LabPipe {
        shared,
        reactor: Rc::clone(reactor),
        fd,
    };
    (writer, pipe)
}

impl LabPipe {
    /// Returns the virtual fd of this pipe.
    #[must_use]
    pub const fn fd(&self) -> RawFd {
        self.fd
    }
}

impl LabPipeWriter {
    /// Appends bytes to the pipe and raises readability.
    pub fn write(&self, bytes: &[u8]) {
        self.shared.borrow_mut().data.extend(bytes.iter().copied());
        self.reactor.mark_readable(self.fd);
    }

    /// Closes the write end; the read end observes end-of-stream once
    /// buffered bytes are drained.
    pub fn close(&self) {
        self.shared.borrow_mut().closed = true;
        self.reactor.mark_readable(self.fd);
    }

    /// Makes every subsequent read fail with the given platform error code.
    pub fn set_read_error(&self, code: i32) {
        self.shared.borrow_mut().read_error = Some(code);
    }
}

impl Transport for LabPipe {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut shared = self.shared.borrow_mut();
        if let Some(code) = shared.read_error {
            return Err(io::Error::from_raw_os_error(code));
        }
        if !shared.data.is_empty() {
            let n = buf.len().min(shared.data.len());
            for (slot, byte) in buf.iter_mut().zip(shared.data.drain(..n)) {
                *slot = byte;
            }
            // Leftover bytes or a pending close still need a notification.
            if !shared.data.is_empty() || shared.closed {
                self.reactor.mark_readable(self.fd);
            }
            return Ok(n);
        }
        if shared.closed {
            return Ok(0);
        }
        Err(io::ErrorKind::WouldBlock.into())
    }

    fn raw_fd(&self) -> RawFd {
        self.fd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn next_turn_callback_fires_on_a_later_turn() {
        init_test("next_turn_callback_fires_on_a_later_turn");
        let reactor = LabReactor::new();
        let fired = Rc::new(Cell::new(false));
        {
            let fired = fired.clone();
            reactor.schedule_next_turn(Box::new(move || fired.set(true)));
        }
        assert!(!fired.get(), "must not run synchronously");
        reactor.turn();
        assert!(fired.get());
        crate::test_complete!("next_turn_callback_fires_on_a_later_turn");
    }

    #[test]
    fn callbacks_scheduled_during_a_turn_run_on_the_next_one() {
        init_test("callbacks_scheduled_during_a_turn_run_on_the_next_one");
        let reactor = Rc::new(LabReactor::new());
        let second = Rc::new(Cell::new(false));
        {
            let reactor2 = Rc::clone(&reactor);
            let second = second.clone();
            reactor.schedule_next_turn(Box::new(move || {
                let second = second.clone();
                reactor2.schedule_next_turn(Box::new(move || second.set(true)));
            }));
        }
        reactor.turn();
        assert!(!second.get(), "nested schedule must wait a turn");
        reactor.turn();
        assert!(second.get());
        crate::test_complete!("callbacks_scheduled_during_a_turn_run_on_the_next_one");
    }

    #[test]
    fn timers_fire_in_deadline_then_submission_order() {
        init_test("timers_fire_in_deadline_then_submission_order");
        let reactor = LabReactor::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (label, delay_ms) in [("b", 20u64), ("a", 10), ("c", 20)] {
            let log = log.clone();
            reactor.schedule_after(
                Duration::from_millis(delay_ms),
                Box::new(move || log.borrow_mut().push(label)),
            );
        }
        reactor.run_until_idle();
        assert!(log.borrow().is_empty(), "nothing due yet");
        reactor.advance(Duration::from_millis(25));
        assert_eq!(*log.borrow(), vec!["a", "b", "c"]);
        crate::test_complete!("timers_fire_in_deadline_then_submission_order");
    }

    #[test]
    fn readiness_is_retained_until_armed() {
        init_test("readiness_is_retained_until_armed");
        let reactor = LabReactor::new();
        let fd = reactor.allocate_fd();
        let fired = Rc::new(Cell::new(0u32));
        reactor.mark_readable(fd);
        reactor.run_until_idle();
        assert_eq!(fired.get(), 0, "disarmed fd must not dispatch");
        {
            let fired = fired.clone();
            reactor.arm_readable(fd, Rc::new(move || fired.set(fired.get() + 1)));
        }
        reactor.run_until_idle();
        assert_eq!(fired.get(), 1);
        crate::test_complete!("readiness_is_retained_until_armed");
    }

    #[test]
    fn pipe_follows_read_conventions() {
        init_test("pipe_follows_read_conventions");
        let reactor = Rc::new(LabReactor::new());
        let (writer, mut pipe) = lab_pipe(&reactor);
        let mut buf = [0u8; 4];

        let err = pipe.read(&mut buf).expect_err("empty pipe blocks");
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        writer.write(b"abcdef");
        assert_eq!(pipe.read(&mut buf).expect("data"), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(pipe.read(&mut buf).expect("rest"), 2);
        assert_eq!(&buf[..2], b"ef");

        writer.close();
        assert_eq!(pipe.read(&mut buf).expect("eof"), 0);
        crate::test_complete!("pipe_follows_read_conventions");
    }

    #[test]
    fn pipe_surfaces_injected_error_codes() {
        init_test("pipe_surfaces_injected_error_codes");
        let reactor = Rc::new(LabReactor::new());
        let (writer, mut pipe) = lab_pipe(&reactor);
        writer.set_read_error(libc::EIO);
        writer.write(b"x");
        let mut buf = [0u8; 4];
        let err = pipe.read(&mut buf).expect_err("injected error");
        assert_eq!(err.raw_os_error(), Some(libc::EIO));
        crate::test_complete!("pipe_surfaces_injected_error_codes");
    }
}

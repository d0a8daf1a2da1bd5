//! Shared fixture for the reader scenario suites.
//!
//! Mirrors the classic evented-input test setup: a pipe feeding a
//! [`BufferedReader`], a text log accumulating `Data:` / `EOF` / `Error:`
//! lines, and helpers for recording the flow-control state from a later
//! loop turn. Everything runs single-threaded on the lab reactor, so the
//! suites are deterministic: no sleeping, no eventually-loops.

// Not every suite uses every helper.
#![allow(dead_code)]

use inflow::lab::{lab_pipe, LabPipe, LabPipeWriter, LabReactor};
use inflow::{BufferedReader, Reactor};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Reader over the lab pipe transport.
pub type LabReader = BufferedReader<LabPipe>;

pub struct Harness {
    pub reactor: Rc<LabReactor>,
    pub writer: LabPipeWriter,
    pub reader: LabReader,
    pub log: Rc<RefCell<String>>,
    pub counter: Rc<Cell<u32>>,
}

impl Harness {
    /// Harness whose data callback consumes every offer in full.
    pub fn new() -> Self {
        Self::with_consume_limit(None)
    }

    /// Harness whose data callback consumes at most `limit` bytes per offer
    /// (`None` = everything). The callback logs `Data: <bytes>` or `EOF`,
    /// and the error callback logs `Error: <code>`.
    pub fn with_consume_limit(limit: Option<usize>) -> Self {
        let reactor = Rc::new(LabReactor::new());
        let (writer, pipe) = lab_pipe(&reactor);
        let reader = BufferedReader::new(reactor.clone(), pipe);
        let log = Rc::new(RefCell::new(String::new()));
        let counter = Rc::new(Cell::new(0u32));

        {
            let log = log.clone();
            let counter = counter.clone();
            reader.set_on_data(move |_, view| {
                counter.set(counter.get() + 1);
                if view.is_empty() {
                    log.borrow_mut().push_str("EOF\n");
                    return 0;
                }
                log.borrow_mut()
                    .push_str(&format!("Data: {}\n", String::from_utf8_lossy(view)));
                match limit {
                    None => view.len(),
                    Some(n) => n.min(view.len()),
                }
            });
        }
        {
            let log = log.clone();
            reader.set_on_error(move |_, err| {
                log.borrow_mut().push_str(&format!("Error: {}\n", err.code()));
            });
        }

        Self {
            reactor,
            writer,
            reader,
            log,
            counter,
        }
    }

    pub fn log(&self) -> String {
        self.log.borrow().clone()
    }
}

/// Formats the reader's flow-control state the way the scenario logs expect.
pub fn state_log_entry(reader: &LabReader) -> String {
    format!(
        "isStarted: {}\nisSocketStarted: {}\n",
        u8::from(reader.is_started()),
        u8::from(reader.is_watcher_armed())
    )
}

/// Schedules a state-log entry for the next loop turn, so the observation
/// happens after the current drain pass has fully settled.
pub fn schedule_state_log(reactor: &Rc<LabReactor>, reader: &LabReader, log: &Rc<RefCell<String>>) {
    let reader = reader.clone();
    let log = log.clone();
    reactor.schedule_next_turn(Box::new(move || {
        let entry = state_log_entry(&reader);
        log.borrow_mut().push_str(&entry);
    }));
}

pub fn init_test(name: &str) {
    inflow::test_utils::init_test_logging();
    inflow::test_phase!(name);
}

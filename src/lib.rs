//! Inflow: evented, flow-controlled buffered input for reactor-driven servers.
//!
//! # Overview
//!
//! Inflow sits between a raw readable file descriptor and application code
//! that consumes byte streams (request bodies, proxied payloads). It turns
//! "socket became readable" notifications into an ordered sequence of data
//! chunks delivered to a consumer callback, while honoring the consumer's
//! backpressure: a consumer that accepts only part of an offer is re-offered
//! the same remaining bytes on a later event-loop turn, with the socket
//! watcher disarmed so new reads cannot compound the backlog.
//!
//! # Core Guarantees
//!
//! - **Order preservation**: bytes are delivered in stream order, never
//!   duplicated, never dropped short of teardown
//! - **No recursive delivery**: at most one consumer call is ever on the
//!   stack; drain resumption is a deferred continuation, not a direct call
//! - **Watcher discipline**: the transport is watched for readability only
//!   while the consumer wants data and nothing buffered awaits delivery
//! - **Terminal permanence**: end-of-stream and read errors are delivered
//!   exactly once and permanently pause the reader
//! - **Deterministic testing**: the [`lab`] module provides a virtual
//!   reactor and pipe for single-threaded, reproducible tests
//!
//! # Module Structure
//!
//! - [`reader`]: the [`BufferedReader`] engine (backlog, delivery loop,
//!   flow-control reconciliation, termination tracking)
//! - [`reactor`]: the [`Reactor`] collaborator trait (watcher arm/disarm,
//!   deferred scheduling)
//! - [`transport`]: the [`Transport`] collaborator trait and the
//!   [`FdTransport`] adapter for nonblocking fd-backed endpoints
//! - [`lab`]: deterministic lab reactor and in-memory pipe for tests
//! - [`error`]: error types
//! - [`test_utils`]: logging/assertion helpers shared by the test suites
//!
//! # Example
//!
//! ```ignore
//! use inflow::lab::{lab_pipe, LabReactor};
//! use inflow::BufferedReader;
//! use std::rc::Rc;
//!
//! let reactor = Rc::new(LabReactor::new());
//! let (writer, pipe) = lab_pipe(&reactor);
//!
//! let reader = BufferedReader::new(reactor.clone(), pipe);
//! reader.set_on_data(|_reader, view| {
//!     if view.is_empty() {
//!         println!("EOF");
//!     } else {
//!         println!("Data: {}", String::from_utf8_lossy(view));
//!     }
//!     view.len()
//! });
//! reader.start();
//!
//! writer.write(b"hello");
//! writer.close();
//! reactor.run_until_idle();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod lab;
pub mod reactor;
pub mod reader;
pub mod test_utils;
pub mod tracing_compat;
pub mod transport;

pub use error::TransportError;
pub use reactor::Reactor;
pub use reader::{BufferedReader, DEFAULT_READ_CHUNK};
pub use transport::{FdTransport, Transport};

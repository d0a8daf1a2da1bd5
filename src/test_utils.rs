//! Test utilities.
//!
//! Shared helpers for the unit and scenario suites:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Assertion macros that log expectation and outcome
//!
//! The macros expand to `tracing` calls resolved in the calling crate, so
//! test crates need `tracing` among their dev-dependencies. They work with
//! or without the `tracing-integration` feature; without it,
//! [`init_test_logging`] installs no subscriber.
//!
//! # Example
//!
//! ```ignore
//! use inflow::test_utils::init_test_logging;
//!
//! #[test]
//! fn my_test() {
//!     init_test_logging();
//!     inflow::test_phase!("my_test");
//!     // ...
//!     inflow::test_complete!("my_test");
//! }
//! ```

#[cfg(feature = "tracing-integration")]
use std::sync::Once;
#[cfg(feature = "tracing-integration")]
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(feature = "tracing-integration")]
static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging.
///
/// With the `tracing-integration` feature disabled there is no subscriber
/// to install, so this is a no-op; emitted events go to whatever
/// subscriber the test binary set up itself, if any.
#[cfg(not(feature = "tracing-integration"))]
pub fn init_test_logging() {}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
#[cfg(feature = "tracing-integration")]
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Log the start of a test phase.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log successful test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Assert with logged expectation and outcome.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

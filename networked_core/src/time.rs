//! Clock used for the grace windows.
//!
//! With the `test_utils` feature the clock is a thread-local mock that tests advance with
//! `MockClock::advance`, so timeout behaviour can be checked without sleeping.

#[cfg(all(feature = "test_utils", not(feature = "not_mock")))]
pub use mock_instant::thread_local::{Instant, MockClock};

#[cfg(any(not(feature = "test_utils"), feature = "not_mock"))]
pub use std::time::Instant;

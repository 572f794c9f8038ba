//! Execution Guards: generic combinators that keep a flaky remote UI from
//! taking down the whole run.
//!
//! - `retry`: bounded retry with exponential backoff for matched errors.
//! - `bounded`: wall-clock caps, either as a hard wrapper (`run_bounded`) or
//!   as a cooperative `Deadline` polled between steps.

pub mod bounded;
pub mod retry;

pub use bounded::{run_blocking_bounded, run_bounded, Deadline, GuardError};
pub use retry::{retry_with_backoff, retry_with_backoff_on, RetryPolicy};

//! Executor module for file transfers

pub mod copy;
pub mod retry;

pub use copy::{stream_copy, transfer, verify_copy, TransferMethod};
pub use retry::RetryPolicy;

//! Terminal output for the binary

pub mod progress;

pub use progress::ProgressReporter;

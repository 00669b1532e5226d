//!
//! Small helpers shared across the crate: amount formatting for logs and atomic file writes.
pub mod fs;
/// Utility functions for formatting and display
pub mod index;

pub use fs::write_atomic;
pub use index::format_token_amount;

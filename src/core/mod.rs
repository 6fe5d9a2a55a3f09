/// Core Module for SafeSQL
///
/// This module contains the execution facade and its error types.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{Operation, Result, SafeSqlError};

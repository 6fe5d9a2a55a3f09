/// SafeSQL Error Module
///
/// This module defines the error taxonomy of the execution facade. Every
/// failure surfaces to the immediate caller; nothing is retried or swallowed.
use std::fmt;
use thiserror::Error;

/// Comprehensive error type for the execution facade.
///
/// Variants map onto the stage that failed:
/// - establishing or closing a session
/// - compiling, querying and executing statements
/// - transaction lifecycle misuse
/// - decoding rows into caller types
/// - cancellation and statement timeouts
/// - configuration loading
#[derive(Error, Debug)]
pub enum SafeSqlError {
    /// The session could not be opened, configured or closed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement template rejected at compile time
    #[error("Prepare error: {0}")]
    Prepare(String),

    /// Query rejected by the engine (syntax, missing table, arity mismatch)
    #[error("Query error: {0}")]
    Query(String),

    /// Insert/update/delete rejected (constraint violation, malformed statement)
    #[error("Exec error: {0}")]
    Exec(String),

    /// Invalid transaction nesting, double resolution or use after resolution
    #[error("Transaction state error: {0}")]
    TransactionState(String),

    /// Row shape or column type does not match the destination type
    #[error("Scan error: {0}")]
    Scan(String),

    /// The operation was interrupted through a `CancelHandle`
    #[error("{operation} interrupted")]
    Interrupted { operation: Operation },

    /// The operation ran past the configured statement timeout
    #[error("{operation} timed out after {timeout_ms}ms")]
    TimedOut { operation: Operation, timeout_ms: u64 },

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The facade operation an error was raised from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Connect,
    Prepare,
    Query,
    Exec,
    Transaction,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Connect => "connect",
            Operation::Prepare => "prepare",
            Operation::Query => "query",
            Operation::Exec => "exec",
            Operation::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

impl SafeSqlError {
    /// Wraps a driver error raised during `operation`.
    ///
    /// `timeout` carries the statement timeout when the operation ran under a
    /// deadline that has fired, so interrupts caused by it are reported as
    /// `TimedOut` rather than `Interrupted`.
    pub(crate) fn from_driver(
        operation: Operation,
        err: rusqlite::Error,
        timeout: Option<std::time::Duration>,
    ) -> Self {
        if is_interrupt(&err) {
            return match timeout {
                Some(limit) => SafeSqlError::TimedOut {
                    operation,
                    timeout_ms: limit.as_millis() as u64,
                },
                None => SafeSqlError::Interrupted { operation },
            };
        }

        let message = err.to_string();
        match operation {
            Operation::Connect => SafeSqlError::Connection(message),
            Operation::Prepare => SafeSqlError::Prepare(message),
            Operation::Query => SafeSqlError::Query(message),
            Operation::Exec => SafeSqlError::Exec(message),
            Operation::Transaction => SafeSqlError::TransactionState(message),
        }
    }

    /// Builds the error reported when placeholder and parameter counts differ.
    pub(crate) fn arity(operation: Operation, expected: usize, supplied: usize) -> Self {
        let message = format!(
            "statement has {} placeholder(s) but {} parameter(s) were supplied",
            expected, supplied
        );
        match operation {
            Operation::Exec => SafeSqlError::Exec(message),
            _ => SafeSqlError::Query(message),
        }
    }

    /// Whether the error came from a cancellation or a statement timeout.
    pub fn is_interrupt(&self) -> bool {
        matches!(
            self,
            SafeSqlError::Interrupted { .. } | SafeSqlError::TimedOut { .. }
        )
    }
}

fn is_interrupt(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::OperationInterrupted
    )
}

/// Type alias for Result to use SafeSqlError as the error type.
pub type Result<T> = std::result::Result<T, SafeSqlError>;

/// Database Module
///
/// This module provides the execution facade, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): the `Database` handle, session lifecycle and transaction scoping
/// - **Query Text** (`sql.rs`): literal-only statement text and statement classification
/// - **Query Execution** (`query.rs`): compiling, binding and executing statements
/// - **Prepared Statements** (`statement.rs`): reusable compiled statements
/// - **Transactions** (`transaction.rs`): explicit commit/rollback handles
/// - **Rows and Values** (`row.rs`, `value.rs`): lazy row sets and typed nullable decoding
/// - **Cancellation** (`cancel.rs`): interrupts and statement timeouts
///
/// ## Error Handling
///
/// All database operations use the standardized `SafeSqlError` type for consistent error propagation.
pub mod cancel;
pub mod connection;
pub mod query;
pub mod row;
pub mod sql;
pub mod statement;
pub mod transaction;
pub mod value;

pub use cancel::CancelHandle;
pub use connection::Database;
pub use row::{ColumnInfo, ExecResult, FromRow, Row, RowSet};
pub use sql::{Sql, StatementType};
pub use statement::Statement;
pub use transaction::{Transaction, TransactionBehavior, TransactionState};
pub use value::{ColumnKind, FromValue, Timestamp, Value};

// Core infrastructure modules
pub mod config;
pub mod core;

// Scenario and escape-hatch modules
pub mod demo;
pub mod unchecked;

#[cfg(test)]
mod test_utils;

pub use crate::config::{load_config, Config, DataSource};
pub use crate::core::db::{
    CancelHandle, ColumnInfo, Database, ExecResult, FromRow, FromValue, Row, RowSet, Sql,
    Statement, StatementType, Timestamp, Transaction, TransactionBehavior, TransactionState, Value,
};
pub use crate::core::{Operation, Result, SafeSqlError};
pub use rusqlite::{params, ToSql};

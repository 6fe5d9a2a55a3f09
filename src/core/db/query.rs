/// Query Execution Module
///
/// This module provides the execution layer shared by `Database` and
/// `Transaction`: compiling statements, binding parameters, and mapping
/// engine failures onto the facade's error taxonomy.
use std::time::Duration;

use rusqlite::{Connection, ToSql};
use tracing::debug;

use crate::core::db::cancel::{DeadlineGuard, DeadlineState};
use crate::core::db::row::{ExecResult, Row, RowSet};
use crate::core::db::sql::{validate_text, Sql, StatementType};
use crate::core::db::statement::Statement;
use crate::core::{Operation, Result, SafeSqlError};

/// Query execution service that operates on a database connection
#[derive(Clone, Copy)]
pub(crate) struct QueryExecutor<'c> {
    connection: &'c Connection,
    deadlines: &'c DeadlineState,
    timeout: Option<Duration>,
}

impl<'c> QueryExecutor<'c> {
    /// Creates a new QueryExecutor for the given connection
    pub(crate) fn new(
        connection: &'c Connection,
        deadlines: &'c DeadlineState,
        timeout: Option<Duration>,
    ) -> Self {
        QueryExecutor {
            connection,
            deadlines,
            timeout,
        }
    }

    pub(crate) fn connection(&self) -> &'c Connection {
        self.connection
    }

    fn deadline(&self) -> Option<DeadlineGuard<'c>> {
        self.timeout
            .map(|limit| DeadlineGuard::install(self.connection, self.deadlines, limit))
    }

    /// Compiles `text`, reporting failures as errors of `operation`.
    ///
    /// Only the unchecked path passes runtime-built text here; every safe
    /// entry point goes through `Sql`.
    pub(crate) fn compile(&self, text: &str, operation: Operation) -> Result<Statement<'c>> {
        validate_text(text, operation)?;

        let deadline = self.deadline();
        let stmt = self.connection.prepare(text).map_err(|e| {
            let fired = deadline.as_ref().and_then(DeadlineGuard::fired_timeout);
            SafeSqlError::from_driver(operation, e, fired)
        })?;
        drop(deadline);

        debug!(sql = text, "Compiled statement");
        Ok(Statement::new(
            stmt,
            self.connection,
            self.deadlines,
            self.timeout,
            StatementType::from_sql(text),
        ))
    }

    /// Compiles a statement for repeated execution.
    pub(crate) fn prepare(&self, sql: Sql) -> Result<Statement<'c>> {
        let text = sql.validate(Operation::Prepare)?;
        self.compile(text, Operation::Prepare)
    }

    /// Runs a query and hands the lazy row set to `work`.
    ///
    /// The statement and the row set are released when this returns,
    /// whether `work` succeeded or not.
    pub(crate) fn query<T, F>(&self, sql: Sql, params: &[&dyn ToSql], work: F) -> Result<T>
    where
        F: FnOnce(&mut RowSet<'_>) -> Result<T>,
    {
        let text = sql.validate(Operation::Query)?;
        self.query_text(text, params, work)
    }

    pub(crate) fn query_text<T, F>(&self, text: &str, params: &[&dyn ToSql], work: F) -> Result<T>
    where
        F: FnOnce(&mut RowSet<'_>) -> Result<T>,
    {
        let mut stmt = self.compile(text, Operation::Query)?;
        let mut rows = stmt.query(params)?;
        work(&mut rows)
    }

    pub(crate) fn query_all(&self, sql: Sql, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        self.query(sql, params, |rows| {
            let mut out = Vec::new();
            while let Some(row) = rows.next_row()? {
                out.push(row);
            }
            Ok(out)
        })
    }

    pub(crate) fn query_row(&self, sql: Sql, params: &[&dyn ToSql]) -> Result<Option<Row>> {
        self.query(sql, params, |rows| rows.next_row())
    }

    /// Executes an insert/update/delete with bound parameters.
    pub(crate) fn exec(&self, sql: Sql, params: &[&dyn ToSql]) -> Result<ExecResult> {
        let text = sql.validate(Operation::Exec)?;
        self.exec_text(text, params)
    }

    pub(crate) fn exec_text(&self, text: &str, params: &[&dyn ToSql]) -> Result<ExecResult> {
        let mut stmt = self.compile(text, Operation::Exec)?;
        stmt.execute(params)
    }

    /// Runs a parameterless batch of statements, such as schema setup.
    pub(crate) fn exec_batch(&self, sql: Sql) -> Result<()> {
        let text = sql.validate(Operation::Exec)?;

        let deadline = self.deadline();
        self.connection.execute_batch(text).map_err(|e| {
            let fired = deadline.as_ref().and_then(DeadlineGuard::fired_timeout);
            SafeSqlError::from_driver(Operation::Exec, e, fired)
        })?;

        debug!(sql = text, "Executed batch");
        Ok(())
    }
}

/// Transaction Module
///
/// Explicit transaction handles. A transaction ends in exactly one of
/// commit or rollback; an unresolved transaction is rolled back when its
/// handle is dropped.
use rusqlite::ToSql;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::core::db::query::QueryExecutor;
use crate::core::db::row::{ExecResult, Row, RowSet};
use crate::core::db::sql::Sql;
use crate::core::db::statement::Statement;
use crate::core::{Operation, Result, SafeSqlError};

/// Represents database transaction states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction in progress
    Active,
    /// Transaction ended with COMMIT
    Committed,
    /// Transaction ended with ROLLBACK
    RolledBack,
}

/// Locking mode used when a transaction begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionBehavior {
    /// Take locks lazily on first read or write
    #[default]
    Deferred,
    /// Take the write lock immediately
    Immediate,
    /// Take an exclusive lock immediately
    Exclusive,
}

impl TransactionBehavior {
    fn begin_statement(self) -> &'static str {
        match self {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
        }
    }
}

/// An open transaction on one connection.
pub struct Transaction<'c> {
    executor: QueryExecutor<'c>,
    state: TransactionState,
}

impl<'c> Transaction<'c> {
    /// Starts a transaction, failing if one is already open on the connection.
    pub(crate) fn begin(
        executor: QueryExecutor<'c>,
        behavior: TransactionBehavior,
    ) -> Result<Self> {
        let connection = executor.connection();
        if !connection.is_autocommit() {
            return Err(SafeSqlError::TransactionState(
                "a transaction is already open on this connection; nested transactions are not supported"
                    .to_string(),
            ));
        }

        // Nesting was ruled out above, so a failed BEGIN is a session or lock problem.
        connection
            .execute_batch(behavior.begin_statement())
            .map_err(|e| match SafeSqlError::from_driver(Operation::Transaction, e, None) {
                SafeSqlError::TransactionState(message) => {
                    SafeSqlError::Connection(format!("could not begin transaction: {}", message))
                }
                other => other,
            })?;

        debug!(?behavior, "Transaction started");
        Ok(Transaction {
            executor,
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    fn ensure_active(&self) -> Result<QueryExecutor<'c>> {
        match self.state {
            TransactionState::Active => Ok(self.executor),
            TransactionState::Committed => Err(SafeSqlError::TransactionState(
                "transaction has already been committed".to_string(),
            )),
            TransactionState::RolledBack => Err(SafeSqlError::TransactionState(
                "transaction has already been rolled back".to_string(),
            )),
        }
    }

    /// Runs a query inside the transaction; see `Database::query`.
    pub fn query<T, F>(&self, sql: impl Into<Sql>, params: &[&dyn ToSql], work: F) -> Result<T>
    where
        F: FnOnce(&mut RowSet<'_>) -> Result<T>,
    {
        self.ensure_active()?.query(sql.into(), params, work)
    }

    pub fn query_all(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        self.ensure_active()?.query_all(sql.into(), params)
    }

    pub fn query_row(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<Option<Row>> {
        self.ensure_active()?.query_row(sql.into(), params)
    }

    /// Executes an insert/update/delete inside the transaction.
    pub fn exec(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<ExecResult> {
        self.ensure_active()?.exec(sql.into(), params)
    }

    /// Prepares a statement that runs inside the transaction.
    ///
    /// The statement borrows the transaction, so it has to be dropped before
    /// `commit` or `rollback`:
    ///
    /// ```compile_fail
    /// # use safesql::{params, Database};
    /// # let db = Database::open_in_memory().unwrap();
    /// let mut tx = db.begin().unwrap();
    /// let mut stmt = tx.prepare("INSERT INTO t (x) VALUES (?)").unwrap();
    /// tx.commit().unwrap();
    /// stmt.execute(params![1]).unwrap();
    /// ```
    pub fn prepare(&self, sql: impl Into<Sql>) -> Result<Statement<'_>> {
        self.ensure_active()?.prepare(sql.into())
    }

    /// Makes the transaction's changes permanent.
    ///
    /// If COMMIT itself fails the transaction is rolled back, so no partial
    /// commit is ever left behind.
    pub fn commit(&mut self) -> Result<()> {
        let executor = self.ensure_active()?;
        match executor.exec_batch(Sql::new("COMMIT")) {
            Ok(()) => {
                self.state = TransactionState::Committed;
                debug!("Transaction committed");
                Ok(())
            }
            Err(err) => {
                if let Err(rollback_err) = self.rollback() {
                    warn!(error = %rollback_err, "Rollback after failed commit also failed");
                }
                Err(err)
            }
        }
    }

    /// Discards the transaction's changes.
    ///
    /// If ROLLBACK fails while the engine still holds the transaction open,
    /// the handle stays active so a later `rollback` or drop can retry.
    pub fn rollback(&mut self) -> Result<()> {
        let executor = self.ensure_active()?;
        if executor.connection().is_autocommit() {
            // The engine already rolled back, e.g. after an interrupted write.
            self.state = TransactionState::RolledBack;
            debug!("Transaction was rolled back by the engine");
            return Ok(());
        }
        let outcome = executor.exec_batch(Sql::new("ROLLBACK"));
        self.settle_rollback(outcome)
    }

    fn settle_rollback(&mut self, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => {
                self.state = TransactionState::RolledBack;
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(err) => {
                if self.executor.connection().is_autocommit() {
                    self.state = TransactionState::RolledBack;
                }
                Err(SafeSqlError::TransactionState(format!("rollback failed: {}", err)))
            }
        }
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.is_active() {
            warn!("Transaction dropped without commit or rollback; rolling back");
            if let Err(e) = self.rollback() {
                warn!(error = %e, "Rollback on drop failed");
            }
        }
    }
}

impl std::fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Connection Management Module
///
/// This module provides the `Database` handle: session acquisition and
/// release, the safe query/exec/prepare entry points, and transaction
/// scoping. The handle is passed explicitly; there is no process-wide
/// connection state.
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, ToSql};
use tracing::{debug, info, warn};

use crate::config::DataSource;
use crate::core::db::cancel::{CancelHandle, DeadlineState};
use crate::core::db::query::QueryExecutor;
use crate::core::db::row::{ExecResult, Row, RowSet};
use crate::core::db::sql::Sql;
use crate::core::db::statement::Statement;
use crate::core::db::transaction::{Transaction, TransactionBehavior};
use crate::core::{Operation, Result, SafeSqlError};

/// An owned session with the database.
///
/// `Database` is `Send` but not `Sync`: one caller (or one task) uses it at a
/// time. Every value passed through `params` is bound by the engine; the
/// query text itself is always a compile-time literal (`Sql`).
pub struct Database {
    conn: Connection,
    path: Option<String>,
    deadlines: DeadlineState,
    statement_timeout: Option<Duration>,
    transaction_behavior: TransactionBehavior,
}

impl Database {
    /// Opens the database described by `source`.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Connection` if the file cannot be opened or the
    /// session cannot be configured.
    pub fn open(source: &DataSource) -> Result<Self> {
        let mut flags = OpenFlags::SQLITE_OPEN_URI | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if source.read_only {
            flags |= OpenFlags::SQLITE_OPEN_READ_ONLY;
        } else {
            flags |= OpenFlags::SQLITE_OPEN_READ_WRITE;
            if source.create_if_missing {
                flags |= OpenFlags::SQLITE_OPEN_CREATE;
            }
        }

        let conn = Connection::open_with_flags(&source.path, flags)
            .map_err(|e| connection_error(&source.path, e))?;

        conn.busy_timeout(source.busy_timeout())
            .map_err(|e| connection_error(&source.path, e))?;
        conn.pragma_update(None, "foreign_keys", source.foreign_keys)
            .map_err(|e| connection_error(&source.path, e))?;

        info!(path = %source.path, read_only = source.read_only, "Opened database");
        Ok(Database {
            conn,
            path: (!source.is_in_memory()).then(|| source.path.clone()),
            deadlines: DeadlineState::default(),
            statement_timeout: source.statement_timeout(),
            transaction_behavior: source.transaction_behavior,
        })
    }

    /// Opens a private in-memory database with default settings.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DataSource::in_memory())
    }

    /// Gets the current database path (if any)
    ///
    /// # Returns
    ///
    /// `Some(path)` if connected to a file database, `None` for in-memory databases.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Sets or clears the timeout applied to every subsequent engine call.
    pub fn set_statement_timeout(&mut self, timeout: Option<Duration>) {
        self.statement_timeout = timeout;
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout
    }

    /// Returns a handle that interrupts the operation running on this
    /// connection; it can be moved to another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(self.conn.get_interrupt_handle())
    }

    /// Whether a transaction is currently open on the connection.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn executor(&self) -> QueryExecutor<'_> {
        QueryExecutor::new(&self.conn, &self.deadlines, self.statement_timeout)
    }

    /// Runs a query and passes the lazy row set to `work`.
    ///
    /// `sql` must contain one placeholder per entry in `params`. The row set
    /// lives only for the duration of `work` and is released on every exit
    /// path.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Query` if the engine rejects the statement or
    /// the placeholder count differs from `params.len()`. Errors returned
    /// by `work` are passed through unchanged.
    ///
    /// # Examples
    ///
    /// ```
    /// use safesql::{params, Database};
    ///
    /// let db = Database::open_in_memory()?;
    /// db.exec_batch("CREATE TABLE customer (id TEXT PRIMARY KEY, nama TEXT NOT NULL);")?;
    /// db.exec("INSERT INTO customer(id, nama) VALUES (?, ?)", params!["eko", "Eko"])?;
    ///
    /// let names = db.query("SELECT nama FROM customer WHERE id = ?", params!["eko"], |rows| {
    ///     let mut names = Vec::new();
    ///     while let Some(row) = rows.next_row()? {
    ///         names.push(row.get::<String>(0)?);
    ///     }
    ///     Ok(names)
    /// })?;
    /// assert_eq!(names, vec!["Eko".to_string()]);
    /// # Ok::<(), safesql::SafeSqlError>(())
    /// ```
    pub fn query<T, F>(&self, sql: impl Into<Sql>, params: &[&dyn ToSql], work: F) -> Result<T>
    where
        F: FnOnce(&mut RowSet<'_>) -> Result<T>,
    {
        self.executor().query(sql.into(), params, work)
    }

    /// Runs a query and collects every row.
    pub fn query_all(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<Vec<Row>> {
        self.executor().query_all(sql.into(), params)
    }

    /// Runs a query and returns its first row, if any.
    pub fn query_row(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<Option<Row>> {
        self.executor().query_row(sql.into(), params)
    }

    /// Executes an insert/update/delete.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Exec` on constraint violation, malformed
    /// statement or placeholder/parameter count mismatch.
    pub fn exec(&self, sql: impl Into<Sql>, params: &[&dyn ToSql]) -> Result<ExecResult> {
        self.executor().exec(sql.into(), params)
    }

    /// Runs a parameterless batch of statements, such as schema setup.
    pub fn exec_batch(&self, sql: impl Into<Sql>) -> Result<()> {
        self.executor().exec_batch(sql.into())
    }

    /// Compiles a statement once for repeated execution.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Prepare` if the text is empty or malformed.
    pub fn prepare(&self, sql: impl Into<Sql>) -> Result<Statement<'_>> {
        self.executor().prepare(sql.into())
    }

    /// Begins a transaction. Dropping the returned handle without resolving
    /// it rolls the transaction back.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::TransactionState` if a transaction is already
    /// open on this connection.
    pub fn begin(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self.executor(), self.transaction_behavior)
    }

    /// Runs `work` inside a transaction.
    ///
    /// `work` decides the outcome by calling `commit` or `rollback` itself;
    /// the facade never commits on its behalf. If `work` returns an error the
    /// transaction is rolled back before the error is returned. If `work`
    /// returns without resolving the transaction it is rolled back and a
    /// `TransactionState` error is returned.
    pub fn with_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T>,
    {
        let mut tx = self.begin()?;
        match work(&mut tx) {
            Ok(value) if !tx.is_active() => Ok(value),
            Ok(_) => {
                tx.rollback()?;
                Err(SafeSqlError::TransactionState(
                    "transaction work finished without commit or rollback; changes were rolled back"
                        .to_string(),
                ))
            }
            Err(err) => {
                if tx.is_active() {
                    warn!(error = %err, "Rolling back transaction after error");
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(error = %rollback_err, "Rollback after error failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Closes the session, reporting any failure to release it.
    ///
    /// Dropping a `Database` also closes it, but silently.
    pub fn close(self) -> Result<()> {
        let path = self.path.clone().unwrap_or_else(|| ":memory:".to_string());
        self.conn
            .close()
            .map_err(|(_, e)| SafeSqlError::from_driver(Operation::Connect, e, None))?;
        debug!(path = %path, "Closed database");
        Ok(())
    }

    pub(crate) fn raw_executor(&self) -> QueryExecutor<'_> {
        self.executor()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("statement_timeout", &self.statement_timeout)
            .field("transaction_behavior", &self.transaction_behavior)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

fn connection_error(path: &str, err: rusqlite::Error) -> SafeSqlError {
    SafeSqlError::Connection(format!("failed to open '{}': {}", path, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::transaction::TransactionState;
    use crate::params;

    fn comments_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.exec_batch(
            "CREATE TABLE comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT NOT NULL,
                comment TEXT
            );",
        )
        .unwrap();
        db
    }

    fn count_comments(db: &Database) -> i64 {
        db.query_row("SELECT COUNT(*) FROM comments", params![])
            .unwrap()
            .unwrap()
            .get(0)
            .unwrap()
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.path(), None);
        assert!(!db.in_transaction());
        db.close().unwrap();
    }

    #[test]
    fn test_connection_error_handling() {
        let source = DataSource::file("/nonexistent/path/database.db");
        let result = Database::open(&source);

        match result.unwrap_err() {
            SafeSqlError::Connection(msg) => assert!(msg.contains("/nonexistent/path/database.db")),
            other => panic!("Expected Connection error, got {:?}", other),
        }
    }

    #[test]
    fn test_file_database_path_tracking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("belajar.db");
        let source = DataSource::file(path.to_str().unwrap());

        let db = Database::open(&source).unwrap();
        assert_eq!(db.path(), path.to_str());
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ro.db");
        let path = path.to_str().unwrap();
        Database::open(&DataSource::file(path))
            .unwrap()
            .exec_batch("CREATE TABLE t (x INTEGER);")
            .unwrap();

        let mut source = DataSource::file(path);
        source.read_only = true;
        let db = Database::open(&source).unwrap();
        let result = db.exec("INSERT INTO t (x) VALUES (?)", params![1]);
        assert!(matches!(result, Err(SafeSqlError::Exec(_))));
    }

    #[test]
    fn test_commit_persists_rows() {
        let db = comments_db();
        db.with_transaction(|tx| {
            for i in 0..3 {
                tx.exec(
                    "INSERT INTO comments(email, comment) VALUES (?, ?)",
                    params![format!("eko{}@gmail.com", i), "kept"],
                )?;
            }
            tx.commit()
        })
        .unwrap();

        assert_eq!(count_comments(&db), 3);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_rollback_restores_row_count() {
        let db = comments_db();
        db.exec("INSERT INTO comments(email) VALUES (?)", params!["before@x.y"])
            .unwrap();

        let ids = db
            .with_transaction(|tx| {
                let mut ids = Vec::new();
                for i in 0..10 {
                    let result = tx.exec(
                        "INSERT INTO comments(email, comment) VALUES (?, ?)",
                        params![format!("eko{}@gmail.com", i), format!("Komentar ke{}", i)],
                    )?;
                    ids.extend(result.last_insert_id);
                }
                tx.rollback()?;
                Ok(ids)
            })
            .unwrap();

        assert_eq!(ids.len(), 10);
        assert_eq!(count_comments(&db), 1);
    }

    #[test]
    fn test_error_in_work_rolls_back() {
        let db = comments_db();
        let result: Result<()> = db.with_transaction(|tx| {
            tx.exec("INSERT INTO comments(email) VALUES (?)", params!["a@b.c"])?;
            tx.exec("INSERT INTO comments(email) VALUES (?)", params![None::<String>])?;
            tx.commit()
        });

        assert!(matches!(result, Err(SafeSqlError::Exec(_))));
        assert_eq!(count_comments(&db), 0);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_unresolved_work_is_rolled_back() {
        let db = comments_db();
        let result = db.with_transaction(|tx| {
            tx.exec("INSERT INTO comments(email) VALUES (?)", params!["a@b.c"])?;
            Ok(())
        });

        assert!(matches!(result, Err(SafeSqlError::TransactionState(_))));
        assert_eq!(count_comments(&db), 0);
    }

    #[test]
    fn test_nested_transaction_fails() {
        let db = comments_db();
        let result = db.with_transaction(|tx| {
            let nested = db.with_transaction(|inner| inner.commit());
            assert!(matches!(nested, Err(SafeSqlError::TransactionState(_))));
            tx.rollback()
        });
        assert!(result.is_ok());
    }

    #[test]
    fn test_locked_begin_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("locked.db");
        let mut source = DataSource::file(path.to_str().unwrap());
        source.busy_timeout_ms = 0;
        source.transaction_behavior = TransactionBehavior::Immediate;

        let holder = Database::open(&source).unwrap();
        holder.exec_batch("CREATE TABLE t (x INTEGER);").unwrap();
        let writer = Database::open(&source).unwrap();

        let mut held = holder.begin().unwrap();
        match writer.begin().unwrap_err() {
            SafeSqlError::Connection(msg) => assert!(msg.contains("locked")),
            other => panic!("Expected Connection error, got {:?}", other),
        }
        assert!(!writer.in_transaction());

        held.rollback().unwrap();
        let mut retried = writer.begin().unwrap();
        retried.rollback().unwrap();
    }

    #[test]
    fn test_double_resolution_fails() {
        let db = comments_db();
        let mut tx = db.begin().unwrap();
        tx.commit().unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);

        assert!(matches!(tx.rollback(), Err(SafeSqlError::TransactionState(_))));
        assert!(matches!(tx.commit(), Err(SafeSqlError::TransactionState(_))));
        assert!(matches!(
            tx.exec("INSERT INTO comments(email) VALUES (?)", params!["late@x.y"]),
            Err(SafeSqlError::TransactionState(_))
        ));
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let db = comments_db();
        {
            let tx = db.begin().unwrap();
            tx.exec("INSERT INTO comments(email) VALUES (?)", params!["gone@x.y"])
                .unwrap();
        }
        assert_eq!(count_comments(&db), 0);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_panic_in_work_rolls_back() {
        let db = comments_db();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = db.with_transaction(|tx| {
                tx.exec("INSERT INTO comments(email) VALUES (?)", params!["boom@x.y"])?;
                panic!("work failed mid-transaction");
            });
        }));

        assert!(outcome.is_err());
        assert_eq!(count_comments(&db), 0);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_cancel_handle_interrupts_query() {
        let db = Database::open_in_memory().unwrap();
        let handle = db.cancel_handle();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });

        let result = db.query_all(
            "WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c)
             SELECT count(*) FROM c",
            params![],
        );
        canceller.join().unwrap();

        assert!(matches!(
            result,
            Err(SafeSqlError::Interrupted { operation: Operation::Query })
        ));
    }

    #[test]
    fn test_statement_timeout_applies_to_exec() {
        let mut db = comments_db();
        db.set_statement_timeout(Some(Duration::from_millis(50)));

        let result = db.exec(
            "INSERT INTO comments(email)
             WITH RECURSIVE c(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM c)
             SELECT 'x' || n FROM c",
            params![],
        );

        assert!(matches!(
            result,
            Err(SafeSqlError::TimedOut { operation: Operation::Exec, .. })
        ));
        assert_eq!(db.statement_timeout(), Some(Duration::from_millis(50)));
    }
}

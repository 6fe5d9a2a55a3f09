/// Prepared Statement Module
///
/// A compiled statement bound to one connection, reusable across parameter
/// sets. Parameters are sent separately from the SQL text.
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{Connection, ToSql};
use tracing::debug;

use crate::core::db::cancel::{DeadlineGuard, DeadlineState};
use crate::core::db::row::{describe_columns, ColumnInfo, ExecResult, RowSet};
use crate::core::db::sql::StatementType;
use crate::core::{Operation, Result, SafeSqlError};

/// A prepared statement for parameterized execution.
///
/// The engine-side statement is finalized when the value is dropped. A
/// statement is used sequentially; it borrows its connection mutably only
/// while a `RowSet` from it is alive.
pub struct Statement<'c> {
    stmt: rusqlite::Statement<'c>,
    conn: &'c Connection,
    deadlines: &'c DeadlineState,
    timeout: Option<Duration>,
    statement_type: StatementType,
    columns: Arc<[ColumnInfo]>,
}

impl std::fmt::Debug for Statement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("statement_type", &self.statement_type)
            .field("parameter_count", &self.parameter_count())
            .field("columns", &self.columns)
            .finish()
    }
}

impl<'c> Statement<'c> {
    pub(crate) fn new(
        stmt: rusqlite::Statement<'c>,
        conn: &'c Connection,
        deadlines: &'c DeadlineState,
        timeout: Option<Duration>,
        statement_type: StatementType,
    ) -> Self {
        let columns = describe_columns(&stmt);
        Statement {
            stmt,
            conn,
            deadlines,
            timeout,
            statement_type,
            columns,
        }
    }

    /// Get the number of placeholders in this statement.
    pub fn parameter_count(&self) -> usize {
        self.stmt.parameter_count()
    }

    /// Columns the statement produces; empty for non-queries.
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    fn check_arity(&self, operation: Operation, params: &[&dyn ToSql]) -> Result<()> {
        let expected = self.parameter_count();
        if expected != params.len() {
            return Err(SafeSqlError::arity(operation, expected, params.len()));
        }
        Ok(())
    }

    fn deadline(&self) -> Option<DeadlineGuard<'c>> {
        self.timeout
            .map(|limit| DeadlineGuard::install(self.conn, self.deadlines, limit))
    }

    /// Executes the statement with one parameter set.
    ///
    /// `last_insert_id` is set only when the execution generated a new rowid;
    /// updates, upserts that took the update branch and inserts into
    /// `WITHOUT ROWID` tables leave it empty.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Exec` if the parameter count does not match the
    /// placeholders or the engine rejects the execution (constraint
    /// violation, type mismatch).
    pub fn execute(&mut self, params: &[&dyn ToSql]) -> Result<ExecResult> {
        self.check_arity(Operation::Exec, params)?;

        let deadline = self.deadline();
        let previous_rowid = self.conn.last_insert_rowid();
        let rows_affected = self.stmt.execute(params).map_err(|e| {
            let fired = deadline.as_ref().and_then(DeadlineGuard::fired_timeout);
            SafeSqlError::from_driver(Operation::Exec, e, fired)
        })?;

        // The engine only moves the last rowid when a rowid table gained a row.
        let rowid = self.conn.last_insert_rowid();
        let last_insert_id = (rows_affected > 0 && rowid != previous_rowid).then_some(rowid);

        debug!(rows_affected, ?last_insert_id, "Executed prepared statement");
        Ok(ExecResult {
            rows_affected,
            last_insert_id,
        })
    }

    /// Runs the statement as a query and returns a lazy row set.
    ///
    /// The statement cannot be used again until the row set is dropped.
    ///
    /// # Errors
    ///
    /// Returns `SafeSqlError::Query` on arity mismatch or engine rejection.
    pub fn query(&mut self, params: &[&dyn ToSql]) -> Result<RowSet<'_>> {
        self.check_arity(Operation::Query, params)?;

        let deadline = self.deadline();
        let columns = Arc::clone(&self.columns);
        match self.stmt.query(params) {
            Ok(rows) => Ok(RowSet::new(rows, columns, deadline)),
            Err(e) => {
                let fired = deadline.as_ref().and_then(DeadlineGuard::fired_timeout);
                Err(SafeSqlError::from_driver(Operation::Query, e, fired))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::db::Database;
    use crate::core::SafeSqlError;
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

    #[test]
    fn test_prepared_insert_reports_increasing_ids() {
        let db = comments_db();
        let mut stmt = db
            .prepare("INSERT INTO comments(email, comment) VALUES (?, ?)")
            .unwrap();
        assert_eq!(stmt.parameter_count(), 2);

        let mut last = 0;
        for i in 0..10 {
            let email = format!("eko{}@gmail.com", i);
            let comment = format!("Komentar ke{}", i);
            let result = stmt.execute(params![email, comment]).unwrap();
            assert_eq!(result.rows_affected, 1);
            let id = result.last_insert_id.unwrap();
            assert!(id > last);
            last = id;
        }
    }

    #[test]
    fn test_update_has_no_insert_id() {
        let db = comments_db();
        db.exec(
            "INSERT INTO comments(email, comment) VALUES (?, ?)",
            params!["a@b.c", "hi"],
        )
        .unwrap();

        let mut stmt = db.prepare("UPDATE comments SET comment = ? WHERE email = ?").unwrap();
        let result = stmt.execute(params!["edited", "a@b.c"]).unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, None);
    }

    #[test]
    fn test_statement_arity_is_checked() {
        let db = comments_db();
        let mut stmt = db
            .prepare("INSERT INTO comments(email, comment) VALUES (?, ?)")
            .unwrap();

        assert!(matches!(stmt.execute(params!["only-one"]), Err(SafeSqlError::Exec(_))));
        assert!(matches!(
            stmt.execute(params!["a", "b", "c"]),
            Err(SafeSqlError::Exec(_))
        ));
    }

    #[test]
    fn test_prepared_query_is_reusable() {
        let db = comments_db();
        db.exec(
            "INSERT INTO comments(email, comment) VALUES (?, ?)",
            params!["x@y.z", "first"],
        )
        .unwrap();

        let mut stmt = db.prepare("SELECT comment FROM comments WHERE email = ?").unwrap();
        assert_eq!(stmt.columns()[0].name, "comment");

        for _ in 0..3 {
            let rows = stmt.query(params!["x@y.z"]).unwrap().collect_rows().unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].get::<String>(0).unwrap(), "first");
        }

        let none = stmt.query(params!["nobody"]).unwrap().collect_rows().unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_insert_id_follows_the_engine_not_the_keyword() {
        let db = comments_db();
        db.exec_batch(
            "CREATE TABLE tags (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT UNIQUE, hits INTEGER);
             CREATE TABLE kv (k TEXT PRIMARY KEY, v TEXT) WITHOUT ROWID;",
        )
        .unwrap();
        let first = db
            .exec("INSERT INTO tags (name, hits) VALUES (?, 1)", params!["rust"])
            .unwrap();
        assert_eq!(first.last_insert_id, Some(1));

        let upsert = db
            .exec(
                "INSERT INTO tags (name, hits) VALUES (?, 1)
                 ON CONFLICT(name) DO UPDATE SET hits = hits + 1",
                params!["rust"],
            )
            .unwrap();
        assert_eq!(upsert.rows_affected, 1);
        assert_eq!(upsert.last_insert_id, None);

        let no_rowid = db
            .exec("INSERT INTO kv (k, v) VALUES (?, ?)", params!["lang", "rust"])
            .unwrap();
        assert_eq!(no_rowid.rows_affected, 1);
        assert_eq!(no_rowid.last_insert_id, None);

        let with_cte = db
            .exec(
                "WITH src(e) AS (SELECT ?) INSERT INTO tags (name, hits) SELECT e, 0 FROM src",
                params!["sqlite"],
            )
            .unwrap();
        assert_eq!(with_cte.last_insert_id, Some(2));

        let commented = db
            .exec(
                "-- new tag\nINSERT INTO tags (name, hits) VALUES (?, 0)",
                params!["tokio"],
            )
            .unwrap();
        assert_eq!(commented.last_insert_id, Some(3));
    }
}

//! Query Text Module
//!
//! Query text accepted by the facade, and a keyword-based statement
//! classifier.
use std::fmt;

use crate::core::{Operation, Result, SafeSqlError};

/// Statement text made of compile-time literals only.
///
/// `Sql` can only be built from a `&'static str`, so text assembled at
/// runtime from caller input (with `format!`, `+` or `push_str`) is rejected
/// by the type checker. Variable data has to travel as bound parameters.
///
/// ```compile_fail
/// use safesql::Sql;
/// let username = String::from("admin' --");
/// let text = format!("SELECT username FROM user WHERE username = '{}'", username);
/// let _sql = Sql::from(text.as_str());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Sql(&'static str);

impl Sql {
    /// Wraps a literal statement.
    pub const fn new(text: &'static str) -> Self {
        Sql(text)
    }

    /// Returns the raw statement text.
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Classifies the statement by its leading keyword.
    pub fn statement_type(&self) -> StatementType {
        StatementType::from_sql(self.0)
    }

    /// Rejects statements with no content before they reach the engine.
    pub(crate) fn validate(&self, operation: Operation) -> Result<&'static str> {
        validate_text(self.0, operation)?;
        Ok(self.0)
    }
}

impl From<&'static str> for Sql {
    fn from(text: &'static str) -> Self {
        Sql(text)
    }
}

impl fmt::Display for Sql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub(crate) fn validate_text(text: &str, operation: Operation) -> Result<()> {
    if text.trim().is_empty() {
        let message = "cannot run an empty SQL statement".to_string();
        return Err(match operation {
            Operation::Exec => SafeSqlError::Exec(message),
            Operation::Query => SafeSqlError::Query(message),
            _ => SafeSqlError::Prepare(message),
        });
    }
    Ok(())
}

/// Represents different SQL statement types for introspection
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StatementType {
    /// SELECT statement
    Select,
    /// INSERT or REPLACE statement
    Insert,
    /// UPDATE statement
    Update,
    /// DELETE statement
    Delete,
    /// CREATE, DROP or ALTER statement
    Ddl,
    /// BEGIN/COMMIT/ROLLBACK transaction commands
    Transaction,
    /// Other statement types
    Other,
}

impl StatementType {
    /// Determines the statement type from a SQL string
    pub fn from_sql(sql: &str) -> Self {
        let sql_upper = sql.trim_start().to_uppercase();
        let keyword = sql_upper
            .split(|c: char| !c.is_ascii_alphabetic())
            .next()
            .unwrap_or("");

        match keyword {
            "SELECT" | "WITH" | "VALUES" => StatementType::Select,
            "INSERT" | "REPLACE" => StatementType::Insert,
            "UPDATE" => StatementType::Update,
            "DELETE" => StatementType::Delete,
            "CREATE" | "DROP" | "ALTER" => StatementType::Ddl,
            "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
                StatementType::Transaction
            }
            _ => StatementType::Other,
        }
    }
}

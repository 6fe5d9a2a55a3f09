//! Unchecked execution of runtime-built SQL text.
//!
//! These functions accept text assembled at runtime, for example by
//! concatenating user input into a statement. They reproduce SQL injection:
//! a value such as `admin' --` rewrites the statement it is pasted into.
//! Use the `Database` methods with bound parameters for anything else.
use tracing::warn;

use crate::core::db::{Database, ExecResult, Row};
use crate::core::Result;

/// Runs runtime-built query text and collects the rows.
pub fn query_concatenated(db: &Database, text: &str) -> Result<Vec<Row>> {
    warn!(sql = text, "Running concatenated SQL text without bound parameters");
    db.raw_executor().query_text(text, &[], |rows| {
        let mut out = Vec::new();
        while let Some(row) = rows.next_row()? {
            out.push(row);
        }
        Ok(out)
    })
}

/// Executes runtime-built statement text.
pub fn exec_concatenated(db: &Database, text: &str) -> Result<ExecResult> {
    warn!(sql = text, "Executing concatenated SQL text without bound parameters");
    db.raw_executor().exec_text(text, &[])
}

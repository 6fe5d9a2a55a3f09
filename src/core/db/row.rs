/// Row Module
///
/// Result rows and the lazy, forward-only `RowSet` produced by queries.
use std::sync::Arc;

use crate::core::db::cancel::DeadlineGuard;
use crate::core::db::value::{ColumnKind, FromValue, Value};
use crate::core::{Operation, Result, SafeSqlError};

/// Column metadata captured when a statement is compiled.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    /// Column name as reported by the engine
    pub name: String,
    /// Declared type from the table definition, if any
    pub decl_type: Option<String>,
    /// Decoding hint derived from the declared type
    pub kind: ColumnKind,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, decl_type: Option<&str>) -> Self {
        ColumnInfo {
            name: name.into(),
            decl_type: decl_type.map(str::to_string),
            kind: ColumnKind::from_decl_type(decl_type),
        }
    }
}

pub(crate) fn describe_columns(stmt: &rusqlite::Statement<'_>) -> Arc<[ColumnInfo]> {
    stmt.columns()
        .iter()
        .map(|c| ColumnInfo::new(c.name(), c.decl_type()))
        .collect()
}

/// One fully decoded result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ColumnInfo]>,
    values: Vec<Value>,
}

impl Row {
    pub(crate) fn from_driver(columns: &Arc<[ColumnInfo]>, row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let mut values = Vec::with_capacity(columns.len());
        for (idx, column) in columns.iter().enumerate() {
            values.push(Value::decode(row.get_ref(idx)?, column.kind));
        }
        Ok(Row {
            columns: Arc::clone(columns),
            values,
        })
    }

    /// Number of fields in the row.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Raw value at `idx`.
    pub fn value(&self, idx: usize) -> Result<&Value> {
        self.values.get(idx).ok_or_else(|| {
            SafeSqlError::Scan(format!(
                "column index {} out of range for a row of {} column(s)",
                idx,
                self.values.len()
            ))
        })
    }

    /// Decodes the value at `idx` into `T`.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self.value(idx)?;
        T::from_value(value).map_err(|reason| {
            SafeSqlError::Scan(format!("column '{}': {}", self.columns[idx].name, reason))
        })
    }

    /// Decodes the value of the column named `name` into `T`.
    pub fn get_by_name<T: FromValue>(&self, name: &str) -> Result<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| SafeSqlError::Scan(format!("no column named '{}'", name)))?;
        self.get(idx)
    }

    /// Decodes the whole row into a tuple whose arity must match the row's.
    pub fn scan<T: FromRow>(&self) -> Result<T> {
        T::from_row(self)
    }
}

/// Conversion from a whole row into a fixed-arity destination.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

macro_rules! impl_from_row_for_tuple {
    ($len:expr; $($name:ident : $idx:tt),+) => {
        impl<$($name: FromValue),+> FromRow for ($($name,)+) {
            fn from_row(row: &Row) -> Result<Self> {
                if row.len() != $len {
                    return Err(SafeSqlError::Scan(format!(
                        "expected {} column(s) but the row has {}",
                        $len,
                        row.len()
                    )));
                }
                Ok(($(row.get::<$name>($idx)?,)+))
            }
        }
    };
}

impl_from_row_for_tuple!(1; A: 0);
impl_from_row_for_tuple!(2; A: 0, B: 1);
impl_from_row_for_tuple!(3; A: 0, B: 1, C: 2);
impl_from_row_for_tuple!(4; A: 0, B: 1, C: 2, D: 3);
impl_from_row_for_tuple!(5; A: 0, B: 1, C: 2, D: 3, E: 4);
impl_from_row_for_tuple!(6; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5);
impl_from_row_for_tuple!(7; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6);
impl_from_row_for_tuple!(8; A: 0, B: 1, C: 2, D: 3, E: 4, F: 5, G: 6, H: 7);

/// Lazy, forward-only, single-pass sequence of rows.
///
/// Each step may block on the engine. Stepping past the last row returns
/// `Ok(None)`; after the end or an error the set stays exhausted. The
/// engine statement is reset when the set is dropped.
pub struct RowSet<'s> {
    rows: rusqlite::Rows<'s>,
    columns: Arc<[ColumnInfo]>,
    deadline: Option<DeadlineGuard<'s>>,
    finished: bool,
}

impl<'s> RowSet<'s> {
    pub(crate) fn new(
        rows: rusqlite::Rows<'s>,
        columns: Arc<[ColumnInfo]>,
        deadline: Option<DeadlineGuard<'s>>,
    ) -> Self {
        RowSet {
            rows,
            columns,
            deadline,
            finished: false,
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Advances to the next row.
    pub fn next_row(&mut self) -> Result<Option<Row>> {
        if self.finished {
            return Ok(None);
        }

        let step = match self.rows.next() {
            Ok(Some(row)) => Row::from_driver(&self.columns, row).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e),
        };

        match step {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => {
                self.finished = true;
                Ok(None)
            }
            Err(e) => {
                self.finished = true;
                let fired = self.deadline.as_ref().and_then(DeadlineGuard::fired_timeout);
                Err(SafeSqlError::from_driver(Operation::Query, e, fired))
            }
        }
    }

    /// Drains the remaining rows.
    pub fn collect_rows(mut self) -> Result<Vec<Row>> {
        let mut out = Vec::new();
        while let Some(row) = self.next_row()? {
            out.push(row);
        }
        Ok(out)
    }
}

impl Iterator for RowSet<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_row().transpose()
    }
}

/// Outcome of an insert/update/delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecResult {
    /// Rows changed by the statement
    pub rows_affected: usize,
    /// Generated row id, present only for inserts that added a row
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let columns: Arc<[ColumnInfo]> = vec![
            ColumnInfo::new("id", Some("TEXT")),
            ColumnInfo::new("email", Some("TEXT")),
            ColumnInfo::new("married", Some("BOOLEAN")),
        ]
        .into();
        Row {
            columns,
            values: vec![
                Value::Text("eko".into()),
                Value::Null,
                Value::Bool(true),
            ],
        }
    }

    #[test]
    fn test_scan_tuple() {
        let row = sample_row();
        let (id, email, married): (String, Option<String>, bool) = row.scan().unwrap();
        assert_eq!(id, "eko");
        assert_eq!(email, None);
        assert!(married);
    }

    #[test]
    fn test_scan_arity_mismatch() {
        let row = sample_row();
        let result = row.scan::<(String, Option<String>)>();
        match result {
            Err(SafeSqlError::Scan(msg)) => assert!(msg.contains("expected 2 column(s)")),
            other => panic!("Expected Scan error, got {:?}", other),
        }
    }

    #[test]
    fn test_null_into_non_optional_is_scan_error() {
        let row = sample_row();
        match row.get::<String>(1) {
            Err(SafeSqlError::Scan(msg)) => assert!(msg.contains("email")),
            other => panic!("Expected Scan error, got {:?}", other),
        }
    }

    #[test]
    fn test_get_by_name_and_out_of_range() {
        let row = sample_row();
        assert!(row.get_by_name::<bool>("MARRIED").unwrap());
        assert!(row.get_by_name::<bool>("missing").is_err());
        assert!(row.value(10).is_err());
    }
}

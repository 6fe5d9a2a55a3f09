/// Value Module
///
/// Typed, nullable column values and the conversions used to decode them
/// into caller types. SQLite stores booleans as integers and timestamps as
/// text or epoch seconds, so the declared column type is used as a hint when
/// decoding. Hinted values keep their stored representation.
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{FromSql, ToSql, ToSqlOutput, ValueRef};

/// A single column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Timestamp(Timestamp),
    Blob(Vec<u8>),
}

/// A value read from a date/time column, exactly as the engine stored it.
#[derive(Debug, Clone, PartialEq)]
pub enum Timestamp {
    /// ISO-8601 text such as `2024-01-02 03:04:05` or `1999-09-09`
    Text(String),
    /// Seconds since the Unix epoch
    Unix(i64),
}

impl Timestamp {
    /// Interprets the stored value as a date and time.
    pub fn to_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Timestamp::Text(text) => parse_timestamp(text),
            Timestamp::Unix(secs) => DateTime::from_timestamp(*secs, 0).map(|ts| ts.naive_utc()),
        }
    }
}

/// How a column's declared type asks its values to be read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnKind {
    Boolean,
    Timestamp,
    Plain,
}

impl ColumnKind {
    /// Derives the kind from a declared column type such as `BOOLEAN` or `DATETIME`.
    pub fn from_decl_type(decl_type: Option<&str>) -> Self {
        let Some(decl) = decl_type else {
            return ColumnKind::Plain;
        };
        let decl = decl.to_ascii_uppercase();
        if decl.contains("BOOL") {
            ColumnKind::Boolean
        } else if decl.contains("DATE") || decl.contains("TIME") {
            ColumnKind::Timestamp
        } else {
            ColumnKind::Plain
        }
    }
}

impl Value {
    /// Decodes a raw engine value using the column kind as a hint.
    ///
    /// Values that do not fit the hint are returned as their plain storage
    /// variant.
    pub fn decode(raw: ValueRef<'_>, kind: ColumnKind) -> Value {
        match (raw, kind) {
            (ValueRef::Null, _) => Value::Null,
            (ValueRef::Integer(i @ (0 | 1)), ColumnKind::Boolean) => Value::Bool(i == 1),
            (ValueRef::Text(t), ColumnKind::Timestamp) => {
                let text = String::from_utf8_lossy(t).into_owned();
                if parse_timestamp(&text).is_some() {
                    Value::Timestamp(Timestamp::Text(text))
                } else {
                    Value::Text(text)
                }
            }
            (ValueRef::Integer(secs), ColumnKind::Timestamp) => {
                let stamp = Timestamp::Unix(secs);
                if stamp.to_datetime().is_some() {
                    Value::Timestamp(stamp)
                } else {
                    Value::Integer(secs)
                }
            }
            (ValueRef::Integer(i), _) => Value::Integer(i),
            (ValueRef::Real(f), _) => Value::Real(f),
            (ValueRef::Text(t), _) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            (ValueRef::Blob(b), _) => Value::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in scan error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Bool(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Blob(_) => "blob",
        }
    }
}

/// Parses the textual layouts SQLite's date functions produce.
///
/// A bare date is read as midnight.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let raw = ValueRef::Text(text.trim().as_bytes());
    NaiveDateTime::column_result(raw).ok().or_else(|| {
        NaiveDate::column_result(raw)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    })
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Value::Text(s) | Value::Timestamp(Timestamp::Text(s)) => {
                ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes()))
            }
            Value::Integer(i) | Value::Timestamp(Timestamp::Unix(i)) => {
                ToSqlOutput::Borrowed(ValueRef::Integer(*i))
            }
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Bool(b) => ToSqlOutput::Borrowed(ValueRef::Integer(i64::from(*b))),
            Value::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Real(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Conversion from a decoded column value into a caller type.
///
/// Returns a short description of the mismatch on failure; `Row` turns it
/// into a `Scan` error naming the column.
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self, String>;
}

fn mismatch<T>(value: &Value, target: &str) -> Result<T, String> {
    Err(format!("cannot read {} value as {}", value.type_name(), target))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self, String> {
        Ok(value.clone())
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Integer(i) => Ok(i.to_string()),
            Value::Real(f) => Ok(f.to_string()),
            Value::Timestamp(Timestamp::Text(s)) => Ok(s.clone()),
            Value::Timestamp(Timestamp::Unix(secs)) => Ok(secs.to_string()),
            other => mismatch(other, "string"),
        }
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Integer(i) | Value::Timestamp(Timestamp::Unix(i)) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => mismatch(other, "i64"),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self, String> {
        let wide = i64::from_value(value).or_else(|_| mismatch(value, "i32"))?;
        i32::try_from(wide).map_err(|_| format!("integer {} is out of range for i32", wide))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Real(f) => Ok(*f),
            Value::Integer(i) => Ok(*i as f64),
            other => mismatch(other, "f64"),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(0) => Ok(false),
            Value::Integer(1) => Ok(true),
            other => mismatch(other, "bool"),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Timestamp(stamp) => stamp
                .to_datetime()
                .ok_or_else(|| format!("{:?} is out of range for a timestamp", stamp)),
            Value::Text(s) => parse_timestamp(s).ok_or_else(|| format!("'{}' is not a timestamp", s)),
            other => mismatch(other, "timestamp"),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self, String> {
        NaiveDateTime::from_value(value)
            .map(|ts| ts.date())
            .map_err(|_| match value {
                Value::Text(s) => format!("'{}' is not a date", s),
                other => format!("cannot read {} value as date", other.type_name()),
            })
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => mismatch(other, "bytes"),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

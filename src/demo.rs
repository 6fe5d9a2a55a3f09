//! Sample schema and scenarios driven through the facade.
//!
//! Covers customer insert and listing, login lookups (bound and
//! concatenated), comments with generated ids, prepared batch inserts and a
//! rolled-back transaction.
use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::core::db::{Database, Sql};
use crate::core::Result;
use crate::params;
use crate::unchecked;

/// Tables used by the scenarios.
pub const SCHEMA: Sql = Sql::new(
    "
    CREATE TABLE IF NOT EXISTS customer (
        id TEXT PRIMARY KEY,
        nama TEXT NOT NULL,
        email TEXT,
        balanced INTEGER NOT NULL DEFAULT 0,
        rating REAL NOT NULL DEFAULT 0.0,
        birth_date DATE,
        married BOOLEAN NOT NULL DEFAULT 0,
        created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS user (
        username TEXT PRIMARY KEY,
        password TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS comments (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        comment TEXT
    );
    ",
);

/// A row of the `customer` table.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub balance: i32,
    pub rating: f64,
    pub birth_date: Option<NaiveDate>,
    pub married: bool,
    pub created_at: Option<NaiveDateTime>,
}

impl Customer {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Customer {
            id: id.into(),
            name: name.into(),
            email: None,
            balance: 0,
            rating: 0.0,
            birth_date: None,
            married: false,
            created_at: None,
        }
    }
}

pub fn apply_schema(db: &Database) -> Result<()> {
    db.exec_batch(SCHEMA)
}

/// Inserts a customer; `created_at` defaults to the current time when unset.
pub fn insert_customer(db: &Database, customer: &Customer) -> Result<()> {
    db.exec(
        "INSERT INTO customer (id, nama, email, balanced, rating, birth_date, married, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))",
        params![
            customer.id,
            customer.name,
            customer.email,
            customer.balance,
            customer.rating,
            customer.birth_date,
            customer.married,
            customer.created_at
        ],
    )?;
    debug!(id = %customer.id, "Inserted customer");
    Ok(())
}

/// Lists every customer ordered by id.
pub fn list_customers(db: &Database) -> Result<Vec<Customer>> {
    db.query(
        "SELECT id, nama, email, balanced, rating, birth_date, married, created_at
         FROM customer ORDER BY id",
        params![],
        |rows| {
            let mut customers = Vec::new();
            while let Some(row) = rows.next_row()? {
                let (id, name, email, balance, rating, birth_date, married, created_at): (
                    String,
                    String,
                    Option<String>,
                    i32,
                    f64,
                    Option<NaiveDate>,
                    bool,
                    NaiveDateTime,
                ) = row.scan()?;
                customers.push(Customer {
                    id,
                    name,
                    email,
                    balance,
                    rating,
                    birth_date,
                    married,
                    created_at: Some(created_at),
                });
            }
            Ok(customers)
        },
    )
}

pub fn register_user(db: &Database, username: &str, password: &str) -> Result<()> {
    db.exec(
        "INSERT INTO user (username, password) VALUES (?, ?)",
        params![username, password],
    )?;
    Ok(())
}

/// Looks a user up with bound parameters; returns the username on a match.
pub fn login(db: &Database, username: &str, password: &str) -> Result<Option<String>> {
    db.query_row(
        "SELECT username FROM user WHERE username = ? AND password = ? LIMIT 1",
        params![username, password],
    )?
    .map(|row| row.get::<String>(0))
    .transpose()
}

/// Looks a user up by pasting the inputs into the statement text.
///
/// Vulnerable to injection; kept to show the difference from `login`.
pub fn login_concatenated(db: &Database, username: &str, password: &str) -> Result<Option<String>> {
    let text = format!(
        "SELECT username FROM user WHERE username = '{}' AND password = '{}' LIMIT 1",
        username, password
    );
    unchecked::query_concatenated(db, &text)?
        .first()
        .map(|row| row.get::<String>(0))
        .transpose()
}

/// Adds a comment and returns its generated id.
pub fn add_comment(db: &Database, email: &str, comment: &str) -> Result<i64> {
    let result = db.exec(
        "INSERT INTO comments (email, comment) VALUES (?, ?)",
        params![email, comment],
    )?;
    generated_id(result.last_insert_id)
}

/// Adds `count` numbered comments through one prepared statement.
pub fn add_comments_prepared(db: &Database, count: usize) -> Result<Vec<i64>> {
    let mut stmt = db.prepare("INSERT INTO comments (email, comment) VALUES (?, ?)")?;
    let mut ids = Vec::with_capacity(count);
    for i in 0..count {
        let (email, comment) = numbered_comment(i);
        let result = stmt.execute(params![email, comment])?;
        ids.push(generated_id(result.last_insert_id)?);
    }
    Ok(ids)
}

/// Adds `count` comments inside a transaction, then rolls it back.
///
/// Returns the ids the engine handed out before the rollback.
pub fn add_comments_then_rollback(db: &Database, count: usize) -> Result<Vec<i64>> {
    db.with_transaction(|tx| {
        let mut ids = Vec::with_capacity(count);
        for i in 0..count {
            let (email, comment) = numbered_comment(i);
            let result = tx.exec(
                "INSERT INTO comments (email, comment) VALUES (?, ?)",
                params![email, comment],
            )?;
            ids.push(generated_id(result.last_insert_id)?);
        }
        tx.rollback()?;
        Ok(ids)
    })
}

pub fn count_comments(db: &Database) -> Result<i64> {
    db.query_row("SELECT COUNT(*) FROM comments", params![])?
        .map(|row| row.get::<i64>(0))
        .unwrap_or(Ok(0))
}

fn numbered_comment(i: usize) -> (String, String) {
    (format!("eko{}@gmail.com", i), format!("Komentar ke{}", i))
}

fn generated_id(id: Option<i64>) -> Result<i64> {
    id.ok_or_else(|| {
        crate::core::SafeSqlError::Exec("insert did not produce a generated id".to_string())
    })
}

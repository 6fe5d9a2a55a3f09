/// # Test Utilities Module
///
/// Testing infrastructure for SafeSQL with isolated databases and error
/// assertion helpers.
///
/// This module provides:
/// - Database test isolation fixtures
/// - SafeSqlError-specific testing helpers
/// - Sample data for the demo schema

use crate::core::db::Database;
use crate::core::Result;
use crate::demo::{self, Customer};
use crate::params;

/// Isolated database test fixture
pub struct DatabaseFixture {
    pub name: String,
    pub db: Database,
}

impl DatabaseFixture {
    /// Create a new in-memory database with the demo schema applied
    pub fn new(name: &str) -> Result<Self> {
        let db = Database::open_in_memory()?;
        demo::apply_schema(&db)?;

        Ok(DatabaseFixture {
            name: name.to_string(),
            db,
        })
    }

    /// Create fixture with sample data
    pub fn with_sample_data(name: &str) -> Result<Self> {
        let fixture = Self::new(name)?;
        fixture.populate_sample_data()?;
        Ok(fixture)
    }

    /// Populate with realistic sample data
    pub fn populate_sample_data(&self) -> Result<()> {
        let mut eko = Customer::new("eko", "Eko");
        eko.email = Some("eko@gmail.com".to_string());
        eko.balance = 100_000;
        eko.rating = 90.0;
        eko.married = true;
        demo::insert_customer(&self.db, &eko)?;
        demo::insert_customer(&self.db, &Customer::new("budi", "Budi"))?;

        let users = vec![("admin", "admin"), ("eko", "rahasia")];
        for (username, password) in users {
            demo::register_user(&self.db, username, password)?;
        }

        Ok(())
    }

    /// Number of rows currently in `table`
    pub fn count(&self, table: &str) -> i64 {
        let row = match table {
            "customer" => self.db.query_row("SELECT COUNT(*) FROM customer", params![]),
            "user" => self.db.query_row("SELECT COUNT(*) FROM user", params![]),
            "comments" => self.db.query_row("SELECT COUNT(*) FROM comments", params![]),
            other => panic!("Unknown table '{}' in fixture {}", other, self.name),
        };
        row.unwrap().unwrap().get(0).unwrap()
    }
}

/// Error testing utilities specific to SafeSqlError patterns
pub mod error_testing {
    /// Test that a function returns a specific error type
    pub fn assert_error_type<T, E>(
        result: &std::result::Result<T, E>,
        expected_variant: fn(&E) -> bool,
        message: &str,
    ) {
        if let Err(ref err) = result {
            assert!(expected_variant(err), "{}", message);
        } else {
            panic!("Expected error but got Ok: {}", message);
        }
    }

    /// Verify error message quality (contains helpful information)
    pub fn verify_error_message_quality<T, E>(result: &std::result::Result<T, E>, context: &str)
    where
        T: std::fmt::Debug,
        E: std::fmt::Display,
    {
        if let Err(ref error) = result {
            let error_str = error.to_string();

            assert!(!error_str.is_empty(), "Error message should not be empty in {}", context);
            assert!(error_str.len() > 10, "Error message should be descriptive in {}", context);

            let has_operation_context = error_str.to_lowercase().contains("error")
                || error_str.to_lowercase().contains("failed")
                || error_str.to_lowercase().contains("interrupted")
                || error_str.to_lowercase().contains("timed out");

            assert!(has_operation_context, "Error should indicate what operation failed: '{}' in {}", error_str, context);
        } else {
            panic!("Expected error in {}", context);
        }
    }
}

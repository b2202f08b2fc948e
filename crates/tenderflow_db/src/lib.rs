//! Unified persistence layer for Tenderflow.
//!
//! This crate is the single source of truth for database access. The engine
//! and the CLI go through [`TenderDb`]; raw sqlx is not used elsewhere.
//!
//! Every lifecycle transition is a compare-and-swap (`UPDATE ... WHERE
//! status = <expected>`) so two concurrent callers can never both win the
//! same transition. Cascades (cancellation, award) run in the same
//! transaction as the transition itself.

mod error;
mod row;
mod schema;

mod decision;
mod dispute;
mod submission;
mod tender;

pub use decision::ApprovalResult;
pub use error::{DbError, Result};

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::info;

/// Unified database handle for all Tenderflow operations.
#[derive(Clone)]
pub struct TenderDb {
    pool: SqlitePool,
}

impl TenderDb {
    /// Open or create a database at the given path.
    ///
    /// Creates all tables if they don't exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let db = Self { pool };
        db.ensure_schema().await?;

        info!(path = %path.display(), "Database opened");
        Ok(db)
    }

    /// Open an in-memory database (tests).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.ensure_schema().await?;
        Ok(db)
    }

    /// The underlying pool (escape hatch for ad-hoc queries in tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_database() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");

        let db = TenderDb::open(&db_path).await.unwrap();
        assert!(db_path.exists());

        db.close().await;
    }

    #[tokio::test]
    async fn test_open_in_memory() {
        let db = TenderDb::open_in_memory().await.unwrap();
        db.close().await;
    }
}

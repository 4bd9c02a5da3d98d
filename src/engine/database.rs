//! Taskgate Database Module
//! SQLite store with connection pooling

use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

use crate::engine::migrations::MigrationRunner;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

pub const DEFAULT_POOL_SIZE: u32 = 10;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to create database pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Handle to the authoritative store. Cloning shares the pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    pub fn new(db_path: &Path) -> Result<Self, DatabaseError> {
        Self::open(db_path, DEFAULT_POOL_SIZE)
    }

    pub fn open(db_path: &Path, pool_size: u32) -> Result<Self, DatabaseError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)?;

        let db = Self { pool };
        {
            let conn = db.get_connection()?;
            let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        }
        db.init_schema()?;
        Ok(db)
    }

    /// Each pooled in-memory connection is its own database, so the pool holds one.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        let manager = SqliteConnectionManager::memory().with_init(configure_connection);
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)?;
        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), DatabaseError> {
        let runner = MigrationRunner::new();
        let applied = runner
            .push(self)
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        if !applied.is_empty() {
            tracing::info!(count = applied.len(), "applied schema migrations");
        }
        Ok(())
    }

    pub fn get_connection(&self) -> Result<DbConnection, DatabaseError> {
        Ok(self.pool.get()?)
    }

    /// Runs `f` inside an IMMEDIATE transaction, committing on success.
    ///
    /// The write lock is taken up front so read-then-write sequences
    /// cannot fail mid-way on lock upgrade.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.get_connection().map_err(E::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| E::from(DatabaseError::from(e)))?;
        let value = f(&tx)?;
        tx.commit().map_err(|e| E::from(DatabaseError::from(e)))?;
        Ok(value)
    }

    /// Runs `f` inside a read transaction so every statement sees one snapshot.
    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.get_connection().map_err(E::from)?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Deferred)
            .map_err(|e| E::from(DatabaseError::from(e)))?;
        let value = f(&tx)?;
        tx.finish().map_err(|e| E::from(DatabaseError::from(e)))?;
        Ok(value)
    }

    pub fn get_tables(&self) -> Result<Vec<String>, DatabaseError> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '_taskgate_%' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        )?;
        let tables = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(tables)
    }

    pub fn count_rows(&self, table: &str) -> Result<u64, DatabaseError> {
        let tables = self.get_tables()?;
        if !tables.iter().any(|t| t == table) {
            return Err(DatabaseError::SqliteError(rusqlite::Error::InvalidParameterName(
                table.to_string(),
            )));
        }
        let conn = self.get_connection()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }
}

fn configure_connection(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys=ON; PRAGMA busy_timeout=5000;")
}

/// True when `err` is a UNIQUE (or PRIMARY KEY) constraint violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.code == ErrorCode::ConstraintViolation
                && (e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        }
        _ => false,
    }
}

/// True when `err` is a FOREIGN KEY constraint violation.
pub fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
        }
        _ => false,
    }
}

// Fixed-width encoding keeps lexicographic order equal to chronological order.
pub fn encode_time(time: &DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_time(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_in_memory_schema() {
        let db = Database::in_memory().unwrap();
        let tables = db.get_tables().unwrap();
        for expected in ["rights", "role_rights", "roles", "todos", "tokens", "user_roles", "users"] {
            assert!(tables.contains(&expected.to_string()), "missing table {}", expected);
        }
        assert_eq!(db.count_rows("users").unwrap(), 0);
        assert!(db.count_rows("nope").is_err());
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("taskgate.db");
        {
            let db = Database::new(&path).unwrap();
            let conn = db.get_connection().unwrap();
            conn.execute(
                "INSERT INTO roles (name) VALUES (?1)",
                ["admin"],
            )
            .unwrap();
        }
        let db = Database::new(&path).unwrap();
        assert_eq!(db.count_rows("roles").unwrap(), 1);
    }

    #[test]
    fn test_unique_violation_detected() {
        let db = Database::in_memory().unwrap();
        let conn = db.get_connection().unwrap();
        conn.execute("INSERT INTO roles (name) VALUES ('a')", []).unwrap();
        let err = conn.execute("INSERT INTO roles (name) VALUES ('a')", []).unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_foreign_key_violation(&err));
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let db = Database::in_memory().unwrap();
        let result: Result<(), DatabaseError> = db.write(|tx| {
            tx.execute("INSERT INTO roles (name) VALUES ('x')", [])?;
            tx.execute("INSERT INTO roles (name) VALUES ('x')", [])?;
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(db.count_rows("roles").unwrap(), 0);
    }

    #[test]
    fn test_time_encoding_orders_chronologically() {
        let base = Utc::now();
        let later = base + Duration::milliseconds(1500);
        let a = encode_time(&base);
        let b = encode_time(&later);
        assert!(a < b);
        assert_eq!(a.len(), b.len());
        let decoded = decode_time(0, &a).unwrap();
        assert_eq!(decoded.timestamp_micros(), base.timestamp_micros());
    }
}

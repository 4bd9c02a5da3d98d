//! Taskgate Migrations Module
//! Embedded schema migrations with a checksummed journal

use crate::engine::database::{encode_time, Database, DatabaseError};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Schema drift detected: {0}")]
    SchemaDrift(String),
    #[error("SQL execution error: {0}")]
    SqlError(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        let result = hasher.finalize();
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, result)
    }
}

const JOURNAL_TABLE: &str = "CREATE TABLE IF NOT EXISTS _taskgate_migrations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    applied_at TEXT NOT NULL,
    checksum TEXT NOT NULL
)";

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "0001_identity",
        sql: "
            CREATE TABLE users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                registration_time TEXT NOT NULL
            );
            CREATE TABLE tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value TEXT NOT NULL UNIQUE,
                creation_time TEXT NOT NULL,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_tokens_user ON tokens(user_id);
        ",
    },
    Migration {
        name: "0002_rights",
        sql: "
            CREATE TABLE roles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE rights (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL CHECK (model IN ('User', 'Todo', 'Token', 'Role', 'Right')),
                can_read INTEGER NOT NULL DEFAULT 0,
                can_write INTEGER NOT NULL DEFAULT 0,
                only_own INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE role_rights (
                role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                right_id INTEGER NOT NULL REFERENCES rights(id) ON DELETE CASCADE,
                PRIMARY KEY (role_id, right_id)
            );
            CREATE TABLE user_roles (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role_id INTEGER NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, role_id)
            );
            CREATE INDEX idx_role_rights_right ON role_rights(right_id);
            CREATE INDEX idx_user_roles_role ON user_roles(role_id);
        ",
    },
    Migration {
        name: "0003_todos",
        sql: "
            CREATE TABLE todos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                important INTEGER NOT NULL DEFAULT 0,
                done INTEGER NOT NULL DEFAULT 0,
                start_time TEXT NOT NULL,
                finish_time TEXT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_todos_user ON todos(user_id);
        ",
    },
];

pub struct MigrationRunner {
    migrations: &'static [Migration],
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationRunner {
    pub fn new() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }

    /// Applied migrations, oldest first.
    pub fn applied(&self, db: &Database) -> Result<Vec<String>, MigrationError> {
        let conn = db.get_connection()?;
        conn.execute(JOURNAL_TABLE, [])?;
        let mut stmt = conn.prepare("SELECT name FROM _taskgate_migrations ORDER BY id")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    pub fn list_pending(&self, db: &Database) -> Result<Vec<&'static Migration>, MigrationError> {
        let applied = self.applied(db)?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.iter().any(|name| name == m.name))
            .collect())
    }

    /// Fails if a recorded migration no longer matches the embedded SQL.
    pub fn verify(&self, db: &Database) -> Result<(), MigrationError> {
        let conn = db.get_connection()?;
        conn.execute(JOURNAL_TABLE, [])?;
        for migration in self.migrations {
            let recorded: Option<String> = conn
                .query_row(
                    "SELECT checksum FROM _taskgate_migrations WHERE name = ?1",
                    [migration.name],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(checksum) = recorded {
                if checksum != migration.checksum() {
                    return Err(MigrationError::SchemaDrift(migration.name.to_string()));
                }
            }
        }
        Ok(())
    }

    pub fn apply(&self, db: &Database, migration: &Migration) -> Result<(), MigrationError> {
        db.write(|tx| {
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO _taskgate_migrations (name, applied_at, checksum) VALUES (?1, ?2, ?3)",
                params![migration.name, encode_time(&Utc::now()), migration.checksum()],
            )?;
            Ok::<_, MigrationError>(())
        })
    }

    pub fn push(&self, db: &Database) -> Result<Vec<String>, MigrationError> {
        self.verify(db)?;
        let pending = self.list_pending(db)?;
        let mut applied = Vec::new();

        for migration in pending {
            self.apply(db, migration)?;
            tracing::debug!(migration = migration.name, "applied migration");
            applied.push(migration.name.to_string());
        }

        Ok(applied)
    }

    pub fn check(&self, db: &Database) -> Result<MigrationStatus, MigrationError> {
        let applied = self.applied(db)?;
        let pending = self.list_pending(db)?;

        Ok(MigrationStatus {
            applied_count: applied.len(),
            pending_count: pending.len(),
            pending_migrations: pending.iter().map(|m| m.name.to_string()).collect(),
        })
    }
}

#[derive(Debug)]
pub struct MigrationStatus {
    pub applied_count: usize,
    pub pending_count: usize,
    pub pending_migrations: Vec<String>,
}

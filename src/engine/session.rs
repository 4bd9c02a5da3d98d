//! Token Session Manager
//!
//! Opaque bearer tokens with a fixed lifetime counted from issuance.
//! Expiry is checked when a token is resolved; expired rows stay in the
//! store until revoked, their user is deleted, or [`TokenSessionManager::purge_expired`] runs.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::engine::database::{decode_time, encode_time, is_foreign_key_violation, Database};
use crate::engine::error::{AuthError, AuthResult};
use crate::engine::identity::User;
use crate::engine::rbac::policy::UserId;

pub type TokenId = i64;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Token {
    pub id: TokenId,
    pub value: String,
    pub creation_time: DateTime<Utc>,
    pub user_id: UserId,
}

impl Token {
    /// Valid up to and including `creation_time + ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.creation_time > ttl
    }
}

fn token_from_row(row: &Row<'_>) -> rusqlite::Result<Token> {
    let created: String = row.get(2)?;
    Ok(Token {
        id: row.get(0)?,
        value: row.get(1)?,
        creation_time: decode_time(2, &created)?,
        user_id: row.get(3)?,
    })
}

/// A resolved token together with the user it belongs to
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: Token,
}

#[derive(Clone)]
pub struct TokenSessionManager {
    db: Database,
    ttl: Duration,
}

impl TokenSessionManager {
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user: &User) -> AuthResult<Token> {
        self.issue_at(user.id, Utc::now())
    }

    pub fn issue_at(&self, user_id: UserId, now: DateTime<Utc>) -> AuthResult<Token> {
        // Stored with microsecond precision; keep the returned token identical.
        let now = now.trunc_subsecs(6);
        let value = Uuid::new_v4().to_string();
        let token = self.db.write(|tx| {
            tx.execute(
                "INSERT INTO tokens (value, creation_time, user_id) VALUES (?1, ?2, ?3)",
                params![value, encode_time(&now), user_id],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AuthError::NotFound(format!("user {}", user_id))
                } else {
                    e.into()
                }
            })?;
            Ok::<_, AuthError>(Token {
                id: tx.last_insert_rowid(),
                value: value.clone(),
                creation_time: now,
                user_id,
            })
        })?;
        tracing::info!(user_id, token_id = token.id, "issued token");
        Ok(token)
    }

    pub fn resolve(&self, value: &str, now: DateTime<Utc>) -> AuthResult<User> {
        self.resolve_session(value, now).map(|session| session.user)
    }

    /// Looks the token and its owner up in one statement.
    pub fn resolve_session(&self, value: &str, now: DateTime<Utc>) -> AuthResult<Session> {
        let conn = self.db.get_connection()?;
        let found = conn
            .query_row(
                "SELECT t.id, t.value, t.creation_time, t.user_id,
                        u.id, u.name, u.password_hash, u.registration_time
                 FROM tokens t JOIN users u ON u.id = t.user_id
                 WHERE t.value = ?1",
                [value],
                |row| {
                    let token = token_from_row(row)?;
                    let registered: String = row.get(7)?;
                    let user = User {
                        id: row.get(4)?,
                        name: row.get(5)?,
                        password_hash: row.get(6)?,
                        registration_time: decode_time(7, &registered)?,
                    };
                    Ok(Session { user, token })
                },
            )
            .optional()?;

        match found {
            Some(session) if !session.token.is_expired(now, self.ttl) => Ok(session),
            Some(session) => {
                tracing::debug!(token_id = session.token.id, "rejected expired token");
                Err(AuthError::InvalidToken)
            }
            None => Err(AuthError::InvalidToken),
        }
    }

    pub fn get(&self, id: TokenId) -> AuthResult<Token> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            "SELECT id, value, creation_time, user_id FROM tokens WHERE id = ?1",
            [id],
            token_from_row,
        )
        .optional()?
        .ok_or_else(|| AuthError::NotFound(format!("token {}", id)))
    }

    pub fn list_for_user(&self, user_id: UserId) -> AuthResult<Vec<Token>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, value, creation_time, user_id FROM tokens WHERE user_id = ?1 ORDER BY id",
        )?;
        let tokens = stmt
            .query_map([user_id], token_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    /// Returns whether a token with this value existed.
    pub fn revoke(&self, value: &str) -> AuthResult<bool> {
        let removed = self.db.write(|tx| {
            Ok::<_, AuthError>(tx.execute("DELETE FROM tokens WHERE value = ?1", [value])?)
        })?;
        if removed > 0 {
            tracing::info!("revoked token");
        }
        Ok(removed > 0)
    }

    pub fn revoke_by_id(&self, id: TokenId) -> AuthResult<()> {
        self.db.write(|tx| {
            let removed = tx.execute("DELETE FROM tokens WHERE id = ?1", [id])?;
            if removed == 0 {
                return Err(AuthError::NotFound(format!("token {}", id)));
            }
            Ok(())
        })?;
        tracing::info!(token_id = id, "revoked token");
        Ok(())
    }

    pub fn revoke_all(&self, user_id: UserId) -> AuthResult<usize> {
        let removed = self.db.write(|tx| {
            Ok::<_, AuthError>(tx.execute("DELETE FROM tokens WHERE user_id = ?1", [user_id])?)
        })?;
        tracing::info!(user_id, removed, "revoked all tokens for user");
        Ok(removed)
    }

    /// Deletes tokens that `resolve` would reject at `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<usize> {
        let Some(cutoff) = now.checked_sub_signed(self.ttl) else {
            return Ok(0);
        };
        let cutoff = encode_time(&cutoff);
        let removed = self.db.write(|tx| {
            Ok::<_, AuthError>(tx.execute("DELETE FROM tokens WHERE creation_time < ?1", [cutoff])?)
        })?;
        tracing::info!(removed, "purged expired tokens");
        Ok(removed)
    }
}

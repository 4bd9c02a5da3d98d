//! Identity Store
//!
//! Users, their argon2 password hashes and role memberships.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde::Serialize;
use std::sync::OnceLock;
use utoipa::ToSchema;

use crate::engine::database::{decode_time, encode_time, is_foreign_key_violation, is_unique_violation, Database};
use crate::engine::error::{AuthError, AuthResult};
use crate::engine::rbac::policy::{Role, RoleId, UserId};
use crate::engine::rbac::RightsRegistry;

const USER_NAME_MAX: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct User {
    pub id: UserId,
    pub name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub registration_time: DateTime<Utc>,
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let registered: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        password_hash: row.get(2)?,
        registration_time: decode_time(3, &registered)?,
    })
}

pub fn hash_password(plain: &str) -> AuthResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Internal(format!("password hashing failed: {}", e)))
}

pub fn verify_password(plain: &str, hashed: &str) -> bool {
    match PasswordHash::new(hashed) {
        Ok(parsed) => Argon2::default()
            .verify_password(plain.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

// Verified against when the name is unknown so both failure paths cost the same.
fn dummy_hash() -> &'static str {
    static DUMMY: OnceLock<String> = OnceLock::new();
    DUMMY.get_or_init(|| hash_password("taskgate-dummy-password").unwrap_or_default())
}

#[derive(Clone)]
pub struct IdentityStore {
    db: Database,
    default_role: Option<String>,
}

impl IdentityStore {
    pub fn new(db: Database) -> Self {
        Self { db, default_role: None }
    }

    /// Role given to every new user, when a role of that name exists.
    pub fn with_default_role(mut self, role: Option<String>) -> Self {
        self.default_role = role;
        self
    }

    pub fn create_user(&self, name: &str, password: &str) -> AuthResult<User> {
        let name = validate_user_name(name)?;
        if password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }
        let password_hash = hash_password(password)?;
        let registration_time = Utc::now();

        let user = self.db.write(|tx| {
            let inserted = tx.execute(
                "INSERT INTO users (name, password_hash, registration_time) VALUES (?1, ?2, ?3)",
                params![name, password_hash, encode_time(&registration_time)],
            );
            match inserted {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateName(name.clone())),
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();

            if let Some(role) = &self.default_role {
                tx.execute(
                    "INSERT INTO user_roles (user_id, role_id) SELECT ?1, id FROM roles WHERE name = ?2",
                    params![id, role],
                )?;
            }

            Ok(User {
                id,
                name: name.clone(),
                password_hash: password_hash.clone(),
                registration_time,
            })
        })?;

        tracing::info!(user_id = user.id, "created user");
        Ok(user)
    }

    /// Unknown names and wrong passwords fail identically.
    pub fn authenticate(&self, name: &str, password: &str) -> AuthResult<User> {
        match self.find_by_name(name) {
            Ok(user) if verify_password(password, &user.password_hash) => Ok(user),
            Ok(_) => {
                tracing::warn!("rejected login attempt");
                Err(AuthError::InvalidCredentials)
            }
            Err(AuthError::NotFound(_)) => {
                verify_password(password, dummy_hash());
                tracing::warn!("rejected login attempt");
                Err(AuthError::InvalidCredentials)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_user(&self, id: UserId) -> AuthResult<User> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            "SELECT id, name, password_hash, registration_time FROM users WHERE id = ?1",
            [id],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| AuthError::NotFound(format!("user {}", id)))
    }

    /// Names are matched the way `create_user` stores them: trimmed.
    pub fn find_by_name(&self, name: &str) -> AuthResult<User> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            "SELECT id, name, password_hash, registration_time FROM users WHERE name = ?1",
            [name.trim()],
            user_from_row,
        )
        .optional()?
        .ok_or_else(|| AuthError::NotFound("user".to_string()))
    }

    pub fn list_users(&self) -> AuthResult<Vec<User>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, password_hash, registration_time FROM users ORDER BY id",
        )?;
        let users = stmt
            .query_map([], user_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn change_password(&self, id: UserId, new_password: &str) -> AuthResult<()> {
        if new_password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".to_string()));
        }
        let password_hash = hash_password(new_password)?;
        self.db.write(|tx| {
            let affected = tx.execute(
                "UPDATE users SET password_hash = ?1 WHERE id = ?2",
                params![password_hash, id],
            )?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("user {}", id)));
            }
            Ok(())
        })
    }

    /// Removes the user together with its tokens, todos and memberships.
    pub fn delete_user(&self, id: UserId) -> AuthResult<()> {
        self.db.write(|tx| {
            let affected = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("user {}", id)));
            }
            Ok(())
        })?;
        tracing::info!(user_id = id, "deleted user");
        Ok(())
    }

    pub fn assign_role(&self, user_id: UserId, role_id: RoleId) -> AuthResult<()> {
        self.db.write(|tx| {
            tx.execute(
                "INSERT OR IGNORE INTO user_roles (user_id, role_id) VALUES (?1, ?2)",
                params![user_id, role_id],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AuthError::NotFound(format!("user {} or role {}", user_id, role_id))
                } else {
                    e.into()
                }
            })?;
            Ok::<_, AuthError>(())
        })?;
        tracing::info!(user_id, role_id, "assigned role");
        Ok(())
    }

    pub fn remove_role(&self, user_id: UserId, role_id: RoleId) -> AuthResult<bool> {
        self.db.write(|tx| {
            let removed = tx.execute(
                "DELETE FROM user_roles WHERE user_id = ?1 AND role_id = ?2",
                params![user_id, role_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn roles_for_user(&self, user_id: UserId, registry: &RightsRegistry) -> AuthResult<Vec<Role>> {
        registry.roles_for_user(user_id)
    }
}

fn validate_user_name(name: &str) -> AuthResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("username must not be empty".to_string()));
    }
    if name.chars().count() > USER_NAME_MAX {
        return Err(AuthError::Validation(format!(
            "username longer than {} characters",
            USER_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> IdentityStore {
        IdentityStore::new(Database::in_memory().unwrap())
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("hunter2").unwrap();
        assert_ne!(hash, "hunter2");
        assert!(verify_password("hunter2", &hash));
        assert!(!verify_password("hunter3", &hash));
        assert!(!verify_password("hunter2", "not-a-hash"));
    }

    #[test]
    fn test_create_and_authenticate() {
        let store = store();
        let created = store.create_user("alice", "s3cret").unwrap();
        assert_ne!(created.password_hash, "s3cret");

        let authed = store.authenticate("alice", "s3cret").unwrap();
        assert_eq!(authed.id, created.id);
        assert_eq!(authed.name, "alice");
    }

    #[test]
    fn test_padded_name_round_trip() {
        let store = store();
        let created = store.create_user(" alice ", "s3cret").unwrap();
        assert_eq!(created.name, "alice");

        assert_eq!(store.authenticate(" alice ", "s3cret").unwrap().id, created.id);
        assert_eq!(store.authenticate("alice", "s3cret").unwrap().id, created.id);
        assert_eq!(store.find_by_name("alice\t").unwrap().id, created.id);
        assert!(matches!(store.create_user("alice", "pw"), Err(AuthError::DuplicateName(_))));
    }

    #[test]
    fn test_login_failures_are_indistinguishable() {
        let store = store();
        store.create_user("alice", "s3cret").unwrap();

        let wrong_password = store.authenticate("alice", "nope").unwrap_err();
        let unknown_user = store.authenticate("mallory", "s3cret").unwrap_err();
        assert!(matches!(wrong_password, AuthError::InvalidCredentials));
        assert!(matches!(unknown_user, AuthError::InvalidCredentials));
        assert_eq!(wrong_password.to_string(), unknown_user.to_string());
    }

    #[test]
    fn test_duplicate_name() {
        let store = store();
        store.create_user("bob", "pw").unwrap();
        assert!(matches!(
            store.create_user("bob", "other"),
            Err(AuthError::DuplicateName(name)) if name == "bob"
        ));
        assert_eq!(store.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_name_validation() {
        let store = store();
        assert!(matches!(store.create_user("", "pw"), Err(AuthError::Validation(_))));
        assert!(matches!(store.create_user(&"x".repeat(51), "pw"), Err(AuthError::Validation(_))));
        assert!(matches!(store.create_user("carol", ""), Err(AuthError::Validation(_))));
    }

    #[test]
    fn test_default_role_assigned() {
        let db = Database::in_memory().unwrap();
        let registry = RightsRegistry::new(db.clone());
        let role = registry.create_role("member").unwrap();
        let store = IdentityStore::new(db).with_default_role(Some("member".to_string()));

        let user = store.create_user("dave", "pw").unwrap();
        let roles = store.roles_for_user(user.id, &registry).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].id, role.id);
    }

    #[test]
    fn test_missing_default_role_is_skipped() {
        let db = Database::in_memory().unwrap();
        let registry = RightsRegistry::new(db.clone());
        let store = IdentityStore::new(db).with_default_role(Some("ghost".to_string()));
        let user = store.create_user("erin", "pw").unwrap();
        assert!(store.roles_for_user(user.id, &registry).unwrap().is_empty());
    }

    #[test]
    fn test_role_membership() {
        let db = Database::in_memory().unwrap();
        let registry = RightsRegistry::new(db.clone());
        let store = IdentityStore::new(db);
        let user = store.create_user("frank", "pw").unwrap();
        let role = registry.create_role("ops").unwrap();

        store.assign_role(user.id, role.id).unwrap();
        store.assign_role(user.id, role.id).unwrap();
        assert_eq!(store.roles_for_user(user.id, &registry).unwrap().len(), 1);
        assert!(matches!(store.assign_role(user.id, 999), Err(AuthError::NotFound(_))));

        assert!(store.remove_role(user.id, role.id).unwrap());
        assert!(store.roles_for_user(user.id, &registry).unwrap().is_empty());
    }

    #[test]
    fn test_change_password_and_delete() {
        let store = store();
        let user = store.create_user("gina", "old").unwrap();
        store.change_password(user.id, "new").unwrap();
        assert!(store.authenticate("gina", "old").is_err());
        assert!(store.authenticate("gina", "new").is_ok());

        store.delete_user(user.id).unwrap();
        assert!(matches!(store.get_user(user.id), Err(AuthError::NotFound(_))));
        assert!(matches!(store.delete_user(user.id), Err(AuthError::NotFound(_))));
    }
}

//! Rights Registry
//!
//! Storage for roles, rights and the role/right and user/role relations.

use rusqlite::{params, OptionalExtension, Row, Transaction};

use super::policy::{NewRight, Right, RightId, RightSet, Role, RoleId, UserId};
use crate::engine::database::{is_foreign_key_violation, is_unique_violation, Database};
use crate::engine::error::{AuthError, AuthResult};

const ROLE_NAME_MAX: usize = 50;

const RIGHT_COLUMNS: &str = "r.id, r.model, r.can_read, r.can_write, r.only_own";

fn right_from_row(row: &Row<'_>) -> rusqlite::Result<Right> {
    Ok(Right {
        id: row.get(0)?,
        model: row.get(1)?,
        read: row.get(2)?,
        write: row.get(3)?,
        only_own: row.get(4)?,
    })
}

#[derive(Clone)]
pub struct RightsRegistry {
    db: Database,
}

impl RightsRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Rights reachable from `user_id` through any of its roles.
    ///
    /// A single statement, so one decision never mixes two registry states.
    pub fn rights_for_user(&self, user_id: UserId) -> AuthResult<RightSet> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT DISTINCT {RIGHT_COLUMNS}
             FROM rights r
             JOIN role_rights rr ON rr.right_id = r.id
             JOIN user_roles ur ON ur.role_id = rr.role_id
             WHERE ur.user_id = ?1"
        ))?;
        let rights = stmt
            .query_map([user_id], right_from_row)?
            .collect::<Result<RightSet, _>>()?;
        Ok(rights)
    }

    pub fn rights_for_role(&self, role_id: RoleId) -> AuthResult<Vec<Right>> {
        self.db.read(|tx| {
            ensure_role(tx, role_id)?;
            Ok(role_rights(tx, role_id)?)
        })
    }

    // ---- rights ----

    pub fn create_right(&self, new: &NewRight) -> AuthResult<Right> {
        self.db.write(|tx| insert_right(tx, new))
    }

    /// Insert a right and attach it to `role_id` in one transaction.
    pub fn create_right_for_role(&self, role_id: RoleId, new: &NewRight) -> AuthResult<Right> {
        self.db.write(|tx| {
            ensure_role(tx, role_id)?;
            let right = insert_right(tx, new)?;
            tx.execute(
                "INSERT INTO role_rights (role_id, right_id) VALUES (?1, ?2)",
                params![role_id, right.id],
            )?;
            tracing::info!(role_id, right_id = right.id, model = %right.model, "granted new right to role");
            Ok(right)
        })
    }

    pub fn get_right(&self, id: RightId) -> AuthResult<Right> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            &format!("SELECT {RIGHT_COLUMNS} FROM rights r WHERE r.id = ?1"),
            [id],
            right_from_row,
        )
        .optional()?
        .ok_or_else(|| AuthError::NotFound(format!("right {}", id)))
    }

    pub fn list_rights(&self) -> AuthResult<Vec<Right>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!("SELECT {RIGHT_COLUMNS} FROM rights r ORDER BY r.id"))?;
        let rights = stmt
            .query_map([], right_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rights)
    }

    pub fn update_right(&self, id: RightId, new: &NewRight) -> AuthResult<Right> {
        self.db.write(|tx| {
            let affected = tx.execute(
                "UPDATE rights SET model = ?1, can_read = ?2, can_write = ?3, only_own = ?4 WHERE id = ?5",
                params![new.model, new.read, new.write, new.only_own, id],
            )?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("right {}", id)));
            }
            Ok(Right {
                id,
                model: new.model,
                read: new.read,
                write: new.write,
                only_own: new.only_own,
            })
        })
    }

    pub fn delete_right(&self, id: RightId) -> AuthResult<()> {
        self.db.write(|tx| {
            let affected = tx.execute("DELETE FROM rights WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("right {}", id)));
            }
            Ok(())
        })
    }

    // ---- roles ----

    pub fn create_role(&self, name: &str) -> AuthResult<Role> {
        let name = validate_role_name(name)?;
        self.db.write(|tx| {
            match tx.execute("INSERT INTO roles (name) VALUES (?1)", [&name]) {
                Ok(_) => {}
                Err(e) if is_unique_violation(&e) => return Err(AuthError::DuplicateName(name.clone())),
                Err(e) => return Err(e.into()),
            }
            let id = tx.last_insert_rowid();
            tracing::info!(role_id = id, role = %name, "created role");
            Ok(Role { id, name: name.clone(), rights: vec![] })
        })
    }

    pub fn get_role(&self, id: RoleId) -> AuthResult<Role> {
        self.db.read(|tx| load_role(tx, "id = ?1", id))
    }

    pub fn find_role(&self, name: &str) -> AuthResult<Role> {
        self.db.read(|tx| load_role(tx, "name = ?1", name))
    }

    pub fn list_roles(&self) -> AuthResult<Vec<Role>> {
        self.db.read(|tx| {
            let mut stmt = tx.prepare("SELECT id, name FROM roles ORDER BY id")?;
            let heads = stmt
                .query_map([], |row| Ok((row.get::<_, RoleId>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut roles = Vec::with_capacity(heads.len());
            for (id, name) in heads {
                let rights = role_right_ids(tx, id)?;
                roles.push(Role { id, name, rights });
            }
            Ok(roles)
        })
    }

    /// Roles held by `user_id`, read in one snapshot with their rights.
    pub fn roles_for_user(&self, user_id: UserId) -> AuthResult<Vec<Role>> {
        self.db.read(|tx| {
            let mut stmt = tx.prepare(
                "SELECT r.id, r.name FROM roles r
                 JOIN user_roles ur ON ur.role_id = r.id
                 WHERE ur.user_id = ?1 ORDER BY r.id",
            )?;
            let heads = stmt
                .query_map([user_id], |row| Ok((row.get::<_, RoleId>(0)?, row.get::<_, String>(1)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut roles = Vec::with_capacity(heads.len());
            for (id, name) in heads {
                let rights = role_right_ids(tx, id)?;
                roles.push(Role { id, name, rights });
            }
            Ok(roles)
        })
    }

    pub fn delete_role(&self, id: RoleId) -> AuthResult<()> {
        self.db.write(|tx| {
            let affected = tx.execute("DELETE FROM roles WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("role {}", id)));
            }
            tracing::info!(role_id = id, "deleted role");
            Ok(())
        })
    }

    /// Attach an existing right to a role. Granting twice is a no-op.
    pub fn grant_right(&self, role_id: RoleId, right_id: RightId) -> AuthResult<()> {
        self.db.write(|tx| {
            ensure_role(tx, role_id)?;
            let inserted = tx
                .execute(
                    "INSERT OR IGNORE INTO role_rights (role_id, right_id) VALUES (?1, ?2)",
                    params![role_id, right_id],
                )
                .map_err(|e| {
                    if is_foreign_key_violation(&e) {
                        AuthError::NotFound(format!("right {}", right_id))
                    } else {
                        e.into()
                    }
                })?;
            if inserted > 0 {
                tracing::info!(role_id, right_id, "granted right to role");
            }
            Ok(())
        })
    }

    pub fn revoke_right(&self, role_id: RoleId, right_id: RightId) -> AuthResult<bool> {
        self.db.write(|tx| {
            ensure_role(tx, role_id)?;
            let removed = tx.execute(
                "DELETE FROM role_rights WHERE role_id = ?1 AND right_id = ?2",
                params![role_id, right_id],
            )?;
            Ok(removed > 0)
        })
    }
}

fn validate_role_name(name: &str) -> AuthResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("role name must not be empty".to_string()));
    }
    if name.chars().count() > ROLE_NAME_MAX {
        return Err(AuthError::Validation(format!(
            "role name longer than {} characters",
            ROLE_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

fn insert_right(tx: &Transaction<'_>, new: &NewRight) -> AuthResult<Right> {
    tx.execute(
        "INSERT INTO rights (model, can_read, can_write, only_own) VALUES (?1, ?2, ?3, ?4)",
        params![new.model, new.read, new.write, new.only_own],
    )?;
    Ok(Right {
        id: tx.last_insert_rowid(),
        model: new.model,
        read: new.read,
        write: new.write,
        only_own: new.only_own,
    })
}

fn ensure_role(tx: &Transaction<'_>, role_id: RoleId) -> AuthResult<()> {
    let exists: Option<i64> = tx
        .query_row("SELECT 1 FROM roles WHERE id = ?1", [role_id], |row| row.get(0))
        .optional()?;
    exists
        .map(|_| ())
        .ok_or_else(|| AuthError::NotFound(format!("role {}", role_id)))
}

fn role_rights(tx: &Transaction<'_>, role_id: RoleId) -> rusqlite::Result<Vec<Right>> {
    let mut stmt = tx.prepare(&format!(
        "SELECT {RIGHT_COLUMNS} FROM rights r
         JOIN role_rights rr ON rr.right_id = r.id
         WHERE rr.role_id = ?1 ORDER BY r.id"
    ))?;
    let rights = stmt.query_map([role_id], right_from_row)?.collect();
    rights
}

fn role_right_ids(tx: &Transaction<'_>, role_id: RoleId) -> rusqlite::Result<Vec<RightId>> {
    let mut stmt =
        tx.prepare("SELECT right_id FROM role_rights WHERE role_id = ?1 ORDER BY right_id")?;
    let ids = stmt.query_map([role_id], |row| row.get(0))?.collect();
    ids
}

fn load_role<P: rusqlite::ToSql + std::fmt::Display>(
    tx: &Transaction<'_>,
    predicate: &str,
    key: P,
) -> AuthResult<Role> {
    let head: Option<(RoleId, String)> = tx
        .query_row(
            &format!("SELECT id, name FROM roles WHERE {}", predicate),
            [&key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (id, name) = head.ok_or_else(|| AuthError::NotFound(format!("role {}", key)))?;
    let rights = role_right_ids(tx, id)?;
    Ok(Role { id, name, rights })
}

//! Todo store
//!
//! Todos are owned by a single user and removed together with it.

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::engine::database::{decode_time, encode_time, is_foreign_key_violation, Database};
use crate::engine::error::{AuthError, AuthResult};
use crate::engine::rbac::policy::UserId;

pub type TodoId = i64;

const TODO_NAME_MAX: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct Todo {
    pub id: TodoId,
    pub name: String,
    pub important: bool,
    pub done: bool,
    pub start_time: DateTime<Utc>,
    pub finish_time: Option<DateTime<Utc>>,
    pub user_id: UserId,
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NewTodo {
    pub name: String,
    #[serde(default)]
    pub important: bool,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TodoPatch {
    pub name: Option<String>,
    pub important: Option<bool>,
    pub done: Option<bool>,
}

fn todo_from_row(row: &Row<'_>) -> rusqlite::Result<Todo> {
    let start: String = row.get(4)?;
    let finish: Option<String> = row.get(5)?;
    Ok(Todo {
        id: row.get(0)?,
        name: row.get(1)?,
        important: row.get(2)?,
        done: row.get(3)?,
        start_time: decode_time(4, &start)?,
        finish_time: finish.map(|f| decode_time(5, &f)).transpose()?,
        user_id: row.get(6)?,
    })
}

const TODO_COLUMNS: &str = "id, name, important, done, start_time, finish_time, user_id";

#[derive(Clone)]
pub struct TodoStore {
    db: Database,
}

impl TodoStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn create(&self, owner: UserId, new: &NewTodo) -> AuthResult<Todo> {
        let name = validate_name(&new.name)?;
        let start_time = Utc::now().trunc_subsecs(6);
        self.db.write(|tx| {
            tx.execute(
                "INSERT INTO todos (name, important, done, start_time, user_id) VALUES (?1, ?2, 0, ?3, ?4)",
                params![name, new.important, encode_time(&start_time), owner],
            )
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    AuthError::NotFound(format!("user {}", owner))
                } else {
                    e.into()
                }
            })?;
            Ok(Todo {
                id: tx.last_insert_rowid(),
                name: name.clone(),
                important: new.important,
                done: false,
                start_time,
                finish_time: None,
                user_id: owner,
            })
        })
    }

    pub fn get(&self, id: TodoId) -> AuthResult<Todo> {
        let conn = self.db.get_connection()?;
        conn.query_row(
            &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
            [id],
            todo_from_row,
        )
        .optional()?
        .ok_or_else(|| AuthError::NotFound(format!("todo {}", id)))
    }

    pub fn list_by_owner(&self, owner: UserId) -> AuthResult<Vec<Todo>> {
        let conn = self.db.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TODO_COLUMNS} FROM todos WHERE user_id = ?1 ORDER BY id"
        ))?;
        let todos = stmt
            .query_map([owner], todo_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(todos)
    }

    /// Marking a todo done stamps `finish_time`; reopening clears it.
    pub fn update(&self, id: TodoId, patch: &TodoPatch) -> AuthResult<Todo> {
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        self.db.write(|tx| {
            let mut todo = load(tx, id)?;
            if let Some(name) = name {
                todo.name = name;
            }
            if let Some(important) = patch.important {
                todo.important = important;
            }
            match patch.done {
                Some(true) if !todo.done => {
                    todo.done = true;
                    todo.finish_time = Some(Utc::now().trunc_subsecs(6));
                }
                Some(false) => {
                    todo.done = false;
                    todo.finish_time = None;
                }
                _ => {}
            }
            tx.execute(
                "UPDATE todos SET name = ?1, important = ?2, done = ?3, finish_time = ?4 WHERE id = ?5",
                params![
                    todo.name,
                    todo.important,
                    todo.done,
                    todo.finish_time.as_ref().map(encode_time),
                    id
                ],
            )?;
            Ok(todo)
        })
    }

    pub fn delete(&self, id: TodoId) -> AuthResult<()> {
        self.db.write(|tx| {
            let affected = tx.execute("DELETE FROM todos WHERE id = ?1", [id])?;
            if affected == 0 {
                return Err(AuthError::NotFound(format!("todo {}", id)));
            }
            Ok(())
        })
    }
}

fn load(tx: &Transaction<'_>, id: TodoId) -> AuthResult<Todo> {
    tx.query_row(
        &format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = ?1"),
        [id],
        todo_from_row,
    )
    .optional()?
    .ok_or_else(|| AuthError::NotFound(format!("todo {}", id)))
}

fn validate_name(name: &str) -> AuthResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::Validation("todo name must not be empty".to_string()));
    }
    if name.chars().count() > TODO_NAME_MAX {
        return Err(AuthError::Validation(format!(
            "todo name longer than {} characters",
            TODO_NAME_MAX
        )));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::identity::IdentityStore;

    fn setup() -> (IdentityStore, TodoStore, UserId) {
        let db = Database::in_memory().unwrap();
        let identity = IdentityStore::new(db.clone());
        let user = identity.create_user("alice", "pw").unwrap();
        (identity, TodoStore::new(db), user.id)
    }

    #[test]
    fn test_create_and_get() {
        let (_identity, todos, owner) = setup();
        let todo = todos
            .create(owner, &NewTodo { name: "write docs".into(), important: true })
            .unwrap();
        assert_eq!(todos.get(todo.id).unwrap(), todo);
        assert!(!todo.done);
        assert!(todo.finish_time.is_none());
        assert_eq!(todos.list_by_owner(owner).unwrap(), vec![todo]);
    }

    #[test]
    fn test_create_for_unknown_owner() {
        let (_identity, todos, _owner) = setup();
        let err = todos.create(999, &NewTodo { name: "x".into(), important: false }).unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }

    #[test]
    fn test_done_sets_finish_time() {
        let (_identity, todos, owner) = setup();
        let todo = todos.create(owner, &NewTodo { name: "ship".into(), important: false }).unwrap();

        let done = todos
            .update(todo.id, &TodoPatch { done: Some(true), ..Default::default() })
            .unwrap();
        assert!(done.done);
        let finished = done.finish_time.unwrap();
        assert_eq!(todos.get(todo.id).unwrap().finish_time, Some(finished));

        let reopened = todos
            .update(todo.id, &TodoPatch { done: Some(false), name: Some("ship it".into()), ..Default::default() })
            .unwrap();
        assert!(!reopened.done);
        assert!(reopened.finish_time.is_none());
        assert_eq!(reopened.name, "ship it");
    }

    #[test]
    fn test_validation_and_delete() {
        let (_identity, todos, owner) = setup();
        assert!(matches!(
            todos.create(owner, &NewTodo { name: "   ".into(), important: false }),
            Err(AuthError::Validation(_))
        ));
        let todo = todos.create(owner, &NewTodo { name: "x".into(), important: false }).unwrap();
        todos.delete(todo.id).unwrap();
        assert!(matches!(todos.get(todo.id), Err(AuthError::NotFound(_))));
        assert!(matches!(todos.delete(todo.id), Err(AuthError::NotFound(_))));
    }

    #[test]
    fn test_todos_cascade_with_owner() {
        let (identity, todos, owner) = setup();
        todos.create(owner, &NewTodo { name: "a".into(), important: false }).unwrap();
        todos.create(owner, &NewTodo { name: "b".into(), important: false }).unwrap();
        identity.delete_user(owner).unwrap();
        assert!(todos.list_by_owner(owner).unwrap().is_empty());
    }
}

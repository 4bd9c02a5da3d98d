//! Rights data model
//!
//! Rights are per-model grants of read and/or write access, optionally
//! limited to objects owned by the acting user. Roles bundle rights.

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::engine::error::AuthError;

pub type UserId = i64;
pub type RoleId = i64;
pub type RightId = i64;

/// The closed set of models a right can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Model {
    User,
    Todo,
    Token,
    Role,
    Right,
}

impl Model {
    pub const ALL: [Model; 5] = [Model::User, Model::Todo, Model::Token, Model::Role, Model::Right];

    pub fn as_str(&self) -> &'static str {
        match self {
            Model::User => "User",
            Model::Todo => "Todo",
            Model::Token => "Token",
            Model::Role => "Role",
            Model::Right => "Right",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Model {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Model::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| AuthError::Validation(format!("unknown model: {}", s)))
    }
}

impl ToSql for Model {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Model {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse().map_err(|e: AuthError| FromSqlError::Other(Box::new(e)))
    }
}

/// Requested action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Write,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Read => f.write_str("read"),
            Action::Write => f.write_str("write"),
        }
    }
}

/// A stored permission grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Right {
    pub id: RightId,
    pub model: Model,
    pub read: bool,
    pub write: bool,
    pub only_own: bool,
}

impl Right {
    /// Whether this right's flags cover `action`. Ownership is checked separately.
    pub fn permits(&self, action: Action) -> bool {
        match action {
            Action::Read => self.read,
            Action::Write => self.write,
        }
    }
}

/// Fields for a right that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct NewRight {
    pub model: Model,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default = "default_true")]
    pub only_own: bool,
}

fn default_true() -> bool {
    true
}

impl NewRight {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            read: false,
            write: false,
            only_own: true,
        }
    }

    pub fn read(mut self) -> Self {
        self.read = true;
        self
    }

    pub fn write(mut self) -> Self {
        self.write = true;
        self
    }

    pub fn read_write(self) -> Self {
        self.read().write()
    }

    /// Lift the only-own restriction so the right applies to any object.
    pub fn any_owner(mut self) -> Self {
        self.only_own = false;
        self
    }
}

/// A named bundle of rights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub rights: Vec<RightId>,
}

/// Rights held by a user, de-duplicated by right id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RightSet {
    rights: BTreeMap<RightId, Right>,
}

impl RightSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, right: Right) {
        self.rights.insert(right.id, right);
    }

    pub fn len(&self) -> usize {
        self.rights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rights.is_empty()
    }

    pub fn contains(&self, id: RightId) -> bool {
        self.rights.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Right> {
        self.rights.values()
    }

    pub fn for_model(&self, model: Model) -> impl Iterator<Item = &Right> {
        self.rights.values().filter(move |r| r.model == model)
    }
}

impl FromIterator<Right> for RightSet {
    fn from_iter<I: IntoIterator<Item = Right>>(iter: I) -> Self {
        let mut set = RightSet::new();
        for right in iter {
            set.insert(right);
        }
        set
    }
}

/// Outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "decision")]
pub enum Decision {
    /// Granted by the right with this id
    Allow { right_id: RightId },
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow { .. })
    }
}

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::resource::path::collection_of;
use crate::storage::{lock, SharedConnection};

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Unknown permission level in role table: {0}")]
    UnknownPermission(String),
}

/// Permission level on a collection, ordered by increasing privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    Read,
    Write,
    Admin,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "read",
            Permission::Write => "write",
            Permission::Admin => "admin",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Permission::Read),
            "write" => Ok(Permission::Write),
            "admin" => Ok(Permission::Admin),
            other => Err(AccessError::UnknownPermission(other.to_string())),
        }
    }
}

/// Policy over the complete set of roles a user holds on one collection:
/// the most privileged role wins, and it must meet the required level.
/// No roles means deny.
pub fn grants(held: &[Permission], required: Permission) -> bool {
    held.iter().max().is_some_and(|best| *best >= required)
}

/// Permission checks against the role table, bound to one user.
pub struct AccessEvaluator {
    conn: SharedConnection,
    user_id: i64,
}

impl AccessEvaluator {
    pub fn new(conn: SharedConnection, user_id: i64) -> Self {
        Self { conn, user_id }
    }

    /// Whether the user meets `required` on the collection owning `rpath`.
    ///
    /// A query failure is an error, never a deny.
    pub fn has_access(&self, rpath: &str, required: Permission) -> Result<bool, AccessError> {
        let held = self.roles_for(&collection_of(rpath))?;
        Ok(grants(&held, required))
    }

    fn roles_for(&self, collection: &str) -> Result<Vec<Permission>, AccessError> {
        let guard = lock(&self.conn);
        let mut stmt = guard.prepare(
            "SELECT collection_role.permission FROM collection_role
             JOIN users ON collection_role.user_id = users.id
             JOIN collection ON collection_role.collection_id = collection.id
             WHERE collection.name = ?1 AND users.id = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![collection, self.user_id], |row| {
            row.get::<_, String>(0)
        })?;

        let mut held = Vec::new();
        for row in rows {
            held.push(row?.parse()?);
        }
        Ok(held)
    }
}

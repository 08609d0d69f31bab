use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::access::{AccessError, AccessEvaluator, Permission};
use crate::auth::Principal;
use crate::resource::path::is_collection;
use crate::resource::{Resource, ResourceAdapter};

use super::{lock, SharedConnection};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("Access check failed: {0}")]
    Access(#[from] AccessError),
    #[error("Content decode error: {0}")]
    Decode(#[from] base64::DecodeError),
    #[error("Stored timestamp is invalid: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

/// Outcome of a create or update. Denial is a first-class case so it can
/// never be mistaken for success or failure.
#[derive(Debug)]
pub enum WriteOutcome {
    Written(Resource),
    Denied,
}

/// Outcome of a delete. Denial is a silent no-op at the protocol boundary,
/// but explicit here.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Denied,
}

/// CRUD over persisted calendar resources, bound to one authenticated user
/// for the duration of a request.
///
/// Access denial never surfaces as an error: reads come back empty and
/// writes come back `Denied`, so unauthorized callers cannot probe for
/// resource existence.
pub struct ResourceStore {
    conn: SharedConnection,
    user: Principal,
    access: AccessEvaluator,
}

impl ResourceStore {
    pub fn new(conn: SharedConnection, user: Principal) -> Self {
        let access = AccessEvaluator::new(conn.clone(), user.id);
        Self { conn, user, access }
    }

    pub fn user(&self) -> &Principal {
        &self.user
    }

    /// Enumerate the resource at `rpath`, the synthetic collection resource
    /// when the path classifies as one, and, with `with_children` on a
    /// collection path, every resource the user owns.
    ///
    /// Children expansion is a flat owner-wide scan, not a subtree filter.
    pub fn list(&self, rpath: &str, with_children: bool) -> Result<Vec<Resource>, StoreError> {
        debug!(rpath, with_children, "listing resources");

        if !self.allowed(rpath, Permission::Read)? {
            return Ok(Vec::new());
        }

        let mut result = Vec::new();
        for row_path in self.exact_paths(rpath)? {
            result.push(self.resource(row_path));
        }
        if is_collection(rpath) {
            result.push(self.resource(rpath.to_string()));
        }
        if with_children && is_collection(rpath) {
            for row_path in self.owned_paths()? {
                result.push(self.resource(row_path));
            }
        }
        Ok(result)
    }

    /// Single lookup. Absent and denied both come back as `None`.
    pub fn get(&self, rpath: &str) -> Result<Option<Resource>, StoreError> {
        let mut resources = self.list(rpath, false)?;
        if resources.is_empty() {
            Ok(None)
        } else {
            Ok(Some(resources.swap_remove(0)))
        }
    }

    /// Per-path lookup that skips absent entries and aborts, discarding
    /// partial results, on any real failure.
    pub fn list_by_paths(&self, rpaths: &[&str]) -> Result<Vec<Resource>, StoreError> {
        let mut result = Vec::new();
        for rpath in rpaths {
            if let Some(resource) = self.get(rpath)? {
                result.push(resource);
            }
        }
        Ok(result)
    }

    /// Expand from the root with children included, keeping resources the
    /// caller-supplied predicate accepts. The predicate belongs to the
    /// protocol engine.
    pub fn list_by_filter<F>(&self, _rpath: &str, filter: F) -> Result<Vec<Resource>, StoreError>
    where
        F: Fn(&Resource) -> bool,
    {
        let resources = self.list("/", true)?;
        Ok(resources.into_iter().filter(|r| filter(r)).collect())
    }

    /// Persist a new resource. Requires write on the owning collection.
    pub fn create(&self, rpath: &str, content: &str) -> Result<WriteOutcome, StoreError> {
        if !self.allowed(rpath, Permission::Write)? {
            info!(rpath, user = %self.user.username, "create denied");
            return Ok(WriteOutcome::Denied);
        }

        let encoded = BASE64.encode(content.as_bytes());
        let result = {
            let guard = lock(&self.conn);
            guard.execute(
                "INSERT INTO calendar (rpath, content, owner_id, modified)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![rpath, encoded, self.user.id, Utc::now().to_rfc3339()],
            )
        };
        if let Err(err) = result {
            error!(rpath, %err, "failed to insert resource");
            return Err(err.into());
        }

        debug!(rpath, "resource created");
        Ok(WriteOutcome::Written(self.resource(rpath.to_string())))
    }

    /// Replace content and advance the modification timestamp in one
    /// statement. Concurrent updates to the same path are last-writer-wins.
    pub fn update(&self, rpath: &str, content: &str) -> Result<WriteOutcome, StoreError> {
        if !self.allowed(rpath, Permission::Write)? {
            info!(rpath, user = %self.user.username, "update denied");
            return Ok(WriteOutcome::Denied);
        }

        let encoded = BASE64.encode(content.as_bytes());
        let result = {
            let guard = lock(&self.conn);
            guard.execute(
                "UPDATE calendar SET content = ?2, modified = ?3
                 WHERE rpath = ?1 AND owner_id = ?4",
                rusqlite::params![rpath, encoded, Utc::now().to_rfc3339(), self.user.id],
            )
        };
        if let Err(err) = result {
            error!(rpath, %err, "failed to update resource");
            return Err(err.into());
        }

        debug!(rpath, "resource updated");
        Ok(WriteOutcome::Written(self.resource(rpath.to_string())))
    }

    /// Remove a resource. Requires admin on the owning collection.
    pub fn delete(&self, rpath: &str) -> Result<DeleteOutcome, StoreError> {
        if !self.allowed(rpath, Permission::Admin)? {
            info!(rpath, user = %self.user.username, "delete denied");
            return Ok(DeleteOutcome::Denied);
        }

        let result = {
            let guard = lock(&self.conn);
            guard.execute(
                "DELETE FROM calendar WHERE rpath = ?1 AND owner_id = ?2",
                rusqlite::params![rpath, self.user.id],
            )
        };
        if let Err(err) = result {
            error!(rpath, %err, "failed to delete resource");
            return Err(err.into());
        }

        debug!(rpath, "resource deleted");
        Ok(DeleteOutcome::Deleted)
    }

    fn allowed(&self, rpath: &str, required: Permission) -> Result<bool, StoreError> {
        match self.access.has_access(rpath, required) {
            Ok(allowed) => Ok(allowed),
            Err(err) => {
                error!(rpath, %err, "failed to evaluate access");
                Err(err.into())
            }
        }
    }

    fn exact_paths(&self, rpath: &str) -> Result<Vec<String>, StoreError> {
        let guard = lock(&self.conn);
        let mut stmt =
            guard.prepare("SELECT rpath FROM calendar WHERE rpath = ?1 AND owner_id = ?2")?;
        let rows = stmt.query_map(rusqlite::params![rpath, self.user.id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    fn owned_paths(&self) -> Result<Vec<String>, StoreError> {
        let guard = lock(&self.conn);
        let mut stmt = guard.prepare("SELECT rpath FROM calendar WHERE owner_id = ?1")?;
        let rows = stmt.query_map([self.user.id], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }

    fn resource(&self, rpath: String) -> Resource {
        let adapter = ResourceAdapter::new(self.conn.clone(), rpath.clone(), self.user.id);
        Resource::new(rpath, adapter)
    }
}

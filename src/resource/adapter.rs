use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::warn;

use crate::access::{AccessEvaluator, Permission};
use crate::resource::path;
use crate::storage::{lock, SharedConnection, StoreError};

/// Lazy, per-resource access to content and metadata.
///
/// Every accessor except `is_collection` re-checks read access before
/// touching storage. `Ok(None)` means denied or absent; real store failures
/// stay errors so the caller can tell the cases apart.
#[derive(Debug, Clone)]
pub struct ResourceAdapter {
    conn: SharedConnection,
    rpath: String,
    user_id: i64,
}

impl ResourceAdapter {
    pub(crate) fn new(conn: SharedConnection, rpath: String, user_id: i64) -> Self {
        Self { conn, rpath, user_id }
    }

    pub fn rpath(&self) -> &str {
        &self.rpath
    }

    pub fn is_collection(&self) -> bool {
        path::is_collection(&self.rpath)
    }

    /// Decoded calendar payload. Collections carry no content.
    pub fn content(&self) -> Result<Option<String>, StoreError> {
        if self.is_collection() {
            return Ok(None);
        }
        if !self.readable()? {
            return Ok(None);
        }

        let encoded: Option<String> = {
            let guard = lock(&self.conn);
            guard
                .query_row(
                    "SELECT content FROM calendar WHERE rpath = ?1 AND owner_id = ?2",
                    rusqlite::params![self.rpath, self.user_id],
                    |row| row.get(0),
                )
                .optional()?
        };

        match encoded {
            Some(encoded) => {
                let decoded = BASE64.decode(encoded.as_bytes())?;
                Ok(Some(String::from_utf8_lossy(&decoded).into_owned()))
            }
            None => Ok(None),
        }
    }

    pub fn content_size(&self) -> Result<Option<i64>, StoreError> {
        Ok(self.content()?.map(|content| content.len() as i64))
    }

    pub fn mod_time(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        if !self.readable()? {
            return Ok(None);
        }

        let stored: Option<String> = {
            let guard = lock(&self.conn);
            guard
                .query_row(
                    "SELECT modified FROM calendar WHERE rpath = ?1 AND owner_id = ?2",
                    rusqlite::params![self.rpath, self.user_id],
                    |row| row.get(0),
                )
                .optional()?
        };

        match stored {
            Some(stored) => {
                let parsed = DateTime::parse_from_rfc3339(&stored)?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
            None => Ok(None),
        }
    }

    /// Weak entity tag: a projection of content size and modification time,
    /// defined only for non-collection resources.
    pub fn etag(&self) -> Result<Option<String>, StoreError> {
        if self.is_collection() {
            return Ok(None);
        }
        let (size, mod_time) = match (self.content_size()?, self.mod_time()?) {
            (Some(size), Some(mod_time)) => (size, mod_time),
            _ => return Ok(None),
        };
        let nanos = mod_time.timestamp_nanos_opt().unwrap_or(0);
        Ok(Some(format!("\"{:x}{:x}\"", size, nanos)))
    }

    /// Non-failing view for the protocol boundary.
    pub fn view(&self) -> ResourceView<'_> {
        ResourceView { adapter: self }
    }

    fn readable(&self) -> Result<bool, StoreError> {
        let evaluator = AccessEvaluator::new(self.conn.clone(), self.user_id);
        Ok(evaluator.has_access(&self.rpath, Permission::Read)?)
    }
}

/// Shim for callers with no error channel: denial and lookup failure both
/// collapse to safe defaults, failures are logged instead of raised.
pub struct ResourceView<'a> {
    adapter: &'a ResourceAdapter,
}

impl ResourceView<'_> {
    pub fn content(&self) -> String {
        self.logged("content", self.adapter.content()).unwrap_or_default()
    }

    pub fn content_size(&self) -> i64 {
        self.logged("content size", self.adapter.content_size())
            .unwrap_or_default()
    }

    pub fn mod_time(&self) -> DateTime<Utc> {
        self.logged("modification time", self.adapter.mod_time())
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn etag(&self) -> String {
        self.logged("etag", self.adapter.etag()).unwrap_or_default()
    }

    pub fn is_collection(&self) -> bool {
        self.adapter.is_collection()
    }

    fn logged<T>(&self, what: &str, result: Result<Option<T>, StoreError>) -> Option<T> {
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(rpath = %self.adapter.rpath, %err, "failed to load {what}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Principal;
    use crate::storage::{schema, ResourceStore, WriteOutcome};

    fn setup(permission: &str) -> (SharedConnection, Principal) {
        let conn = crate::storage::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        {
            let guard = lock(&conn);
            guard
                .execute(
                    "INSERT INTO users (username, password, email)
                     VALUES ('alice', 'x', 'alice@example.com')",
                    [],
                )
                .unwrap();
            guard
                .execute("INSERT INTO collection (name) VALUES ('/cal/')", [])
                .unwrap();
            guard
                .execute(
                    "INSERT INTO collection_role (user_id, collection_id, permission)
                     VALUES (1, 1, ?1)",
                    [permission],
                )
                .unwrap();
        }
        let user = Principal {
            id: 1,
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
        };
        (conn, user)
    }

    fn create(conn: &SharedConnection, user: &Principal, rpath: &str, content: &str) {
        let store = ResourceStore::new(conn.clone(), user.clone());
        match store.create(rpath, content).unwrap() {
            WriteOutcome::Written(_) => {}
            WriteOutcome::Denied => panic!("create denied in test setup"),
        }
    }

    #[test]
    fn content_round_trips_through_encoding() {
        let (conn, user) = setup("write");
        create(&conn, &user, "/cal/event1.ics", "BEGIN:VEVENT\nEND:VEVENT");

        let adapter = ResourceAdapter::new(conn, "/cal/event1.ics".to_string(), user.id);
        assert_eq!(
            adapter.content().unwrap().as_deref(),
            Some("BEGIN:VEVENT\nEND:VEVENT")
        );
        assert_eq!(adapter.content_size().unwrap(), Some(23));
    }

    #[test]
    fn collection_has_no_content_and_no_etag() {
        let (conn, user) = setup("admin");
        let adapter = ResourceAdapter::new(conn, "/cal/".to_string(), user.id);

        assert_eq!(adapter.content().unwrap(), None);
        assert_eq!(adapter.etag().unwrap(), None);
        assert!(adapter.is_collection());
    }

    #[test]
    fn etag_reflects_size_and_mod_time() {
        let (conn, user) = setup("write");
        create(&conn, &user, "/cal/event1.ics", "BEGIN:VEVENT\nEND:VEVENT");

        let adapter = ResourceAdapter::new(conn, "/cal/event1.ics".to_string(), user.id);
        let size = adapter.content_size().unwrap().unwrap();
        let nanos = adapter
            .mod_time()
            .unwrap()
            .unwrap()
            .timestamp_nanos_opt()
            .unwrap();

        assert_eq!(
            adapter.etag().unwrap().unwrap(),
            format!("\"{:x}{:x}\"", size, nanos)
        );
    }

    #[test]
    fn denied_accessor_yields_none_not_error() {
        let (conn, user) = setup("write");
        create(&conn, &user, "/cal/event1.ics", "BEGIN:VEVENT\nEND:VEVENT");
        {
            let guard = lock(&conn);
            guard.execute("DELETE FROM collection_role", []).unwrap();
        }

        let adapter = ResourceAdapter::new(conn, "/cal/event1.ics".to_string(), user.id);
        assert_eq!(adapter.content().unwrap(), None);
        assert_eq!(adapter.mod_time().unwrap(), None);
        assert_eq!(adapter.etag().unwrap(), None);
    }

    #[test]
    fn view_returns_safe_defaults_on_denial() {
        let (conn, user) = setup("write");
        create(&conn, &user, "/cal/event1.ics", "BEGIN:VEVENT\nEND:VEVENT");
        {
            let guard = lock(&conn);
            guard.execute("DELETE FROM collection_role", []).unwrap();
        }

        let adapter = ResourceAdapter::new(conn, "/cal/event1.ics".to_string(), user.id);
        let view = adapter.view();
        assert_eq!(view.content(), "");
        assert_eq!(view.content_size(), 0);
        assert_eq!(view.mod_time(), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(view.etag(), "");
    }

    #[test]
    fn absent_resource_yields_none() {
        let (conn, user) = setup("read");
        let adapter = ResourceAdapter::new(conn, "/cal/missing.ics".to_string(), user.id);

        assert_eq!(adapter.content().unwrap(), None);
        assert_eq!(adapter.mod_time().unwrap(), None);
    }
}

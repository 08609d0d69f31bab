use tracing::info;

use super::{lock, SharedConnection, StoreError};

/// Initialization script, applied exactly once.
const SCHEMA: &str = "
CREATE TABLE users (
    id       INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    email    TEXT NOT NULL
);

CREATE TABLE collection (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE collection_role (
    user_id       INTEGER NOT NULL REFERENCES users(id),
    collection_id INTEGER NOT NULL REFERENCES collection(id),
    permission    TEXT NOT NULL CHECK (permission IN ('read', 'write', 'admin'))
);

CREATE TABLE calendar (
    rpath    TEXT NOT NULL,
    content  TEXT NOT NULL,
    owner_id INTEGER NOT NULL REFERENCES users(id),
    modified TEXT NOT NULL,
    UNIQUE (rpath, owner_id)
);

CREATE INDEX idx_calendar_owner ON calendar(owner_id);
CREATE INDEX idx_role_user ON collection_role(user_id);
";

/// Apply the schema if the resource table is not readable yet.
///
/// The whole script runs in one transaction: any statement failure rolls
/// everything back and surfaces as a store error.
pub fn initialize(conn: &SharedConnection) -> Result<(), StoreError> {
    let mut guard = lock(conn);

    let probe: Result<i64, rusqlite::Error> =
        guard.query_row("SELECT COUNT(*) FROM calendar LIMIT 1", [], |row| row.get(0));
    if probe.is_ok() {
        return Ok(());
    }

    let tx = guard.transaction()?;
    tx.execute_batch(SCHEMA)?;
    tx.commit()?;
    info!("database schema initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::open_in_memory;

    fn table_exists(conn: &SharedConnection, name: &str) -> bool {
        let guard = lock(conn);
        let count: i64 = guard
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn creates_all_tables() {
        let conn = open_in_memory().unwrap();
        initialize(&conn).unwrap();

        assert!(table_exists(&conn, "users"));
        assert!(table_exists(&conn, "collection"));
        assert!(table_exists(&conn, "collection_role"));
        assert!(table_exists(&conn, "calendar"));
    }

    #[test]
    fn second_initialize_is_a_no_op() {
        let conn = open_in_memory().unwrap();
        initialize(&conn).unwrap();
        initialize(&conn).unwrap();
    }

    #[test]
    fn existing_data_survives_reinitialization() {
        let conn = open_in_memory().unwrap();
        initialize(&conn).unwrap();
        {
            let guard = lock(&conn);
            guard
                .execute(
                    "INSERT INTO users (username, password, email) VALUES ('a', 'b', 'c')",
                    [],
                )
                .unwrap();
        }

        initialize(&conn).unwrap();

        let guard = lock(&conn);
        let count: i64 = guard
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}

use rand::RngCore;
use rusqlite::OptionalExtension;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

use crate::storage::{lock, SharedConnection};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Authenticated user, resolved once per request at the transport boundary
/// and passed explicitly into the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub email: String,
}

/// Resolve a principal by verifying the presented password against the
/// stored salted hash. Unknown user and bad password both come back as
/// `None`; only a query failure is an error.
pub fn authenticate(
    conn: &SharedConnection,
    username: &str,
    password: &str,
) -> Result<Option<Principal>, AuthError> {
    let row: Option<(i64, String, String, String)> = {
        let guard = lock(conn);
        guard
            .query_row(
                "SELECT id, username, email, password FROM users WHERE username = ?1",
                [username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?
    };

    match row {
        Some((id, username, email, stored)) => {
            if verify_password(password, &stored) {
                Ok(Some(Principal { id, username, email }))
            } else {
                warn!(username, "password verification failed");
                Ok(None)
            }
        }
        None => Ok(None),
    }
}

/// Hash a password as `salt$hexdigest` with a random per-user salt.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    format!("{salt}${}", digest(&salt, password))
}

/// Constant-shape check of a presented password against a stored
/// `salt$hexdigest` entry. Malformed entries never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema;

    fn setup_user(username: &str, password: &str) -> SharedConnection {
        let conn = crate::storage::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        {
            let guard = lock(&conn);
            guard
                .execute(
                    "INSERT INTO users (username, password, email) VALUES (?1, ?2, ?3)",
                    rusqlite::params![
                        username,
                        hash_password(password),
                        format!("{username}@example.com")
                    ],
                )
                .unwrap();
        }
        conn
    }

    #[test]
    fn hash_round_trips() {
        let stored = hash_password("hunter2");
        assert!(verify_password("hunter2", &stored));
        assert!(!verify_password("hunter3", &stored));
    }

    #[test]
    fn hashes_are_salted() {
        assert_ne!(hash_password("hunter2"), hash_password("hunter2"));
    }

    #[test]
    fn malformed_stored_hash_never_verifies() {
        assert!(!verify_password("anything", "no-dollar-sign"));
    }

    #[test]
    fn valid_credentials_resolve_a_principal() {
        let conn = setup_user("alice", "hunter2");

        let principal = authenticate(&conn, "alice", "hunter2").unwrap().unwrap();
        assert_eq!(principal.username, "alice");
        assert_eq!(principal.email, "alice@example.com");
    }

    #[test]
    fn wrong_password_resolves_nothing() {
        let conn = setup_user("alice", "hunter2");
        assert!(authenticate(&conn, "alice", "wrong").unwrap().is_none());
    }

    #[test]
    fn unknown_user_resolves_nothing() {
        let conn = setup_user("alice", "hunter2");
        assert!(authenticate(&conn, "bob", "hunter2").unwrap().is_none());
    }
}

pub mod config;
pub mod schema;
pub mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::Connection;

pub use config::{Config, ConfigError, MailConfig};
pub use store::{DeleteOutcome, ResourceStore, StoreError, WriteOutcome};

/// Connection handle shared between the per-request store and the lazy
/// resource adapters it hands out.
pub type SharedConnection = Arc<Mutex<Connection>>;

/// How long a single statement may wait on a locked database.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open the backing database and wrap it for sharing.
pub fn open(path: &std::path::Path) -> Result<SharedConnection, StoreError> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory database, used by tests.
pub fn open_in_memory() -> Result<SharedConnection, StoreError> {
    let conn = Connection::open_in_memory()?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Acquire the connection, recovering the guard if a previous holder
/// panicked mid-statement.
pub(crate) fn lock(conn: &SharedConnection) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

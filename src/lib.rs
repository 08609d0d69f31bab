pub mod access;
pub mod auth;
pub mod mail;
pub mod resource;
pub mod storage;

pub use access::Permission;
pub use auth::Principal;
pub use resource::{Resource, ResourceAdapter, ResourceView};
pub use storage::{DeleteOutcome, ResourceStore, StoreError, WriteOutcome};

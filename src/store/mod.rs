//! Persistence layer: libSQL-backed storage for onboarding sessions and
//! user records.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlStore;
pub use traits::{ProfileStore, UserRecord};

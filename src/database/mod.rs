//! Persistence layer: SQLite connection, schema migrations and the
//! key/value store adapter used by the repository and session manager.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use tabgroups::database::{Database, SqliteStore, MemoryStore};
//! use tabgroups::database::sqlite_store::DURABLE_NAMESPACE;
//!
//! let db = Arc::new(Database::open("tabgroups.db").expect("failed to open database"));
//! let durable = SqliteStore::new(db, DURABLE_NAMESPACE);
//! let primary = MemoryStore::new();
//! ```

pub mod connection;
pub mod migrations;
pub mod sqlite_store;
pub mod store;

pub use connection::Database;
pub use sqlite_store::SqliteStore;
pub use store::{KeyValueStore, MemoryStore};

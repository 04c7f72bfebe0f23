//! MDM Storage Layer
//!
//! Enrollment, command queue, certificate association and push certificate
//! storage, with SQLite and filesystem backends.

mod error;
mod file;
mod lastseen;
mod models;
mod multi;
mod queue;
mod schema;
mod sqlite;
mod traits;

#[cfg(test)]
mod conformance;

pub use error::StorageError;
pub use file::FileStorage;
pub use lastseen::LastSeenBatcher;
pub use multi::MultiStorage;
pub use queue::QueueState;
pub use sqlite::SqliteStorage;
pub use traits::*;

use diesel_migrations::{EmbeddedMigrations, embed_migrations};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

//! Genre Collections Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod background_jobs;
pub mod catalog_store;
pub mod collections;
pub mod config;
pub mod server;
pub mod server_store;
pub mod sqlite_persistence;
pub mod user;

// Re-export commonly used types for convenience
pub use catalog_store::{CatalogStore, CollectionStore, SqliteCatalogStore};
pub use collections::{GenreReconciler, NameMatching, PinSynchronizer};
pub use server::{run_server, RequestsLoggingLevel};
pub use server_store::{ServerStore, SqliteServerStore};
pub use user::{FavoritesStore, SqliteUserStore, UserRegistry};

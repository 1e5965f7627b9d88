mod models;
mod null_store;
mod schema;
mod store;
mod trait_def;

pub use models::*;
pub use null_store::NullCatalogStore;
pub use schema::CATALOG_VERSIONED_SCHEMAS;
pub use store::SqliteCatalogStore;
pub use trait_def::{CatalogStore, CollectionError, CollectionStore};

//! Store traits the collection jobs are written against.
//!
//! Reads and writes are split so a host can grant the reconciler write
//! access to collections only.

use super::models::{CatalogItem, Collection, Movie, MovieQuery};
use crate::collections::NameMatching;
use anyhow::Result;
use thiserror::Error;
use uuid::Uuid;

pub trait CatalogStore: Send + Sync {
    /// Movies matching `query`, in catalog order.
    fn list_movies(&self, query: &MovieQuery) -> Result<Vec<Movie>>;

    /// All collections, oldest first.
    fn list_collections(&self) -> Result<Vec<CatalogItem>>;

    /// The oldest collection whose name matches `name` under `matching`.
    fn find_collection_by_name(
        &self,
        name: &str,
        matching: NameMatching,
    ) -> Result<Option<CatalogItem>>;

    /// A collection with its current children. `Ok(None)` if `id` is not a collection.
    fn get_collection(&self, id: &Uuid) -> Result<Option<Collection>>;

    fn get_item(&self, id: &Uuid) -> Result<Option<CatalogItem>>;
}

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("collection {0} not found")]
    NotFound(Uuid),
    #[error("invalid collection name {0:?}")]
    InvalidName(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub trait CollectionStore: Send + Sync {
    /// Creates an empty collection named `name`.
    fn create_collection(&self, name: &str) -> Result<Collection, CollectionError>;

    /// Links `item_ids` into the collection. Already linked items are left as they are.
    fn add_to_collection(&self, collection_id: &Uuid, item_ids: &[Uuid])
        -> Result<(), CollectionError>;
}

//! A catalog with nothing in it, for wiring that needs a store but no data.

use super::models::{CatalogItem, Collection, Movie, MovieQuery};
use super::trait_def::{CatalogStore, CollectionError, CollectionStore};
use crate::collections::NameMatching;
use anyhow::Result;
use uuid::Uuid;

pub struct NullCatalogStore;

impl CatalogStore for NullCatalogStore {
    fn list_movies(&self, _query: &MovieQuery) -> Result<Vec<Movie>> {
        Ok(vec![])
    }

    fn list_collections(&self) -> Result<Vec<CatalogItem>> {
        Ok(vec![])
    }

    fn find_collection_by_name(
        &self,
        _name: &str,
        _matching: NameMatching,
    ) -> Result<Option<CatalogItem>> {
        Ok(None)
    }

    fn get_collection(&self, _id: &Uuid) -> Result<Option<Collection>> {
        Ok(None)
    }

    fn get_item(&self, _id: &Uuid) -> Result<Option<CatalogItem>> {
        Ok(None)
    }
}

impl CollectionStore for NullCatalogStore {
    fn create_collection(&self, name: &str) -> Result<Collection, CollectionError> {
        Err(CollectionError::Storage(anyhow::anyhow!(
            "cannot create {:?}: null catalog",
            name
        )))
    }

    fn add_to_collection(
        &self,
        collection_id: &Uuid,
        _item_ids: &[Uuid],
    ) -> Result<(), CollectionError> {
        Err(CollectionError::NotFound(*collection_id))
    }
}

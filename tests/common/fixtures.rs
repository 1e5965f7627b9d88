//! Test fixture creation for catalog and user databases

use super::constants::*;
use anyhow::Result;
use genre_collections::catalog_store::{
    CatalogItem, CollectionStore, ItemKind, Movie, SqliteCatalogStore,
};
use genre_collections::user::SqliteUserStore;
use std::path::Path;
use uuid::Uuid;

/// Ids of the seeded library items.
#[derive(Clone, Debug)]
pub struct TestCatalog {
    pub heat: Uuid,
    pub amelie: Uuid,
    pub untagged: Uuid,
    pub virtual_movie: Uuid,
    pub existing_collection: Uuid,
}

fn movie(name: &str, genres: &[&str]) -> Movie {
    Movie {
        id: Uuid::new_v4(),
        name: name.to_string(),
        genres: genres.iter().map(|g| g.to_string()).collect(),
    }
}

/// Creates a catalog with three real movies, one virtual movie and an
/// existing "Drama" collection.
pub fn create_test_catalog(db_dir: &Path) -> Result<(SqliteCatalogStore, TestCatalog)> {
    let store = SqliteCatalogStore::new(db_dir.join("catalog.db"))?;

    let existing = store.create_collection(EXISTING_COLLECTION)?;

    let heat = movie(MOVIE_HEAT, MOVIE_HEAT_GENRES);
    let amelie = movie(MOVIE_AMELIE, MOVIE_AMELIE_GENRES);
    let untagged = movie(MOVIE_UNTAGGED, &[]);
    for m in [&heat, &amelie, &untagged] {
        store.insert_movie(m)?;
    }

    let virtual_movie = CatalogItem {
        id: Uuid::new_v4(),
        name: MOVIE_VIRTUAL.to_string(),
        kind: ItemKind::Movie,
        is_virtual: true,
        parent_id: None,
    };
    let virtual_genres: Vec<String> = MOVIE_VIRTUAL_GENRES.iter().map(|g| g.to_string()).collect();
    store.insert_item(&virtual_movie, &virtual_genres)?;

    Ok((
        store,
        TestCatalog {
            heat: heat.id,
            amelie: amelie.id,
            untagged: untagged.id,
            virtual_movie: virtual_movie.id,
            existing_collection: existing.id,
        },
    ))
}

/// Creates the user database with the two test users. Returns their ids.
pub fn create_test_users(db_dir: &Path) -> Result<(SqliteUserStore, usize, usize)> {
    let store = SqliteUserStore::new(db_dir.join("user.db"))?;
    let alice = store.create_user(USER_ALICE)?;
    let bob = store.create_user(USER_BOB)?;
    Ok((store, alice, bob))
}

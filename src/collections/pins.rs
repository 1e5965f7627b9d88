//! Applies the pinned collection list as favorites for every user.

use crate::catalog_store::{CatalogStore, ItemKind};
use crate::user::{FavoritesStore, UserRegistry};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PinReport {
    pub users: usize,
    /// Pinned ids that resolved to an existing collection.
    pub collections: usize,
    pub skipped_ids: Vec<Uuid>,
    pub favorites_set: usize,
    pub already_favorite: usize,
    pub failures: usize,
}

pub struct PinSynchronizer {
    catalog: Arc<dyn CatalogStore>,
    users: Arc<dyn UserRegistry>,
    favorites: Arc<dyn FavoritesStore>,
}

impl PinSynchronizer {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        users: Arc<dyn UserRegistry>,
        favorites: Arc<dyn FavoritesStore>,
    ) -> Self {
        Self {
            catalog,
            users,
            favorites,
        }
    }

    /// Marks every pinned collection as a favorite of every user.
    ///
    /// Ids that do not resolve to a collection are skipped with a warning.
    /// A failure on a single (user, collection) pair is logged and the loop
    /// moves on; only failing to enumerate users is returned as an error.
    /// Favorites are never removed.
    pub fn apply_pins(&self, pinned_ids: &[Uuid]) -> Result<PinReport> {
        let users = self.users.list_users().context("Failed to list users")?;
        let mut report = PinReport {
            users: users.len(),
            ..Default::default()
        };

        let mut collections = Vec::with_capacity(pinned_ids.len());
        for id in pinned_ids {
            match self.catalog.get_item(id) {
                Ok(Some(item)) if item.kind == ItemKind::Collection => collections.push(*id),
                Ok(Some(item)) => {
                    warn!(
                        "Pinned item {} ({}) is a {}, not a collection; skipping",
                        id,
                        item.name,
                        item.kind.as_str()
                    );
                    report.skipped_ids.push(*id);
                }
                Ok(None) => {
                    warn!("Pinned collection {} not found; skipping", id);
                    report.skipped_ids.push(*id);
                }
                Err(e) => {
                    error!("Failed to resolve pinned collection {}: {:#}", id, e);
                    report.skipped_ids.push(*id);
                    report.failures += 1;
                }
            }
        }
        report.collections = collections.len();

        for user in &users {
            for collection_id in &collections {
                match self.pin_for_user(user.id, collection_id) {
                    Ok(true) => report.favorites_set += 1,
                    Ok(false) => report.already_favorite += 1,
                    Err(e) => {
                        error!(
                            "Failed to pin collection {} for user {}: {:#}",
                            collection_id, user.handle, e
                        );
                        report.failures += 1;
                    }
                }
            }
        }

        info!(
            "Applied {} pinned collections to {} users: {} favorites set, {} already set, {} failures",
            report.collections, report.users, report.favorites_set, report.already_favorite, report.failures
        );
        Ok(report)
    }

    /// Returns whether the favorite flag had to be set.
    fn pin_for_user(&self, user_id: usize, collection_id: &Uuid) -> Result<bool> {
        if self.favorites.is_favorite(user_id, collection_id)? {
            debug!("Collection {} already favorite for user {}", collection_id, user_id);
            return Ok(false);
        }
        self.favorites.set_favorite(user_id, collection_id, true)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::test_support::{InMemoryCatalog, InMemoryUsers};
    use std::collections::HashSet;

    fn synchronizer(catalog: &Arc<InMemoryCatalog>, users: &Arc<InMemoryUsers>) -> PinSynchronizer {
        PinSynchronizer::new(catalog.clone(), users.clone(), users.clone())
    }

    #[test]
    fn pins_every_collection_for_every_user() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let c1 = catalog.add_collection("Drama", &[]);
        let c2 = catalog.add_collection("Comedy", &[]);
        let alice = users.add_user("alice");
        let bob = users.add_user("bob");

        let report = synchronizer(&catalog, &users).apply_pins(&[c1, c2]).unwrap();

        assert_eq!(report.favorites_set, 4);
        assert_eq!(users.favorites_of(alice), HashSet::from([c1, c2]));
        assert_eq!(users.favorites_of(bob), HashSet::from([c1, c2]));
    }

    #[test]
    fn existing_favorites_are_not_rewritten() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let c1 = catalog.add_collection("Drama", &[]);
        users.add_user("alice");
        let sync = synchronizer(&catalog, &users);

        sync.apply_pins(&[c1]).unwrap();
        let report = sync.apply_pins(&[c1]).unwrap();

        assert_eq!(report.favorites_set, 0);
        assert_eq!(report.already_favorite, 1);
        assert_eq!(users.set_calls(), 1);
    }

    #[test]
    fn missing_and_non_collection_ids_are_skipped() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let movie = catalog.add_movie("M1", &["Drama"]);
        let collection = catalog.add_collection("Drama", &[]);
        let missing = Uuid::new_v4();
        let alice = users.add_user("alice");

        let report = synchronizer(&catalog, &users)
            .apply_pins(&[missing, movie, collection])
            .unwrap();

        assert_eq!(report.skipped_ids, vec![missing, movie]);
        assert_eq!(report.collections, 1);
        assert_eq!(users.favorites_of(alice), HashSet::from([collection]));
    }

    #[test]
    fn removing_a_pin_does_not_unfavorite() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let c1 = catalog.add_collection("Drama", &[]);
        let c2 = catalog.add_collection("Comedy", &[]);
        let alice = users.add_user("alice");
        let sync = synchronizer(&catalog, &users);

        sync.apply_pins(&[c1, c2]).unwrap();
        sync.apply_pins(&[c2]).unwrap();

        assert!(users.favorites_of(alice).contains(&c1));
    }

    #[test]
    fn failure_for_one_user_does_not_stop_others() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let c1 = catalog.add_collection("Drama", &[]);
        let alice = users.add_user("alice");
        let bob = users.add_user("bob");
        users.fail_favorites_for(alice);

        let report = synchronizer(&catalog, &users).apply_pins(&[c1]).unwrap();

        assert_eq!(report.failures, 1);
        assert_eq!(report.favorites_set, 1);
        assert!(users.favorites_of(bob).contains(&c1));
    }

    #[test]
    fn user_listing_failure_is_an_error() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        let c1 = catalog.add_collection("Drama", &[]);
        users.fail_list_users();

        assert!(synchronizer(&catalog, &users).apply_pins(&[c1]).is_err());
    }

    #[test]
    fn empty_pin_list_changes_nothing() {
        let catalog = Arc::new(InMemoryCatalog::default());
        let users = Arc::new(InMemoryUsers::default());
        users.add_user("alice");

        let report = synchronizer(&catalog, &users).apply_pins(&[]).unwrap();

        assert_eq!(report.users, 1);
        assert_eq!(report.favorites_set, 0);
        assert_eq!(users.set_calls(), 0);
    }
}

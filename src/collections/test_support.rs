//! In-memory stores with failure injection for the collection tests.

use super::genre::NameMatching;
use super::reconciler::ProgressSink;
use crate::catalog_store::{
    CatalogItem, CatalogStore, Collection, CollectionError, CollectionStore, ItemKind, Movie,
    MovieQuery,
};
use crate::user::{FavoritesStore, User, UserRegistry};
use anyhow::{anyhow, Result};
use std::collections::HashSet;
use std::sync::{mpsc, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct RecordingProgress {
    values: Mutex<Vec<f64>>,
}

impl RecordingProgress {
    pub fn values(&self) -> Vec<f64> {
        self.values.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn report(&self, percent: f64) {
        self.values.lock().unwrap().push(percent);
    }
}

struct StoredCollection {
    id: Uuid,
    name: String,
    children: Vec<Uuid>,
    /// Not returned by `list_collections`, only by direct lookups.
    hidden: bool,
}

#[derive(Default)]
struct CatalogState {
    movies: Vec<Movie>,
    collections: Vec<StoredCollection>,
    writes: usize,
    fail_list_movies: bool,
    fail_create: HashSet<String>,
    fail_link: HashSet<Uuid>,
}

/// Parks one `list_movies` call until the test lets it go.
struct ListMoviesGate {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

#[derive(Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
    list_gate: Mutex<Option<ListMoviesGate>>,
}

impl InMemoryCatalog {
    pub fn add_movie(&self, name: &str, genres: &[&str]) -> Uuid {
        let id = Uuid::new_v4();
        self.state.lock().unwrap().movies.push(Movie {
            id,
            name: name.to_string(),
            genres: genres.iter().map(|g| g.to_string()).collect(),
        });
        id
    }

    pub fn add_collection(&self, name: &str, children: &[Uuid]) -> Uuid {
        self.push_collection(name, children, false)
    }

    pub fn add_hidden_collection(&self, name: &str) -> Uuid {
        self.push_collection(name, &[], true)
    }

    fn push_collection(&self, name: &str, children: &[Uuid], hidden: bool) -> Uuid {
        let id = Uuid::new_v4();
        self.state
            .lock()
            .unwrap()
            .collections
            .push(StoredCollection {
                id,
                name: name.to_string(),
                children: children.to_vec(),
                hidden,
            });
        id
    }

    pub fn collection_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.collections.iter().map(|c| c.name.clone()).collect()
    }

    /// Children of the first collection named `name`, in link order.
    pub fn members(&self, name: &str) -> Vec<Uuid> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    pub fn children_of(&self, id: &Uuid) -> Vec<Uuid> {
        let state = self.state.lock().unwrap();
        state
            .collections
            .iter()
            .find(|c| c.id == *id)
            .map(|c| c.children.clone())
            .unwrap_or_default()
    }

    pub fn write_count(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// The next `list_movies` call signals the returned receiver, then waits
    /// for a message on the returned sender.
    pub fn hold_next_list_movies(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.list_gate.lock().unwrap() = Some(ListMoviesGate {
            entered: entered_tx,
            release: release_rx,
        });
        (entered_rx, release_tx)
    }

    pub fn fail_list_movies(&self) {
        self.state.lock().unwrap().fail_list_movies = true;
    }

    pub fn fail_create_for(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_create
            .insert(name.to_string());
    }

    pub fn fail_link_for(&self, movie_id: Uuid) {
        self.state.lock().unwrap().fail_link.insert(movie_id);
    }
}

fn as_item(collection: &StoredCollection) -> CatalogItem {
    CatalogItem {
        id: collection.id,
        name: collection.name.clone(),
        kind: ItemKind::Collection,
        is_virtual: false,
        parent_id: None,
    }
}

impl CatalogStore for InMemoryCatalog {
    fn list_movies(&self, _query: &MovieQuery) -> Result<Vec<Movie>> {
        let gate = self.list_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        let state = self.state.lock().unwrap();
        if state.fail_list_movies {
            return Err(anyhow!("catalog unavailable"));
        }
        Ok(state.movies.clone())
    }

    fn list_collections(&self) -> Result<Vec<CatalogItem>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .iter()
            .filter(|c| !c.hidden)
            .map(as_item)
            .collect())
    }

    fn find_collection_by_name(
        &self,
        name: &str,
        matching: NameMatching,
    ) -> Result<Option<CatalogItem>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .iter()
            .find(|c| matching.matches(&c.name, name))
            .map(as_item))
    }

    fn get_collection(&self, id: &Uuid) -> Result<Option<Collection>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .collections
            .iter()
            .find(|c| c.id == *id)
            .map(|c| Collection {
                id: c.id,
                name: c.name.clone(),
                children: c.children.iter().copied().collect(),
            }))
    }

    fn get_item(&self, id: &Uuid) -> Result<Option<CatalogItem>> {
        let state = self.state.lock().unwrap();
        if let Some(collection) = state.collections.iter().find(|c| c.id == *id) {
            return Ok(Some(as_item(collection)));
        }
        Ok(state.movies.iter().find(|m| m.id == *id).map(|m| CatalogItem {
            id: m.id,
            name: m.name.clone(),
            kind: ItemKind::Movie,
            is_virtual: false,
            parent_id: None,
        }))
    }
}

impl CollectionStore for InMemoryCatalog {
    fn create_collection(&self, name: &str) -> Result<Collection, CollectionError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_create.contains(name) {
            return Err(CollectionError::Storage(anyhow!("disk full")));
        }
        let id = Uuid::new_v4();
        state.collections.push(StoredCollection {
            id,
            name: name.to_string(),
            children: vec![],
            hidden: false,
        });
        state.writes += 1;
        Ok(Collection {
            id,
            name: name.to_string(),
            children: HashSet::new(),
        })
    }

    fn add_to_collection(
        &self,
        collection_id: &Uuid,
        item_ids: &[Uuid],
    ) -> Result<(), CollectionError> {
        let mut state = self.state.lock().unwrap();
        if item_ids.iter().any(|id| state.fail_link.contains(id)) {
            return Err(CollectionError::Storage(anyhow!("link rejected")));
        }
        let collection = state
            .collections
            .iter_mut()
            .find(|c| c.id == *collection_id)
            .ok_or(CollectionError::NotFound(*collection_id))?;
        for id in item_ids {
            if !collection.children.contains(id) {
                collection.children.push(*id);
            }
        }
        state.writes += 1;
        Ok(())
    }
}

#[derive(Default)]
struct UsersState {
    users: Vec<User>,
    favorites: HashSet<(usize, Uuid)>,
    fail_list: bool,
    fail_for_user: HashSet<usize>,
    set_calls: usize,
}

#[derive(Default)]
pub struct InMemoryUsers {
    state: Mutex<UsersState>,
}

impl InMemoryUsers {
    pub fn add_user(&self, handle: &str) -> usize {
        let mut state = self.state.lock().unwrap();
        let id = state.users.len() + 1;
        state.users.push(User {
            id,
            handle: handle.to_string(),
        });
        id
    }

    pub fn favorites_of(&self, user_id: usize) -> HashSet<Uuid> {
        let state = self.state.lock().unwrap();
        state
            .favorites
            .iter()
            .filter(|(user, _)| *user == user_id)
            .map(|(_, item)| *item)
            .collect()
    }

    pub fn set_calls(&self) -> usize {
        self.state.lock().unwrap().set_calls
    }

    pub fn fail_list_users(&self) {
        self.state.lock().unwrap().fail_list = true;
    }

    pub fn fail_favorites_for(&self, user_id: usize) {
        self.state.lock().unwrap().fail_for_user.insert(user_id);
    }
}

impl UserRegistry for InMemoryUsers {
    fn list_users(&self) -> Result<Vec<User>> {
        let state = self.state.lock().unwrap();
        if state.fail_list {
            return Err(anyhow!("user database locked"));
        }
        Ok(state.users.clone())
    }
}

impl FavoritesStore for InMemoryUsers {
    fn is_favorite(&self, user_id: usize, item_id: &Uuid) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.favorites.contains(&(user_id, *item_id)))
    }

    fn set_favorite(&self, user_id: usize, item_id: &Uuid, favorite: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_for_user.contains(&user_id) {
            return Err(anyhow!("cannot write favorites for user {}", user_id));
        }
        state.set_calls += 1;
        if favorite {
            state.favorites.insert((user_id, *item_id));
        } else {
            state.favorites.remove(&(user_id, *item_id));
        }
        Ok(())
    }
}

//! SQLite-backed catalog store.

use super::models::*;
use super::schema::CATALOG_VERSIONED_SCHEMAS;
use super::trait_def::{CatalogStore, CollectionError, CollectionStore};
use crate::collections::NameMatching;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct SqliteCatalogStore {
    conn: Arc<Mutex<Connection>>,
}

fn uuid_column(row: &rusqlite::Row, column: &str) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(column)?;
    Uuid::parse_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<CatalogItem> {
    let kind: String = row.get("kind")?;
    let parent_id: Option<String> = row.get("parent_id")?;
    Ok(CatalogItem {
        id: uuid_column(row, "id")?,
        name: row.get("name")?,
        kind: ItemKind::parse(&kind).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown item kind {:?}", kind).into(),
            )
        })?,
        is_virtual: row.get::<_, i64>("is_virtual")? != 0,
        parent_id: parent_id.and_then(|p| Uuid::parse_str(&p).ok()),
    })
}

const ITEM_COLUMNS: &str = "id, name, kind, is_virtual, parent_id";

impl SqliteCatalogStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = open_versioned(db_path, "catalog", CATALOG_VERSIONED_SCHEMAS)?;

        let movies: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM items WHERE kind = ?1",
                params![ItemKind::Movie.as_str()],
                |r| r.get(0),
            )
            .unwrap_or(0);
        let collections: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM items WHERE kind = ?1",
                params![ItemKind::Collection.as_str()],
                |r| r.get(0),
            )
            .unwrap_or(0);
        info!(
            "Opened catalog: {} movies, {} collections",
            movies, collections
        );

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Inserts a top-level, non-virtual movie with its genre tags.
    pub fn insert_movie(&self, movie: &Movie) -> Result<()> {
        let item = CatalogItem {
            id: movie.id,
            name: movie.name.clone(),
            kind: ItemKind::Movie,
            is_virtual: false,
            parent_id: None,
        };
        self.insert_item(&item, &movie.genres)
    }

    /// Inserts any item. `genres` are stored in the given order.
    pub fn insert_item(&self, item: &CatalogItem, genres: &[String]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO items (id, name, kind, is_virtual, parent_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                item.id.to_string(),
                item.name,
                item.kind.as_str(),
                item.is_virtual as i64,
                item.parent_id.map(|p| p.to_string())
            ],
        )
        .with_context(|| format!("Failed to insert item {}", item.id))?;
        for (position, genre) in genres.iter().enumerate() {
            tx.execute(
                "INSERT INTO item_genres (item_id, position, genre) VALUES (?1, ?2, ?3)",
                params![item.id.to_string(), position as i64, genre],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn count_items(&self, kind: ItemKind) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM items WHERE kind = ?1",
            params![kind.as_str()],
            |r| r.get(0),
        )?;
        Ok(count as usize)
    }

    fn load_genres(conn: &Connection, ids: &[String]) -> Result<HashMap<String, Vec<String>>> {
        let mut genres: HashMap<String, Vec<String>> = HashMap::new();
        if ids.is_empty() {
            return Ok(genres);
        }
        let mut stmt = conn.prepare(
            "SELECT item_id, genre FROM item_genres WHERE item_id = ?1 ORDER BY position",
        )?;
        for id in ids {
            let tags = stmt
                .query_map(params![id], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if !tags.is_empty() {
                genres.insert(id.clone(), tags);
            }
        }
        Ok(genres)
    }
}

impl CatalogStore for SqliteCatalogStore {
    fn list_movies(&self, query: &MovieQuery) -> Result<Vec<Movie>> {
        let conn = self.conn.lock().unwrap();
        let virtual_filter = if query.exclude_virtual {
            " AND is_virtual = 0"
        } else {
            ""
        };
        let parent = query.parent_id.map(|p| p.to_string());

        let sql = match (&parent, query.recursive) {
            (None, true) => format!(
                "SELECT id, name FROM items WHERE kind = 'movie'{} ORDER BY rowid",
                virtual_filter
            ),
            (None, false) => format!(
                "SELECT id, name FROM items WHERE kind = 'movie' AND parent_id IS NULL{} ORDER BY rowid",
                virtual_filter
            ),
            (Some(_), false) => format!(
                "SELECT id, name FROM items WHERE kind = 'movie' AND parent_id = ?1{} ORDER BY rowid",
                virtual_filter
            ),
            (Some(_), true) => format!(
                "WITH RECURSIVE descendants(id) AS (
                    SELECT id FROM items WHERE parent_id = ?1
                    UNION
                    SELECT items.id FROM items JOIN descendants ON items.parent_id = descendants.id
                 )
                 SELECT id, name FROM items
                 WHERE kind = 'movie' AND id IN (SELECT id FROM descendants){}
                 ORDER BY rowid",
                virtual_filter
            ),
        };

        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(String, String)> {
            Ok((row.get(0)?, row.get(1)?))
        };
        let rows = match &parent {
            Some(p) => stmt
                .query_map(params![p], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        let ids: Vec<String> = rows.iter().map(|(id, _)| id.clone()).collect();
        let mut genres = Self::load_genres(&conn, &ids)?;

        rows.into_iter()
            .map(|(id, name)| -> Result<Movie> {
                let uuid = Uuid::parse_str(&id)
                    .with_context(|| format!("Invalid item id in catalog: {}", id))?;
                Ok(Movie {
                    id: uuid,
                    name,
                    genres: genres.remove(&id).unwrap_or_default(),
                })
            })
            .collect()
    }

    fn list_collections(&self) -> Result<Vec<CatalogItem>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM items WHERE kind = ?1 ORDER BY rowid",
            ITEM_COLUMNS
        ))?;
        let items = stmt
            .query_map(params![ItemKind::Collection.as_str()], row_to_item)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    fn find_collection_by_name(
        &self,
        name: &str,
        matching: NameMatching,
    ) -> Result<Option<CatalogItem>> {
        match matching {
            NameMatching::Exact => {
                let conn = self.conn.lock().unwrap();
                let item = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM items WHERE kind = ?1 AND name = ?2 ORDER BY rowid LIMIT 1",
                            ITEM_COLUMNS
                        ),
                        params![ItemKind::Collection.as_str(), name],
                        row_to_item,
                    )
                    .optional()?;
                Ok(item)
            }
            // SQLite's lower() only folds ASCII, so compare on the Rust side.
            NameMatching::CaseInsensitive => Ok(self
                .list_collections()?
                .into_iter()
                .find(|c| matching.matches(&c.name, name))),
        }
    }

    fn get_collection(&self, id: &Uuid) -> Result<Option<Collection>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![id.to_string()],
                row_to_item,
            )
            .optional()?;
        let item = match item {
            Some(item) if item.kind == ItemKind::Collection => item,
            _ => return Ok(None),
        };

        let mut stmt =
            conn.prepare("SELECT item_id FROM collection_items WHERE collection_id = ?1")?;
        let children = stmt
            .query_map(params![id.to_string()], |row| uuid_column(row, "item_id"))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;

        Ok(Some(Collection {
            id: item.id,
            name: item.name,
            children,
        }))
    }

    fn get_item(&self, id: &Uuid) -> Result<Option<CatalogItem>> {
        let conn = self.conn.lock().unwrap();
        let item = conn
            .query_row(
                &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLUMNS),
                params![id.to_string()],
                row_to_item,
            )
            .optional()?;
        Ok(item)
    }
}

impl CollectionStore for SqliteCatalogStore {
    fn create_collection(&self, name: &str) -> Result<Collection, CollectionError> {
        if name.trim().is_empty() {
            return Err(CollectionError::InvalidName(name.to_string()));
        }
        let item = CatalogItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: ItemKind::Collection,
            is_virtual: false,
            parent_id: None,
        };
        self.insert_item(&item, &[])
            .with_context(|| format!("Failed to create collection {:?}", name))?;
        Ok(Collection {
            id: item.id,
            name: item.name,
            children: HashSet::new(),
        })
    }

    fn add_to_collection(
        &self,
        collection_id: &Uuid,
        item_ids: &[Uuid],
    ) -> Result<(), CollectionError> {
        let mut conn = self.conn.lock().unwrap();
        let kind: Option<String> = conn
            .query_row(
                "SELECT kind FROM items WHERE id = ?1",
                params![collection_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .context("Failed to look up collection")?;
        if kind.as_deref() != Some(ItemKind::Collection.as_str()) {
            return Err(CollectionError::NotFound(*collection_id));
        }

        let tx = conn.transaction().context("Failed to begin transaction")?;
        for item_id in item_ids {
            tx.execute(
                "INSERT OR IGNORE INTO collection_items (collection_id, item_id) VALUES (?1, ?2)",
                params![collection_id.to_string(), item_id.to_string()],
            )
            .with_context(|| format!("Failed to link {} into {}", item_id, collection_id))?;
        }
        tx.commit().context("Failed to commit collection links")?;
        Ok(())
    }
}

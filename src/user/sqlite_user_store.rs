use super::user_models::User;
use super::user_store::{FavoritesStore, UserRegistry};
use crate::sqlite_column;
use crate::sqlite_persistence::{
    open_versioned, Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema,
    DEFAULT_TIMESTAMP,
};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// V 1
const USER_TABLE_V_1: Table = Table {
    name: "user",
    columns: &[
        sqlite_column!(
            "id",
            &SqlType::Integer,
            is_primary_key = true,
            is_unique = true
        ),
        sqlite_column!("handle", &SqlType::Text, non_null = true, is_unique = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[],
    indices: &[("idx_user_handle", "handle")],
};

const FAVORITE_ITEM_TABLE_V_1: Table = Table {
    name: "favorite_item",
    columns: &[
        sqlite_column!(
            "user_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&ForeignKey {
                foreign_table: "user",
                foreign_column: "id",
                on_delete: ForeignKeyOnChange::Cascade,
            })
        ),
        sqlite_column!("item_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    unique_constraints: &[&["user_id", "item_id"]],
    indices: &[("idx_favorite_item_user", "user_id")],
};

const VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[USER_TABLE_V_1, FAVORITE_ITEM_TABLE_V_1],
    migration: None,
}];

#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    pub fn new<T: AsRef<Path>>(db_path: T) -> Result<Self> {
        let conn = open_versioned(db_path, "user", VERSIONED_SCHEMAS)?;
        Ok(SqliteUserStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates a new user and returns the user id.
    pub fn create_user(&self, user_handle: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO {} (handle) VALUES (?1)", USER_TABLE_V_1.name),
            params![user_handle],
        )
        .with_context(|| format!("Failed to create user {}", user_handle))?;
        Ok(conn.last_insert_rowid() as usize)
    }
}

impl UserRegistry for SqliteUserStore {
    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT id, handle FROM {} ORDER BY id",
            USER_TABLE_V_1.name
        ))?;
        let users = stmt
            .query_map([], |row| {
                Ok(User {
                    id: row.get::<_, i64>(0)? as usize,
                    handle: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

impl FavoritesStore for SqliteUserStore {
    fn is_favorite(&self, user_id: usize, item_id: &Uuid) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE user_id = ?1 AND item_id = ?2",
                FAVORITE_ITEM_TABLE_V_1.name
            ),
            params![user_id as i64, item_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn set_favorite(&self, user_id: usize, item_id: &Uuid, favorite: bool) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        if favorite {
            conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} (user_id, item_id) VALUES (?1, ?2)",
                    FAVORITE_ITEM_TABLE_V_1.name
                ),
                params![user_id as i64, item_id.to_string()],
            )
            .with_context(|| format!("Failed to favorite {} for user {}", item_id, user_id))?;
        } else {
            conn.execute(
                &format!(
                    "DELETE FROM {} WHERE user_id = ?1 AND item_id = ?2",
                    FAVORITE_ITEM_TABLE_V_1.name
                ),
                params![user_id as i64, item_id.to_string()],
            )?;
        }
        Ok(())
    }
}

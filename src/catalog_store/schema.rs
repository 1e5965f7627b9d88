//! SQLite schema of the catalog database.
//!
//! Items are keyed by their UUID text; `rowid` gives catalog order.

use crate::sqlite_column;
use crate::sqlite_persistence::{
    Column, ForeignKey, ForeignKeyOnChange, SqlType, Table, VersionedSchema, DEFAULT_TIMESTAMP,
};

const ITEM_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "items",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

const ITEMS_TABLE: Table = Table {
    name: "items",
    columns: &[
        sqlite_column!("rowid", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("id", &SqlType::Text, non_null = true),
        sqlite_column!("name", &SqlType::Text, non_null = true),
        sqlite_column!("kind", &SqlType::Text, non_null = true), // 'movie', 'series', 'folder', 'collection'
        sqlite_column!(
            "is_virtual",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("parent_id", &SqlType::Text),
        sqlite_column!(
            "created",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[
        ("idx_items_kind", "kind"),
        ("idx_items_parent", "parent_id"),
        ("idx_items_name", "name"),
    ],
    unique_constraints: &[&["id"]],
};

const ITEM_GENRES_TABLE: Table = Table {
    name: "item_genres",
    columns: &[
        sqlite_column!(
            "item_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ITEM_ID_FOREIGN_KEY)
        ),
        sqlite_column!("position", &SqlType::Integer, non_null = true),
        sqlite_column!("genre", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_item_genres_item", "item_id")],
    unique_constraints: &[&["item_id", "position"]],
};

const COLLECTION_ITEMS_TABLE: Table = Table {
    name: "collection_items",
    columns: &[
        sqlite_column!(
            "collection_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ITEM_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "item_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&ITEM_ID_FOREIGN_KEY)
        ),
        sqlite_column!(
            "added",
            &SqlType::Integer,
            default_value = Some(DEFAULT_TIMESTAMP)
        ),
    ],
    indices: &[("idx_collection_items_collection", "collection_id")],
    unique_constraints: &[&["collection_id", "item_id"]],
};

pub const CATALOG_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[ITEMS_TABLE, ITEM_GENRES_TABLE, COLLECTION_ITEMS_TABLE],
    migration: None,
}];

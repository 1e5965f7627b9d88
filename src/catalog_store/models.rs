//! Media library models as seen by the collection jobs.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Movie,
    Series,
    /// Folder-like item; may also be a plain library folder.
    Folder,
    Collection,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Series => "series",
            ItemKind::Folder => "folder",
            ItemKind::Collection => "collection",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(ItemKind::Movie),
            "series" => Some(ItemKind::Series),
            "folder" => Some(ItemKind::Folder),
            "collection" => Some(ItemKind::Collection),
            _ => None,
        }
    }
}

/// Any item of the library.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: Uuid,
    pub name: String,
    pub kind: ItemKind,
    /// Placeholder items (e.g. missing episodes) that have no media behind them.
    pub is_virtual: bool,
    pub parent_id: Option<Uuid>,
}

/// A movie and its genre tags, in the order the host stores them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: Uuid,
    pub name: String,
    pub genres: Vec<String>,
}

/// A named grouping of items, with its current members.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub name: String,
    pub children: HashSet<Uuid>,
}

impl Collection {
    pub fn contains(&self, item_id: &Uuid) -> bool {
        self.children.contains(item_id)
    }
}

/// Filter for [`super::CatalogStore::list_movies`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MovieQuery {
    pub exclude_virtual: bool,
    /// Descend into nested folders instead of listing direct children only.
    pub recursive: bool,
    /// `None` means the library root.
    pub parent_id: Option<Uuid>,
}

impl MovieQuery {
    /// Every real movie in the library.
    pub fn all_movies() -> Self {
        Self {
            exclude_virtual: true,
            recursive: true,
            parent_id: None,
        }
    }
}

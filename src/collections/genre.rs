//! Genre tag normalization and name matching.

use crate::catalog_store::CatalogItem;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How a genre name is compared against existing collection names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum NameMatching {
    /// "Drama" and "drama" are different collections.
    #[default]
    Exact,
    CaseInsensitive,
}

impl NameMatching {
    /// The key two names must share to be considered the same collection.
    pub fn key(&self, name: &str) -> String {
        match self {
            NameMatching::Exact => name.to_string(),
            NameMatching::CaseInsensitive => name.to_lowercase(),
        }
    }

    pub fn matches(&self, a: &str, b: &str) -> bool {
        match self {
            NameMatching::Exact => a == b,
            NameMatching::CaseInsensitive => a.to_lowercase() == b.to_lowercase(),
        }
    }
}

/// Trims a raw genre tag. Blank tags yield `None` and are ignored.
pub fn normalize_genre(tag: &str) -> Option<&str> {
    let trimmed = tag.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Per-run lookup from genre name to collection id.
///
/// Built once from the catalog's collections (oldest first), so when the
/// host already contains several collections with the same name the oldest
/// one is canonical for the whole run.
pub struct CollectionIndex {
    matching: NameMatching,
    by_name: HashMap<String, Uuid>,
}

impl CollectionIndex {
    pub fn build<'a, I>(matching: NameMatching, collections: I) -> Self
    where
        I: IntoIterator<Item = &'a CatalogItem>,
    {
        let mut index = Self {
            matching,
            by_name: HashMap::new(),
        };
        for collection in collections {
            index.insert(&collection.name, collection.id);
        }
        index
    }

    pub fn get(&self, name: &str) -> Option<Uuid> {
        self.by_name.get(&self.matching.key(name)).copied()
    }

    /// Records `name -> id` unless the name is already claimed.
    pub fn insert(&mut self, name: &str, id: Uuid) {
        self.by_name.entry(self.matching.key(name)).or_insert(id);
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_store::ItemKind;

    fn collection(name: &str) -> CatalogItem {
        CatalogItem {
            id: Uuid::new_v4(),
            name: name.to_string(),
            kind: ItemKind::Collection,
            is_virtual: false,
            parent_id: None,
        }
    }

    #[test]
    fn normalize_trims_and_drops_blank_tags() {
        assert_eq!(normalize_genre("  Drama "), Some("Drama"));
        assert_eq!(normalize_genre("Sci-Fi"), Some("Sci-Fi"));
        assert_eq!(normalize_genre(""), None);
        assert_eq!(normalize_genre(" \t "), None);
    }

    #[test]
    fn exact_matching_is_case_sensitive() {
        assert!(NameMatching::Exact.matches("Drama", "Drama"));
        assert!(!NameMatching::Exact.matches("Drama", "drama"));
        assert!(NameMatching::CaseInsensitive.matches("Drama", "dRAMA"));
    }

    #[test]
    fn index_keeps_first_collection_per_name() {
        let oldest = collection("Drama");
        let newer = collection("Drama");
        let index = CollectionIndex::build(NameMatching::Exact, [&oldest, &newer]);

        assert_eq!(index.len(), 1);
        assert_eq!(index.get("Drama"), Some(oldest.id));
        assert_eq!(index.get("drama"), None);
    }

    #[test]
    fn case_insensitive_index_collapses_names() {
        let drama = collection("Drama");
        let mut index = CollectionIndex::build(NameMatching::CaseInsensitive, [&drama]);

        assert_eq!(index.get("drama"), Some(drama.id));
        index.insert("DRAMA", Uuid::new_v4());
        assert_eq!(index.get("Drama"), Some(drama.id));
    }
}

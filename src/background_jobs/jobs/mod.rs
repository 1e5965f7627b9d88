//! Specific background job implementations.

pub mod genre_collections;
pub mod pinned_collections;

pub use genre_collections::GenreCollectionsJob;
pub use pinned_collections::PinnedCollectionsJob;

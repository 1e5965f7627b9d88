//! Shared constants for end-to-end tests
//!
//! When the seeded library or users change, update only this file.

// ============================================================================
// Test Users
// ============================================================================

pub const USER_ALICE: &str = "alice";
pub const USER_BOB: &str = "bob";

// ============================================================================
// Test Library
// ============================================================================

pub const MOVIE_HEAT: &str = "Heat";
pub const MOVIE_HEAT_GENRES: &[&str] = &["Crime", " Drama "];

pub const MOVIE_AMELIE: &str = "Amelie";
pub const MOVIE_AMELIE_GENRES: &[&str] = &["Comedy", "Drama", "Comedy"];

/// Has no genre tags and must not end up in any collection.
pub const MOVIE_UNTAGGED: &str = "Untagged";

/// Placeholder item; skipped by the genre job.
pub const MOVIE_VIRTUAL: &str = "Coming Soon";
pub const MOVIE_VIRTUAL_GENRES: &[&str] = &["Horror"];

/// Collection that already exists before the first run.
pub const EXISTING_COLLECTION: &str = "Drama";

// ============================================================================
// Job IDs
// ============================================================================

pub const GENRE_JOB_ID: &str = "genre_collections";
pub const PINNED_JOB_ID: &str = "pinned_collections";

// ============================================================================
// Timing
// ============================================================================

/// Polling attempts while waiting for a job run, 10ms apart.
pub const JOB_WAIT_ATTEMPTS: usize = 500;

//! Genre collection reconciliation and pinned collection sync.

mod genre;
mod pins;
mod reconciler;
#[cfg(test)]
pub(crate) mod test_support;

pub use genre::{normalize_genre, CollectionIndex, NameMatching};
pub use pins::{PinReport, PinSynchronizer};
pub use reconciler::{
    FailureKind, GenreReconciler, ProgressSink, ReconcileError, ReconcileReport,
    RecoverableFailure, TagOutcome,
};

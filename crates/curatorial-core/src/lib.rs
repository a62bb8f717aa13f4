//! Resolution engine for curatorial parentage.
//!
//! Records are indexed under their alias codes ([`RecordIndex`]), narrowed to
//! the ones valid on a given day ([`TemporalResolver`]) and folded into a
//! single parent assignment ([`HierarchyMerger`]).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod edtf;
pub mod geometry;
pub mod index;
pub mod merge;
pub mod record;
pub mod temporal;

pub use edtf::{EdtfError, EdtfSpan};
pub use geometry::{Geometry, Point};
pub use index::{IndexCell, Indexed, Pointer, RecordIndex};
pub use merge::{
    derived_point, GeometryUpdate, HierarchyMerger, ParentAssignment, DEFAULT_PASS_THROUGH,
};
pub use record::{Currency, HierarchyEntry, ParentId, Record};
pub use temporal::{
    default_tie_breakers, sort_by_window, window_label, Dated, Exclusion, Resolution,
    TemporalResolver, TieBreaker,
};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum CatalogError {
    #[error("code '{0}' not found")]
    NotFound(String),
    #[error("multiple candidates for code '{0}'")]
    MultipleCandidates(String),
    #[error("malformed record {id}: {reason}")]
    MalformedRecord { id: String, reason: String },
    #[error("record {id} skipped for temporal comparison: {reason}")]
    TemporalParseSkipped { id: i64, reason: String },
    #[error("invalid query date '{0}'")]
    InvalidDate(String),
    #[error("index build failed: {0}")]
    IndexBuildFailure(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("source error: {0}")]
    Source(String),
}

impl CatalogError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[must_use]
    pub fn is_multiple_candidates(&self) -> bool {
        matches!(self, Self::MultipleCandidates(_))
    }
}

/// Cooperative cancellation flag shared between a caller and long record loops.
///
/// Loops check the flag once per record and stop between records, never in
/// the middle of indexing one.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_name_the_code() {
        assert_eq!(CatalogError::NotFound("1845".to_string()).to_string(), "code '1845' not found");
        assert_eq!(
            CatalogError::MultipleCandidates("1845".to_string()).to_string(),
            "multiple candidates for code '1845'"
        );
        assert!(CatalogError::NotFound("x".to_string()).is_not_found());
        assert!(CatalogError::MultipleCandidates("x".to_string()).is_multiple_candidates());
        assert!(!CatalogError::Cancelled.is_not_found());
    }

    #[test]
    fn cancellation_is_shared_between_clones() {
        let token = CancellationToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}

//! Lookup tables for galleries, exhibitions, collection objects and
//! public-art works, built on the `curatorial-core` index and resolver.

use std::sync::Arc;

use curatorial_core::{
    CancellationToken, CatalogError, Dated, IndexCell, RecordIndex, Resolution, TemporalResolver,
};

pub mod compile;
pub mod domain;
pub mod features;
pub mod source;

pub use compile::{compile_dataset, feature_paths, is_alternate, read_feature, Compiled, SkippedFeature};
pub use domain::{CollectionObject, Domain, Exhibition, Gallery, PublicArtWork};
pub use features::{
    apply_assignment, apply_lineage, decode_record, feature_relative_path, is_deprecated, supersede, FeatureStore,
    Supersession,
};
pub use source::{decode_snapshot, LookupSource, SourceUri};

/// Schemes accepted by [`SourceUri`], one per domain.
pub const LOOKUP_SCHEMES: &[&str] = &[
    Gallery::SCHEME,
    Exhibition::SCHEME,
    CollectionObject::SCHEME,
    PublicArtWork::SCHEME,
];

/// Code lookups over one domain. Cheap to clone; clones share the index.
#[derive(Clone)]
pub struct Lookup<D> {
    index: Arc<RecordIndex<D>>,
    resolver: TemporalResolver,
}

impl<D: Domain> Lookup<D> {
    #[must_use]
    pub fn new(index: Arc<RecordIndex<D>>) -> Self {
        Self { index, resolver: TemporalResolver::new() }
    }

    #[must_use]
    pub fn from_records(records: Vec<D>) -> Self {
        Self::new(Arc::new(RecordIndex::build(records)))
    }

    /// # Errors
    /// Returns an error when the source cannot be loaded; see
    /// [`LookupSource::build_index`].
    pub fn open(source: &LookupSource, token: &CancellationToken) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(source.build_index::<D>(token)?)))
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: TemporalResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub fn index(&self) -> &RecordIndex<D> {
        &self.index
    }

    /// Every entry indexed under `code`, in the domain's presentation order.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when `code` is unknown.
    pub fn find(&self, code: &str) -> Result<Vec<Arc<D>>, CatalogError> {
        let mut results = self.index.find(code)?;
        D::sort_results(&mut results);
        Ok(results)
    }

    /// Entries under `code` flagged as current; may be empty.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when `code` is unknown.
    pub fn find_all_current(&self, code: &str) -> Result<Vec<Arc<D>>, CatalogError> {
        Ok(self.find(code)?.into_iter().filter(|entry| entry.current_state().is_current()).collect())
    }

    /// The one current entry under `code`.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when nothing under `code` is
    /// current, or [`CatalogError::MultipleCandidates`] when more than one
    /// is.
    pub fn find_current(&self, code: &str) -> Result<Arc<D>, CatalogError> {
        let mut current = self.find_all_current(code)?;
        match current.len() {
            0 => Err(CatalogError::NotFound(code.to_string())),
            1 => Ok(current.remove(0)),
            _ => Err(CatalogError::MultipleCandidates(code.to_string())),
        }
    }
}

impl<D: Domain + Dated> Lookup<D> {
    /// # Errors
    /// See [`TemporalResolver::resolve_as_of`].
    pub fn resolve_as_of(&self, code: &str, date: &str) -> Result<Resolution<D>, CatalogError> {
        let candidates = self.index.find(code)?;
        self.resolver.resolve_as_of(code, &candidates, date)
    }

    /// Entries under `code` valid on `date`, after tie-breaking.
    ///
    /// # Errors
    /// See [`TemporalResolver::resolve_as_of`].
    pub fn find_all_for_date(&self, code: &str, date: &str) -> Result<Vec<Arc<D>>, CatalogError> {
        Ok(self.resolve_as_of(code, date)?.selected)
    }

    /// The one entry under `code` valid on `date`.
    ///
    /// # Errors
    /// See [`TemporalResolver::resolve_single_as_of`].
    pub fn find_for_date(&self, code: &str, date: &str) -> Result<Arc<D>, CatalogError> {
        self.resolve_as_of(code, date)?.into_single(code)
    }
}

/// Lazily opened, shared lookup for one domain.
///
/// The first call to [`LookupCell::get_or_open`] builds the index; later
/// calls (with any source) reuse it, or get the cached build failure.
pub struct LookupCell<D> {
    cell: IndexCell<D>,
}

impl<D> Default for LookupCell<D> {
    fn default() -> Self {
        Self { cell: IndexCell::new() }
    }
}

impl<D: Domain> LookupCell<D> {
    #[must_use]
    pub const fn new() -> Self {
        Self { cell: IndexCell::new() }
    }

    /// # Errors
    /// Returns [`CatalogError::IndexBuildFailure`] when this or an earlier
    /// build failed.
    pub fn get_or_open(&self, source: &LookupSource, token: &CancellationToken) -> Result<Lookup<D>, CatalogError> {
        let index = self.cell.get_or_build(|| source.build_index::<D>(token))?;
        Ok(Lookup::new(index))
    }
}

use std::fmt::Display;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde::Serialize;

use crate::{CancellationToken, CatalogError, Record};

/// Exposes the strings a record can be looked up by.
pub trait Indexed {
    fn alias_codes(&self) -> Vec<String>;
}

impl Indexed for Record {
    fn alias_codes(&self) -> Vec<String> {
        vec![self.id.to_string()]
    }
}

/// Stable handle for one stored record.
#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Pointer(usize);

impl Pointer {
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Multi-key inverted index: alias code → records, through pointers.
///
/// Records live in an append-only arena; each code maps to a duplicate-free
/// list of pointers in link order. A record is pushed into the arena before
/// any code points at it, so `find` never sees a pointer it cannot resolve.
/// Linking a code only locks the map shard that holds it.
pub struct RecordIndex<R> {
    records: RwLock<Vec<Arc<R>>>,
    codes: DashMap<String, Vec<Pointer>>,
    allocations: DashMap<usize, Pointer>,
}

impl<R> Default for RecordIndex<R> {
    fn default() -> Self {
        Self { records: RwLock::new(Vec::new()), codes: DashMap::new(), allocations: DashMap::new() }
    }
}

impl<R: Indexed> RecordIndex<R> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate an index from a closed batch.
    #[must_use]
    pub fn build<I>(records: I) -> Self
    where
        I: IntoIterator<Item = R>,
    {
        let index = Self::new();
        for record in records {
            index.append(record);
        }
        tracing::debug!(records = index.len(), codes = index.codes.len(), "built record index");
        index
    }

    /// Populate an index, checking `token` before each record.
    ///
    /// # Errors
    /// Returns [`CatalogError::Cancelled`] when the token fires; records
    /// appended before that point were fully linked.
    pub fn build_with_cancel<I>(records: I, token: &CancellationToken) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = R>,
    {
        let index = Self::new();
        for record in records {
            if token.is_cancelled() {
                tracing::info!(records = index.len(), "record index build cancelled");
                return Err(CatalogError::Cancelled);
            }
            index.append(record);
        }
        tracing::debug!(records = index.len(), codes = index.codes.len(), "built record index");
        Ok(index)
    }

    /// Store one record and link it under each of its alias codes.
    pub fn append(&self, record: R) -> Pointer {
        self.append_shared(Arc::new(record))
    }

    /// Like [`RecordIndex::append`], but a record that is already stored
    /// (the same allocation) keeps its pointer and is not linked twice.
    pub fn append_shared(&self, record: Arc<R>) -> Pointer {
        let key = Arc::as_ptr(&record) as usize;
        let pointer = match self.allocations.entry(key) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let pointer = self.store(Arc::clone(&record));
                entry.insert(pointer);
                pointer
            }
        };
        self.link(pointer, record.as_ref());
        pointer
    }

    fn store(&self, record: Arc<R>) -> Pointer {
        let mut records = self.records.write();
        let pointer = Pointer(records.len());
        records.push(record);
        pointer
    }

    fn link(&self, pointer: Pointer, record: &R) {
        for code in record.alias_codes() {
            if code.is_empty() {
                continue;
            }
            let mut pointers = self.codes.entry(code).or_default();
            if !pointers.contains(&pointer) {
                pointers.push(pointer);
            }
        }
    }
}

impl<R> RecordIndex<R> {
    /// All records linked under `code`, in link order.
    ///
    /// # Errors
    /// Returns [`CatalogError::NotFound`] when `code` was never indexed.
    pub fn find(&self, code: &str) -> Result<Vec<Arc<R>>, CatalogError> {
        let pointers = match self.codes.get(code) {
            Some(entry) => entry.value().clone(),
            None => return Err(CatalogError::NotFound(code.to_string())),
        };
        let records = self.records.read();
        Ok(pointers.iter().filter_map(|pointer| records.get(pointer.index()).cloned()).collect())
    }

    #[must_use]
    pub fn get(&self, pointer: Pointer) -> Option<Arc<R>> {
        self.records.read().get(pointer.index()).cloned()
    }

    #[must_use]
    pub fn contains_code(&self, code: &str) -> bool {
        self.codes.contains_key(code)
    }

    /// Indexed codes, sorted.
    #[must_use]
    pub fn codes(&self) -> Vec<String> {
        let mut codes = self.codes.iter().map(|entry| entry.key().clone()).collect::<Vec<_>>();
        codes.sort_unstable();
        codes
    }

    /// Every stored record in pointer order.
    #[must_use]
    pub fn records(&self) -> Vec<Arc<R>> {
        self.records.read().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One-time build guard for a shared index.
///
/// The first caller runs the build; concurrent callers block until it
/// finishes. Success and failure are both cached, so a failed build is
/// reported identically to every later caller and never retried.
pub struct IndexCell<R> {
    cell: OnceCell<Result<Arc<RecordIndex<R>>, CatalogError>>,
}

impl<R> Default for IndexCell<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> IndexCell<R> {
    #[must_use]
    pub const fn new() -> Self {
        Self { cell: OnceCell::new() }
    }

    /// # Errors
    /// Returns [`CatalogError::IndexBuildFailure`] when this or an earlier
    /// build failed.
    pub fn get_or_build<F, E>(&self, build: F) -> Result<Arc<RecordIndex<R>>, CatalogError>
    where
        F: FnOnce() -> Result<RecordIndex<R>, E>,
        E: Display,
    {
        self.cell
            .get_or_init(|| match build() {
                Ok(index) => Ok(Arc::new(index)),
                Err(err) => {
                    let reason = format!("{err:#}");
                    tracing::error!(error = %reason, "record index build failed");
                    Err(CatalogError::IndexBuildFailure(reason))
                }
            })
            .clone()
    }

    #[must_use]
    pub fn get(&self) -> Option<Result<Arc<RecordIndex<R>>, CatalogError>> {
        self.cell.get().cloned()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    use proptest::prelude::*;

    use super::*;

    #[derive(Debug, PartialEq)]
    struct Fixture {
        id: i64,
        codes: Vec<String>,
    }

    impl Indexed for Fixture {
        fn alias_codes(&self) -> Vec<String> {
            let mut codes = vec![self.id.to_string()];
            codes.extend(self.codes.iter().cloned());
            codes
        }
    }

    fn fixture(id: i64, codes: &[&str]) -> Fixture {
        Fixture { id, codes: codes.iter().map(|code| (*code).to_string()).collect() }
    }

    fn found(index: &RecordIndex<Fixture>, code: &str) -> Vec<Arc<Fixture>> {
        match index.find(code) {
            Ok(records) => records,
            Err(err) => panic!("code {code} should resolve: {err}"),
        }
    }

    #[test]
    fn every_alias_code_resolves_to_the_record() {
        let index = RecordIndex::new();
        index.append(fixture(1_745_882_483, &["3", "3E"]));

        for code in ["1745882483", "3", "3E"] {
            let records = found(&index, code);
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].id, 1_745_882_483);
        }
        assert_eq!(index.codes(), vec!["1745882483", "3", "3E"]);
    }

    #[test]
    fn unknown_code_is_not_found() {
        let index = RecordIndex::build([fixture(1, &["a"])]);
        assert_eq!(index.find("b").err(), Some(CatalogError::NotFound("b".to_string())));
    }

    #[test]
    fn shared_codes_keep_insertion_order() {
        let index = RecordIndex::build([
            fixture(10, &["42"]),
            fixture(11, &["42"]),
            fixture(12, &["42"]),
        ]);
        let ids = found(&index, "42").iter().map(|record| record.id).collect::<Vec<_>>();
        assert_eq!(ids, vec![10, 11, 12]);
    }

    #[test]
    fn appending_the_same_stored_record_twice_does_not_duplicate() {
        let index = RecordIndex::new();
        let record = Arc::new(fixture(7, &["gate-7", "G7"]));

        let first = index.append_shared(Arc::clone(&record));
        let again = index.append_shared(Arc::clone(&record));
        let from_find = found(&index, "G7").remove(0);
        let via_find = index.append_shared(from_find);

        assert_eq!(first, again);
        assert_eq!(first, via_find);
        assert_eq!(index.len(), 1);
        for code in ["7", "gate-7", "G7"] {
            assert_eq!(found(&index, code).len(), 1);
        }
    }

    #[test]
    fn empty_codes_are_not_indexed() {
        let index = RecordIndex::build([fixture(5, &[""])]);
        assert!(!index.contains_code(""));
        assert!(index.contains_code("5"));
    }

    #[test]
    fn cancelled_build_stops_between_records() {
        let token = CancellationToken::new();
        token.cancel();
        let result = RecordIndex::build_with_cancel([fixture(1, &[])], &token);
        assert!(matches!(result, Err(CatalogError::Cancelled)));

        let live = CancellationToken::new();
        let index = match RecordIndex::build_with_cancel([fixture(1, &[]), fixture(2, &[])], &live)
        {
            Ok(index) => index,
            Err(err) => panic!("uncancelled build should succeed: {err}"),
        };
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn concurrent_appends_and_finds_observe_complete_records() {
        let index = RecordIndex::new();
        thread::scope(|scope| {
            for worker in 0..4_i64 {
                let index = &index;
                scope.spawn(move || {
                    for offset in 0..250_i64 {
                        index.append(fixture(worker * 1_000 + offset, &["shared"]));
                    }
                });
            }
            scope.spawn(|| {
                for _ in 0..100 {
                    if let Ok(records) = index.find("shared") {
                        let ids = records.iter().map(|record| record.id).collect::<BTreeSet<_>>();
                        assert_eq!(ids.len(), records.len());
                    }
                }
            });
        });

        assert_eq!(index.len(), 1_000);
        assert_eq!(found(&index, "shared").len(), 1_000);
        assert_eq!(found(&index, "3249").len(), 1);
    }

    #[test]
    fn index_cell_builds_once_for_concurrent_callers() {
        let cell: IndexCell<Fixture> = IndexCell::new();
        let builds = AtomicUsize::new(0);

        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let index = cell.get_or_build(|| {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, CatalogError>(RecordIndex::build([fixture(1, &["one"])]))
                    });
                    assert!(index.is_ok());
                });
            }
        });

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(cell.is_initialized());
    }

    #[test]
    fn index_cell_caches_failure() {
        let cell: IndexCell<Fixture> = IndexCell::new();
        let first = cell.get_or_build(|| Err::<RecordIndex<Fixture>, _>("snapshot is not JSON"));
        let second = cell.get_or_build(|| Ok::<_, CatalogError>(RecordIndex::new()));

        let expected = CatalogError::IndexBuildFailure("snapshot is not JSON".to_string());
        assert_eq!(first.err(), Some(expected.clone()));
        assert_eq!(second.err(), Some(expected));
    }

    proptest! {
        #[test]
        fn property_appended_records_are_found_under_exactly_their_codes(
            entries in proptest::collection::vec(
                (0_i64..10_000, proptest::collection::vec("[a-z]{1,3}", 0..4)),
                1..20,
            )
        ) {
            let index = RecordIndex::new();
            let mut expected: std::collections::BTreeMap<String, usize> = std::collections::BTreeMap::new();
            for (position, (id, codes)) in entries.iter().enumerate() {
                let record = Fixture { id: *id + i64::try_from(position).unwrap_or(0) * 10_000, codes: codes.clone() };
                let distinct = record.alias_codes().into_iter().collect::<BTreeSet<_>>();
                for code in distinct {
                    *expected.entry(code).or_default() += 1;
                }
                index.append(record);
            }

            prop_assert_eq!(index.codes(), expected.keys().cloned().collect::<Vec<_>>());
            for (code, count) in &expected {
                let records = index.find(code);
                prop_assert!(records.is_ok());
                let records = records.unwrap_or_default();
                prop_assert_eq!(records.len(), *count);
                for record in &records {
                    prop_assert!(record.alias_codes().contains(code));
                }
            }
        }
    }
}

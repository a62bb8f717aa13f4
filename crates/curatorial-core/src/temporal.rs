use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::edtf::{EdtfError, EdtfSpan};
use crate::record::{Currency, Record};
use crate::CatalogError;

/// Records that carry a validity window and a currency flag.
pub trait Dated {
    fn record_id(&self) -> i64;
    fn inception(&self) -> Option<&str>;
    fn cessation(&self) -> Option<&str>;
    fn currency(&self) -> Currency;
}

impl Dated for Record {
    fn record_id(&self) -> i64 {
        self.id
    }

    fn inception(&self) -> Option<&str> {
        self.inception.as_deref()
    }

    fn cessation(&self) -> Option<&str> {
        self.cessation.as_deref()
    }

    fn currency(&self) -> Currency {
        self.currency
    }
}

/// Narrowing rules applied, in order, when more than one candidate is valid
/// on the query date.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TieBreaker {
    /// Keep candidates flagged as current.
    PreferCurrent,
    /// Keep candidates whose inception is literally the query date.
    PreferStartingOnDate,
}

impl TieBreaker {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreferCurrent => "prefer_current",
            Self::PreferStartingOnDate => "prefer_starting_on_date",
        }
    }

    fn keeps<R: Dated>(self, record: &R, query_date: &str) -> bool {
        match self {
            Self::PreferCurrent => record.currency().is_current(),
            Self::PreferStartingOnDate => record.inception().map(str::trim) == Some(query_date),
        }
    }
}

#[must_use]
pub fn default_tie_breakers() -> Vec<TieBreaker> {
    vec![TieBreaker::PreferCurrent, TieBreaker::PreferStartingOnDate]
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Exclusion {
    pub id: i64,
    pub reason: String,
}

/// Outcome of an as-of query. `selected` is never empty.
#[derive(Debug, Clone)]
pub struct Resolution<R> {
    pub selected: Vec<Arc<R>>,
    pub excluded: Vec<Exclusion>,
    pub ordering_trace: Vec<String>,
}

impl<R> Resolution<R> {
    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.selected.len() > 1
    }

    /// # Errors
    /// Returns [`CatalogError::MultipleCandidates`] when more than one
    /// candidate survived, or [`CatalogError::NotFound`] when none did.
    pub fn into_single(mut self, code: &str) -> Result<Arc<R>, CatalogError> {
        match self.selected.len() {
            0 => Err(CatalogError::NotFound(code.to_string())),
            1 => Ok(self.selected.remove(0)),
            _ => Err(CatalogError::MultipleCandidates(code.to_string())),
        }
    }
}

/// Picks the candidates that were valid on a given day.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TemporalResolver {
    tie_breakers: Vec<TieBreaker>,
}

impl Default for TemporalResolver {
    fn default() -> Self {
        Self { tie_breakers: default_tie_breakers() }
    }
}

enum Window {
    Contains,
    Outside,
    Skipped(CatalogError),
}

impl TemporalResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tie_breakers(tie_breakers: Vec<TieBreaker>) -> Self {
        Self { tie_breakers }
    }

    #[must_use]
    pub fn tie_breakers(&self) -> &[TieBreaker] {
        &self.tie_breakers
    }

    /// Candidates whose `[inception, cessation]` window contains `query_date`,
    /// narrowed by the tie-breakers when more than one qualifies.
    ///
    /// The result may still hold several candidates; callers that need one
    /// answer use [`TemporalResolver::resolve_single_as_of`].
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidDate`] when `query_date` is not a
    /// bounded EDTF date, or [`CatalogError::NotFound`] when no candidate is
    /// valid on that date.
    pub fn resolve_as_of<R: Dated>(
        &self,
        code: &str,
        candidates: &[Arc<R>],
        query_date: &str,
    ) -> Result<Resolution<R>, CatalogError> {
        let query_date = query_date.trim();
        let (query_start, query_end) = match EdtfSpan::parse(query_date) {
            Ok(EdtfSpan { earliest: Some(start), latest: Some(end) }) => (start, end),
            _ => return Err(CatalogError::InvalidDate(query_date.to_string())),
        };

        let mut excluded = Vec::new();
        let mut working = Vec::new();
        for candidate in candidates {
            match window_contains(candidate.as_ref(), query_start, query_end) {
                Window::Contains => working.push(Arc::clone(candidate)),
                Window::Outside => {
                    tracing::debug!(code, id = candidate.record_id(), query_date, "candidate outside validity window");
                    excluded.push(Exclusion {
                        id: candidate.record_id(),
                        reason: format!("not valid on {query_date}"),
                    });
                }
                Window::Skipped(err) => {
                    tracing::debug!(code, error = %err, "candidate skipped for temporal comparison");
                    excluded.push(Exclusion { id: candidate.record_id(), reason: err.to_string() });
                }
            }
        }

        let mut ordering_trace = vec![format!("filter: inception <= {query_date} <= cessation")];
        if working.is_empty() {
            return Err(CatalogError::NotFound(code.to_string()));
        }

        for tie_breaker in &self.tie_breakers {
            if working.len() < 2 {
                break;
            }
            let (kept, dropped): (Vec<_>, Vec<_>) = working
                .iter()
                .cloned()
                .partition(|candidate| tie_breaker.keeps(candidate.as_ref(), query_date));
            if kept.is_empty() {
                ordering_trace.push(format!("tie_breaker: {} kept none, skipped", tie_breaker.as_str()));
                continue;
            }
            ordering_trace.push(format!(
                "tie_breaker: {} kept {} of {}",
                tie_breaker.as_str(),
                kept.len(),
                working.len()
            ));
            excluded.extend(dropped.iter().map(|candidate| Exclusion {
                id: candidate.record_id(),
                reason: format!("dropped by {}", tie_breaker.as_str()),
            }));
            working = kept;
        }

        if working.len() > 1 {
            tracing::debug!(code, query_date, survivors = working.len(), "as-of resolution is ambiguous");
        }

        Ok(Resolution { selected: working, excluded, ordering_trace })
    }

    /// # Errors
    /// As [`TemporalResolver::resolve_as_of`], plus
    /// [`CatalogError::MultipleCandidates`] when the tie-breakers leave more
    /// than one candidate.
    pub fn resolve_single_as_of<R: Dated>(
        &self,
        code: &str,
        candidates: &[Arc<R>],
        query_date: &str,
    ) -> Result<Arc<R>, CatalogError> {
        self.resolve_as_of(code, candidates, query_date)?.into_single(code)
    }
}

fn window_contains<R: Dated>(record: &R, query_start: Date, query_end: Date) -> Window {
    let skipped = |field: &str, err: &EdtfError| {
        Window::Skipped(CatalogError::TemporalParseSkipped {
            id: record.record_id(),
            reason: format!("{field}: {err}"),
        })
    };

    let lower = match record.inception().map_or(Ok(EdtfSpan::OPEN), EdtfSpan::parse) {
        Ok(span) => span.earliest,
        Err(err) => return skipped("edtf:inception", &err),
    };

    // An unknown end date is treated like an open one.
    let upper = match record.cessation().map_or(Ok(EdtfSpan::OPEN), EdtfSpan::parse) {
        Ok(span) => span.latest,
        Err(EdtfError::Unknown(_)) => None,
        Err(err) => return skipped("edtf:cessation", &err),
    };

    let started = lower.map_or(true, |lower| lower <= query_end);
    let not_ended = upper.map_or(true, |upper| query_start <= upper);
    if started && not_ended {
        Window::Contains
    } else {
        Window::Outside
    }
}

/// `"{inception} - {cessation}"`, the key records are listed by.
#[must_use]
pub fn window_label<R: Dated>(record: &R) -> String {
    format!("{} - {}", record.inception().unwrap_or(""), record.cessation().unwrap_or(""))
}

/// Stable re-sort for presentation: by window label, then id.
pub fn sort_by_window<R: Dated>(records: &mut [Arc<R>]) {
    records.sort_by_cached_key(|record| (window_label(record.as_ref()), record.record_id()));
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;

    use super::*;
    use crate::record::ParentId;

    fn gallery(id: i64, inception: &str, cessation: Option<&str>, currency: Currency) -> Arc<Record> {
        Arc::new(Record {
            id,
            name: format!("gallery {id}"),
            parent_id: ParentId::NONE,
            inception: Some(inception.to_string()),
            cessation: cessation.map(str::to_string),
            currency,
            hierarchy: Vec::new(),
            supersedes: Vec::new(),
            superseded_by: Vec::new(),
            geometry: None,
            centroid_hint: None,
            properties: BTreeMap::new(),
        })
    }

    fn ids(resolution: &Resolution<Record>) -> Vec<i64> {
        resolution.selected.iter().map(|record| record.id).collect()
    }

    fn resolve(candidates: &[Arc<Record>], date: &str) -> Resolution<Record> {
        match TemporalResolver::new().resolve_as_of("code", candidates, date) {
            Ok(resolution) => resolution,
            Err(err) => panic!("resolution on {date} should succeed: {err}"),
        }
    }

    #[test]
    fn current_candidate_wins_on_a_shared_boundary_day() {
        let g1 = gallery(1, "2021-11-09", Some("2024-06-17"), Currency::NotCurrent);
        let g2 = gallery(2, "2024-06-17", Some(".."), Currency::Current);

        let resolution = resolve(&[g1, g2], "2024-06-17");
        assert_eq!(ids(&resolution), vec![2]);
        assert_eq!(resolution.excluded, vec![Exclusion { id: 1, reason: "dropped by prefer_current".to_string() }]);
        assert_eq!(resolution.ordering_trace[1], "tie_breaker: prefer_current kept 1 of 2");
    }

    #[test]
    fn candidate_starting_on_the_date_wins_when_none_is_current() {
        let g1 = gallery(1, "2021-05-25", Some("2021-11-09"), Currency::NotCurrent);
        let g3 = gallery(3, "2021-11-09", Some("2024-06-17"), Currency::NotCurrent);

        let resolution = resolve(&[g1, g3], "2021-11-09");
        assert_eq!(ids(&resolution), vec![3]);
        assert_eq!(
            resolution.ordering_trace,
            vec![
                "filter: inception <= 2021-11-09 <= cessation".to_string(),
                "tie_breaker: prefer_current kept none, skipped".to_string(),
                "tie_breaker: prefer_starting_on_date kept 1 of 2".to_string(),
            ]
        );
    }

    #[test]
    fn single_survivor_skips_tie_breakers() {
        let g1 = gallery(1, "2021-05-25", Some("2021-11-09"), Currency::NotCurrent);
        let g2 = gallery(2, "2024-06-17", None, Currency::Current);

        let resolution = resolve(&[g1, g2], "2021-06-01");
        assert_eq!(ids(&resolution), vec![1]);
        assert_eq!(resolution.ordering_trace.len(), 1);
        assert_eq!(resolution.excluded.len(), 1);
    }

    #[test]
    fn no_valid_candidate_is_not_found() {
        let g1 = gallery(1, "2021-05-25", Some("2021-11-09"), Currency::NotCurrent);
        let result = TemporalResolver::new().resolve_as_of("3", &[g1], "2020-01-01");
        assert_eq!(result.err(), Some(CatalogError::NotFound("3".to_string())));
    }

    #[test]
    fn unbounded_query_dates_are_invalid() {
        let g1 = gallery(1, "2021-05-25", None, Currency::Current);
        for date in ["..", "", "uuuu", "not a date"] {
            let result = TemporalResolver::new().resolve_as_of("3", std::slice::from_ref(&g1), date);
            assert!(matches!(result, Err(CatalogError::InvalidDate(_))), "{date:?} should be rejected");
        }
    }

    #[test]
    fn unparseable_inception_is_skipped_with_a_diagnostic() {
        let broken = gallery(1, "sometime", None, Currency::Current);
        let fine = gallery(2, "2020-01-01", None, Currency::NotCurrent);

        let resolution = resolve(&[broken, fine], "2022-03-04");
        assert_eq!(ids(&resolution), vec![2]);
        assert_eq!(resolution.excluded.len(), 1);
        assert_eq!(resolution.excluded[0].id, 1);
        assert!(resolution.excluded[0].reason.contains("edtf:inception"));
    }

    #[test]
    fn unknown_cessation_is_treated_as_open() {
        let g1 = gallery(1, "2019-01-01", Some("uuuu"), Currency::Unknown);
        assert_eq!(ids(&resolve(&[g1], "2030-06-01")), vec![1]);
    }

    #[test]
    fn partial_precision_windows_overlap_the_query_day() {
        let g1 = gallery(1, "2021", Some("2021-06"), Currency::NotCurrent);
        assert_eq!(ids(&resolve(std::slice::from_ref(&g1), "2021-06-30")), vec![1]);
        assert!(TemporalResolver::new().resolve_as_of("c", &[g1], "2021-07-01").is_err());
    }

    #[test]
    fn ambiguity_is_reported_not_guessed() {
        let g1 = gallery(1, "2020-01-01", None, Currency::Current);
        let g2 = gallery(2, "2020-01-01", None, Currency::Current);
        let candidates = [g1, g2];

        let resolution = resolve(&candidates, "2022-01-01");
        assert!(resolution.is_ambiguous());
        assert_eq!(ids(&resolution), vec![1, 2]);

        let single = TemporalResolver::new().resolve_single_as_of("42", &candidates, "2022-01-01");
        assert_eq!(single.err(), Some(CatalogError::MultipleCandidates("42".to_string())));
    }

    #[test]
    fn tie_breakers_can_be_overridden() {
        let g1 = gallery(1, "2021-11-09", Some("2024-06-17"), Currency::NotCurrent);
        let g2 = gallery(2, "2024-06-17", None, Currency::Current);

        let resolver = TemporalResolver::with_tie_breakers(vec![TieBreaker::PreferStartingOnDate]);
        let resolution = match resolver.resolve_as_of("42", &[g1.clone(), g2.clone()], "2024-06-17") {
            Ok(resolution) => resolution,
            Err(err) => panic!("resolution should succeed: {err}"),
        };
        assert_eq!(ids(&resolution), vec![2]);

        let none = TemporalResolver::with_tie_breakers(Vec::new());
        let resolution = match none.resolve_as_of("42", &[g1, g2], "2024-06-17") {
            Ok(resolution) => resolution,
            Err(err) => panic!("resolution should succeed: {err}"),
        };
        assert_eq!(ids(&resolution), vec![1, 2]);
    }

    #[test]
    fn sort_by_window_orders_by_label() {
        let mut records = vec![
            gallery(3, "2024-06-17", None, Currency::Current),
            gallery(1, "2021-05-25", Some("2021-11-09"), Currency::NotCurrent),
            gallery(2, "2021-11-09", Some("2024-06-17"), Currency::NotCurrent),
        ];
        sort_by_window(&mut records);
        assert_eq!(records.iter().map(|record| record.id).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert_eq!(window_label(records[0].as_ref()), "2021-05-25 - 2021-11-09");
    }

    fn candidate_strategy() -> impl Strategy<Value = Vec<(i64, u8, u8, bool)>> {
        proptest::collection::vec((1_i64..1_000, 0_u8..12, 0_u8..12, any::<bool>()), 1..12)
    }

    proptest! {
        #[test]
        fn property_selection_is_independent_of_candidate_order(raw in candidate_strategy(), rotate in 0_usize..12) {
            let candidates = raw
                .iter()
                .enumerate()
                .map(|(position, (id, start, length, current))| {
                    let start_month = start + 1;
                    let end_month = (start + length).min(11) + 1;
                    gallery(
                        id * 100 + i64::try_from(position).unwrap_or(0),
                        &format!("2020-{start_month:02}-01"),
                        Some(&format!("2020-{end_month:02}-28")),
                        if *current { Currency::Current } else { Currency::NotCurrent },
                    )
                })
                .collect::<Vec<_>>();
            let mut rotated = candidates.clone();
            let len = rotated.len();
            rotated.rotate_left(rotate % len);

            let resolver = TemporalResolver::new();
            let lhs = resolver.resolve_as_of("code", &candidates, "2020-06-15");
            let rhs = resolver.resolve_as_of("code", &rotated, "2020-06-15");
            match (lhs, rhs) {
                (Ok(lhs), Ok(rhs)) => {
                    let mut lhs_ids = lhs.selected.iter().map(|record| record.id).collect::<Vec<_>>();
                    let mut rhs_ids = rhs.selected.iter().map(|record| record.id).collect::<Vec<_>>();
                    lhs_ids.sort_unstable();
                    rhs_ids.sort_unstable();
                    prop_assert_eq!(lhs_ids, rhs_ids);
                }
                (Err(lhs), Err(rhs)) => prop_assert_eq!(lhs, rhs),
                (lhs, rhs) => prop_assert!(false, "order changed the outcome: {lhs:?} vs {rhs:?}"),
            }
        }
    }
}

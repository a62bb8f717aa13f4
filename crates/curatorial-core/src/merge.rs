use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::Value;

use crate::geometry::{Geometry, Point};
use crate::record::{HierarchyEntry, ParentId, Record};
use crate::CatalogError;

/// Properties copied from a sole parent onto the child by default.
pub const DEFAULT_PASS_THROUGH: &[&str] = &["sfomuseum:post_security"];

/// What to do with the child's geometry.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "action", content = "geometry", rename_all = "snake_case")]
pub enum GeometryUpdate {
    Clear,
    Replace(Geometry),
    /// One representative point per parent, in candidate order.
    MultiPoint(Vec<Point>),
}

impl GeometryUpdate {
    #[must_use]
    pub fn into_geometry(self) -> Option<Geometry> {
        match self {
            Self::Clear => None,
            Self::Replace(geometry) => Some(geometry),
            Self::MultiPoint(points) => Some(Geometry::MultiPoint(points)),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ParentAssignment {
    pub parent_id: ParentId,
    pub hierarchy: Vec<HierarchyEntry>,
    pub geometry: GeometryUpdate,
    pub properties: BTreeMap<String, Value>,
}

impl ParentAssignment {
    /// No parent: `-1`, empty hierarchy, geometry cleared.
    #[must_use]
    pub fn orphan() -> Self {
        Self {
            parent_id: ParentId::NONE,
            hierarchy: Vec::new(),
            geometry: GeometryUpdate::Clear,
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_ambiguous(&self) -> bool {
        self.parent_id == ParentId::MULTIPLE
    }
}

/// Folds the ancestors chosen for a record into one [`ParentAssignment`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct HierarchyMerger {
    pass_through: Vec<String>,
}

impl Default for HierarchyMerger {
    fn default() -> Self {
        Self::with_pass_through(DEFAULT_PASS_THROUGH.iter().map(|key| (*key).to_string()).collect())
    }
}

impl HierarchyMerger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pass_through(pass_through: Vec<String>) -> Self {
        Self { pass_through }
    }

    #[must_use]
    pub fn pass_through(&self) -> &[String] {
        &self.pass_through
    }

    /// Merge zero or more ancestor candidates.
    ///
    /// * none: parent `-1`, empty hierarchy, geometry cleared;
    /// * one: parent is its id, its hierarchy verbatim, its geometry (or its
    ///   derived point), plus the pass-through properties it carries;
    /// * several: parent `-4`, the union of their hierarchies without
    ///   repeats (first-seen order), and a multipoint of derived points.
    ///
    /// A candidate listed more than once counts once.
    ///
    /// # Errors
    /// Returns [`CatalogError::MalformedRecord`] when several candidates are
    /// merged and one of them has no derivable point.
    pub fn merge<'a, I>(&self, candidates: I) -> Result<ParentAssignment, CatalogError>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        let mut seen_ids = BTreeSet::new();
        let unique = candidates
            .into_iter()
            .filter(|candidate| seen_ids.insert(candidate.id))
            .collect::<Vec<_>>();

        let assignment = match unique.as_slice() {
            [] => ParentAssignment::orphan(),
            [parent] => self.single(parent),
            parents => multiple(parents)?,
        };
        tracing::debug!(
            candidates = unique.len(),
            parent_id = assignment.parent_id.0,
            hierarchy = assignment.hierarchy.len(),
            "merged parent candidates"
        );
        Ok(assignment)
    }

    fn single(&self, parent: &Record) -> ParentAssignment {
        let geometry = match (&parent.geometry, derived_point(parent)) {
            (Some(geometry), _) => GeometryUpdate::Replace(geometry.clone()),
            (None, Some(point)) => GeometryUpdate::Replace(Geometry::Point(point)),
            (None, None) => GeometryUpdate::Clear,
        };

        let properties = self
            .pass_through
            .iter()
            .filter_map(|key| parent.property(key).map(|value| (key.clone(), value.clone())))
            .collect();

        ParentAssignment {
            parent_id: ParentId(parent.id),
            hierarchy: parent.hierarchy.clone(),
            geometry,
            properties,
        }
    }
}

fn multiple(parents: &[&Record]) -> Result<ParentAssignment, CatalogError> {
    let mut seen = BTreeSet::new();
    let hierarchy = parents
        .iter()
        .flat_map(|parent| parent.hierarchy.iter())
        .filter(|entry| seen.insert(*entry))
        .cloned()
        .collect();

    let points = parents
        .iter()
        .map(|parent| {
            derived_point(parent).ok_or_else(|| CatalogError::MalformedRecord {
                id: parent.id.to_string(),
                reason: "no derivable point".to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ParentAssignment {
        parent_id: ParentId::MULTIPLE,
        hierarchy,
        geometry: GeometryUpdate::MultiPoint(points),
        properties: BTreeMap::new(),
    })
}

/// Representative point for a record: its label hint, its geometry hint,
/// then the centroid of its geometry.
#[must_use]
pub fn derived_point(record: &Record) -> Option<Point> {
    record.centroid_hint.or_else(|| record.geometry.as_ref().and_then(Geometry::centroid))
}

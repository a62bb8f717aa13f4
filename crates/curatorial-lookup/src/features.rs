use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use curatorial_core::record::{int_property, str_property};
use curatorial_core::{CatalogError, GeometryUpdate, HierarchyMerger, ParentAssignment, Record};
use dashmap::DashMap;
use serde_json::{Map, Value};

use crate::compile::{feature_paths, read_feature};

/// Decode the full [`Record`] behind a GeoJSON feature.
///
/// # Errors
/// Returns [`CatalogError::MalformedRecord`] when required properties are
/// missing or a point or polygon geometry cannot be read.
pub fn decode_record(feature: &Value) -> Result<Record, CatalogError> {
    Record::from_feature(feature)
}

/// Write parent id, hierarchy, geometry and pass-through properties from
/// `assignment` onto `feature`. Returns whether anything changed.
pub fn apply_assignment(feature: &mut Value, assignment: &ParentAssignment) -> bool {
    let mut changed = apply_lineage(feature, assignment);

    if let Some(properties) = properties_mut(feature) {
        for (key, value) in &assignment.properties {
            changed |= set_if_changed(properties, key, value.clone());
        }
    }

    let geometry = match &assignment.geometry {
        GeometryUpdate::Clear => Value::Null,
        update => match serde_json::to_value(update.clone().into_geometry()) {
            Ok(value) => value,
            Err(err) => {
                tracing::error!(error = %err, "failed to encode geometry, leaving it untouched");
                return changed;
            }
        },
    };
    if let Some(object) = feature.as_object_mut() {
        changed |= set_if_changed(object, "geometry", geometry);
    }
    changed
}

/// Write only `wof:parent_id` and `wof:hierarchy`. Returns whether anything
/// changed.
pub fn apply_lineage(feature: &mut Value, assignment: &ParentAssignment) -> bool {
    let Some(properties) = properties_mut(feature) else {
        return false;
    };
    let hierarchy = match serde_json::to_value(&assignment.hierarchy) {
        Ok(hierarchy) => hierarchy,
        Err(err) => {
            tracing::error!(error = %err, "failed to encode hierarchy");
            return false;
        }
    };

    let mut changed = set_if_changed(properties, "wof:parent_id", Value::from(assignment.parent_id.0));
    changed |= set_if_changed(properties, "wof:hierarchy", hierarchy);
    changed
}

/// Whether the feature carries a non-empty `edtf:deprecated` date.
#[must_use]
pub fn is_deprecated(feature: &Value) -> bool {
    feature
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|properties| str_property(properties, "edtf:deprecated"))
        .is_some_and(|deprecated| !deprecated.trim().is_empty())
}

/// A predecessor closed at its successor's start, and that successor.
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
    pub predecessor: Value,
    pub successor: Value,
}

/// Split `predecessor` into a closed version and a successor under `parent`.
///
/// The successor copies the predecessor, takes id `successor_id`, the
/// parent's lineage, currency and inception, and lists the predecessor in
/// `wof:supersedes`. The predecessor gets `wof:superseded_by` and an
/// `edtf:cessation` equal to the parent's inception. Geometry is untouched.
///
/// # Errors
/// Returns [`CatalogError::MalformedRecord`] when the predecessor cannot be
/// decoded, the parent has no inception, or `successor_id` is the
/// predecessor's own id.
pub fn supersede(
    predecessor: &Value,
    parent: &Record,
    successor_id: i64,
    merger: &HierarchyMerger,
) -> Result<Supersession, CatalogError> {
    let previous = decode_record(predecessor)?;
    if successor_id == previous.id {
        return Err(CatalogError::MalformedRecord {
            id: previous.id.to_string(),
            reason: "a record cannot supersede itself".to_string(),
        });
    }
    let inception = parent.inception.clone().ok_or_else(|| CatalogError::MalformedRecord {
        id: parent.id.to_string(),
        reason: "parent has no edtf:inception".to_string(),
    })?;
    let assignment = merger.merge([parent])?;

    let mut successor = predecessor.clone();
    apply_lineage(&mut successor, &assignment);
    if let Some(properties) = properties_mut(&mut successor) {
        properties.insert("wof:id".to_string(), Value::from(successor_id));
        properties.insert("mz:is_current".to_string(), Value::from(parent.currency.flag()));
        properties.insert("edtf:inception".to_string(), Value::from(inception.clone()));
        properties.insert("wof:supersedes".to_string(), Value::from(vec![previous.id]));
        properties.insert("wof:superseded_by".to_string(), Value::Array(Vec::new()));
    }

    let mut closed = predecessor.clone();
    if let Some(properties) = properties_mut(&mut closed) {
        properties.insert("wof:superseded_by".to_string(), Value::from(vec![successor_id]));
        properties.insert("edtf:cessation".to_string(), Value::from(inception));
    }

    tracing::debug!(predecessor = previous.id, successor = successor_id, parent = parent.id, "superseded record");
    Ok(Supersession { predecessor: closed, successor })
}

/// Relative path of a feature in a `data/` tree: `1914601189` becomes
/// `data/191/460/118/9/1914601189.geojson`.
#[must_use]
pub fn feature_relative_path(id: i64) -> PathBuf {
    let digits = id.to_string();
    let mut path = PathBuf::from("data");
    let mut start = 0;
    while start < digits.len() {
        let end = (start + 3).min(digits.len());
        path.push(&digits[start..end]);
        start = end;
    }
    path.push(format!("{digits}.geojson"));
    path
}

fn properties_mut(feature: &mut Value) -> Option<&mut Map<String, Value>> {
    let object = feature.as_object_mut()?;
    object
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
}

fn set_if_changed(object: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    if object.get(key) == Some(&value) {
        return false;
    }
    object.insert(key.to_string(), value);
    true
}

/// A directory of features addressed by `wof:id`.
///
/// Paths are discovered once when the store is opened; feature bodies are
/// read on first use and cached.
pub struct FeatureStore {
    root: PathBuf,
    paths: DashMap<i64, PathBuf>,
    cache: DashMap<i64, Value>,
}

impl FeatureStore {
    /// # Errors
    /// Returns an error when `root` cannot be walked or a feature file
    /// cannot be read.
    pub fn open(root: &Path) -> Result<Self> {
        let paths = DashMap::new();
        for path in feature_paths(root)? {
            let feature = read_feature(&path)?;
            let id = feature
                .get("properties")
                .and_then(Value::as_object)
                .and_then(|properties| int_property(properties, "wof:id"));
            match id {
                Some(id) => {
                    paths.insert(id, path);
                }
                None => tracing::warn!(path = %path.display(), "feature has no wof:id, ignoring"),
            }
        }
        tracing::debug!(root = %root.display(), features = paths.len(), "opened feature store");
        Ok(Self { root: root.to_path_buf(), paths, cache: DashMap::new() })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Ids in ascending order.
    #[must_use]
    pub fn ids(&self) -> Vec<i64> {
        let mut ids = self.paths.iter().map(|entry| *entry.key()).collect::<Vec<_>>();
        ids.sort_unstable();
        ids
    }

    #[must_use]
    pub fn path_of(&self, id: i64) -> Option<PathBuf> {
        self.paths.get(&id).map(|entry| entry.value().clone())
    }

    /// # Errors
    /// Returns an error when no feature has `id` or its file cannot be read.
    pub fn load(&self, id: i64) -> Result<Value> {
        if let Some(cached) = self.cache.get(&id) {
            return Ok(cached.value().clone());
        }
        let path = self.path_of(id).ok_or_else(|| anyhow!("no feature with id {id} under {}", self.root.display()))?;
        let feature = read_feature(&path)?;
        self.cache.insert(id, feature.clone());
        Ok(feature)
    }

    /// Add a feature whose `wof:id` is new to this store, under
    /// [`feature_relative_path`].
    ///
    /// # Errors
    /// Returns an error when the feature has no `wof:id`, the id is already
    /// present, or the file cannot be written.
    pub fn create(&self, feature: &Value) -> Result<PathBuf> {
        let id = feature_id(feature)?;
        if self.paths.contains_key(&id) {
            return Err(anyhow!("feature {id} already exists under {}", self.root.display()));
        }
        let path = self.root.join(feature_relative_path(id));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
        }
        self.paths.insert(id, path);
        self.write(feature).inspect_err(|_| {
            self.paths.remove(&id);
        })
    }

    /// Write `feature` back to the file it was loaded from.
    ///
    /// # Errors
    /// Returns an error when the feature has no `wof:id` known to this store
    /// or the file cannot be written.
    pub fn write(&self, feature: &Value) -> Result<PathBuf> {
        let id = feature_id(feature)?;
        let path = self.path_of(id).ok_or_else(|| anyhow!("no feature with id {id} under {}", self.root.display()))?;

        let mut body = serde_json::to_string_pretty(feature).context("failed to encode feature")?;
        body.push('\n');
        fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
        self.cache.insert(id, feature.clone());
        tracing::info!(id, path = %path.display(), "wrote feature");
        Ok(path)
    }
}

fn feature_id(feature: &Value) -> Result<i64> {
    feature
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|properties| int_property(properties, "wof:id"))
        .ok_or_else(|| anyhow!("feature has no wof:id"))
}

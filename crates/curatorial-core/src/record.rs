use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geometry::{Geometry, Point};
use crate::CatalogError;

/// Tri-state `mz:is_current` flag.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(try_from = "i64", into = "i64")]
pub enum Currency {
    Current,
    NotCurrent,
    #[default]
    Unknown,
}

impl Currency {
    #[must_use]
    pub fn flag(self) -> i64 {
        match self {
            Self::Current => 1,
            Self::NotCurrent => 0,
            Self::Unknown => -1,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::NotCurrent => "not_current",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn is_current(self) -> bool {
        self == Self::Current
    }
}

impl From<Currency> for i64 {
    fn from(value: Currency) -> Self {
        value.flag()
    }
}

impl TryFrom<i64> for Currency {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Current),
            0 => Ok(Self::NotCurrent),
            -1 => Ok(Self::Unknown),
            other => Err(format!("mz:is_current MUST be one of -1, 0, 1 (got {other})")),
        }
    }
}

/// Parent id with the two reserved sentinels used by the catalog.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct ParentId(pub i64);

impl ParentId {
    pub const NONE: Self = Self(-1);
    pub const MULTIPLE: Self = Self(-4);

    #[must_use]
    pub fn is_sentinel(self) -> bool {
        self == Self::NONE || self == Self::MULTIPLE
    }
}

impl Default for ParentId {
    fn default() -> Self {
        Self::NONE
    }
}

impl Display for ParentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ancestor-role → id mapping from `wof:hierarchy`.
///
/// Equality is structural: two entries are the same only when every role and
/// id matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct HierarchyEntry(pub BTreeMap<String, i64>);

impl HierarchyEntry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, role: &str, id: i64) -> Self {
        self.0.insert(role.to_string(), id);
        self
    }

    #[must_use]
    pub fn get(&self, role: &str) -> Option<i64> {
        self.0.get(role).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(role, id)| (role.as_str(), *id))
    }
}

/// A fully decoded catalog feature.
///
/// Everything not modelled explicitly stays in `properties` so it can be
/// passed through to children untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub id: i64,
    pub name: String,
    pub parent_id: ParentId,
    pub inception: Option<String>,
    pub cessation: Option<String>,
    pub currency: Currency,
    pub hierarchy: Vec<HierarchyEntry>,
    pub supersedes: Vec<i64>,
    pub superseded_by: Vec<i64>,
    pub geometry: Option<Geometry>,
    pub centroid_hint: Option<Point>,
    pub properties: BTreeMap<String, Value>,
}

const MODELLED_PROPERTIES: &[&str] = &[
    "wof:id",
    "wof:name",
    "wof:parent_id",
    "edtf:inception",
    "edtf:cessation",
    "mz:is_current",
    "wof:hierarchy",
    "wof:supersedes",
    "wof:superseded_by",
];

impl Record {
    /// Decode a GeoJSON feature (`{"properties": {...}, "geometry": {...}}`).
    ///
    /// Geometry types other than points and polygons are dropped.
    ///
    /// # Errors
    /// Returns [`CatalogError::MalformedRecord`] when the feature has no
    /// properties object, a required property is missing or mistyped, or a
    /// point or polygon geometry has unreadable coordinates.
    pub fn from_feature(feature: &Value) -> Result<Self, CatalogError> {
        let Some(properties) = feature.get("properties").and_then(Value::as_object) else {
            return Err(CatalogError::MalformedRecord {
                id: "<unknown>".to_string(),
                reason: "feature is missing a properties object".to_string(),
            });
        };

        let mut record = Self::from_properties(properties)?;
        record.geometry = match feature.get("geometry") {
            None | Some(Value::Null) => None,
            Some(value) => match value.get("type").and_then(Value::as_str) {
                Some(kind) if Geometry::is_supported_type(kind) => {
                    Some(serde_json::from_value(value.clone()).map_err(|err| {
                        malformed(&record.id.to_string(), &format!("invalid {kind} geometry: {err}"))
                    })?)
                }
                kind => {
                    // Centroid hints, if any, still give the record a point.
                    tracing::debug!(id = record.id, kind = kind.unwrap_or("<none>"), "ignoring unsupported geometry");
                    None
                }
            },
        };
        Ok(record)
    }

    /// Decode a bare property bag.
    ///
    /// # Errors
    /// Returns [`CatalogError::MalformedRecord`] when `wof:id` or `wof:name`
    /// is missing, or when a modelled property has the wrong shape.
    pub fn from_properties(properties: &Map<String, Value>) -> Result<Self, CatalogError> {
        let id = require_int(properties, "wof:id", "<unknown>")?;
        let label = id.to_string();
        let name = require_str(properties, "wof:name", &label)?;

        let currency = match properties.get("mz:is_current") {
            None | Some(Value::Null) => Currency::Unknown,
            Some(value) => {
                let flag = value_as_i64(value).ok_or_else(|| malformed(&label, "mz:is_current MUST be an integer"))?;
                Currency::try_from(flag).map_err(|reason| malformed(&label, &reason))?
            }
        };

        let hierarchy = match properties.get("wof:hierarchy") {
            None | Some(Value::Null) => Vec::new(),
            Some(value) => serde_json::from_value::<Vec<HierarchyEntry>>(value.clone())
                .map_err(|err| malformed(&label, &format!("wof:hierarchy is invalid: {err}")))?,
        };

        let extras = properties
            .iter()
            .filter(|(key, _)| !MODELLED_PROPERTIES.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            id,
            name,
            parent_id: int_property(properties, "wof:parent_id").map_or(ParentId::NONE, ParentId),
            inception: str_property(properties, "edtf:inception"),
            cessation: str_property(properties, "edtf:cessation"),
            currency,
            hierarchy,
            supersedes: int_list_property(properties, "wof:supersedes"),
            superseded_by: int_list_property(properties, "wof:superseded_by"),
            geometry: None,
            centroid_hint: centroid_hint(properties, "lbl")
                .or_else(|| centroid_hint(properties, "geom")),
            properties: extras,
        })
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}-{} ({})",
            self.id,
            self.name,
            self.inception.as_deref().unwrap_or(""),
            self.cessation.as_deref().unwrap_or(""),
            self.currency.flag()
        )
    }
}

fn malformed(id: &str, reason: &str) -> CatalogError {
    CatalogError::MalformedRecord { id: id.to_string(), reason: reason.to_string() }
}

fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Read an integer property, accepting numeric strings.
#[must_use]
pub fn int_property(properties: &Map<String, Value>, key: &str) -> Option<i64> {
    properties.get(key).and_then(value_as_i64)
}

/// Read a non-empty string property; numbers are rendered as strings.
#[must_use]
pub fn str_property(properties: &Map<String, Value>, key: &str) -> Option<String> {
    let text = match properties.get(key)? {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Read an integer list; a scalar is treated as a one-element list.
#[must_use]
pub fn int_list_property(properties: &Map<String, Value>, key: &str) -> Vec<i64> {
    match properties.get(key) {
        Some(Value::Array(values)) => values.iter().filter_map(value_as_i64).collect(),
        Some(value) => value_as_i64(value).into_iter().collect(),
        None => Vec::new(),
    }
}

/// # Errors
/// Returns [`CatalogError::MalformedRecord`] naming `key` when it is absent.
pub fn require_int(
    properties: &Map<String, Value>,
    key: &str,
    id: &str,
) -> Result<i64, CatalogError> {
    int_property(properties, key).ok_or_else(|| malformed(id, &format!("missing {key} property")))
}

/// # Errors
/// Returns [`CatalogError::MalformedRecord`] naming `key` when it is absent.
pub fn require_str(
    properties: &Map<String, Value>,
    key: &str,
    id: &str,
) -> Result<String, CatalogError> {
    str_property(properties, key).ok_or_else(|| malformed(id, &format!("missing {key} property")))
}

fn centroid_hint(properties: &Map<String, Value>, prefix: &str) -> Option<Point> {
    let latitude = properties.get(&format!("{prefix}:latitude"))?.as_f64()?;
    let longitude = properties.get(&format!("{prefix}:longitude"))?.as_f64()?;
    Some(Point::new(longitude, latitude))
}

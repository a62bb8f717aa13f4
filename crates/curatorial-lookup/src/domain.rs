use std::fmt::{Display, Formatter};
use std::sync::Arc;

use curatorial_core::record::{int_property, require_int, str_property};
use curatorial_core::{sort_by_window, CatalogError, Currency, Dated, Indexed, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One kind of catalog entry served by a [`crate::Lookup`].
///
/// A domain knows its selector scheme, where its compiled snapshot lives and
/// how to pull itself out of a GeoJSON feature. Only domains that also
/// implement [`Dated`] can be resolved as of a date.
pub trait Domain: Indexed + Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const SCHEME: &'static str;
    const SNAPSHOT_FILE: &'static str;
    const REMOTE_URL: &'static str;

    fn embedded_snapshot() -> &'static str;

    fn primary_id(&self) -> i64;

    fn current_state(&self) -> Currency;

    /// # Errors
    /// Returns [`CatalogError::MalformedRecord`] when a required property is
    /// missing.
    fn from_feature(feature: &Value) -> Result<Self, CatalogError>;

    /// Presentation order for [`crate::Lookup::find`]; index order by default.
    fn sort_results(_results: &mut [Arc<Self>]) {}
}

pub(crate) fn feature_properties(feature: &Value) -> Result<&Map<String, Value>, CatalogError> {
    feature.get("properties").and_then(Value::as_object).ok_or_else(|| {
        CatalogError::MalformedRecord {
            id: "<unknown>".to_string(),
            reason: "feature is missing a properties object".to_string(),
        }
    })
}

/// Decode the shared fields and hand back the property bag for the rest.
fn decode_common(feature: &Value) -> Result<(Record, &Map<String, Value>), CatalogError> {
    let properties = feature_properties(feature)?;
    Ok((Record::from_properties(properties)?, properties))
}

/// A passenger gallery; alias codes are its WOF id, SFO Museum id and map label.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Gallery {
    #[serde(rename = "wof:id")]
    pub wof_id: i64,
    #[serde(rename = "sfomuseum:id")]
    pub sfomuseum_id: i64,
    #[serde(rename = "map_id", default, skip_serializing_if = "String::is_empty")]
    pub map_id: String,
    #[serde(rename = "wof:name")]
    pub name: String,
    #[serde(rename = "edtf:inception", default)]
    pub inception: String,
    #[serde(rename = "edtf:cessation", default)]
    pub cessation: String,
    #[serde(rename = "mz:is_current", default)]
    pub currency: Currency,
}

impl Display for Gallery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}#{} {} {}-{} ({})",
            self.wof_id,
            self.sfomuseum_id,
            self.name,
            self.inception,
            self.cessation,
            self.currency.flag()
        )
    }
}

impl Indexed for Gallery {
    fn alias_codes(&self) -> Vec<String> {
        vec![self.wof_id.to_string(), self.sfomuseum_id.to_string(), self.map_id.clone()]
    }
}

impl Dated for Gallery {
    fn record_id(&self) -> i64 {
        self.wof_id
    }

    fn inception(&self) -> Option<&str> {
        non_empty(&self.inception)
    }

    fn cessation(&self) -> Option<&str> {
        non_empty(&self.cessation)
    }

    fn currency(&self) -> Currency {
        self.currency
    }
}

impl Domain for Gallery {
    const SCHEME: &'static str = "galleries";
    const SNAPSHOT_FILE: &'static str = "galleries.json";
    const REMOTE_URL: &'static str =
        "https://raw.githubusercontent.com/sfomuseum/go-sfomuseum-architecture/main/data/galleries.json";

    fn embedded_snapshot() -> &'static str {
        include_str!("../data/galleries.json")
    }

    fn primary_id(&self) -> i64 {
        self.wof_id
    }

    fn current_state(&self) -> Currency {
        self.currency
    }

    fn from_feature(feature: &Value) -> Result<Self, CatalogError> {
        let (record, properties) = decode_common(feature)?;
        Ok(Self {
            wof_id: record.id,
            sfomuseum_id: require_int(properties, "sfomuseum:gallery_id", &record.id.to_string())?,
            map_id: str_property(properties, "sfomuseum:map_id").unwrap_or_default(),
            name: record.name,
            inception: record.inception.unwrap_or_default(),
            cessation: record.cessation.unwrap_or_default(),
            currency: record.currency,
        })
    }

    fn sort_results(results: &mut [Arc<Self>]) {
        sort_by_window(results);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Exhibition {
    #[serde(rename = "wof:id")]
    pub wof_id: i64,
    #[serde(rename = "wof:name")]
    pub name: String,
    #[serde(rename = "sfomuseum:exhibition_id")]
    pub exhibition_id: i64,
    #[serde(rename = "sfomuseum_www:exhibition_id", default, skip_serializing_if = "Option::is_none")]
    pub www_exhibition_id: Option<i64>,
    #[serde(rename = "mz:is_current", default)]
    pub currency: Currency,
}

impl Display for Exhibition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} FM: {}", self.wof_id, self.name, self.exhibition_id)?;
        if let Some(www) = self.www_exhibition_id {
            write!(f, " WWW: {www}")?;
        }
        Ok(())
    }
}

impl Indexed for Exhibition {
    fn alias_codes(&self) -> Vec<String> {
        vec![self.wof_id.to_string(), self.exhibition_id.to_string()]
    }
}

impl Domain for Exhibition {
    const SCHEME: &'static str = "exhibitions";
    const SNAPSHOT_FILE: &'static str = "exhibitions.json";
    const REMOTE_URL: &'static str =
        "https://raw.githubusercontent.com/sfomuseum/go-sfomuseum-curatorial/main/data/exhibitions.json";

    fn embedded_snapshot() -> &'static str {
        include_str!("../data/exhibitions.json")
    }

    fn primary_id(&self) -> i64 {
        self.wof_id
    }

    fn current_state(&self) -> Currency {
        self.currency
    }

    fn from_feature(feature: &Value) -> Result<Self, CatalogError> {
        let (record, properties) = decode_common(feature)?;
        Ok(Self {
            wof_id: record.id,
            exhibition_id: require_int(
                properties,
                "sfomuseum:exhibition_id",
                &record.id.to_string(),
            )?,
            www_exhibition_id: int_property(properties, "sfomuseum_www:exhibition_id"),
            name: record.name,
            currency: record.currency,
        })
    }
}

/// An object in the permanent collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionObject {
    #[serde(rename = "wof:id")]
    pub wof_id: i64,
    #[serde(rename = "wof:name")]
    pub name: String,
    #[serde(rename = "sfomuseum:object_id")]
    pub object_id: i64,
    #[serde(rename = "sfomuseum:accession_number", default)]
    pub accession_number: String,
    #[serde(rename = "sfomuseum:callnumber", default, skip_serializing_if = "String::is_empty")]
    pub callnumber: String,
    #[serde(rename = "mz:is_current", default)]
    pub currency: Currency,
}

impl Display for CollectionObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\" {} {} ({})", self.name, self.accession_number, self.wof_id, self.object_id)
    }
}

impl Indexed for CollectionObject {
    fn alias_codes(&self) -> Vec<String> {
        vec![
            self.wof_id.to_string(),
            self.object_id.to_string(),
            self.accession_number.clone(),
            self.callnumber.clone(),
        ]
    }
}

impl Domain for CollectionObject {
    const SCHEME: &'static str = "collection";
    const SNAPSHOT_FILE: &'static str = "collection.json";
    const REMOTE_URL: &'static str =
        "https://raw.githubusercontent.com/sfomuseum/go-sfomuseum-curatorial/main/data/collection.json";

    fn embedded_snapshot() -> &'static str {
        include_str!("../data/collection.json")
    }

    fn primary_id(&self) -> i64 {
        self.wof_id
    }

    fn current_state(&self) -> Currency {
        self.currency
    }

    fn from_feature(feature: &Value) -> Result<Self, CatalogError> {
        let (record, properties) = decode_common(feature)?;
        Ok(Self {
            wof_id: record.id,
            object_id: require_int(properties, "sfomuseum:object_id", &record.id.to_string())?,
            accession_number: str_property(properties, "sfomuseum:accession_number")
                .unwrap_or_default(),
            callnumber: str_property(properties, "sfomuseum:callnumber").unwrap_or_default(),
            name: record.name,
            currency: record.currency,
        })
    }
}

/// A public-art installation. Besides the bare ids it is also found under
/// `property=value` codes such as `sfomuseum:map_id=T2-07`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicArtWork {
    #[serde(rename = "wof:id")]
    pub wof_id: i64,
    #[serde(rename = "wof:name")]
    pub name: String,
    #[serde(rename = "sfomuseum:object_id")]
    pub object_id: i64,
    #[serde(rename = "sfomuseum:map_id", default)]
    pub map_id: String,
    #[serde(rename = "mz:is_current", default)]
    pub currency: Currency,
}

impl Display for PublicArtWork {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "\"{}\" {} ({}) ({}) Is current: {}",
            self.name,
            self.wof_id,
            self.object_id,
            self.map_id,
            self.currency.flag()
        )
    }
}

impl Indexed for PublicArtWork {
    fn alias_codes(&self) -> Vec<String> {
        let mut codes = vec![
            self.wof_id.to_string(),
            self.object_id.to_string(),
            format!("wof:id={}", self.wof_id),
            format!("sfomuseum:object_id={}", self.object_id),
        ];
        if !self.map_id.is_empty() {
            codes.push(self.map_id.clone());
            codes.push(format!("sfomuseum:map_id={}", self.map_id));
        }
        codes
    }
}

impl Domain for PublicArtWork {
    const SCHEME: &'static str = "publicart";
    const SNAPSHOT_FILE: &'static str = "publicart.json";
    const REMOTE_URL: &'static str =
        "https://raw.githubusercontent.com/sfomuseum/go-sfomuseum-curatorial/main/data/publicart.json";

    fn embedded_snapshot() -> &'static str {
        include_str!("../data/publicart.json")
    }

    fn primary_id(&self) -> i64 {
        self.wof_id
    }

    fn current_state(&self) -> Currency {
        self.currency
    }

    fn from_feature(feature: &Value) -> Result<Self, CatalogError> {
        let (record, properties) = decode_common(feature)?;
        Ok(Self {
            wof_id: record.id,
            object_id: require_int(properties, "sfomuseum:object_id", &record.id.to_string())?,
            map_id: str_property(properties, "sfomuseum:map_id").unwrap_or_default(),
            name: record.name,
            currency: record.currency,
        })
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

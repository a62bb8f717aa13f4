use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use curatorial_core::{CancellationToken, CatalogError, RecordIndex};
use url::Url;

use crate::compile::index_sources;
use crate::domain::Domain;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(30);

/// Where a lookup table comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupSource {
    /// The snapshot compiled into this crate.
    Embedded,
    /// The published snapshot for the domain, fetched over HTTPS.
    Github,
    /// A snapshot at an explicit URL.
    Remote(Url),
    /// A live build over one or more directories of GeoJSON features.
    Iterator(Vec<PathBuf>),
}

/// A parsed `scheme://host?query` selector.
///
/// ```text
/// galleries://                                  embedded snapshot
/// galleries://github                            published snapshot
/// galleries://remote?url=https://example/x.json explicit snapshot URL
/// galleries://iterator?source=/data/a&source=/data/b
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUri {
    pub scheme: String,
    pub source: LookupSource,
}

impl SourceUri {
    #[must_use]
    pub fn embedded(scheme: &str) -> Self {
        Self { scheme: scheme.to_string(), source: LookupSource::Embedded }
    }

    /// # Errors
    /// Returns [`CatalogError::Source`] when the selector is not a URI, uses
    /// an unknown host, or is missing a required query parameter.
    pub fn parse(uri: &str) -> Result<Self, CatalogError> {
        let uri = uri.trim();
        if !uri.contains("://") {
            if uri.is_empty() || !uri.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '-') {
                return Err(CatalogError::Source(format!("invalid lookup selector '{uri}'")));
            }
            return Ok(Self::embedded(uri));
        }

        let parsed = Url::parse(uri)
            .map_err(|err| CatalogError::Source(format!("invalid lookup selector '{uri}': {err}")))?;
        let scheme = parsed.scheme().to_string();
        let query = |key: &str| {
            parsed
                .query_pairs()
                .filter(|(name, _)| name == key)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.is_empty())
                .collect::<Vec<_>>()
        };

        let source = match parsed.host_str().unwrap_or_default() {
            "" => LookupSource::Embedded,
            "github" => LookupSource::Github,
            "remote" => {
                let Some(target) = query("url").into_iter().next() else {
                    return Err(CatalogError::Source(format!("'{uri}' is missing a url parameter")));
                };
                let target = Url::parse(&target).map_err(|err| {
                    CatalogError::Source(format!("invalid remote url '{target}': {err}"))
                })?;
                LookupSource::Remote(target)
            }
            "iterator" => {
                let sources = query("source").into_iter().map(PathBuf::from).collect::<Vec<_>>();
                if sources.is_empty() {
                    return Err(CatalogError::Source(format!(
                        "'{uri}' MUST name at least one source parameter"
                    )));
                }
                LookupSource::Iterator(sources)
            }
            other => {
                return Err(CatalogError::Source(format!(
                    "unsupported lookup source '{other}' in '{uri}'"
                )))
            }
        };

        Ok(Self { scheme, source })
    }
}

impl FromStr for SourceUri {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl Display for SourceUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            LookupSource::Embedded => write!(f, "{}://", self.scheme),
            LookupSource::Github => write!(f, "{}://github", self.scheme),
            LookupSource::Remote(target) => {
                let mut uri = Url::parse(&format!("{}://remote", self.scheme)).map_err(|_| std::fmt::Error)?;
                uri.query_pairs_mut().append_pair("url", target.as_str());
                write!(f, "{uri}")
            }
            LookupSource::Iterator(sources) => {
                let mut uri = Url::parse(&format!("{}://iterator", self.scheme)).map_err(|_| std::fmt::Error)?;
                {
                    let mut pairs = uri.query_pairs_mut();
                    for source in sources {
                        pairs.append_pair("source", &source.to_string_lossy());
                    }
                }
                write!(f, "{uri}")
            }
        }
    }
}

impl LookupSource {
    /// Build the index for `D` from this source.
    ///
    /// Snapshots are decoded in full and then indexed; an iterator source
    /// appends records to the index as each worker decodes them.
    ///
    /// # Errors
    /// Returns an error when the snapshot cannot be fetched or decoded, when
    /// a source directory cannot be walked, or when `token` is cancelled.
    pub fn build_index<D: Domain>(&self, token: &CancellationToken) -> Result<RecordIndex<D>> {
        let index = match self {
            Self::Iterator(sources) => index_sources::<D>(sources, token)?,
            _ => RecordIndex::build_with_cancel(self.load_snapshot::<D>()?, token)?,
        };
        tracing::info!(scheme = D::SCHEME, records = index.len(), "lookup index ready");
        Ok(index)
    }

    /// # Errors
    /// Returns an error for iterator sources, or when the snapshot cannot be
    /// fetched or is not a JSON array of `D`.
    pub fn load_snapshot<D: Domain>(&self) -> Result<Vec<D>> {
        match self {
            Self::Embedded => decode_snapshot(D::embedded_snapshot())
                .with_context(|| format!("failed to decode embedded {}", D::SNAPSHOT_FILE)),
            Self::Github => fetch_snapshot(D::REMOTE_URL),
            Self::Remote(target) => fetch_snapshot(target.as_str()),
            Self::Iterator(_) => Err(anyhow!("iterator sources have no snapshot")),
        }
    }
}

/// # Errors
/// Returns an error when `body` is not a JSON array of `D`.
pub fn decode_snapshot<D: Domain>(body: &str) -> Result<Vec<D>> {
    serde_json::from_str(body).context("snapshot is not a valid dataset array")
}

fn fetch_snapshot<D: Domain>(target: &str) -> Result<Vec<D>> {
    tracing::debug!(url = target, "fetching remote snapshot");
    let agent = ureq::AgentBuilder::new().timeout(REMOTE_TIMEOUT).build();
    let response = agent
        .get(target)
        .call()
        .with_context(|| format!("failed to load remote data from {target}"))?;
    response
        .into_json::<Vec<D>>()
        .with_context(|| format!("remote data from {target} is not a valid dataset array"))
}

//! Optional YAML settings for the `curatorial` binary.
//!
//! ```yaml
//! sources:
//!   galleries: "galleries://iterator?source=/usr/local/data/sfomuseum-data-architecture"
//! pass_through:
//!   - sfomuseum:post_security
//! tie_breakers: [prefer_current, prefer_starting_on_date]
//! log_filter: info
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use curatorial_core::{HierarchyMerger, TemporalResolver, TieBreaker};
use curatorial_lookup::{SourceUri, LOOKUP_SCHEMES};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Default lookup selector per scheme.
    pub sources: BTreeMap<String, String>,
    pub pass_through: Option<Vec<String>>,
    pub tie_breakers: Option<Vec<TieBreaker>>,
    pub log_filter: Option<String>,
}

impl CliConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (scheme, selector) in &self.sources {
            if !LOOKUP_SCHEMES.contains(&scheme.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "unknown scheme '{scheme}' (expected one of {})",
                    LOOKUP_SCHEMES.join(", ")
                )));
            }
            let parsed = SourceUri::parse(selector)
                .map_err(|err| ConfigError::Validation(err.to_string()))?;
            if &parsed.scheme != scheme {
                return Err(ConfigError::Validation(format!(
                    "source for '{scheme}' uses scheme '{}'",
                    parsed.scheme
                )));
            }
        }
        if self.pass_through.as_ref().is_some_and(|keys| keys.iter().any(|key| key.trim().is_empty())) {
            return Err(ConfigError::Validation("pass_through keys cannot be empty".into()));
        }
        Ok(())
    }

    /// `--source` wins, then the configured source, then the embedded snapshot.
    pub fn source_for(&self, scheme: &str, flag: Option<&str>) -> Result<SourceUri, ConfigError> {
        let parsed = match flag.or_else(|| self.sources.get(scheme).map(String::as_str)) {
            Some(selector) => {
                SourceUri::parse(selector).map_err(|err| ConfigError::Validation(err.to_string()))?
            }
            None => SourceUri::embedded(scheme),
        };
        if parsed.scheme != scheme {
            return Err(ConfigError::Validation(format!(
                "expected a {scheme}:// source, got {}://",
                parsed.scheme
            )));
        }
        Ok(parsed)
    }

    pub fn merger(&self) -> HierarchyMerger {
        match &self.pass_through {
            Some(keys) => HierarchyMerger::with_pass_through(keys.clone()),
            None => HierarchyMerger::new(),
        }
    }

    pub fn resolver(&self) -> TemporalResolver {
        match &self.tie_breakers {
            Some(tie_breakers) => TemporalResolver::with_tie_breakers(tie_breakers.clone()),
            None => TemporalResolver::new(),
        }
    }
}

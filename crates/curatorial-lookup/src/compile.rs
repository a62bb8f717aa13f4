use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use anyhow::{anyhow, Context, Result};
use curatorial_core::{CancellationToken, CatalogError, RecordIndex};
use serde::Serialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::domain::Domain;
use crate::features::is_deprecated;

/// A feature that could not be turned into a dataset entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SkippedFeature {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of [`compile_dataset`]: entries in source order, then path order.
#[derive(Debug, Clone)]
pub struct Compiled<D> {
    pub records: Vec<D>,
    pub skipped: Vec<SkippedFeature>,
}

/// Alternate geometries (`1234-alt-foo.geojson`) describe a record that is
/// already present under its primary file.
#[must_use]
pub fn is_alternate(path: &Path) -> bool {
    path.file_stem().and_then(|stem| stem.to_str()).is_some_and(|stem| stem.contains("-alt-"))
}

fn is_feature_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
    !name.ends_with('~')
        && path.extension().and_then(|ext| ext.to_str()) == Some("geojson")
        && !is_alternate(path)
}

/// Primary feature files under `root`, sorted by path.
///
/// # Errors
/// Returns an error when `root` (or anything below it) cannot be read.
pub fn feature_paths(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if entry.file_type().is_file() && is_feature_file(entry.path()) {
            paths.push(entry.into_path());
        }
    }
    Ok(paths)
}

/// # Errors
/// Returns an error when the file cannot be read or is not JSON.
pub fn read_feature(path: &Path) -> Result<Value> {
    let body = fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("failed to parse {}", path.display()))
}

/// Decode every primary feature below `sources` into dataset entries.
///
/// Each source is walked by its own worker. Deprecated features are left
/// out. Features that fail to decode are logged and listed in
/// [`Compiled::skipped`]; they never abort the run.
///
/// # Errors
/// Returns an error when a source cannot be walked or `token` is cancelled.
pub fn compile_dataset<D: Domain>(sources: &[PathBuf], token: &CancellationToken) -> Result<Compiled<D>> {
    let per_source = thread::scope(|scope| {
        let workers = sources
            .iter()
            .map(|source| scope.spawn(move || compile_source::<D>(source, token)))
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .map(|worker| worker.join().map_err(|_| anyhow!("compile worker panicked"))?)
            .collect::<Result<Vec<_>>>()
    })?;

    let mut compiled = Compiled { records: Vec::new(), skipped: Vec::new() };
    for part in per_source {
        compiled.records.extend(part.records);
        compiled.skipped.extend(part.skipped);
    }
    tracing::info!(
        scheme = D::SCHEME,
        records = compiled.records.len(),
        skipped = compiled.skipped.len(),
        "compiled dataset"
    );
    Ok(compiled)
}

fn compile_source<D: Domain>(source: &Path, token: &CancellationToken) -> Result<Compiled<D>> {
    let mut compiled = Compiled { records: Vec::new(), skipped: Vec::new() };
    for path in feature_paths(source)? {
        if token.is_cancelled() {
            return Err(CatalogError::Cancelled.into());
        }
        match decode_path::<D>(&path) {
            Ok(Some(record)) => compiled.records.push(record),
            Ok(None) => {}
            Err(reason) => compiled.skipped.push(SkippedFeature { path, reason }),
        }
    }
    Ok(compiled)
}

/// `Ok(None)` for a deprecated feature.
fn decode_path<D: Domain>(path: &Path) -> Result<Option<D>, String> {
    let decoded = read_feature(path).map_err(|err| format!("{err:#}")).and_then(|feature| {
        if is_deprecated(&feature) {
            tracing::debug!(path = %path.display(), "skipping deprecated feature");
            return Ok(None);
        }
        D::from_feature(&feature).map(Some).map_err(|err| err.to_string())
    });
    if let Err(reason) = &decoded {
        tracing::warn!(path = %path.display(), error = %reason, "skipping feature");
    }
    decoded
}

/// Live build: one worker per source, each appending records to the shared
/// index as soon as they decode.
pub(crate) fn index_sources<D: Domain>(sources: &[PathBuf], token: &CancellationToken) -> Result<RecordIndex<D>> {
    let index = RecordIndex::new();
    thread::scope(|scope| {
        let workers = sources
            .iter()
            .map(|source| {
                let index = &index;
                scope.spawn(move || -> Result<usize> {
                    let mut appended = 0;
                    for path in feature_paths(source)? {
                        if token.is_cancelled() {
                            return Err(CatalogError::Cancelled.into());
                        }
                        if let Ok(Some(record)) = decode_path::<D>(&path) {
                            index.append(record);
                            appended += 1;
                        }
                    }
                    tracing::debug!(source = %source.display(), appended, "source indexed");
                    Ok(appended)
                })
            })
            .collect::<Vec<_>>();
        for worker in workers {
            worker.join().map_err(|_| anyhow!("index worker panicked"))??;
        }
        Ok::<_, anyhow::Error>(())
    })?;
    Ok(index)
}

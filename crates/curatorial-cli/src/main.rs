use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use curatorial_core::record::int_list_property;
use curatorial_core::{CancellationToken, CatalogError, HierarchyMerger, ParentId, Record};
use curatorial_lookup::{
    apply_assignment, apply_lineage, compile_dataset, decode_record, is_deprecated, supersede,
    CollectionObject, Domain, Exhibition, FeatureStore, Gallery, Lookup, PublicArtWork,
};
use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod config;

use config::CliConfig;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Debug, Parser)]
#[command(name = "curatorial")]
#[command(about = "Curatorial parentage resolution CLI")]
struct Cli {
    /// YAML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG or the config file.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print every entry indexed under each code.
    Lookup(LookupArgs),
    /// Resolve the gallery a code referred to on a given date.
    Resolve(ResolveArgs),
    /// Compile a directory of features into a dataset snapshot.
    Compile(CompileArgs),
    /// Assign one or more parent features to a record.
    AssignParent(AssignParentArgs),
    /// Resolve and assign galleries for every exhibition in a store.
    BackfillGalleries(BackfillArgs),
    /// Close a record and create its successor under a new parent.
    Supersede(SupersedeArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scheme {
    Galleries,
    Exhibitions,
    Collection,
    Publicart,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Self::Galleries => Gallery::SCHEME,
            Self::Exhibitions => Exhibition::SCHEME,
            Self::Collection => CollectionObject::SCHEME,
            Self::Publicart => PublicArtWork::SCHEME,
        }
    }

    fn parse_selector(selector: &str) -> Result<Self> {
        let scheme = selector.split("://").next().unwrap_or_default();
        <Self as ValueEnum>::from_str(scheme, true)
            .map_err(|_| anyhow!("unknown lookup scheme '{scheme}' in '{selector}'"))
    }
}

#[derive(Debug, Args)]
struct LookupArgs {
    /// Lookup selector, e.g. `galleries://` or `exhibitions://iterator?source=DIR`.
    #[arg(long)]
    source: String,
    /// Only report entries flagged as current.
    #[arg(long, default_value_t = false)]
    current: bool,
    #[arg(required = true)]
    codes: Vec<String>,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    /// Gallery selector; defaults to the configured or embedded source.
    #[arg(long)]
    source: Option<String>,
    #[arg(long)]
    code: String,
    /// EDTF date, e.g. 2024-06-17.
    #[arg(long)]
    date: String,
    /// Report every surviving candidate instead of demanding exactly one.
    #[arg(long, default_value_t = false)]
    all: bool,
}

#[derive(Debug, Args)]
struct CompileArgs {
    #[arg(long, value_enum)]
    scheme: Scheme,
    /// Directory of GeoJSON features; may be repeated.
    #[arg(long = "source", required = true)]
    sources: Vec<PathBuf>,
    /// Where to write the dataset.
    #[arg(long, required_unless_present = "stdout")]
    out: Option<PathBuf>,
    /// Write the dataset to stdout instead of a file.
    #[arg(long, default_value_t = false, conflicts_with = "out")]
    stdout: bool,
}

#[derive(Debug, Args)]
struct AssignParentArgs {
    /// Directory holding the record to update.
    #[arg(long)]
    store: PathBuf,
    /// Directory holding the parent features; defaults to `--store`.
    #[arg(long)]
    parent_store: Option<PathBuf>,
    #[arg(long)]
    id: i64,
    /// Parent feature id; may be repeated, or omitted to clear the parent.
    #[arg(long = "parent")]
    parents: Vec<i64>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct BackfillArgs {
    /// Directory of exhibition features to update.
    #[arg(long)]
    store: PathBuf,
    /// Directory of gallery (architecture) features.
    #[arg(long)]
    architecture: PathBuf,
    /// Gallery selector used to resolve `sfomuseum:gallery_id` codes.
    #[arg(long)]
    source: Option<String>,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct SupersedeArgs {
    /// Directory holding the record to supersede; the successor is added here.
    #[arg(long)]
    store: PathBuf,
    /// Directory holding the new parent feature; defaults to `--store`.
    #[arg(long)]
    parent_store: Option<PathBuf>,
    #[arg(long)]
    id: i64,
    #[arg(long)]
    parent: i64,
    /// Id for the successor record.
    #[arg(long)]
    new_id: i64,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn init_logging(verbose: bool, config: &CliConfig) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        match std::env::var(EnvFilter::DEFAULT_ENV) {
            Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)),
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .map_err(|err| anyhow!("failed to initialise logging: {err}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CliConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CliConfig::default(),
    };
    init_logging(cli.verbose, &config)?;
    let token = CancellationToken::new();

    match cli.command {
        Command::Lookup(args) => run_lookup(&args, &config, &token),
        Command::Resolve(args) => run_resolve(&args, &config, &token),
        Command::Compile(args) => run_compile(&args, &token),
        Command::AssignParent(args) => run_assign_parent(&args, &config.merger()),
        Command::BackfillGalleries(args) => run_backfill(&args, &config, &token),
        Command::Supersede(args) => run_supersede(&args, &config.merger()),
    }
}

fn open_lookup<D: Domain>(
    config: &CliConfig,
    selector: Option<&str>,
    token: &CancellationToken,
) -> Result<Lookup<D>> {
    let source = config.source_for(D::SCHEME, selector)?;
    tracing::debug!(source = %source, "opening lookup");
    Ok(Lookup::open(&source.source, token)?.with_resolver(config.resolver()))
}

fn run_lookup(args: &LookupArgs, config: &CliConfig, token: &CancellationToken) -> Result<()> {
    match Scheme::parse_selector(&args.source)? {
        Scheme::Galleries => lookup_codes::<Gallery>(args, config, token),
        Scheme::Exhibitions => lookup_codes::<Exhibition>(args, config, token),
        Scheme::Collection => lookup_codes::<CollectionObject>(args, config, token),
        Scheme::Publicart => lookup_codes::<PublicArtWork>(args, config, token),
    }
}

fn lookup_codes<D: Domain>(args: &LookupArgs, config: &CliConfig, token: &CancellationToken) -> Result<()> {
    let lookup = open_lookup::<D>(config, Some(&args.source), token)?;
    let mut results = Vec::with_capacity(args.codes.len());
    for code in &args.codes {
        let found = if args.current { lookup.find_all_current(code) } else { lookup.find(code) };
        results.push(match found {
            Ok(entries) => json!({
                "code": code,
                "matches": entries.iter().map(|entry| entry.as_ref()).collect::<Vec<_>>(),
            }),
            Err(err) => json!({ "code": code, "matches": [], "error": err.to_string() }),
        });
    }

    emit_json(json!({
        "scheme": D::SCHEME,
        "results": results,
    }))
}

fn run_resolve(args: &ResolveArgs, config: &CliConfig, token: &CancellationToken) -> Result<()> {
    let lookup = open_lookup::<Gallery>(config, args.source.as_deref(), token)?;
    let resolution = lookup.resolve_as_of(&args.code, &args.date)?;
    if !args.all && resolution.is_ambiguous() {
        return Err(CatalogError::MultipleCandidates(args.code.clone()).into());
    }

    emit_json(json!({
        "code": args.code,
        "date": args.date,
        "ambiguous": resolution.is_ambiguous(),
        "tie_breakers": config.resolver().tie_breakers(),
        "selected": resolution.selected.iter().map(|gallery| gallery.as_ref()).collect::<Vec<_>>(),
        "excluded": resolution.excluded,
        "ordering_trace": resolution.ordering_trace,
    }))
}

fn run_compile(args: &CompileArgs, token: &CancellationToken) -> Result<()> {
    match args.scheme {
        Scheme::Galleries => compile_scheme::<Gallery>(args, token),
        Scheme::Exhibitions => compile_scheme::<Exhibition>(args, token),
        Scheme::Collection => compile_scheme::<CollectionObject>(args, token),
        Scheme::Publicart => compile_scheme::<PublicArtWork>(args, token),
    }
}

fn compile_scheme<D: Domain>(args: &CompileArgs, token: &CancellationToken) -> Result<()> {
    let compiled = compile_dataset::<D>(&args.sources, token)?;
    let mut body = serde_json::to_string_pretty(&compiled.records).context("failed to encode dataset")?;
    body.push('\n');

    if args.stdout {
        print!("{body}");
        return Ok(());
    }

    let out = args.out.as_deref().ok_or_else(|| anyhow!("--out is required without --stdout"))?;
    write_dataset(out, &body)?;
    emit_json(json!({
        "scheme": args.scheme.as_str(),
        "out": out.display().to_string(),
        "records": compiled.records.len(),
        "skipped": compiled.skipped,
        "digest": format!("sha256:{}", hex::encode(Sha256::digest(body.as_bytes()))),
    }))
}

fn write_dataset(path: &Path, body: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, body).with_context(|| format!("failed to write {}", path.display()))
}

fn run_assign_parent(args: &AssignParentArgs, merger: &HierarchyMerger) -> Result<()> {
    let store = FeatureStore::open(&args.store)?;
    let parent_store = match &args.parent_store {
        Some(root) => FeatureStore::open(root)?,
        None => FeatureStore::open(&args.store)?,
    };

    let parents = args
        .parents
        .iter()
        .map(|id| {
            let feature = parent_store.load(*id)?;
            decode_record(&feature).with_context(|| format!("failed to decode parent {id}"))
        })
        .collect::<Result<Vec<Record>>>()?;

    let assignment = merger.merge(&parents)?;
    let mut feature = store.load(args.id)?;
    let changed = apply_assignment(&mut feature, &assignment);
    let written = changed && !args.dry_run;
    if written {
        store.write(&feature)?;
    }

    emit_json(json!({
        "id": args.id,
        "assignment": assignment,
        "changed": changed,
        "written": written,
        "dry_run": args.dry_run,
    }))
}

#[derive(Debug, Serialize)]
struct BackfillUpdate {
    id: i64,
    old_parent_id: ParentId,
    parent_id: ParentId,
    written: bool,
}

#[derive(Debug, Serialize)]
struct BackfillSkip {
    id: i64,
    reason: String,
}

#[derive(Debug, Default, Serialize)]
struct BackfillReport {
    examined: usize,
    unchanged: usize,
    deprecated: usize,
    updated: Vec<BackfillUpdate>,
    skipped: Vec<BackfillSkip>,
}

fn run_backfill(args: &BackfillArgs, config: &CliConfig, token: &CancellationToken) -> Result<()> {
    let galleries = open_lookup::<Gallery>(config, args.source.as_deref(), token)?;
    let exhibitions = FeatureStore::open(&args.store)?;
    let architecture = FeatureStore::open(&args.architecture)?;
    let merger = config.merger();

    let mut report = BackfillReport::default();
    for id in exhibitions.ids() {
        if token.is_cancelled() {
            return Err(CatalogError::Cancelled.into());
        }
        report.examined += 1;
        match backfill_one(id, &exhibitions, &architecture, &galleries, &merger, args.dry_run) {
            Ok(BackfillOutcome::Updated(update)) => report.updated.push(update),
            Ok(BackfillOutcome::Unchanged) => report.unchanged += 1,
            Ok(BackfillOutcome::Deprecated) => report.deprecated += 1,
            Err(err) => {
                let reason = format!("{err:#}");
                tracing::error!(id, error = %reason, "failed to backfill exhibition, skipping");
                report.skipped.push(BackfillSkip { id, reason });
            }
        }
    }

    tracing::info!(
        examined = report.examined,
        updated = report.updated.len(),
        deprecated = report.deprecated,
        skipped = report.skipped.len(),
        "backfill finished"
    );
    emit_json(json!({ "dry_run": args.dry_run, "report": report }))
}

enum BackfillOutcome {
    Updated(BackfillUpdate),
    /// No gallery ids, or the parent is already correct.
    Unchanged,
    Deprecated,
}

fn backfill_one(
    id: i64,
    exhibitions: &FeatureStore,
    architecture: &FeatureStore,
    galleries: &Lookup<Gallery>,
    merger: &HierarchyMerger,
    dry_run: bool,
) -> Result<BackfillOutcome> {
    let mut feature = exhibitions.load(id)?;
    if is_deprecated(&feature) {
        tracing::debug!(id, "skipping deprecated exhibition");
        return Ok(BackfillOutcome::Deprecated);
    }
    let exhibition = decode_record(&feature)?;
    let gallery_codes = feature
        .get("properties")
        .and_then(Value::as_object)
        .map(|properties| int_list_property(properties, "sfomuseum:gallery_id"))
        .unwrap_or_default();
    if gallery_codes.is_empty() {
        return Ok(BackfillOutcome::Unchanged);
    }

    let date = exhibition.inception.as_deref().ok_or_else(|| anyhow!("exhibition has no edtf:inception"))?;
    let mut parents = Vec::with_capacity(gallery_codes.len());
    for code in gallery_codes {
        let gallery = galleries
            .find_for_date(&code.to_string(), date)
            .with_context(|| format!("failed to resolve gallery {code} on {date}"))?;
        let gallery_feature = architecture.load(gallery.wof_id)?;
        parents.push(decode_record(&gallery_feature)?);
    }

    let assignment = merger.merge(&parents)?;
    if assignment.parent_id == exhibition.parent_id {
        tracing::debug!(id, parent_id = assignment.parent_id.0, "no change to parent id, skipping");
        return Ok(BackfillOutcome::Unchanged);
    }

    let changed = apply_lineage(&mut feature, &assignment);
    let written = changed && !dry_run;
    if written {
        exhibitions.write(&feature)?;
    }
    tracing::info!(id, parent_id = assignment.parent_id.0, dry_run, "resolved gallery");
    Ok(BackfillOutcome::Updated(BackfillUpdate {
        id,
        old_parent_id: exhibition.parent_id,
        parent_id: assignment.parent_id,
        written,
    }))
}

fn run_supersede(args: &SupersedeArgs, merger: &HierarchyMerger) -> Result<()> {
    let store = FeatureStore::open(&args.store)?;
    let parent_store = match &args.parent_store {
        Some(root) => FeatureStore::open(root)?,
        None => FeatureStore::open(&args.store)?,
    };
    if store.path_of(args.new_id).is_some() {
        return Err(anyhow!("feature {} already exists under {}", args.new_id, args.store.display()));
    }

    let predecessor = store.load(args.id)?;
    let parent = decode_record(&parent_store.load(args.parent)?)
        .with_context(|| format!("failed to decode parent {}", args.parent))?;
    let supersession = supersede(&predecessor, &parent, args.new_id, merger)
        .with_context(|| format!("failed to supersede {}", args.id))?;

    let mut written = Vec::new();
    if !args.dry_run {
        written.push(store.create(&supersession.successor)?.display().to_string());
        written.push(store.write(&supersession.predecessor)?.display().to_string());
    }
    tracing::info!(id = args.id, new_id = args.new_id, parent = args.parent, dry_run = args.dry_run, "supersede complete");

    emit_json(json!({
        "id": args.id,
        "new_id": args.new_id,
        "parent_id": args.parent,
        "predecessor": supersession.predecessor["properties"],
        "successor": supersession.successor["properties"],
        "written": written,
        "dry_run": args.dry_run,
    }))
}

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use serde::Serialize;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use conceptdb_catalog::{
    reverse_attribution, AggregateRecompute, CategoryIdCache, ConceptIdCache, ForwardAttributionJob, JsonExtractor,
    Reconciler,
};
use conceptdb_core::config::{expand_path, Config, Settings};
use conceptdb_core::TableKind;
use conceptdb_embed::get_default_embedder;
use conceptdb_hybrid::{HybridSearchEngine, SearchKind};
use conceptdb_lexical::{strategy_for, ExpansionParams, InMemoryLexicon, LexicalNetwork};
use conceptdb_store::LanceStore;

const USAGE: &str = "\
Usage: conceptdb <command> [args...]

Commands:
  reconcile [--dry-run] [--tables catalog,chunks,concepts,categories]
  aggregates [--dry-run]
  attribute-reverse [--dry-run]
  attribute-forward <extractions-dir> [--dry-run] [--retry-failed]
  search <query> [--chunks] [--limit N] [--strategy context|context-aware|first|first-synset]
  cache-stats";

const COMMANDS: &[&str] = &[
    "reconcile",
    "aggregates",
    "attribute-reverse",
    "attribute-forward",
    "search",
    "cache-stats",
];

/// Options that take a value.
const VALUE_OPTIONS: &[&str] = &["--tables", "--limit", "--strategy"];

struct Args {
    positional: Vec<String>,
    flags: HashSet<String>,
    options: HashMap<String, String>,
}

impl Args {
    fn flag(&self, name: &str) -> bool {
        self.flags.contains(name)
    }

    fn option(&self, name: &str) -> Option<&str> {
        self.options.get(name).map(String::as_str)
    }
}

/// Split the command line (without the program name) into a known command
/// and its arguments.
fn parse_args(mut raw: Vec<String>) -> anyhow::Result<(String, Args)> {
    if raw.is_empty() {
        bail!("missing command");
    }
    let cmd = raw.remove(0);
    if !COMMANDS.contains(&cmd.as_str()) {
        bail!("Unknown command: {cmd}");
    }
    let mut args = Args {
        positional: Vec::new(),
        flags: HashSet::new(),
        options: HashMap::new(),
    };
    let mut iter = raw.into_iter();
    while let Some(arg) = iter.next() {
        if VALUE_OPTIONS.contains(&arg.as_str()) {
            let Some(value) = iter.next() else {
                bail!("{arg} requires a value");
            };
            args.options.insert(arg, value);
        } else if arg.starts_with("--") {
            args.flags.insert(arg);
        } else {
            args.positional.push(arg);
        }
    }
    Ok((cmd, args))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_tables(list: &str) -> anyhow::Result<Vec<TableKind>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| TableKind::parse(s).with_context(|| format!("unknown table '{s}'")))
        .collect()
}

async fn load_lexicon(settings: &Settings) -> anyhow::Result<Arc<dyn LexicalNetwork>> {
    let lexicon = match &settings.expansion.lexicon_path {
        Some(path) => {
            let path = expand_path(path);
            InMemoryLexicon::load(&path)
                .await
                .with_context(|| format!("loading lexicon {}", path.display()))?
        }
        None => {
            warn!("no expansion.lexicon_path configured; queries will not be expanded");
            InMemoryLexicon::new()
        }
    };
    Ok(Arc::new(lexicon))
}

async fn search(store: LanceStore, settings: &Settings, args: &Args) -> anyhow::Result<()> {
    let query = args.positional.join(" ");
    if query.trim().is_empty() {
        bail!("search requires a query");
    }
    let limit = match args.option("--limit") {
        Some(n) => n.parse::<usize>().with_context(|| format!("--limit expects a number, got '{n}'"))?,
        None => 10,
    };
    let kind = if args.flag("--chunks") { SearchKind::Chunks } else { SearchKind::Documents };
    let strategy_name = args.option("--strategy").unwrap_or(&settings.expansion.strategy);

    let cache = Arc::new(ConceptIdCache::new());
    if let Err(err) = cache.initialize(&store).await {
        warn!(error = %err, "concept cache unavailable; ranking without concept overlap");
    }
    let strategy = strategy_for(strategy_name, load_lexicon(settings).await?)?;
    let embedder = get_default_embedder(settings.store.dimension)?;
    let engine = HybridSearchEngine::new(
        store,
        embedder,
        strategy,
        cache,
        settings.ranking.clone(),
        ExpansionParams::from(&settings.expansion),
    );

    let results = engine.search(&query, kind, limit).await?;
    println!("Found {} results for \"{}\" ({} expansion)", results.len(), query, engine.strategy_name());
    for (i, r) in results.iter().enumerate() {
        let b = &r.breakdown;
        println!(
            "\n  {}. score={:.4}  id={}  [vector={:.3} lexical={:.3} title={:.3} expansion={:.3}]",
            i + 1,
            r.score,
            r.id,
            b.vector,
            b.lexical,
            b.title,
            b.expansion
        );
        println!("     {}", r.label);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cmd, args) = match parse_args(env::args().skip(1).collect()) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("{err}\n\n{USAGE}");
            std::process::exit(1);
        }
    };
    init_tracing();
    let config = Config::load().context("loading configuration")?;
    let settings = config.settings()?;
    let scan_cap = settings.store.scan_cap;
    let dry_run = args.flag("--dry-run");
    let store = LanceStore::open(&settings.store).await.context("opening record store")?;

    match cmd.as_str() {
        "reconcile" => {
            let tables = args.option("--tables").map(parse_tables).transpose()?;
            let report = Reconciler::new(&store, scan_cap).reconcile(tables.as_deref(), dry_run).await?;
            print_json(&report)?;
        }
        "aggregates" => {
            let report = AggregateRecompute::new(&store, scan_cap).run(dry_run).await?;
            print_json(&report)?;
        }
        "attribute-reverse" => {
            let report = reverse_attribution(&store, scan_cap, dry_run).await?;
            print_json(&report)?;
        }
        "attribute-forward" => {
            let Some(dir) = args.positional.first().map(PathBuf::from) else {
                bail!("attribute-forward requires an extractions directory");
            };
            let extractor = JsonExtractor::new(dir);
            let cache = ConceptIdCache::new();
            let report = ForwardAttributionJob::new(&store, &extractor, &cache, &settings.batch, scan_cap)
                .dry_run(dry_run)
                .retry_failed(args.flag("--retry-failed"))
                .with_progress(true)
                .run()
                .await?;
            print_json(&report)?;
        }
        "search" => search(store, &settings, &args).await?,
        "cache-stats" => {
            let concepts = ConceptIdCache::new().initialize(&store).await?;
            let categories = CategoryIdCache::new().initialize(&store).await?;
            print_json(&serde_json::json!({ "concepts": concepts, "categories": categories }))?;
        }
        other => bail!("Unknown command: {other}"),
    }
    Ok(())
}

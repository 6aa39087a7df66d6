//! cinesim: find movies similar to the ones you pick.
//!
//! Movies live in a JSON-lines table with one embedding per row. Every
//! command builds an in-memory catalog from that table and ranks it by cosine
//! similarity against the selected movies.

mod config;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cinesim_core::{
    BuildStats, Catalog, CatalogBuilder, CatalogHandle, DispatchReport, ExactEngine,
    QueryDispatcher, QueryRequest, RawEmbedding, VectorCodec,
};
use cinesim_store::{
    ImportRow, JsonlStore, MovieRecord, StoreWatcher, WatcherConfig, watch_and_reload,
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;

/// Find movies similar to the ones you pick
#[derive(Parser)]
#[command(name = "cinesim")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to .cinesim directory (default: search for .cinesim/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new .cinesim directory with config file
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },

    /// List catalog entries with their positions
    List {
        /// Only show titles containing this text (case-insensitive)
        #[arg(long)]
        filter: Option<String>,
    },

    /// Recommend movies similar to the selected ones
    Recommend {
        /// Select by catalog position
        #[arg(long = "position", short = 'p')]
        positions: Vec<usize>,

        /// Select by movie id
        #[arg(long = "id")]
        ids: Vec<i64>,

        /// Query with an embedding literal, e.g. "[0.1, 0.2, ...]"
        #[arg(long = "embedding")]
        embeddings: Vec<String>,

        /// Results per selection (default: from config)
        #[arg(long, short = 'k')]
        top_k: Option<usize>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import movies from a JSON-lines file into the store
    Import {
        /// File with one {id, title, popularity, embedding} object per line
        file: PathBuf,
    },

    /// Build the catalog and report what was accepted
    Stats,

    /// Keep the catalog live and answer selections read from stdin
    Watch,
}

/// Initialize logging for interactive use. Logs to stderr.
fn init_logging(verbose: bool) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(log_filter(verbose))
        .init();
}

/// Initialize logging to rotating files in .cinesim/logs/ with daily rotation.
fn init_file_logging(cinesim_dir: &Path, verbose: bool) {
    let logs_dir = cinesim_dir.join("logs");

    if let Err(e) = std::fs::create_dir_all(&logs_dir) {
        eprintln!("Warning: Failed to create logs directory: {}", e);
        init_logging(verbose);
        return;
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "cinesim.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops the writer thread
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .with(log_filter(verbose))
        .init();
}

fn log_filter(verbose: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Load config from an explicit path or auto-discover `.cinesim/config.toml`.
///
/// Returns the config and the `.cinesim` directory it came from, if any.
fn load_config(override_path: Option<&PathBuf>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(path) = override_path {
        // Explicit path override - treat as path to .cinesim directory
        let config_file = if path.is_dir() {
            Config::config_path(path)
        } else {
            path.clone()
        };
        let cinesim_dir = config_file.parent().unwrap_or(path).to_path_buf();
        let config = Config::from_file(&config_file)?;
        return Ok((config, Some(cinesim_dir)));
    }

    match Config::find_and_load() {
        Ok(Some((config, cinesim_dir))) => Ok((config, Some(cinesim_dir))),
        Ok(None) => Ok((Config::default(), None)),
        Err(e) => {
            eprintln!("Warning: {:#}, using defaults", e);
            Ok((Config::default(), None))
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# cinesim configuration
# All paths are relative to this .cinesim/ directory unless absolute

[catalog]
dimension = 387        # Components per embedding; rows of any other length are skipped
store = "movies.jsonl" # Stored in .cinesim/movies.jsonl

[search]
top_k = 5
# max_workers = 8      # Default: number of CPUs

[watch]
debounce_ms = 300

[logging]
to_file = false        # true: write to .cinesim/logs/ instead of stderr
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, config_dir) = load_config(cli.config.as_ref())?;

    let Some(command) = cli.command else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(());
    };

    if config.logging.to_file {
        let cinesim_dir = config_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(config::CINESIM_DIR));
        init_file_logging(&cinesim_dir, cli.verbose);
    } else {
        init_logging(cli.verbose);
    }

    match &config_dir {
        Some(dir) => info!("Using config from {}", dir.display()),
        None => tracing::debug!("No .cinesim/config.toml found, using defaults"),
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            tracing::error!("Invalid config: {}", e);
        }
        anyhow::bail!("Configuration has {} invalid field(s)", errors.len());
    }

    let store_path = config.resolve_store_path(config_dir.as_deref());

    match command {
        Commands::Init { force } => {
            let cinesim_dir = PathBuf::from(config::CINESIM_DIR);
            let config_path = Config::config_path(&cinesim_dir);

            if config_path.exists() && !force {
                anyhow::bail!(".cinesim/config.toml already exists. Use --force to overwrite.");
            }

            if !cinesim_dir.exists() {
                std::fs::create_dir_all(&cinesim_dir)?;
                info!("Created {}/", cinesim_dir.display());
            }

            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            info!("Created {}", config_path.display());
            info!("Next steps:");
            info!("  1. Edit .cinesim/config.toml to set the embedding dimension");
            info!("  2. Run 'cinesim import <file>' to load movies");
            info!("  3. Run 'cinesim recommend --id <id>' to find similar movies");
        }

        Commands::List { filter } => {
            let (_, catalog, _) = build_catalog(&config, &store_path)?;
            let rows = match filter.as_deref() {
                Some(needle) => catalog.find_titles(needle),
                None => catalog.entries().iter().enumerate().collect(),
            };
            for (position, entry) in &rows {
                println!("{:>6}  {:>10}  {}", position, entry.id, entry.title);
            }
            info!("{} of {} entries shown", rows.len(), catalog.len());
        }

        Commands::Recommend {
            positions,
            ids,
            embeddings,
            top_k,
            json,
        } => {
            let requests = collect_requests(positions, ids, embeddings);
            let (_, catalog, _) = build_catalog(&config, &store_path)?;

            let mut dispatch = config.dispatch_config();
            if let Some(k) = top_k {
                dispatch = dispatch.with_top_k(k);
            }
            let dispatcher = QueryDispatcher::new(
                Arc::new(ExactEngine::new()),
                CatalogHandle::shared(catalog),
                dispatch,
            );

            let report = dispatcher.dispatch_all(requests).await?;
            print_report(&report, json)?;
        }

        Commands::Import { file } => {
            let codec = VectorCodec::new(config.catalog.dimension)?;
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let (records, skipped) = parse_import(&content, &codec);

            if records.is_empty() {
                anyhow::bail!(
                    "No importable rows in {} ({} skipped)",
                    file.display(),
                    skipped
                );
            }

            let store = JsonlStore::open(&store_path);
            let stats = store
                .upsert(&records)
                .with_context(|| format!("Failed to write {}", store_path.display()))?;
            println!(
                "Imported {} rows into {}: {} inserted, {} replaced, {} skipped",
                records.len(),
                store_path.display(),
                stats.inserted,
                stats.replaced,
                skipped
            );
        }

        Commands::Stats => {
            let store = JsonlStore::open(&store_path);
            let store_stats = store
                .stats()
                .with_context(|| format!("Failed to read {}", store_path.display()))?;
            let (_, _, stats) = build_catalog(&config, &store_path)?;
            print_stats(&store_path, &stats, store_stats.malformed);
        }

        Commands::Watch => {
            run_watch(&config, &store_path).await?;
        }
    }

    Ok(())
}

/// Build the catalog from the store at `store_path`.
fn build_catalog(
    config: &Config,
    store_path: &Path,
) -> Result<(CatalogBuilder, Catalog, BuildStats)> {
    let codec = VectorCodec::new(config.catalog.dimension)?;
    let builder = CatalogBuilder::new(codec);
    let mut store = JsonlStore::open(store_path);
    let (catalog, stats) = builder
        .build_from(&mut store)
        .with_context(|| format!("Failed to build catalog from {}", store_path.display()))?;
    Ok((builder, catalog, stats))
}

/// Turn command-line selections into requests, positions first.
fn collect_requests(
    positions: Vec<usize>,
    ids: Vec<i64>,
    embeddings: Vec<String>,
) -> Vec<QueryRequest> {
    let mut requests: Vec<QueryRequest> = positions
        .into_iter()
        .map(QueryRequest::Position)
        .chain(ids.into_iter().map(QueryRequest::Id))
        .collect();
    for literal in embeddings {
        requests.push(QueryRequest::Embedding {
            label: clip(&literal, 24),
            raw: RawEmbedding::Text(literal),
        });
    }
    requests
}

/// Parse one stdin selection token: `#603` selects by id, `12` by position.
fn parse_selection(token: &str) -> Option<QueryRequest> {
    match token.strip_prefix('#') {
        Some(id) => id.parse().ok().map(QueryRequest::Id),
        None => token.parse().ok().map(QueryRequest::Position),
    }
}

/// Validate every line of an import file.
///
/// Returns the importable records and the number of skipped lines.
fn parse_import(content: &str, codec: &VectorCodec) -> (Vec<MovieRecord>, usize) {
    let mut records = Vec::new();
    let mut skipped = 0;

    for (number, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let row = match serde_json::from_str::<ImportRow>(line) {
            Ok(row) => row,
            Err(e) => {
                warn!("Line {}: {}", number + 1, e);
                skipped += 1;
                continue;
            }
        };
        let id = row.id;
        match MovieRecord::from_import(row, codec) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!("Line {} (id {}): {}", number + 1, id, e);
                skipped += 1;
            }
        }
    }

    (records, skipped)
}

fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let head: String = text.chars().take(max).collect();
        format!("{}...", head)
    }
}

fn print_report(report: &DispatchReport, json: bool) -> Result<()> {
    if json {
        let outcomes: Vec<serde_json::Value> = report
            .iter()
            .map(|(request, outcome)| match outcome {
                Ok(rec) => serde_json::json!({ "request": request, "recommendation": rec }),
                Err(e) => serde_json::json!({ "request": request, "error": e.to_string() }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    for (request, outcome) in report.iter() {
        match outcome {
            Ok(rec) => {
                match rec.source_id {
                    Some(id) => println!("Similar to '{}' (id {}):", rec.title, id),
                    None => println!("Similar to {}:", request),
                }
                if rec.results.is_empty() {
                    println!("  (no other movies in the catalog)");
                }
                for (rank, hit) in rec.results.iter().enumerate() {
                    println!(
                        "  {:>2}. {:<48} {:>8.4}  (id {})",
                        rank + 1,
                        hit.title,
                        hit.score,
                        hit.id
                    );
                }
            }
            Err(e) => println!("{}: {}", request, e),
        }
        println!();
    }
    Ok(())
}

fn print_stats(store_path: &Path, stats: &BuildStats, malformed: usize) {
    println!("Store:      {}", store_path.display());
    println!("Dimension:  {}", stats.dimension);
    println!("Rows read:  {}", stats.rows_read);
    println!("Accepted:   {}", stats.accepted);
    println!("Rejected:   {}", stats.rejected);
    println!("Malformed:  {}", malformed);
    println!("Build time: {}ms", stats.build_time_ms);
}

/// Serve stdin selections against a catalog that follows the store file.
async fn run_watch(config: &Config, store_path: &Path) -> Result<()> {
    use tokio::io::{AsyncBufReadExt, BufReader};

    let (builder, catalog, stats) = build_catalog(config, store_path)?;
    info!(
        "Catalog ready: {} entries ({} rejected)",
        stats.accepted, stats.rejected
    );

    let handle = CatalogHandle::shared(catalog);
    let watcher = StoreWatcher::with_config(
        store_path,
        WatcherConfig {
            debounce_duration: Duration::from_millis(config.watch.debounce_ms),
        },
    )
    .with_context(|| format!("Failed to watch {}", store_path.display()))?;

    {
        let handle = Arc::clone(&handle);
        let mut store = JsonlStore::open(store_path);
        std::thread::spawn(move || {
            info!("Watching {}", watcher.path().display());
            watch_and_reload(&watcher, &builder, &mut store, &handle, |outcome| {
                if let Ok(stats) = outcome {
                    eprintln!("Catalog reloaded: {} entries", stats.accepted);
                }
            });
        });
    }

    let dispatcher = QueryDispatcher::new(
        Arc::new(ExactEngine::new()),
        handle,
        config.dispatch_config(),
    );

    eprintln!("Enter selections (#id or position), one batch per line. Ctrl-D to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let mut requests = Vec::new();
        for token in line.split_whitespace() {
            match parse_selection(token) {
                Some(request) => requests.push(request),
                None => eprintln!("Ignoring '{}': expected #id or a position", token),
            }
        }
        if requests.is_empty() {
            continue;
        }
        let report = dispatcher.dispatch_all(requests).await?;
        print_report(&report, false)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection("#603"), Some(QueryRequest::Id(603)));
        assert_eq!(parse_selection("#-4"), Some(QueryRequest::Id(-4)));
        assert_eq!(parse_selection("12"), Some(QueryRequest::Position(12)));
        assert_eq!(parse_selection("-1"), None);
        assert_eq!(parse_selection("#"), None);
        assert_eq!(parse_selection("alien"), None);
    }

    #[test]
    fn test_collect_requests_order() {
        let requests = collect_requests(vec![3], vec![603], vec!["[1, 0]".to_string()]);
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0], QueryRequest::Position(3));
        assert_eq!(requests[1], QueryRequest::Id(603));
        assert_eq!(
            requests[2],
            QueryRequest::Embedding {
                label: "[1, 0]".to_string(),
                raw: RawEmbedding::Text("[1, 0]".to_string()),
            }
        );
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("short", 10), "short");
        assert_eq!(clip("abcdefghij", 4), "abcd...");
    }

    #[test]
    fn test_parse_import_skips_bad_lines() {
        let codec = VectorCodec::new(2).unwrap();
        let content = concat!(
            "{\"id\": 1, \"title\": \"Alien\", \"popularity\": 9.5, \"embedding\": [1, 0]}\n",
            "\n",
            "{\"id\": 2, \"title\": \"Heat\", \"embedding\": \"{0,1}\"}\n",
            "{\"id\": 3, \"title\": \"Short\", \"embedding\": [1]}\n",
            "{\"id\": 4, \"title\": \"NaN\", \"embedding\": \"[1, NaN]\"}\n",
            "garbage\n",
        );

        let (records, skipped) = parse_import(content, &codec);
        assert_eq!(skipped, 3);
        let ids: Vec<i64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(records[0].popularity, 9.5);
    }

    #[test]
    fn test_default_config_template_parses() {
        let config: Config = toml::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.catalog.dimension, 387);
        assert_eq!(config.search.top_k, 5);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_build_catalog_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("movies.jsonl");
        std::fs::write(
            &path,
            concat!(
                "{\"id\": 1, \"title\": \"Alien\", \"embedding\": \"{1,0}\"}\n",
                "{\"id\": 2, \"title\": \"Bad\", \"embedding\": \"{1,0,0}\"}\n",
            ),
        )
        .unwrap();

        let mut config = Config::default();
        config.catalog.dimension = 2;
        let (_, catalog, stats) = build_catalog(&config, &path).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(stats.rejected, 1);

        let missing = build_catalog(&config, &dir.path().join("none.jsonl"));
        assert!(missing.is_err());
    }
}

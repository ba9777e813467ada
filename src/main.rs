use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amlwatch::api::{self, AppState};
use amlwatch::config::Config;
use amlwatch::extract::{EntityExtractor, FallbackExtractor, GeminiExtractor, PatternExtractor};
use amlwatch::fetch::{HttpFetcher, Retriever};
use amlwatch::ingest::{scheduler, BackfillOptions, CycleReport, Ingestor};
use amlwatch::storage::{Store, StoreError};

/// Get the config directory path (~/.config/amlwatch/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("amlwatch"))
}

/// Create `dir` if needed, restricted to the current user on Unix.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        println!("Created directory: {}", dir.display());
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }
    Ok(())
}

/// Delete the database and its WAL side files.
fn reset_database(db_path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = db_path.as_os_str().to_owned();
        path.push(suffix);
        let path = PathBuf::from(path);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
        }
    }
    println!("Database reset.");
    Ok(())
}

fn print_report(report: &CycleReport) {
    for source in &report.sources {
        match &source.result {
            Ok(stats) => println!(
                "  {:<12} {} new, {} already stored, {} skipped, {} entities{}",
                source.source,
                stats.inserted,
                stats.existing,
                stats.dropped,
                stats.entities,
                if stats.pages > 1 {
                    format!(" ({} pages)", stats.pages)
                } else {
                    String::new()
                }
            ),
            Err(e) => println!("  {:<12} FAILED: {}", source.source, e),
        }
    }
    println!(
        "{} new articles, {} entities in {:.1}s",
        report.inserted(),
        report.entities(),
        report.elapsed.as_secs_f64()
    );
    if let Some(reason) = &report.aborted {
        eprintln!("Cycle aborted: {}", reason);
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "amlwatch",
    about = "Ingest AML enforcement news into SQLite and serve it over HTTP"
)]
struct Args {
    /// Config file (default: ~/.config/amlwatch/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run a single ingestion cycle, print a summary and exit
    #[arg(long)]
    once: bool,

    /// Also ingest older archive pages of paginated sources, then exit
    #[arg(long, conflicts_with = "once")]
    backfill: bool,

    /// Stop a backfill at entries published before this date
    #[arg(long, value_name = "YYYY-MM-DD", requires = "backfill")]
    since: Option<NaiveDate>,

    /// Reset database (delete and recreate)
    #[arg(long)]
    reset_db: bool,

    /// Override the API listen address from the config file
    #[arg(long, value_name = "ADDR")]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => {
            let config_dir = get_config_dir()?;
            ensure_private_dir(&config_dir)?;
            config_dir.join("config.toml")
        }
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    tracing::debug!(config = ?config, "Effective configuration");

    let registry = config.registry().context("Invalid source registry")?;

    let db_path = match &config.database_path {
        Some(path) => path.clone(),
        None => config_path
            .parent()
            .map(|dir| dir.join("amlwatch.db"))
            .unwrap_or_else(|| PathBuf::from("amlwatch.db")),
    };
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    if args.reset_db {
        reset_database(&db_path)?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let store = match Store::open(db_path_str).await {
        Ok(store) => store,
        Err(StoreError::Locked) => {
            eprintln!(
                "Error: The database at {} is locked by another process.",
                db_path.display()
            );
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    let http = HttpFetcher::new(&config.user_agent).context("Failed to build HTTP client")?;
    let pattern = PatternExtractor::new(config.deny_list.clone());
    let extractor: Arc<dyn EntityExtractor> = match config.gemini_api_key() {
        Some(key) => {
            tracing::info!("Model-backed extraction enabled, pattern extraction as fallback");
            Arc::new(FallbackExtractor::new(
                Box::new(GeminiExtractor::new(key)),
                Box::new(pattern),
            ))
        }
        None => Arc::new(pattern),
    };

    let ingestor = Ingestor::new(registry, Arc::new(Retriever::new(http)), extractor, store.clone())
        .with_fetch_timeout(config.fetch_timeout());

    if args.once || args.backfill {
        let outcome = if args.backfill {
            let options = BackfillOptions {
                cutoff: args.since,
                ..BackfillOptions::default()
            };
            ingestor.backfill(&options).await
        } else {
            ingestor.run_cycle().await
        };
        let aborted = match &outcome.report {
            Some(report) => {
                print_report(report);
                report.is_aborted()
            }
            None => false,
        };
        store.close().await;
        if aborted {
            std::process::exit(1);
        }
        return Ok(());
    }

    let timer = scheduler::spawn(ingestor.clone(), config.refresh_interval());

    let listen_addr = args.listen.unwrap_or_else(|| config.listen_addr.clone());
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", listen_addr))?;

    let state = Arc::new(AppState {
        store: store.clone(),
        ingestor,
    });
    api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
    })
    .await
    .context("API server failed")?;

    if let Some(timer) = timer {
        timer.abort();
    }
    store.close().await;

    println!("Goodbye!");
    Ok(())
}

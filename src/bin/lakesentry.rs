//! Lakesentry CLI: classification pipeline server and one-shot tools.
//!
//! Usage:
//!   lakesentry serve [--config path] [--db path]
//!   lakesentry classify <file-event.json> [--config path] [--db path]
//!   lakesentry records [--limit N] [--db path]
//!   lakesentry adapters [--config path]

use clap::{ArgAction, Parser, Subcommand};
use lakesentry::server;
use lakesentry::{FileEvent, MetadataStore, OpenStore, Pipeline, SentinelConfig, SqliteStore};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lakesentry",
    version,
    about = "Sensitive-data classification for data-lake files"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Path to YAML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Log verbosity (-v info, -vv debug, -vvv trace); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP surface and the queue worker
    Serve,
    /// Classify one file event document and print the result
    Classify {
        /// Path to a JSON file event
        event: PathBuf,
    },
    /// List stored metadata records, most recently updated first
    Records {
        /// Maximum number of records to show
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List the classifier adapters the configuration activates
    Adapters,
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default database path (~/.local/share/lakesentry/lakesentry.db)
fn default_db_path() -> PathBuf {
    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".local/share"));
    data_dir.join("lakesentry").join("lakesentry.db")
}

fn load_config(path: Option<&Path>) -> Result<SentinelConfig, String> {
    SentinelConfig::load(path).map_err(|e| format!("Failed to load configuration: {}", e))
}

fn open_store(db: Option<PathBuf>, config: &SentinelConfig) -> Result<Arc<SqliteStore>, String> {
    let db_path = db
        .or_else(|| config.metadata.db_path.clone())
        .unwrap_or_else(default_db_path);
    let store = SqliteStore::open(&db_path).map_err(|e| format!("Failed to open database: {}", e))?;
    Ok(Arc::new(store))
}

fn build_pipeline(config: SentinelConfig, db: Option<PathBuf>) -> Result<Pipeline, String> {
    let store = open_store(db, &config)?;
    Pipeline::from_config(config, store).map_err(|e| format!("Failed to assemble pipeline: {}", e))
}

async fn cmd_serve(pipeline: Pipeline) -> i32 {
    let addr = match pipeline.config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: failed to bind {}: {}", addr, e);
            return 1;
        }
    };

    let (ingestion, worker, receiver) = pipeline.queue();
    let worker = tokio::spawn(async move { worker.run(receiver).await });
    tracing::info!(
        %addr,
        adapters = ?pipeline.config.active_adapters(),
        "lakesentry serving"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
    };
    let served = server::serve(listener, pipeline.app_state(ingestion), shutdown).await;

    // The server owned the only producer; the worker drains what is left and stops
    match worker.await {
        Ok(stats) => tracing::info!(?stats, "queue drained"),
        Err(e) => tracing::error!(error = %e, "queue worker failed"),
    }

    match served {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: server failed: {}", e);
            1
        }
    }
}

async fn cmd_classify(pipeline: Pipeline, path: &Path) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read {}: {}", path.display(), e);
            return 1;
        }
    };
    let event: FileEvent = match serde_json::from_str(&text) {
        Ok(event) => event,
        Err(e) => {
            eprintln!("Error: {} is not a valid file event: {}", path.display(), e);
            return 1;
        }
    };

    match pipeline.orchestrator.process(&event).await {
        Ok(result) => match serde_json::to_string_pretty(&result) {
            Ok(json) => {
                println!("{}", json);
                0
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_records(store: &dyn MetadataStore, limit: Option<usize>) -> i32 {
    let records = match store.list(limit) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    if records.is_empty() {
        println!("No metadata records stored.");
        return 0;
    }
    println!("{:<48}  {:<12}  {:>10}  {:<25}", "PATH", "LABEL", "CONFIDENCE", "ANALYZED");
    println!("{}", "-".repeat(101));
    for record in records {
        println!(
            "{:<48}  {:<12}  {:>10.2}  {:<25}",
            record.file_path,
            record.classification.as_str(),
            record.confidence,
            record.analysis_timestamp.to_rfc3339()
        );
    }
    0
}

fn cmd_adapters(config: &SentinelConfig) -> i32 {
    let active = config.active_adapters();
    if active.is_empty() {
        println!("No classifier adapters configured.");
        return 0;
    }
    for id in active {
        println!("{}", id);
    }
    0
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let code = match cli.command {
        Commands::Adapters => cmd_adapters(&config),
        Commands::Records { limit } => match open_store(cli.db, &config) {
            Ok(store) => cmd_records(store.as_ref(), limit),
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Serve => match build_pipeline(config, cli.db) {
            Ok(pipeline) => cmd_serve(pipeline).await,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
        Commands::Classify { event } => match build_pipeline(config, cli.db) {
            Ok(pipeline) => cmd_classify(pipeline, &event).await,
            Err(e) => {
                eprintln!("Error: {}", e);
                1
            }
        },
    };
    std::process::exit(code);
}

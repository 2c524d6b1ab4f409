//! histdb CLI - system catalog and destination maintenance.

use clap::{Parser, Subcommand};
use histdb::{Config, HistError, SchemaExecutor, SystemCatalog};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "histdb")]
#[command(about = "History-preserving change-data-capture destination for PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "histdb.yaml")]
    config: PathBuf,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new, empty system catalog file
    InitSysdb {
        /// Catalog file to create [default: sysdb.path from the configuration]
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show tracked relations and stored connectors
    Status {
        /// Catalog file to open [default: sysdb.path from the configuration]
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Test the destination connection
    HealthCheck,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), HistError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format);

    match cli.command {
        Commands::InitSysdb { path } => {
            let path = sysdb_path(path, &cli.config)?;
            let sysdb = SystemCatalog::init_create(&path)?;
            let version = sysdb.schema_version()?;
            sysdb.close()?;

            if cli.output_json {
                let report = json!({ "path": path, "schema_version": version });
                println!("{}", to_json(&report)?);
            } else {
                println!("Created system catalog {}", path.display());
                println!("  Schema version: {}", version);
            }
        }

        Commands::Status { path } => {
            let path = sysdb_path(path, &cli.config)?;
            let sysdb = SystemCatalog::init(&path)?;
            let version = sysdb.schema_version()?;
            let relations = sysdb.read_relations()?;
            let attributes = sysdb.read_attributes()?;
            let databases = sysdb.read_database_connectors()?;
            let sources = sysdb.read_source_connectors()?;
            sysdb.close()?;

            if cli.output_json {
                let report = json!({
                    "path": path,
                    "schema_version": version,
                    "relations": relations,
                    "attributes": attributes,
                    "database_connectors": databases,
                    "source_connectors": sources,
                });
                println!("{}", to_json(&report)?);
            } else {
                println!("System catalog {}", path.display());
                println!("  Schema version: {}", version);
                println!("  Relations: {}", relations.len());
                for relation in &relations {
                    let columns = attributes
                        .iter()
                        .filter(|a| a.column.table == relation.table)
                        .count();
                    match &relation.parent {
                        Some(parent) => println!(
                            "    {} ({} columns, parent {})",
                            relation.table, columns, parent
                        ),
                        None => println!("    {} ({} columns)", relation.table, columns),
                    }
                }
                println!("  Database connectors: {}", databases.len());
                for db in &databases {
                    println!(
                        "    {} ({}://{}:{}/{})",
                        db.name, db.db_type, db.db_host, db.db_port, db.db_name
                    );
                }
                println!("  Source connectors: {}", sources.len());
                for source in &sources {
                    println!(
                        "    {} ({}, topics: {})",
                        source.name,
                        source.brokers,
                        source.topics.join(", ")
                    );
                }
            }
        }

        Commands::HealthCheck => {
            let config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);
            let cancel_token = setup_signal_handler()?;

            let executor = SchemaExecutor::connect_postgres(&config.destination).await?;
            let result = executor.health_check(&cancel_token).await?;

            if cli.output_json {
                println!("{}", to_json(&result)?);
            } else {
                println!("Health Check Results:");
                println!(
                    "  Destination ({}): {} ({}ms)",
                    result.destination,
                    if result.connected { "OK" } else { "FAILED" },
                    result.latency_ms
                );
                if let Some(ref err) = result.error {
                    println!("    Error: {}", err);
                }
            }

            if let Some(err) = result.error {
                return Err(HistError::destination(
                    result.destination,
                    "SELECT 1",
                    format!("health check failed: {}", err),
                ));
            }
        }
    }

    Ok(())
}

/// Resolve the catalog path: an explicit `--path` wins, otherwise the
/// configuration file must exist and name one.
fn sysdb_path(path: Option<PathBuf>, config: &Path) -> Result<PathBuf, HistError> {
    match path {
        Some(path) => Ok(path),
        None => Ok(Config::load(config)?.sysdb.path),
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<String, HistError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| HistError::Config(format!("cannot render JSON output: {}", e)))
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Logs go to stderr so --output-json stays parseable.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Cancel in-flight DDL on SIGINT (Ctrl-C) or SIGTERM.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, HistError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigint.recv() => eprintln!("\nReceived SIGINT. Cancelling..."),
            _ = sigterm.recv() => eprintln!("\nReceived SIGTERM. Cancelling..."),
        }
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, HistError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Cancelling...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}

//! textgraph CLI - Command-line interface
//!
//! Usage:
//!   textgraph process <path|->
//!   textgraph extract <path|->
//!   textgraph snapshot
//!   textgraph clear
//!
//! Author: hephaex@gmail.com

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use textgraph_core::{AppConfig, GraphBackend, GraphSnapshot, LoggingConfig};
use textgraph_graph::{GraphStore, MemoryGraphStore, SurrealDbStore};
use textgraph_pipeline::{create_llm_client, Pipeline, ProcessReport};

#[derive(Parser)]
#[command(name = "textgraph")]
#[command(about = "Turn text into a typed entity/relationship graph")]
#[command(version)]
struct Cli {
    /// TOML configuration file (environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of a summary
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract from text and reconcile into the graph
    Process {
        /// Input file, or `-` for stdin
        input: String,

        /// Clear the graph before processing
        #[arg(long)]
        clear_first: bool,
    },
    /// Extract from text without touching the graph
    Extract {
        /// Input file, or `-` for stdin
        input: String,
    },
    /// Print every entity and relationship
    Snapshot,
    /// Delete every relationship and entity
    Clear,
}

fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::from_file(path)?.with_env_override()?,
        None => AppConfig::from_env()?,
    };
    Ok(config)
}

/// `snapshot` and `clear` only make sense against a store that outlives the process
fn require_persistent_backend(config: &AppConfig, command: &str) -> anyhow::Result<()> {
    if config.database.backend == GraphBackend::Memory {
        anyhow::bail!(
            "`{command}` needs a persistent graph store; the in-memory store starts empty \
             on every run (set GRAPH_BACKEND=surrealdb or database.backend in the config file)"
        );
    }
    Ok(())
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn GraphStore>> {
    match config.database.backend {
        GraphBackend::Memory => Ok(Arc::new(MemoryGraphStore::new())),
        GraphBackend::SurrealDb => {
            let store = SurrealDbStore::new(&config.database).await?;
            store.init_schema().await?;
            Ok(Arc::new(store))
        }
    }
}

async fn read_input(input: &str) -> anyhow::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        Ok(text)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {input}"))
    }
}

fn print_report(report: &ProcessReport) {
    println!(
        "method={} entities={} relationships={} (existing={}, skipped={}, failed={}) in {}ms",
        report.method,
        report.entity_count,
        report.relationship_count,
        report.relationships_existing,
        report.relationships_skipped,
        report.relationships_failed,
        report.processing_time_ms
    );
    for entity in &report.entities {
        println!("  {} [{}] {:.2}", entity.label, entity.entity_type, entity.confidence);
    }
    for rel in &report.relationships {
        println!(
            "  {} -{}-> {} {:.2}",
            rel.source_label, rel.relation_type, rel.target_label, rel.confidence
        );
    }
}

fn print_snapshot(snapshot: &GraphSnapshot) {
    println!(
        "{} entities, {} relationships",
        snapshot.entities.len(),
        snapshot.relationships.len()
    );
    for entity in &snapshot.entities {
        println!("  {} [{}] {:.2}", entity.label, entity.entity_type, entity.confidence);
    }
    for rel in &snapshot.relationships {
        println!(
            "  {} -{}-> {} {:.2}",
            rel.source_label, rel.relation_type, rel.target_label, rel.confidence
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Snapshot => require_persistent_backend(&config, "snapshot")?,
        Commands::Clear => require_persistent_backend(&config, "clear")?,
        Commands::Process { .. } | Commands::Extract { .. } => {}
    }

    let store = open_store(&config).await?;
    let llm_client = if config.llm.enabled {
        Some(create_llm_client(&config.llm)?)
    } else {
        None
    };
    let pipeline = Pipeline::from_config(&config, store, llm_client);

    match cli.command {
        Commands::Process { input, clear_first } => {
            let text = read_input(&input).await?;
            if clear_first {
                pipeline.clear_graph().await?;
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupted, cancelling request");
                    on_interrupt.cancel();
                }
            });

            let report = pipeline.process(&text, &cancel).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
        }
        Commands::Extract { input } => {
            let text = read_input(&input).await?;
            let result = pipeline.extract(&text).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "method={} entities={} relationships={}",
                    result.method,
                    result.entities.len(),
                    result.relationships.len()
                );
                for entity in &result.entities {
                    println!("  {} [{}] {:.2}", entity.label, entity.entity_type, entity.confidence);
                }
                for rel in &result.relationships {
                    println!(
                        "  {} -{}-> {} {:.2}",
                        rel.source, rel.relation_type, rel.target, rel.confidence
                    );
                }
            }
        }
        Commands::Snapshot => {
            let snapshot = pipeline.snapshot().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                print_snapshot(&snapshot);
            }
        }
        Commands::Clear => {
            let report = pipeline.clear_graph().await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Deleted {} relationships and {} entities",
                    report.relationships_deleted, report.entities_deleted
                );
            }
        }
    }

    Ok(())
}

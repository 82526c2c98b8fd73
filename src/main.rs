//! # contract-rag CLI (`crag`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crag init` | Create the SQLite database and run schema migrations |
//! | `crag ingest <files...>` | Index contract files (PDF, DOCX, text) |
//! | `crag ask <contract_id> "<question>"` | Extract a clause from one contract |
//! | `crag search <contract_id> "<question>"` | Show the ranked chunks retrieval would use |
//! | `crag get <contract_id>` | Print the stored chunks of a contract |
//! | `crag serve` | Start the HTTP server |
//!
//! Logs go to stderr and honour `RUST_LOG`; command output goes to stdout.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use contract_rag::{ask, config, get, ingest, migrate, server};

#[derive(Parser)]
#[command(
    name = "crag",
    about = "Retrieval-augmented clause extraction over contracts",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/crag.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest contract files.
    ///
    /// Each file is identified by the SHA-256 of its bytes; files already
    /// indexed are reported as duplicates without calling the embedding model.
    Ingest {
        /// Files to ingest.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Show identity and chunk counts without embedding or writing.
        #[arg(long)]
        dry_run: bool,

        /// Print reports as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Ask a question about one contract.
    Ask {
        /// Contract id (64-character hex SHA-256).
        contract_id: String,
        /// The question, e.g. "Extract the termination clause".
        question: String,
        #[arg(long)]
        json: bool,
    },

    /// Rank the chunks of one contract against a question.
    Search {
        contract_id: String,
        question: String,
        /// Number of chunks to return (defaults to retrieval.top_k).
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        json: bool,
    },

    /// Print the stored chunks of a contract.
    Get {
        contract_id: String,
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "contract_rag=debug,contract_rag_core=debug"
    } else {
        "contract_rag=info,contract_rag_core=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            if cfg.store.backend == "sqlite" {
                migrate::run_migrations(&cfg).await?;
                println!("Database initialized successfully.");
            } else {
                println!(
                    "Store backend '{}' needs no local schema; index '{}' must already exist.",
                    cfg.store.backend, cfg.elasticsearch.index
                );
            }
        }
        Commands::Ingest {
            files,
            dry_run,
            json,
        } => {
            ingest::run_ingest(&cfg, &files, dry_run, json).await?;
        }
        Commands::Ask {
            contract_id,
            question,
            json,
        } => {
            ask::run_ask(&cfg, &contract_id, &question, json).await?;
        }
        Commands::Search {
            contract_id,
            question,
            limit,
            json,
        } => {
            ask::run_search(&cfg, &contract_id, &question, limit, json).await?;
        }
        Commands::Get { contract_id, json } => {
            get::run_get(&cfg, &contract_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

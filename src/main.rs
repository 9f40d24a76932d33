//! # Ragnar CLI
//!
//! ```bash
//! ragnar --config ./ragnar.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragnar index` | Rebuild the vector index from the knowledge directory and persist it |
//! | `ragnar query "<question>"` | Answer one question and print sources |
//! | `ragnar chat` | Interactive question loop on stdin |
//! | `ragnar serve` | Start the JSON HTTP API |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use ragnar::agent::QueryEngine;
use ragnar::chunk::chunk_documents;
use ragnar::config::{load_config, Config};
use ragnar::embedding::{Embedder, OpenAiEmbedder};
use ragnar::index::VectorIndex;
use ragnar::llm::{ChatModel, OpenAiChatModel};
use ragnar::loader::LoaderRegistry;
use ragnar::retrieval::RetrievalService;
use ragnar::server::run_server;

/// Retrieval-augmented question answering over a local knowledge
/// directory.
#[derive(Parser)]
#[command(
    name = "ragnar",
    about = "Retrieval-augmented question answering over a local knowledge directory",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./ragnar.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the vector index from the knowledge directory and persist it.
    ///
    /// Runs a full rebuild even if a persisted index already exists. The
    /// corpus changes out-of-band, so this is the one write path; `query`,
    /// `chat`, and `serve` only read.
    Index,

    /// Answer a single question and print the answer, sources, and the
    /// agent that handled it.
    Query { question: String },

    /// Interactive loop: read questions from stdin until `exit`/`quit`/EOF.
    Chat,

    /// Start the JSON HTTP API (`POST /query`, `GET /health`).
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ragnar=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Index => cmd_index(&config).await,
        Commands::Query { question } => cmd_query(&config, &question).await,
        Commands::Chat => cmd_chat(&config).await,
        Commands::Serve => cmd_serve(&config).await,
    }
}

fn make_embedder(config: &Config) -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(OpenAiEmbedder::new(&config.embedding)?))
}

/// Wire up the long-lived collaborators: capability clients and the
/// retrieval service with its load-or-rebuild startup sequence.
async fn build_engine(config: &Config) -> Result<Arc<QueryEngine>> {
    let embedder = make_embedder(config)?;
    let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(&config.llm)?);
    let registry = LoaderRegistry::standard();
    let retrieval = Arc::new(RetrievalService::open(config, embedder, &registry).await?);
    if !retrieval.has_index() {
        println!("warning: no index available; answers will not use the knowledge base");
    }
    Ok(Arc::new(QueryEngine::new(chat, retrieval)))
}

async fn cmd_index(config: &Config) -> Result<()> {
    let embedder = make_embedder(config)?;
    let registry = LoaderRegistry::standard();

    let docs = registry.load_dir(&config.knowledge.dir)?;
    let chunks = chunk_documents(
        &docs,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );

    println!("index rebuild");
    println!("  documents loaded: {}", docs.len());
    println!("  chunks: {}", chunks.len());

    if chunks.is_empty() {
        println!("  nothing to index");
        return Ok(());
    }

    let index = VectorIndex::build(
        chunks,
        embedder.as_ref(),
        config.embedding.batch_size,
        config.index.metric,
    )
    .await?;
    index.persist(&config.index.path)?;

    println!("  indexed chunks: {}", index.len());
    println!("  written to: {}", config.index.path.display());
    Ok(())
}

async fn cmd_query(config: &Config, question: &str) -> Result<()> {
    let engine = build_engine(config).await?;
    let response = engine.run_query(question).await?;

    println!("{}", response.answer);
    if !response.sources.is_empty() {
        println!();
        println!("sources: {}", response.sources.join(", "));
    }
    println!("agent: {}", response.agent_used.as_str());
    Ok(())
}

async fn cmd_chat(config: &Config) -> Result<()> {
    let engine = build_engine(config).await?;

    println!("ragnar chat (type 'exit' or 'quit' to leave)");
    let stdin = std::io::stdin();
    loop {
        print!("you> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break; // EOF
        }
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match engine.run_query(question).await {
            Ok(response) => {
                println!("{}", response.answer);
                if !response.sources.is_empty() {
                    println!("  (sources: {})", response.sources.join(", "));
                }
            }
            Err(e) => println!("error: {e:#}"),
        }
    }
    Ok(())
}

async fn cmd_serve(config: &Config) -> Result<()> {
    let engine = build_engine(config).await?;
    run_server(config, engine).await
}

//! Command-line interface for Ace.

pub mod chat;

use std::path::{Path, PathBuf};

use ace_config::Config;
use ace_core::{open_graph_store, TutorService};
use ace_index::GraphQuery;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "ace=info,ace_cli=info,ace_core=info,ace_index=info,ace_providers=info";
const VERBOSE_FILTER: &str = "ace=debug,ace_cli=debug,ace_core=debug,ace_index=debug,ace_providers=debug";

#[derive(Parser, Debug)]
#[command(name = "ace")]
#[command(about = "Course tutor answering questions from syllabus text and a concept graph")]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to ./ace.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Index a syllabus file and merge its concepts into the graph
    Ingest {
        /// Path to the syllabus text
        file: PathBuf,
    },

    /// Ask a single question
    Ask {
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Interactive question loop on stdin (exit, quit or EOF to stop)
    Chat,

    /// Show the graph context found for some text
    Topics {
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    debug!(?config.graph.backend, snapshot = ?config.index.snapshot_path, "Configuration loaded");

    execute(cli.command, &config).await
}

fn init_logging(verbose: bool) {
    let default = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn execute(command: Command, config: &Config) -> Result<()> {
    match command {
        Command::Ingest { file } => ingest(&file, config).await,
        Command::Ask { question } => {
            let service = TutorService::from_config(config).await?;
            let answer = service.answer_question(&question.join(" ")).await;
            println!("{}", answer.response);
            Ok(())
        }
        Command::Chat => {
            let service = TutorService::from_config(config).await?;
            let input = tokio::io::BufReader::new(tokio::io::stdin());
            let mut output = tokio::io::stdout();
            let service = &service;
            let chat = chat::chat_loop(input, &mut output, |question| async move {
                service.answer_question(&question).await.response
            });
            tokio::select! {
                answered = chat => {
                    debug!(answered = answered?, "Chat ended");
                }
                _ = tokio::signal::ctrl_c() => {
                    debug!("Chat interrupted");
                }
            }
            service.shutdown().await;
            Ok(())
        }
        Command::Topics { text } => {
            let store = open_graph_store(config, reqwest::Client::new())?;
            let query = GraphQuery::new(store).with_limit(config.graph.context_limit);
            let lines = query.context_for(&text.join(" ")).await?;
            if lines.is_empty() {
                println!("No relevant topics found in the graph.");
            }
            for line in lines {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn ingest(file: &Path, config: &Config) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let service = TutorService::from_config(config).await?;
    let response = service.process_syllabus(&file_name, &bytes).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !response.success {
        bail!("{}", response.message);
    }
    Ok(())
}

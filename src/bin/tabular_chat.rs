//! Tabular chat command line interface
//!
//! # Usage
//!
//! ```bash
//! # Show what is loaded from the data directory
//! tabular-chat status
//!
//! # Ask a single question
//! tabular-chat ask "Which region has the highest total sales?"
//!
//! # Interactive session keeping conversation history
//! tabular-chat --data-dir ./uploads chat
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tabular_rag::{
    create_embedder, create_llm_client, AssistantConfig, ChatMessage, DatasetState,
    FileDatasetLoader, QueryOrchestrator,
};

#[derive(Parser)]
#[command(name = "tabular-chat")]
#[command(version = "0.1.0")]
#[command(about = "Ask questions about CSV and Excel files")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory containing .csv, .xlsx and .xls files
    #[arg(long, global = true, env = "TABULAR_RAG_DATA_DIR")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the data directory and print its status as JSON
    Status,

    /// Answer one question
    Ask {
        /// The question to answer
        question: String,
    },

    /// Interactive question loop on stdin
    Chat,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AssistantConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config = config.with_data_dir(dir);
    }

    let llm = create_llm_client().context("configuring the LLM backend")?;
    let embedder = create_embedder().context("configuring the embedding backend")?;
    let state = Arc::new(DatasetState::new(
        config,
        Arc::new(FileDatasetLoader),
        llm,
        embedder,
    )?);
    let orchestrator = QueryOrchestrator::new(state.clone());

    match cli.command {
        Commands::Status => {
            if let Err(e) = state.initialize(false).await {
                eprintln!("Dataset not loaded: {}", e);
            }
            println!("{}", serde_json::to_string_pretty(&state.status().await)?);
        }
        Commands::Ask { question } => {
            let answer = orchestrator.answer(&question, &[]).await;
            println!("{}", answer.text);
        }
        Commands::Chat => chat_loop(&orchestrator).await?,
    }

    Ok(())
}

async fn chat_loop(orchestrator: &QueryOrchestrator) -> Result<()> {
    let stdin = io::stdin();
    let mut history: Vec<ChatMessage> = Vec::new();

    loop {
        print!("> ");
        io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let question = line.trim();
        match question {
            "" => continue,
            "exit" | "quit" => break,
            "/rebuild" => {
                match orchestrator.state().rebuild().await {
                    Ok(_) => println!("Rebuilt."),
                    Err(e) => println!("Rebuild failed: {}", e),
                }
                continue;
            }
            _ => {}
        }

        let answer = orchestrator.answer(question, &history).await;
        println!("{}\n", answer.text);

        history.push(ChatMessage::user(question));
        history.push(ChatMessage::assistant(answer.text));
    }

    Ok(())
}

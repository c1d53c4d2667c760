//! Main module for the Sibyl CLI application.
//!
//! This module provides the main function and auxiliary functionality for
//! the CLI: command parsing, configuration loading, wiring the semantic
//! memory and response pipeline together, and dispatching the subcommands.
//!
//! # Examples
//!
//! Adding a document and chatting against it:
//!
//! ```sh
//! sibyl add "Diversification lowers risk." -s doc1
//! sibyl chat -u alice
//! ```
//!
//! Initializing the application's configuration and default persona:
//!
//! ```sh
//! sibyl init
//! ```

use std::error::Error;
use std::io::{BufRead, Write as _};
use std::sync::Arc;

use clap::Parser;
use crossterm::{
    ExecutableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use once_cell::sync::OnceCell;
use tokio::sync::RwLock;
use tracing::debug;

use sibyl::commands::{Cli, Commands};
use sibyl::config::{self, SibylConfig};
use sibyl::embedding::OpenAiEmbedder;
use sibyl::inference::OpenAiEngine;
use sibyl::memory::SemanticMemory;
use sibyl::pipeline::ChatPipeline;
use sibyl::prompt::{PersonaTemplate, load_persona};

static TRACING: OnceCell<()> = OnceCell::new();

fn main() -> Result<(), Box<dyn Error>> {
    TRACING.get_or_init(|| {
        tracing_subscriber::fmt::init();
    });
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run())
}

/// Main asynchronous function of the Sibyl CLI.
///
/// Loads configuration, builds the pipeline, and executes the requested
/// command.
async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        return init();
    }

    let config_path = match std::env::var("SIBYL_CONFIG") {
        Ok(path) => path.into(),
        Err(_) => sibyl::config_dir()?.join("config.yaml"),
    };
    debug!("loading config from: {}", config_path.display());
    let config = config::load_config(config_path.to_str().ok_or("non-UTF-8 config path")?)?;

    let pipeline = build_pipeline(&config)?;

    match cli.command {
        Commands::Chat { user } => chat_loop(&pipeline, &user).await?,
        Commands::Add { content, source } => {
            let record = pipeline.add_document(&content, &source).await?;
            println!("added document {} ({})", record.id, record.source);
        }
        Commands::Search { query, top_k } => {
            let results = pipeline.search_documents(&query, top_k).await?;
            if results.is_empty() {
                println!("no documents stored");
            }
            for record in results {
                println!("[{}] ({}) {}", record.id, record.source, record.content);
            }
        }
        Commands::Delete { id } => {
            pipeline.delete_document(id).await?;
            println!("deleted document {id}; later documents were renumbered");
        }
        Commands::List { skip, limit } => {
            for record in pipeline.list_documents(skip, limit).await {
                println!(
                    "[{}] ({}) {}: {}",
                    record.id, record.source, record.created_at, record.content
                );
            }
        }
        Commands::Ingest { path } => {
            let count = ingest(&pipeline, &path).await?;
            println!("ingested {count} document(s) from {}", path.display());
        }
        Commands::Init => unreachable!("handled above"),
    }

    Ok(())
}

/// Wire the external providers, semantic memory, and pipeline from config.
fn build_pipeline(config: &SibylConfig) -> Result<ChatPipeline, Box<dyn Error>> {
    let embedder = Arc::new(OpenAiEmbedder::new(config));
    let engine = Arc::new(OpenAiEngine::new(config));

    let data_dir = match &config.data_dir {
        Some(dir) => dir.clone(),
        None => sibyl::data_dir()?,
    };
    let memory = SemanticMemory::open(&data_dir, embedder)?;

    let persona = match &config.persona {
        Some(name) => load_persona(name)?,
        None => PersonaTemplate::default(),
    };

    Ok(ChatPipeline::new(
        Arc::new(RwLock::new(memory)),
        engine,
        persona,
        config.max_history,
        config.retrieval_top_k,
    ))
}

/// Interactive chat REPL over `handle_message`.
async fn chat_loop(pipeline: &ChatPipeline, user: &str) -> Result<(), Box<dyn Error>> {
    println!("chatting as '{user}' (empty line or Ctrl-D to quit)");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            break;
        }

        let reply = pipeline.handle_message(user, message).await;

        stdout.execute(SetForegroundColor(Color::Blue))?;
        stdout.execute(SetAttribute(Attribute::Bold))?;
        println!("{}", reply.text);
        stdout.execute(SetAttribute(Attribute::Reset))?;
        stdout.execute(SetForegroundColor(Color::Reset))?;

        if !reply.sources.is_empty() {
            println!("(context: {})", reply.sources.join(", "));
        }
    }

    Ok(())
}

/// Ingest a file: a `.json` array becomes one document per element, anything
/// else becomes a single document sourced by its file name.
async fn ingest(pipeline: &ChatPipeline, path: &std::path::Path) -> Result<usize, Box<dyn Error>> {
    let content = std::fs::read_to_string(path)?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    if path.extension().is_some_and(|ext| ext == "json") {
        let value: serde_json::Value = serde_json::from_str(&content)?;
        if let serde_json::Value::Array(items) = value {
            let mut count = 0;
            for (i, item) in items.iter().enumerate() {
                pipeline
                    .add_document(&item.to_string(), &format!("{file_name}:{i}"))
                    .await?;
                count += 1;
            }
            return Ok(count);
        }
    }

    pipeline.add_document(&content, &file_name).await?;
    Ok(1)
}

/// Initializes the application's configuration and default persona.
///
/// Creates the necessary directories and files in YAML format, mirroring
/// what `load_config` and `load_persona` expect to find.
fn init() -> Result<(), Box<dyn Error>> {
    let config_dir = sibyl::config_dir()?;
    let personas_dir = config_dir.join("personas");
    std::fs::create_dir_all(&personas_dir)?;

    let persona_path = personas_dir.join("default.yaml");
    println!("writing persona: {}", persona_path.display());
    std::fs::write(&persona_path, serde_yaml::to_string(&PersonaTemplate::default())?)?;

    let config = SibylConfig {
        api_key: "CHANGEME".to_string(),
        api_base: "http://localhost:5001/v1".to_string(),
        model: "mistral-7b-openorca".to_string(),
        embedding_model: "all-MiniLM-L6-v2".to_string(),
        embedding_dimension: 384,
        max_history: 5,
        retrieval_top_k: 3,
        stop_words: vec![],
        data_dir: None,
        persona: Some("default".to_string()),
    };
    let config_path = config_dir.join("config.yaml");
    println!("writing config: {}", config_path.display());
    std::fs::write(&config_path, serde_yaml::to_string(&config)?)?;

    Ok(())
}

//! # ragchat CLI
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat init` | Create the SQLite database and run schema migrations |
//! | `ragchat ingest <file>` | Ingest a PDF or a text/markdown file |
//! | `ragchat scrape <url>` | Scrape a web page and ingest its text |
//! | `ragchat ask "<question>"` | Ask one question |
//! | `ragchat chat` | Interactive chat that keeps one session |
//! | `ragchat documents` | List ingested documents |
//! | `ragchat get <id>` | Show one document |
//! | `ragchat delete <id>` | Delete a document and its chunks |
//! | `ragchat serve` | Start the HTTP API |
//!
//! A missing config file is not an error; built-in defaults are used.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use ragchat::{app, config, logging, migrate, server};
use ragchat_core::generate::Answer;
use ragchat_core::ingest::IngestReport;
use ragchat_core::RagEngine;

/// Chat with your PDFs, web pages, and notes.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/ragchat.toml`; built-in defaults apply if it
    /// does not exist.
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Ingest a file. `.pdf` files go through PDF extraction; anything
    /// else is read as UTF-8 text.
    Ingest {
        /// Path to the file.
        file: PathBuf,
    },

    /// Scrape a web page and ingest its readable text.
    Scrape {
        /// `http://` or `https://` URL.
        url: String,
    },

    /// Ask a single question against the indexed documents.
    Ask {
        question: String,

        /// Continue an existing session.
        #[arg(long)]
        session: Option<String>,
    },

    /// Interactive chat. One session is kept until you type `exit`.
    Chat,

    /// List ingested documents, oldest first.
    Documents,

    /// Show a document's metadata.
    Get {
        /// Document id.
        id: String,
    },

    /// Delete a document and all of its chunks.
    Delete {
        /// Document id.
        id: String,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config, true)?;
    logging::init(&cfg.logging.level);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}.", cfg.db.path.display());
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        command => {
            let engine = app::build_engine(&cfg).await?;
            run_command(&engine, command).await?;
        }
    }

    Ok(())
}

async fn run_command(engine: &RagEngine, command: Commands) -> Result<()> {
    match command {
        Commands::Ingest { file } => {
            let report = ingest_file(engine, &file).await?;
            print_report(&report);
        }
        Commands::Scrape { url } => {
            let report = engine.ingest_url(&url).await?;
            print_report(&report);
        }
        Commands::Ask { question, session } => {
            let answer = engine.chat(session.as_deref(), &question).await?;
            print_answer(&answer);
            println!("session: {}", answer.session_id);
        }
        Commands::Chat => chat_loop(engine).await?,
        Commands::Documents => {
            let documents = engine.list_documents().await?;
            if documents.is_empty() {
                println!("No documents ingested yet.");
            }
            for doc in documents {
                let added = chrono::DateTime::from_timestamp(doc.created_at, 0)
                    .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| doc.created_at.to_string());
                println!(
                    "{}  {}  {:<4}  {:>6} chars  {:>4} chunks  {}",
                    doc.id,
                    added,
                    doc.kind.as_str(),
                    doc.char_count,
                    doc.chunk_count,
                    doc.source
                );
            }
        }
        Commands::Get { id } => {
            let doc = engine.get_document(&id).await?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
        }
        Commands::Delete { id } => {
            let removed = engine.delete_document(&id).await?;
            if removed == 0 {
                println!("No chunks found for document {}.", id);
            } else {
                println!("Deleted document {} ({} chunks).", id, removed);
            }
        }
        Commands::Init | Commands::Serve => {}
    }
    Ok(())
}

async fn ingest_file(engine: &RagEngine, path: &Path) -> Result<IngestReport> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("not a file: {}", path.display()))?;

    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

    let report = if is_pdf {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        engine.ingest_pdf(&name, &bytes).await?
    } else {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {} as UTF-8 text", path.display()))?;
        engine.ingest_text(&name, &text).await?
    };
    Ok(report)
}

async fn chat_loop(engine: &RagEngine) -> Result<()> {
    let mut session_id: Option<String> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    println!("Chatting with {} (type 'exit' to quit).", engine.backend_name());
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question == "exit" || question == "quit" {
            break;
        }

        match engine.chat(session_id.as_deref(), question).await {
            Ok(answer) => {
                print_answer(&answer);
                session_id = Some(answer.session_id);
            }
            Err(e) => eprintln!("error: {}", e),
        }
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!(
        "Ingested {} as {} ({} chars, {} chunks).",
        report.document.source, report.document.id, report.document.char_count,
        report.chunks_written
    );
    if report.chunks_failed > 0 {
        println!("  {} chunks could not be embedded and were skipped.", report.chunks_failed);
    }
}

fn print_answer(answer: &Answer) {
    println!("{}", answer.response);
    if !answer.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &answer.sources {
            println!("  - {}", source);
        }
    }
}

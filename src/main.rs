//! # pdf-chat CLI (`pdfchat`)
//!
//! Entry point for the PDF question-answering service.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pdfchat serve` | Start the HTTP API server |
//! | `pdfchat extract <file.pdf>` | Print page count and text statistics for a PDF |
//! | `pdfchat chunk <file>` | Preview chunk boundaries for a text file |
//!
//! ## Usage
//!
//! ```bash
//! pdfchat --config ./config/pdf-chat.toml serve
//! pdfchat extract paper.pdf
//! pdfchat chunk notes.txt --chunk-size 500
//! ```
//!
//! Logging is controlled with `RUST_LOG` (e.g. `RUST_LOG=pdf_chat=debug`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use pdf_chat::chunk::split_text;
use pdf_chat::config::load_config;
use pdf_chat::extract::extract_pdf;
use pdf_chat::server::run_server;

/// pdf-chat — an admission-controlled PDF question-answering service.
#[derive(Parser)]
#[command(
    name = "pdfchat",
    about = "Upload PDFs and ask questions about them via a remote LLM",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pdf-chat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to `[server].bind` from the configuration file and serves
    /// until terminated.
    Serve,

    /// Extract text from a PDF and print page count and size statistics.
    Extract {
        /// Path to the PDF file.
        file: PathBuf,

        /// Print the extracted text instead of statistics.
        #[arg(long)]
        text: bool,
    },

    /// Preview chunk boundaries for a plain-text file.
    Chunk {
        /// Path to the text file.
        file: PathBuf,

        /// Chunk size in characters.
        #[arg(long, default_value_t = 500)]
        chunk_size: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = load_config(&cli.config)?;
            run_server(&config).await
        }
        Commands::Extract { file, text } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let extracted = extract_pdf(&bytes)?;
            if text {
                println!("{}", extracted.text);
            } else {
                println!("pages: {}", extracted.pages);
                println!("chars: {}", extracted.text.len());
                println!(
                    "words: {}",
                    extracted.text.split_whitespace().count()
                );
            }
            Ok(())
        }
        Commands::Chunk { file, chunk_size } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let chunks = split_text(&content, chunk_size);
            println!("chunks: {}", chunks.len());
            for (i, chunk) in chunks.iter().enumerate() {
                println!("--- chunk {} ({} chars) ---", i, chunk.len());
                println!("{}", chunk);
            }
            Ok(())
        }
    }
}

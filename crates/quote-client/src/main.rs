//! Quote-client: отправляет котировки и следит за лентой реального времени.
//!
//! # Запуск
//!
//! ```bash
//! RUST_LOG=info cargo run -p quote-client -- watch
//! cargo run -p quote-client -- post --text "Simplicity is prerequisite for reliability." \
//!     --author "Edsger Dijkstra"
//! cargo run -p quote-client -- --server-addr 127.0.0.1:8080 list
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use quote_client::{connection::connect_feed, receiver::run_receive_loop, requests::QuoteApi};
use quote_common::{DEFAULT_HTTP_ADDR, NewQuote};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Клиент сервера котировок реального времени.
#[derive(Parser, Debug)]
#[command(name = "quote-client")]
#[command(version, about)]
struct Args {
    /// Адрес сервера котировок.
    #[arg(long, env = "QUOTE_SERVER_ADDR", default_value = DEFAULT_HTTP_ADDR)]
    server_addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Отправить котировку.
    Post {
        #[arg(long)]
        text: String,

        /// Если не указан, сохраняется как "Unknown".
        #[arg(long)]
        author: Option<String>,
    },
    /// Вывести все сохранённые котировки.
    List,
    /// Следить за новыми котировками до Ctrl+C.
    Watch,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run().await {
        error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Post { text, author } => {
            let candidate = NewQuote { text: Some(text), author };
            let quote = QuoteApi::new(&args.server_addr).post(&candidate).await?;
            println!("{}", serde_json::to_string_pretty(&quote).context("encode quote")?);
        }
        Command::List => {
            let quotes = QuoteApi::new(&args.server_addr).list().await?;
            info!(count = quotes.len(), "quotes loaded");
            for quote in quotes {
                println!("#{} \"{}\" ({})", quote.id, quote.text, quote.author);
            }
        }
        Command::Watch => {
            let feed = connect_feed(&args.server_addr).await?;
            let shutdown = async {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl+C received, shutting down...");
                } else {
                    std::future::pending::<()>().await;
                }
            };
            let received = run_receive_loop(feed, shutdown).await?;
            info!(received, "client shut down cleanly");
        }
    }

    Ok(())
}

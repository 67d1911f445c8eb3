//! minirpc-cli - Command-line interface for minirpc
//!
//! Provides both a REPL and one-shot command execution.

mod commands;
mod repl;

use clap::{Parser, Subcommand};
use colored::Colorize;
use minirpc_client::{Client, ConnectionConfig};
use minirpc_protocol::CodecType;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "minirpc-cli")]
#[command(about = "Command-line interface for minirpc servers")]
#[command(version)]
struct Cli {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:7411")]
    server: SocketAddr,

    /// Body encoding to negotiate
    #[arg(short, long, env = "MINIRPC_CODEC", default_value = "application/json")]
    codec: CodecType,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start interactive REPL
    Repl,

    /// Call a method once
    Call {
        /// Method to call, as Service.Method
        service_method: String,

        /// Argument JSON (or @file.json to read from file)
        args: String,
    },

    /// Issue concurrent Foo.Sum calls over one connection
    Bench {
        /// Number of calls
        #[arg(short, long, default_value = "5")]
        n: u32,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    // Free-form JSON values cannot be decoded from a non-self-describing encoding.
    if cli.codec != CodecType::Json && !matches!(cli.command, Some(Commands::Bench { .. })) {
        eprintln!(
            "{}: call and repl need --codec {}",
            "Error".red(),
            CodecType::Json
        );
        std::process::exit(1);
    }

    let config = ConnectionConfig::new().with_codec(cli.codec);
    let client = Client::dial(cli.server, config).await.map_err(|e| {
        eprintln!("{}: {}", "Connection failed".red(), e);
        e
    })?;

    match cli.command {
        Some(Commands::Repl) | None => {
            repl::run(client, cli.server).await?;
        }
        Some(cmd) => {
            let result = commands::execute(&client, cmd).await;

            match result {
                Ok(output) => {
                    println!("{}", output);
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red(), e);
                    std::process::exit(1);
                }
            }

            client.close().await?;
        }
    }

    Ok(())
}

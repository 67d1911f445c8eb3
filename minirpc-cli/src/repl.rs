//! Interactive REPL.

use crate::commands::{execute, format_json, parse_json_arg};
use crate::Commands;
use colored::Colorize;
use minirpc_client::Client;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::{Config, Editor};
use serde_json::Value;
use std::net::SocketAddr;

const HELP_TEXT: &str = r#"
Available commands:
  help                              Show this help

  call <Service.Method> <json>      Call a method with a JSON argument
  <Service.Method> <json>           Same as call
  bench [n]                         Issue n concurrent Foo.Sum calls

  pending                           Show calls awaiting a reply

  quit, exit                        Exit the REPL
"#;

pub async fn run(client: Client, addr: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", "minirpc CLI".bold().cyan());
    println!("{} {} ({})", "Connected to".green(), addr, client.codec());

    let config = Config::builder()
        .history_ignore_space(true)
        .auto_add_history(true)
        .build();
    let mut rl: Editor<(), DefaultHistory> = Editor::with_config(config)?;

    let history_path = std::env::var("HOME")
        .map(|h| std::path::PathBuf::from(h).join(".minirpc_history"))
        .unwrap_or_else(|_| ".minirpc_history".into());
    let _ = rl.load_history(&history_path);

    println!("Type 'help' for available commands.\n");

    loop {
        let prompt = format!("{} ", "minirpc>".cyan());
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                match execute_repl_command(&client, line).await {
                    Ok(Some(output)) => println!("{}\n", output),
                    Ok(None) => break,
                    Err(e) => println!("{}: {}\n", "Error".red(), e),
                }

                if !client.is_available() {
                    println!("{}", "Connection lost.".red());
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(err) => {
                println!("{}: {:?}", "Error".red(), err);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);

    let _ = client.close().await;
    println!("{}", "Disconnected.".dimmed());

    Ok(())
}

async fn execute_repl_command(
    client: &Client,
    line: &str,
) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let (cmd, rest) = match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd.to_lowercase().as_str() {
        "help" | "?" => Ok(Some(HELP_TEXT.to_string())),

        "quit" | "exit" | "q" => Ok(None),

        "pending" => Ok(Some(format!("{} pending", client.pending_count()))),

        "bench" => {
            let n = if rest.is_empty() { 5 } else { rest.parse()? };
            Ok(Some(execute(client, Commands::Bench { n }).await?))
        }

        "call" | "c" => {
            let Some((service_method, args)) = rest.split_once(char::is_whitespace) else {
                return Ok(Some("Usage: call <Service.Method> <json>".to_string()));
            };
            call(client, service_method, args).await.map(Some)
        }

        _ if cmd.contains('.') => call(client, cmd, rest).await.map(Some),

        _ => Ok(Some(format!(
            "Unknown command: {}. Type 'help' for help.",
            cmd
        ))),
    }
}

async fn call(
    client: &Client,
    service_method: &str,
    args: &str,
) -> Result<String, Box<dyn std::error::Error>> {
    let args = if args.trim().is_empty() {
        Value::Null
    } else {
        parse_json_arg(args.trim())?
    };
    let reply: Value = client.call(service_method, &args).await?;
    Ok(format_json(&reply))
}

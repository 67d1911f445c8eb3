//! Command execution.

use crate::Commands;
use colored::Colorize;
use minirpc_client::{Client, ClientError};
use serde::Serialize;
use serde_json::Value;
use std::time::Instant;
use tokio::task::JoinSet;

/// Argument of the demo `Foo.Sum` method.
#[derive(Debug, Serialize)]
struct SumArgs {
    num1: i64,
    num2: i64,
}

/// Executes a command and returns the formatted output.
pub async fn execute(client: &Client, cmd: Commands) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => Err("repl runs interactively, not as a one-shot command".into()),

        Commands::Call {
            service_method,
            args,
        } => {
            let args = parse_json_arg(&args)?;
            let reply: Value = client.call(&service_method, &args).await?;
            Ok(format_json(&reply))
        }

        Commands::Bench { n } => bench(client, n).await,
    }
}

/// Issues `n` concurrent `Foo.Sum` calls and reports each reply.
async fn bench(client: &Client, n: u32) -> Result<String, Box<dyn std::error::Error>> {
    let started = Instant::now();
    let mut calls = JoinSet::new();

    // Calls are registered in order so their sequence numbers follow `i`.
    for i in 0..i64::from(n) {
        let call = client
            .go::<_, i64>("Foo.Sum", &SumArgs { num1: i, num2: i * i })
            .await;
        tracing::debug!("issued Foo.Sum seq={}", call.seq());
        calls.spawn(async move { (i, call.done().await) });
    }

    let mut results: Vec<(i64, Result<i64, ClientError>)> = Vec::with_capacity(n as usize);
    while let Some(joined) = calls.join_next().await {
        results.push(joined?);
    }
    results.sort_by_key(|(i, _)| *i);

    let mut output = String::new();
    let mut failed = 0;
    for (i, result) in &results {
        match result {
            Ok(reply) => {
                output.push_str(&format!("{} + {}^2 = {}\n", i, i, reply.to_string().cyan()));
            }
            Err(e) => {
                failed += 1;
                output.push_str(&format!("{} + {}^2: {}\n", i, i, e.to_string().red()));
            }
        }
    }

    let elapsed = started.elapsed();
    let summary = format!(
        "{} calls in {:.2?} ({} failed)",
        results.len(),
        elapsed,
        failed
    );
    output.push_str(&if failed == 0 {
        summary.green().to_string()
    } else {
        summary.yellow().to_string()
    });
    Ok(output)
}

/// Parses a JSON argument, or reads it from a file when prefixed with `@`.
pub fn parse_json_arg(arg: &str) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

pub fn format_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_arg_inline() {
        let value = parse_json_arg(r#"{"num1": 3, "num2": 4}"#).unwrap();
        assert_eq!(value["num1"], 3);
        assert_eq!(value["num2"], 4);
    }

    #[test]
    fn test_parse_json_arg_errors() {
        assert!(parse_json_arg("{not json").is_err());
        assert!(parse_json_arg("@/nonexistent/args.json").is_err());
    }
}

//! cache-admin: exercise and inspect the response cache from the command line
//!
//! Usage:
//!   cache-admin demo [--requests <n>] [--prompts <k>] [--config <file>]
//!   cache-admin config [--config <file>]
//!   cache-admin version

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use llm_response_cache::telemetry::TracingMetricsSink;
use llm_response_cache::{CacheConfig, CachePolicy, CacheStack, InferenceEngine, Parameters};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const DEMO_MODEL: &str = "demo-echo";

/// Stand-in model: echoes the prompt after a short delay.
struct EchoEngine {
    delay: Duration,
}

#[async_trait]
impl InferenceEngine for EchoEngine {
    async fn infer(
        &self,
        prompt: &str,
        _model: &str,
        _parameters: &Parameters,
    ) -> llm_response_cache::Result<Value> {
        tokio::time::sleep(self.delay).await;
        let words = prompt.split_whitespace().count() as u64;
        Ok(json!({
            "text": format!("echo: {}", prompt),
            "usage": { "prompt_tokens": words, "completion_tokens": words + 1 },
        }))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("warn".parse()?),
        )
        .with_target(false)
        .try_init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        print_usage();
        std::process::exit(1);
    };
    let rest = &args[1..];

    match command.as_str() {
        "demo" => cmd_demo(rest).await,
        "config" => cmd_config(rest),
        "version" | "--version" | "-V" => {
            println!("cache-admin {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"cache-admin: LLM response cache tool

USAGE:
    cache-admin <COMMAND> [OPTIONS]

COMMANDS:
    demo      Run a synthetic workload against an in-process cache and print stats
    config    Print the effective configuration
    version   Show version information
    help      Show this help message

OPTIONS:
    --config <file>    YAML configuration (default: LLM_CACHE_* environment)
    --requests <n>     Requests issued by `demo` (default 40)
    --prompts <k>      Distinct prompts used by `demo` (default 8)

ENVIRONMENT:
    RUST_LOG                   Log filter (default warn)
    LLM_CACHE_MAX_SIZE_MB      Size cap in megabytes
    LLM_CACHE_DEFAULT_TTL_SECS Default entry TTL
    LLM_CACHE_MIN_TTL_SECS     TTL floor
    LLM_CACHE_MAX_ITEMS        Entry-count cap
    LLM_CACHE_ENABLED          Enable or disable caching
    LLM_CACHE_NAMESPACE        Key prefix
    LLM_CACHE_ENVIRONMENT      Environment label on metrics"#
    );
}

fn flag_value<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

fn load_config(args: &[String]) -> Result<CacheConfig> {
    match flag_value(args, "--config") {
        Some(path) => {
            let yaml = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path))?;
            Ok(CacheConfig::from_yaml_str(&yaml)?)
        }
        None => Ok(CacheConfig::from_env()?),
    }
}

fn parse_count(args: &[String], name: &str, default: usize) -> Result<usize> {
    match flag_value(args, name) {
        Some(raw) => {
            let n: usize = raw
                .parse()
                .with_context(|| format!("{} expects a number, got {:?}", name, raw))?;
            if n == 0 {
                bail!("{} must be at least 1", name);
            }
            Ok(n)
        }
        None => Ok(default),
    }
}

fn cmd_config(args: &[String]) -> Result<()> {
    let cfg = load_config(args)?;
    print!("{}", serde_yaml::to_string(&cfg)?);
    Ok(())
}

async fn cmd_demo(args: &[String]) -> Result<()> {
    let cfg = load_config(args)?;
    let requests = parse_count(args, "--requests", 40)?;
    let prompts = parse_count(args, "--prompts", 8)?;

    let stack = CacheStack::builder()
        .metrics_sink(Arc::new(TracingMetricsSink::new(cfg.environment.clone())))
        .config(cfg)
        .build()?;
    let engine = stack.cached(EchoEngine {
        delay: Duration::from_millis(20),
    });

    let mut params = Parameters::new();
    params.insert("temperature".into(), json!(0.2));
    let policy = CachePolicy::new();

    let mut served_from_cache = 0;
    for i in 0..requests {
        let prompt = format!("question number {}", i % prompts);
        let outcome = engine
            .respond(&prompt, DEMO_MODEL, &params, &policy)
            .await?;
        if outcome.cached {
            served_from_cache += 1;
        }
    }
    // latency samples are applied on background tasks
    tokio::time::sleep(Duration::from_millis(200)).await;

    let snapshot = stack.admin.snapshot().await?;
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "requests": requests,
            "served_from_cache": served_from_cache,
            "snapshot": snapshot,
        }))?
    );
    Ok(())
}

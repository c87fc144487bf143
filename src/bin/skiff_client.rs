//!
//! skiff client binary
//! -------------------
//! Runs one update pass: fetch the server catalog with the current rotating
//! token, reconcile the local inventory, download missing artifacts and
//! remove retired ones. Ctrl-C aborts the run at the next suspension point.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use skiff::config::{self, ClientConfig};
use skiff::error::AppError;

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag
            && i + 1 < args.len() {
                return Some(args[i + 1].clone());
            }
        i += 1;
    }
    None
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn print_failure_panel(err: &AppError) {
    let separation = "-".repeat(30);
    eprintln!();
    eprintln!("The update run failed");
    eprintln!("{}", err);
    eprintln!("{}", separation);
    eprintln!("If this was caused by a transient network problem, running the updater again usually succeeds.");
    eprintln!("If the error persists, report it to whoever provides this updater.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("warn"))
        .unwrap();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("skiff update client\n\nUSAGE:\n  skiff_client --resource-base URL [--base-path PATH] [--ref-path NAME] [--endpoint HOST] [--endpoint-port N] [--salt-file PATH] [--concurrency N] [--retries N] [--extension EXT]\n\nOPTIONS:\n  --resource-base URL   Base URL the artifact bytes are downloaded from (env: SKIFF_RESOURCE_BASE)\n  --base-path PATH      Local installation root (env: SKIFF_BASE_PATH, default .)\n  --ref-path NAME       Inventory subdirectory under the base path (env: SKIFF_REF_PATH, default libs)\n  --endpoint HOST       Catalog endpoint host (env: SKIFF_ENDPOINT, default 127.0.0.1)\n  --endpoint-port N     Catalog endpoint port (env: SKIFF_ENDPOINT_PORT, default 8330)\n  --salt-file PATH      File holding the 64-character shared secret (env: SKIFF_SALT_FILE, default sha256)\n  --concurrency N       Concurrent download cap (env: SKIFF_CONCURRENCY, default 8)\n  --retries N           Bounded retries per failing download (env: SKIFF_RETRIES, default 3)\n  --extension EXT       Artifact file extension to reconcile (env: SKIFF_EXTENSION, default jar)\n");
        return Ok(());
    }

    let resource_base = parse_str_arg(&args, "--resource-base")
        .or_else(|| env::var("SKIFF_RESOURCE_BASE").ok())
        .context("--resource-base (or SKIFF_RESOURCE_BASE) is required")?;
    let base_path = parse_str_arg(&args, "--base-path")
        .or_else(|| env::var("SKIFF_BASE_PATH").ok())
        .unwrap_or_else(|| ".".to_string());
    let ref_path = parse_str_arg(&args, "--ref-path")
        .or_else(|| env::var("SKIFF_REF_PATH").ok())
        .unwrap_or_else(|| "libs".to_string());
    let endpoint_host = parse_str_arg(&args, "--endpoint")
        .or_else(|| env::var("SKIFF_ENDPOINT").ok())
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let endpoint_port = parse_str_arg(&args, "--endpoint-port")
        .and_then(|v| v.parse::<u16>().ok())
        .or_else(|| env::var("SKIFF_ENDPOINT_PORT").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(8330);
    let salt_file = parse_str_arg(&args, "--salt-file")
        .or_else(|| env::var("SKIFF_SALT_FILE").ok())
        .unwrap_or_else(|| "sha256".to_string());
    let download_concurrency = parse_str_arg(&args, "--concurrency")
        .and_then(|v| v.parse::<usize>().ok())
        .or_else(|| env::var("SKIFF_CONCURRENCY").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(config::DEFAULT_DOWNLOAD_CONCURRENCY);
    let retry_limit = parse_str_arg(&args, "--retries")
        .and_then(|v| v.parse::<u32>().ok())
        .or_else(|| env::var("SKIFF_RETRIES").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(config::DEFAULT_RETRY_LIMIT);
    let artifact_extension = parse_str_arg(&args, "--extension")
        .or_else(|| env::var("SKIFF_EXTENSION").ok())
        .unwrap_or_else(|| config::DEFAULT_ARTIFACT_EXTENSION.to_string());

    let salt = config::read_salt_file(std::path::Path::new(&salt_file))
        .context("client configuration")?;

    let client_config = ClientConfig {
        resource_base,
        base_path: PathBuf::from(base_path),
        ref_path,
        endpoint_host,
        endpoint_port,
        salt,
        download_concurrency,
        retry_limit,
        artifact_extension,
    };

    // Ctrl-C flips the cancellation signal; the run stops at its next
    // suspension point.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = cancel_tx.send(true);
        }
    });

    match skiff::client::run(&client_config, cancel_rx).await {
        Ok(summary) => {
            println!(
                "Update finished: {} downloaded, {} deleted.",
                summary.downloaded, summary.deleted
            );
            Ok(())
        }
        Err(e) => {
            print_failure_panel(&e);
            std::process::exit(1);
        }
    }
}

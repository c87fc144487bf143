//!
//! skiff server binary
//! -------------------
//! Command-line entry point for the update server. Builds the artifact
//! catalog from the target folder's `increment`/`decrement` directories and
//! serves it under rotating-token admission. Supports configuration via CLI
//! flags and environment variables.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

use skiff::config::{self, ServerConfig};

fn parse_port_env(name: &str) -> Option<u16> {
    match env::var(name) {
        Ok(val) => val.parse::<u16>().ok(),
        Err(_) => None,
    }
}

fn parse_usize_env(name: &str) -> Option<usize> {
    match env::var(name) {
        Ok(val) => val.parse::<usize>().ok(),
        Err(_) => None,
    }
}

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

#[tokio::main]
async fn main() -> Result<()> {
    println!(r"      _    _  __  __
  ___| | _(_)/ _|/ _|
 / __| |/ / | |_| |_
 \__ \   <| |  _|  _|
 |___/_|\_\_|_| |_|   server");

    // Initialize tracing subscriber with env filter if provided
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .unwrap();
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("skiff update server\n\nUSAGE:\n  skiff_server [--port N] [--target-folder PATH] [--salt-file PATH] [--heartbeat-url URL] [--max-connections N] [--extension EXT] [--access-log PATH]\n\nOPTIONS:\n  --port N              Listen port (env: SKIFF_PORT, default 8330)\n  --target-folder PATH  Parent of the increment/decrement directories (env: SKIFF_TARGET_FOLDER, default artifacts)\n  --salt-file PATH      File holding the 64-character shared secret (env: SKIFF_SALT_FILE, default sha256)\n  --heartbeat-url URL   Monitoring URL probed every 60s (env: SKIFF_HEARTBEAT_URL, off by default)\n  --max-connections N   Concurrent request handler bound (env: SKIFF_MAX_CONNECTIONS, default 100)\n  --extension EXT       Artifact file extension to serve (env: SKIFF_EXTENSION, default jar)\n  --access-log PATH     Request log file (env: SKIFF_ACCESS_LOG, default UpdateRequest.log)\n");
        return Ok(());
    }

    let port = parse_str_arg(&args, "--port")
        .and_then(|v| v.parse::<u16>().ok())
        .or_else(|| parse_port_env("SKIFF_PORT"))
        .unwrap_or(8330);
    let target_folder = parse_str_arg(&args, "--target-folder")
        .or_else(|| env::var("SKIFF_TARGET_FOLDER").ok())
        .unwrap_or_else(|| "artifacts".to_string());
    let salt_file = parse_str_arg(&args, "--salt-file")
        .or_else(|| env::var("SKIFF_SALT_FILE").ok())
        .unwrap_or_else(|| "sha256".to_string());
    let heartbeat_url = parse_str_arg(&args, "--heartbeat-url")
        .or_else(|| env::var("SKIFF_HEARTBEAT_URL").ok());
    let max_connections = parse_str_arg(&args, "--max-connections")
        .and_then(|v| v.parse::<usize>().ok())
        .or_else(|| parse_usize_env("SKIFF_MAX_CONNECTIONS"))
        .unwrap_or(config::DEFAULT_MAX_CONNECTIONS);
    let artifact_extension = parse_str_arg(&args, "--extension")
        .or_else(|| env::var("SKIFF_EXTENSION").ok())
        .unwrap_or_else(|| config::DEFAULT_ARTIFACT_EXTENSION.to_string());
    let access_log_path = parse_str_arg(&args, "--access-log")
        .or_else(|| env::var("SKIFF_ACCESS_LOG").ok())
        .unwrap_or_else(|| "UpdateRequest.log".to_string());

    // Missing or malformed salt is fatal at startup.
    let salt = config::read_salt_file(std::path::Path::new(&salt_file))
        .context("server configuration")?;

    println!(
        "skiff server starting: port={}, target_folder={}, max_connections={}",
        port, target_folder, max_connections
    );
    tracing::info!(
        "starting: port={}, target_folder={}, max_connections={}, heartbeat={}",
        port,
        target_folder,
        max_connections,
        heartbeat_url.as_deref().unwrap_or("<off>")
    );

    let server_config = ServerConfig {
        target_folder: PathBuf::from(target_folder),
        port,
        salt,
        heartbeat_url,
        max_connections,
        artifact_extension,
        access_log_path: PathBuf::from(access_log_path),
    };

    skiff::server::run(server_config).await
}

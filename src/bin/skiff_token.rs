//!
//! Prints the rotating token for the current UTC minute, for manual testing
//! of a deployed endpoint (`curl "http://host:port/?authToken=$(skiff_token)"`).

use anyhow::{Context, Result};
use chrono::Utc;
use std::env;

use skiff::config;
use skiff::token;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let salt_file = args
        .iter()
        .position(|a| a == "--salt-file")
        .and_then(|i| args.get(i + 1).cloned())
        .or_else(|| env::var("SKIFF_SALT_FILE").ok())
        .unwrap_or_else(|| "sha256".to_string());

    let salt = config::read_salt_file(std::path::Path::new(&salt_file))
        .context("token configuration")?;

    let now = Utc::now();
    println!("{}", token::generate(&salt, now));
    eprintln!("(valid for minute {} UTC)", now.format("%Y.%m.%d.%H:%M"));
    Ok(())
}

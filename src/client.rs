//!
//! skiff update client
//! -------------------
//! One update run: authenticate with the current rotating token, fetch the
//! server's catalog, scan the local inventory, diff both ways concurrently,
//! download every missing `Add` record under a bounded concurrency cap, then
//! delete matched `Del` files sequentially.
//!
//! Downloads stream into a `.part` temporary path while hashing on the fly;
//! the file is renamed to its final name only after the digest matches the
//! catalog record, so a crash can leave `.part` litter but never a truncated
//! artifact under the final name. Each failing download is retried a bounded
//! number of times before its failure aborts the run.
//!
//! Progress renders on one reserved line per file (`MultiProgress`), which
//! keeps concurrent downloads from interleaving output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use crate::catalog::{self, Catalog, FileRecord};
use crate::config::ClientConfig;
use crate::error::{AppError, AppResult};
use crate::token;

const CATALOG_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// A download fails if the peer stalls longer than this between chunks.
const READ_STALL_TIMEOUT: Duration = Duration::from_secs(60);
/// Downloads are written through a buffer of this size.
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Outcome of a completed update run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub deleted: usize,
}

/// Execute one full update run. `cancel` aborts the run at the next
/// suspension point when it flips to true.
pub async fn run(config: &ClientConfig, cancel: watch::Receiver<bool>) -> AppResult<RunSummary> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_STALL_TIMEOUT)
        .user_agent(concat!("skiff/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(AppError::from)?;

    println!("Initialized.");
    println!("Trying to fetch any available update.");

    let remote = fetch_catalog(&client, config, cancel.clone()).await?;
    info!("server catalog: {} records", remote.len());

    let inventory_dir = config.inventory_dir();
    std::fs::create_dir_all(&inventory_dir).map_err(AppError::from)?;
    let local = scan_inventory(inventory_dir.clone(), config.artifact_extension.clone()).await?;
    info!("local inventory: {} records", local.len());

    // Independent classifications, no shared mutable state.
    let (to_add, to_delete) = {
        let (l1, r1) = (local.clone(), remote.clone());
        let (l2, r2) = (local, remote);
        let add_task = tokio::task::spawn_blocking(move || catalog::diff_for_add(&l1, &r1));
        let del_task = tokio::task::spawn_blocking(move || catalog::diff_for_delete(&l2, &r2));
        let (add, del) = tokio::join!(add_task, del_task);
        (
            add.map_err(|e| AppError::internal("diff_panic".into(), e.to_string()))?,
            del.map_err(|e| AppError::internal("diff_panic".into(), e.to_string()))?,
        )
    };

    let mut summary = RunSummary::default();

    if to_add.is_empty() {
        println!("No update available.");
    } else {
        println!("Files available, fetching.");
        summary.downloaded =
            download_all(&client, config, &inventory_dir, &to_add, cancel.clone()).await?;
        println!("Completed.");
    }

    // Deletions only after every download has settled; sequential on purpose,
    // they are cheap and failures attribute cleanly.
    for record in &to_delete.files {
        if *cancel.borrow() {
            return Err(cancelled());
        }
        let path = inventory_dir.join(&record.file_name);
        if path.exists() {
            std::fs::remove_file(&path).map_err(AppError::from)?;
            println!("Deleted {}", record.file_name);
            summary.deleted += 1;
        }
    }

    Ok(summary)
}

fn cancelled() -> AppError {
    AppError::internal("cancelled", "update run aborted by operator")
}

/// Completes only when the cancel signal flips to true.
async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            // Sender gone without signalling: nothing will ever cancel us.
            std::future::pending::<()>().await;
        }
    }
}

async fn fetch_catalog(
    client: &reqwest::Client,
    config: &ClientConfig,
    cancel: watch::Receiver<bool>,
) -> AppResult<Catalog> {
    let auth_token = token::generate(&config.salt, Utc::now());
    let url = config.catalog_url(&auth_token);

    let request = client.get(&url).timeout(CATALOG_FETCH_TIMEOUT).send();
    let response = tokio::select! {
        r = request => r.map_err(AppError::from)?,
        _ = wait_cancelled(cancel) => return Err(cancelled()),
    };

    if response.status() == reqwest::StatusCode::FORBIDDEN {
        return Err(AppError::auth(
            "token_rejected",
            "server refused the update token; check the shared secret and the clock",
        ));
    }
    if !response.status().is_success() {
        return Err(AppError::network(
            "catalog_fetch_failed".into(),
            format!("catalog endpoint answered HTTP {}", response.status()),
        ));
    }

    response.json::<Catalog>().await.map_err(AppError::from)
}

async fn scan_inventory(dir: PathBuf, extension: String) -> AppResult<Catalog> {
    tokio::task::spawn_blocking(move || catalog::scan_directory(&dir, &extension))
        .await
        .map_err(|e| AppError::internal("scan_panic".into(), e.to_string()))?
        .map_err(AppError::from)
}

/// Run every download concurrently under the configured cap; returns the
/// number of files fetched, or the first failure once all tasks settled.
async fn download_all(
    client: &reqwest::Client,
    config: &ClientConfig,
    inventory_dir: &Path,
    to_add: &Catalog,
    cancel: watch::Receiver<bool>,
) -> AppResult<usize> {
    let progress = MultiProgress::new();
    let permits = Arc::new(Semaphore::new(config.download_concurrency.max(1)));

    let mut handles = Vec::with_capacity(to_add.len());
    for record in &to_add.files {
        let bar = progress.add(ProgressBar::new(record.file_size.max(1)));
        bar.set_style(progress_style());
        bar.set_message(record.file_name.clone());

        let client = client.clone();
        let url = config.artifact_url(&record.file_name);
        let dest_dir = inventory_dir.to_path_buf();
        let record = record.clone();
        let permits = permits.clone();
        let retry_limit = config.retry_limit.max(1);
        let cancel = cancel.clone();

        let name = record.file_name.clone();
        let handle = tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|e| AppError::internal("permits_closed".into(), e.to_string()))?;
            download_with_retries(&client, &url, &dest_dir, &record, &bar, retry_limit, cancel)
                .await
        });
        handles.push((name, handle));
    }

    let mut downloaded = 0usize;
    let mut first_failure: Option<(String, AppError)> = None;
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => downloaded += 1,
            Ok(Err(e)) => {
                warn!("download of {} failed: {}", name, e);
                if first_failure.is_none() {
                    first_failure = Some((name, e));
                }
            }
            Err(e) => {
                if first_failure.is_none() {
                    first_failure =
                        Some((name, AppError::internal("download_panic".into(), e.to_string())));
                }
            }
        }
    }

    match first_failure {
        None => Ok(downloaded),
        // Surface the first failure once every task has settled; the
        // per-file warnings above name the rest.
        Some((_name, e)) => Err(e),
    }
}

fn progress_style() -> ProgressStyle {
    ProgressStyle::with_template("{msg} {percent:>3}% [{bar:40}] {binary_bytes_per_sec}")
        .unwrap()
        .progress_chars("==-")
}

async fn download_with_retries(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    record: &FileRecord,
    bar: &ProgressBar,
    retry_limit: u32,
    cancel: watch::Receiver<bool>,
) -> AppResult<()> {
    let mut attempt = 1;
    loop {
        match download_one(client, url, dest_dir, record, bar, cancel.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retryable() && attempt < retry_limit => {
                warn!(
                    "retrying {} (attempt {}/{}): {}",
                    record.file_name, attempt, retry_limit, e
                );
                bar.set_position(0);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Fetch one artifact: stream chunks into `<name>.part` while hashing,
/// verify the digest against the catalog record, then rename into place.
async fn download_one(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    record: &FileRecord,
    bar: &ProgressBar,
    cancel: watch::Receiver<bool>,
) -> AppResult<()> {
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(AppError::from)?;
    if let Some(len) = response.content_length() {
        bar.set_length(len.max(1));
    }

    let part_path = dest_dir.join(format!("{}.part", record.file_name));
    let final_path = dest_dir.join(&record.file_name);

    let file = tokio::fs::File::create(&part_path).await.map_err(AppError::from)?;
    let mut file = tokio::io::BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;

    loop {
        let next = tokio::select! {
            chunk = stream.next() => chunk,
            _ = wait_cancelled(cancel.clone()) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(cancelled());
            }
        };
        let Some(chunk) = next else { break };
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                return Err(AppError::from(e));
            }
        };
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(AppError::from)?;
        downloaded += chunk.len() as u64;
        bar.set_position(downloaded);
    }

    file.flush().await.map_err(AppError::from)?;
    drop(file);

    let digest = hex::encode(hasher.finalize());
    if digest != record.file_hash {
        let _ = tokio::fs::remove_file(&part_path).await;
        return Err(AppError::Integrity {
            code: "hash_mismatch".into(),
            message: format!(
                "{}: downloaded digest {} does not match catalog digest {}",
                record.file_name, digest, record.file_hash
            ),
        });
    }

    tokio::fs::rename(&part_path, &final_path).await.map_err(AppError::from)?;
    bar.finish();
    Ok(())
}

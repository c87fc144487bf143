//!
//! Background liveness pinger (Uptime-Kuma style passive probe). Runs
//! independently of request handling and shares no locks with it; failures
//! are logged and never terminate the loop. The watch signal stops it
//! promptly, whether the loop is mid-probe or mid-wait.

use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const PROBE_TIMEOUT: Duration = Duration::from_secs(120);
const PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Completes when the signal flips to true or the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

pub async fn run(url: String, mut cancel: watch::Receiver<bool>) {
    let client = match reqwest::Client::builder().timeout(PROBE_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => {
            error!("heartbeat client could not be built: {}", e);
            return;
        }
    };
    info!("heartbeat probing {}", url);

    loop {
        if *cancel.borrow() {
            break;
        }

        tokio::select! {
            resp = client.get(&url).send() => match resp {
                Ok(resp) if !resp.status().is_success() => {
                    warn!("heartbeat query failed with status code {}", resp.status());
                }
                Ok(_) => {}
                Err(e) => warn!("heartbeat query error: {}", e),
            },
            _ = cancelled(&mut cancel) => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(PROBE_INTERVAL) => {}
            _ = cancelled(&mut cancel) => break,
        }
    }
    info!("heartbeat stopped");
}

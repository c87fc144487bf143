use axum::extract::State;
use axum::routing::get;
use axum::Router;
use skiff::heartbeat;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn ping(State(hits): State<Arc<AtomicUsize>>) -> &'static str {
    hits.fetch_add(1, Ordering::SeqCst);
    "ok"
}

#[tokio::test]
async fn heartbeat_probes_and_stops_promptly_on_cancel() {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new().route("/ping", get(ping)).with_state(hits.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(heartbeat::run(format!("http://{}/ping", addr), cancel_rx));

    // First probe fires immediately; give it a moment to land.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(hits.load(Ordering::SeqCst) >= 1, "no probe observed");

    // The loop sits in its 60s wait now; cancellation must not wait it out.
    cancel_tx.send(true).expect("cancel send failed");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("heartbeat did not stop promptly")
        .expect("heartbeat task panicked");
}

#[tokio::test]
async fn heartbeat_survives_an_unreachable_url() {
    // Nothing listens here; the probe must fail without ending the loop.
    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    let task = tokio::spawn(heartbeat::run(
        "http://127.0.0.1:9/ping".to_string(),
        cancel_rx,
    ));

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!task.is_finished(), "loop must outlive probe failures");

    cancel_tx.send(true).expect("cancel send failed");
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("heartbeat did not stop promptly")
        .expect("heartbeat task panicked");
}

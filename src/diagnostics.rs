/// Minimal diagnostics endpoint, bound on `GW_PPROF_ADDR` when set.
///
/// Explicitly outside the core per spec: a hand-rolled plaintext/JSON
/// status page, not a pprof server or a web framework. Any HTTP request
/// (the request itself is not parsed) gets the same JSON body back.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct Stats {
    pub accepted: AtomicU64,
    pub active: AtomicU64,
}

impl Stats {
    pub fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Serve the diagnostics endpoint on `addr` until the process exits. Each
/// connection gets one plaintext JSON response and is then closed.
pub async fn serve(addr: String, started_at: chrono::DateTime<Utc>, stats: Arc<Stats>) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            log::warn!("diagnostics endpoint failed to bind {}: {}", addr, err);
            return;
        }
    };

    log::info!("diagnostics endpoint listening on {}", addr);

    loop {
        let (mut stream, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                log::warn!("diagnostics accept error: {}", err);
                continue;
            }
        };

        let started_at = started_at;
        let stats = stats.clone();
        tokio::spawn(async move {
            // Drain whatever the client sent; we don't parse it.
            let mut discard = [0u8; 1024];
            let _ = stream.read(&mut discard).await;

            let uptime_secs = (Utc::now() - started_at).num_seconds().max(0);
            let body = serde_json::json!({
                "uptime_secs": uptime_secs,
                "accepted_connections": stats.accepted.load(Ordering::Relaxed),
                "active_connections": stats.active.load(Ordering::Relaxed),
            })
            .to_string();

            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
    }
}

//! Dashboard API
//!
//! REST control/status surface consumed by an external dashboard: start and
//! stop the trading worker, read the latest status snapshot, the open
//! trades with live pips, aggregate history statistics and the recent log
//! tail. Handlers never touch bot internals; they read published snapshots
//! and flip the stop flag.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use crate::engine::{SharedState, TradeHistory};

/// Spawns a fresh bot worker thread against the shared state
pub type BotSpawner = Box<dyn Fn(Arc<SharedState>) -> Result<JoinHandle<()>> + Send + Sync>;

/// State shared with all request handlers
pub struct AppState {
    pub shared: Arc<SharedState>,
    /// Read handle onto the same history directory the bot writes
    pub history: TradeHistory,
    spawner: BotSpawner,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AppState {
    pub fn new(shared: Arc<SharedState>, history: TradeHistory, spawner: BotSpawner) -> Self {
        Self {
            shared,
            history,
            spawner,
            worker: Mutex::new(None),
        }
    }

    /// Spawn a worker unless one is already alive. Returns false when a
    /// running worker made the call a no-op.
    pub fn start_worker(&self) -> Result<bool> {
        let mut worker = self.worker.lock().expect("worker lock");
        let alive = worker.as_ref().map(|h| !h.is_finished()).unwrap_or(false);
        if alive || self.shared.is_running() {
            return Ok(false);
        }
        let handle = (self.spawner)(self.shared.clone())?;
        *worker = Some(handle);
        Ok(true)
    }
}

/// Build the dashboard router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/trades", get(get_trades))
        .route("/api/stats", get(get_stats))
        .route("/api/logs", get(get_logs))
        .route("/api/start", post(start_bot))
        .route("/api/stop", post(stop_bot))
        .with_state(state)
}

/// GET /api/status - latest published snapshot
async fn get_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.shared.snapshot();
    (StatusCode::OK, Json(json!(snapshot)))
}

/// GET /api/trades - open trades with live pips
async fn get_trades(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.shared.snapshot();
    (StatusCode::OK, Json(json!({ "trades": snapshot.open_trades })))
}

/// GET /api/stats - aggregate history statistics
async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.history.aggregate_stats();
    (StatusCode::OK, Json(json!(stats)))
}

/// GET /api/logs - recent log tail
async fn get_logs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let lines = state.shared.log_tail(200);
    (StatusCode::OK, Json(json!({ "lines": lines })))
}

/// POST /api/start - launch a fresh bot worker
async fn start_bot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.start_worker() {
        Ok(true) => {
            info!("Bot worker started via API");
            (StatusCode::OK, Json(json!({ "status": "started" })))
        }
        Ok(false) => (StatusCode::OK, Json(json!({ "status": "already_running" }))),
        Err(e) => {
            error!("Bot start failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": format!("{:#}", e) })),
            )
        }
    }
}

/// POST /api/stop - request a cooperative stop
async fn stop_bot(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if !state.shared.is_running() {
        return (StatusCode::OK, Json(json!({ "status": "not_running" })));
    }
    state.shared.request_stop();
    info!("Bot stop requested via API");
    (StatusCode::OK, Json(json!({ "status": "stopping" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> Arc<AppState> {
        let shared = SharedState::new();
        let dir = std::env::temp_dir().join(format!("smcflow-api-{}", std::process::id()));
        let history = TradeHistory::new(dir).unwrap();
        let spawner: BotSpawner = Box::new(|shared| {
            Ok(std::thread::spawn(move || {
                shared.running.store(true, std::sync::atomic::Ordering::SeqCst);
                while !shared.stop.load(std::sync::atomic::Ordering::SeqCst) {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                }
                shared.running.store(false, std::sync::atomic::Ordering::SeqCst);
            }))
        });
        Arc::new(AppState::new(shared, history, spawner))
    }

    #[tokio::test]
    async fn test_start_stop_round_trip() {
        let state = test_state();

        start_bot(State(state.clone())).await;
        // Worker thread flips the running flag.
        for _ in 0..100 {
            if state.shared.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(state.shared.is_running());

        // A second start is a no-op.
        start_bot(State(state.clone())).await;

        stop_bot(State(state.clone())).await;
        for _ in 0..100 {
            if !state.shared.is_running() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(!state.shared.is_running());
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let state = test_state();
        // No panic, no spawned worker.
        stop_bot(State(state.clone())).await;
        assert!(!state.shared.is_running());
    }
}

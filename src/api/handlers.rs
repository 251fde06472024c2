//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::EngineHandles;
use crate::metrics;
use crate::orderbook::QuoteConsolidator;
use crate::risk::{RiskGovernor, RiskState};
use crate::session::{SessionController, SessionSummary};
use crate::utils::now_ms;

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the engine is connected and trading.
    pub ready: Arc<AtomicBool>,
    /// Risk governor of the running engine.
    pub risk: Arc<RwLock<RiskGovernor>>,
    /// Session of the running engine.
    pub session: Arc<RwLock<SessionController>>,
    /// Consolidated quotes.
    pub quotes: Arc<QuoteConsolidator>,
}

impl AppState {
    /// State backed by a running engine.
    pub fn new(handles: &EngineHandles) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            risk: handles.risk.clone(),
            session: handles.session.clone(),
            quotes: handles.quotes.clone(),
        }
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the engine is ready.
    pub ready: bool,
    /// Halt reason, if the breaker is tripped.
    pub halted: Option<String>,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// "starting", "running" or "halted".
    pub status: &'static str,
    /// Symbols with a consolidated quote.
    pub tracked_symbols: usize,
    /// Quotes dropped at ingest.
    pub rejected_quotes: u64,
    /// Risk counters.
    pub risk: RiskState,
    /// Session so far.
    pub session: SessionSummary,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - 200 when trading, 503 when starting or halted.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let halted = state.risk.read().await.state().halted.clone();
    let is_ready = state.is_ready() && halted.is_none();

    let response = ReadyResponse {
        ready: is_ready,
        halted,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - risk snapshot and session summary.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let risk = state.risk.read().await.state().clone();
    let session = state.session.read().await.summary(now_ms());

    let status = match (state.is_ready(), risk.halted.is_some()) {
        (_, true) => "halted",
        (true, false) => "running",
        (false, false) => "starting",
    };

    Json(StatusResponse {
        status,
        tracked_symbols: state.quotes.len(),
        rejected_quotes: state.quotes.rejected_count(),
        risk,
        session,
    })
}

/// Resume handler - clears a tripped breaker.
pub async fn resume(State(state): State<AppState>) -> impl IntoResponse {
    let mut risk = state.risk.write().await;
    let was_halted = risk.is_halted();
    risk.resume();
    if was_halted {
        warn!("Trading resumed by operator");
    }
    Json(risk.state().clone())
}

/// Prometheus exposition.
pub async fn metrics_text() -> impl IntoResponse {
    match metrics::render() {
        Some(body) => (StatusCode::OK, body),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics exporter not installed".to_string(),
        ),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::risk::RiskConfig;
    use crate::session::SessionConfig;
    use crate::venue::VenueId;
    use tokio::sync::broadcast;

    pub fn state() -> AppState {
        let (events, _) = broadcast::channel(8);
        AppState::new(&EngineHandles {
            risk: Arc::new(RwLock::new(RiskGovernor::new(RiskConfig::default(), 0))),
            session: Arc::new(RwLock::new(SessionController::new(SessionConfig::default(), 0))),
            quotes: Arc::new(QuoteConsolidator::new(VenueId::from("left"), VenueId::from("right"), 500)),
            events,
        })
    }
}

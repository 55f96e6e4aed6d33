//! Health-Check-Endpunkt fuer camrelay
//!
//! Endpoint: `GET /health`
//! Response: JSON mit Status, Version, Uptime, aktiven Sessions und
//! Quellen-Status

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::metrics::BrokerMetrics;

/// Status des Health-Checks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Antwort des Health-Check-Endpunkts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub active_sessions: i64,
    pub sources_ready: bool,
}

/// Geteilter Zustand fuer den Health-Check-Handler
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Arc<Instant>,
    pub metriken: BrokerMetrics,
}

impl HealthState {
    pub fn neu(metriken: BrokerMetrics) -> Self {
        Self {
            start_time: Arc::new(Instant::now()),
            metriken,
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Quellen werden lazy beim ersten Attach gestartet. Solange noch kein
    /// Lauf fehlgeschlagen ist, gilt der Broker als gesund.
    pub fn status(&self) -> HealthStatus {
        let bereit = self.metriken.quellen_bereit.get() == 1;
        if !bereit && self.metriken.quellen_init_fehler() > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }

    pub fn antwort(&self) -> HealthResponse {
        HealthResponse {
            status: self.status(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.uptime_seconds(),
            active_sessions: self.metriken.aktive_sitzungen.get(),
            sources_ready: self.metriken.quellen_bereit.get() == 1,
        }
    }
}

/// Axum-Router fuer den `/health`-Endpunkt
pub fn health_router(metriken: BrokerMetrics) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(HealthState::neu(metriken))
}

/// `GET /health` – gibt den Broker-Status zurueck
async fn health_handler(State(state): State<HealthState>) -> impl IntoResponse {
    // Auch degraded ist 200: der naechste Attach startet die Quellen neu
    (StatusCode::OK, Json(state.antwort()))
}

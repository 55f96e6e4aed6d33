//! Prometheus-kompatible Metriken fuer camrelay
//!
//! Registrierte Metriken:
//! - `camrelay_active_sessions` – Gauge: Viewer-Sessions im SessionStore
//! - `camrelay_attach_total` – Counter: Attach-Versuche nach Ergebnis (`result`)
//! - `camrelay_sources_ready` – Gauge: 1 wenn alle Feeds laufen, sonst 0
//! - `camrelay_source_init_total` – Counter: Initialisierungslaeufe (`result`)
//! - `camrelay_endpoint_releases_total` – Counter: Freigegebene Viewer-Endpunkte

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Ergebnis-Label fuer erfolgreiche Vorgaenge
pub const ERGEBNIS_OK: &str = "ok";
/// Ergebnis-Label fuer fehlgeschlagene Vorgaenge
pub const ERGEBNIS_FEHLER: &str = "error";

/// Alle Broker-Metriken
///
/// Clone teilt dieselbe Registry und dieselben Zaehler.
#[derive(Clone)]
pub struct BrokerMetrics {
    pub registry: Arc<Registry>,

    pub aktive_sitzungen: IntGauge,
    pub attach_gesamt: IntCounterVec,
    pub quellen_bereit: IntGauge,
    pub quellen_init_gesamt: IntCounterVec,
    pub endpunkt_freigaben: IntCounter,
}

impl BrokerMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        let aktive_sitzungen = IntGauge::with_opts(Opts::new(
            "camrelay_active_sessions",
            "Anzahl aktiver Viewer-Sessions",
        ))?;
        registry.register(Box::new(aktive_sitzungen.clone()))?;

        let attach_gesamt = IntCounterVec::new(
            Opts::new("camrelay_attach_total", "Attach-Versuche nach Ergebnis"),
            &["result"],
        )?;
        registry.register(Box::new(attach_gesamt.clone()))?;

        let quellen_bereit = IntGauge::with_opts(Opts::new(
            "camrelay_sources_ready",
            "1 wenn alle Quellen-Feeds initialisiert sind",
        ))?;
        registry.register(Box::new(quellen_bereit.clone()))?;

        let quellen_init_gesamt = IntCounterVec::new(
            Opts::new(
                "camrelay_source_init_total",
                "Initialisierungslaeufe der Quellen nach Ergebnis",
            ),
            &["result"],
        )?;
        registry.register(Box::new(quellen_init_gesamt.clone()))?;

        let endpunkt_freigaben = IntCounter::with_opts(Opts::new(
            "camrelay_endpoint_releases_total",
            "Anzahl freigegebener Viewer-Endpunkte",
        ))?;
        registry.register(Box::new(endpunkt_freigaben.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            aktive_sitzungen,
            attach_gesamt,
            quellen_bereit,
            quellen_init_gesamt,
            endpunkt_freigaben,
        })
    }

    /// Zaehlt einen Attach-Versuch mit dem gegebenen Ergebnis-Label
    pub fn attach_zaehlen(&self, ergebnis: &str) {
        self.attach_gesamt.with_label_values(&[ergebnis]).inc();
    }

    /// Zaehlt einen Initialisierungslauf der Quellen
    pub fn quellen_init_zaehlen(&self, erfolgreich: bool) {
        let label = if erfolgreich { ERGEBNIS_OK } else { ERGEBNIS_FEHLER };
        self.quellen_init_gesamt.with_label_values(&[label]).inc();
        self.quellen_bereit.set(i64::from(erfolgreich));
    }

    /// Anzahl fehlgeschlagener Initialisierungslaeufe
    pub fn quellen_init_fehler(&self) -> u64 {
        self.quellen_init_gesamt
            .with_label_values(&[ERGEBNIS_FEHLER])
            .get()
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Axum-Router fuer den `/metrics`-Endpunkt
pub fn metrics_router(metriken: BrokerMetrics) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metriken)
}

async fn metrics_handler(State(metriken): State<BrokerMetrics>) -> impl IntoResponse {
    match metriken.exportieren() {
        Ok(text) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(err) => {
            tracing::error!("Metriken-Export fehlgeschlagen: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

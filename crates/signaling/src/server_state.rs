//! Gemeinsamer Server-Zustand fuer den Signaling-Service
//!
//! Haelt Konfiguration, Engine und Verbindungszaehler als Arc-Referenzen,
//! die sicher zwischen tokio-Tasks geteilt werden koennen.

use camrelay_media::MediaGateway;
use camrelay_observability::BrokerMetrics;
use camrelay_protocol::wire::DEFAULT_MAX_FRAME_SIZE;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::engine::{SignalingEngine, SperrStrategie};

/// Konfiguration fuer den Signaling-Service
#[derive(Debug, Clone)]
pub struct SignalingConfig {
    /// Maximale gleichzeitige TCP-Verbindungen
    pub max_verbindungen: usize,
    /// Maximale Payload-Groesse eines Frames in Bytes
    pub max_frame_groesse: usize,
    pub sperr_strategie: SperrStrategie,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            max_verbindungen: 1024,
            max_frame_groesse: DEFAULT_MAX_FRAME_SIZE,
            sperr_strategie: SperrStrategie::Global,
        }
    }
}

/// Gemeinsamer Server-Zustand (thread-safe, Arc-geteilt)
pub struct SignalingState {
    pub config: Arc<SignalingConfig>,
    pub engine: Arc<SignalingEngine>,
    aktive_verbindungen: AtomicUsize,
}

impl SignalingState {
    /// Baut Engine und Zustand aus Konfiguration und Gateway auf
    pub fn aufbauen(
        config: SignalingConfig,
        uris: Vec<String>,
        gateway: Arc<dyn MediaGateway>,
        metriken: BrokerMetrics,
    ) -> Arc<Self> {
        let engine = SignalingEngine::neu(uris, gateway, metriken, config.sperr_strategie);
        Arc::new(Self {
            config: Arc::new(config),
            engine: Arc::new(engine),
            aktive_verbindungen: AtomicUsize::new(0),
        })
    }

    /// Anzahl offener TCP-Verbindungen
    pub fn verbindungen(&self) -> usize {
        self.aktive_verbindungen.load(Ordering::Acquire)
    }

    /// Reserviert einen Verbindungsplatz; None wenn das Limit erreicht ist
    ///
    /// Der Platz wird beim Drop des [`VerbindungsPlatz`] freigegeben, auch
    /// wenn der Verbindungs-Task panict.
    pub fn verbindung_belegen(self: &Arc<Self>) -> Option<VerbindungsPlatz> {
        self.aktive_verbindungen
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.config.max_verbindungen).then_some(n + 1)
            })
            .ok()
            .map(|_| VerbindungsPlatz {
                state: Arc::clone(self),
            })
    }

    fn verbindung_freigeben(&self) {
        self.aktive_verbindungen.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Belegter Verbindungsplatz, gibt sich beim Drop frei
pub struct VerbindungsPlatz {
    state: Arc<SignalingState>,
}

impl Drop for VerbindungsPlatz {
    fn drop(&mut self) {
        self.state.verbindung_freigeben();
    }
}

//! SourceRegistry – Konfigurierte Quellen und ihre Feeds
//!
//! Haelt die beim Start feste, geordnete Liste der Quellen-URIs und startet
//! beim ersten Bedarf alle Feeds in einer gemeinsamen Pipeline.
//!
//! ## Initialisierung
//! - Alles-oder-nichts: entweder laufen alle Feeds oder keiner
//! - Genau ein Initialisierungslauf gleichzeitig (async Mutex); wer waehrend
//!   eines Laufs wartet, bekommt dessen Ergebnis (Erfolg oder denselben Fehler)
//! - Teilfehler werden zurueckgerollt: bereits gestartete Feeds werden in
//!   umgekehrter Reihenfolge freigegeben, danach die Pipeline. Die Registry
//!   ist danach wieder uninitialisiert, ein spaeteres Attach versucht es erneut.
//!
//! Nach erfolgreicher Initialisierung sind Pipeline und Feeds read-mostly und
//! werden nur unter einem kurzen Read-Lock geklont.

use camrelay_core::SourceId;
use camrelay_media::{FeedHandle, GatewayError, MediaGateway, PipelineHandle};
use camrelay_observability::BrokerMetrics;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{SignalingError, SignalingResult};

/// Gestartete Feeds samt gemeinsamer Pipeline
#[derive(Debug)]
struct FeedSatz {
    pipeline: PipelineHandle,
    /// Ein Feed pro konfigurierter Quelle, gleiche Reihenfolge wie `uris`
    feeds: Vec<FeedHandle>,
}

/// Verwaltet die konfigurierten Quellen und ihre Feeds
pub struct SourceRegistry {
    uris: Vec<String>,
    gateway: Arc<dyn MediaGateway>,
    metriken: BrokerMetrics,
    satz: RwLock<Option<Arc<FeedSatz>>>,
    /// Serialisiert Initialisierung und Freigabe; haelt den letzten Fehler
    init: Mutex<Option<GatewayError>>,
    /// Anzahl fehlgeschlagener Laeufe
    fehlversuche: AtomicU64,
}

impl SourceRegistry {
    /// Erstellt eine uninitialisierte Registry fuer die gegebenen Quellen-URIs
    pub fn neu(uris: Vec<String>, gateway: Arc<dyn MediaGateway>, metriken: BrokerMetrics) -> Self {
        Self {
            uris,
            gateway,
            metriken,
            satz: RwLock::new(None),
            init: Mutex::new(None),
            fehlversuche: AtomicU64::new(0),
        }
    }

    /// Anzahl der konfigurierten Quellen
    pub fn anzahl(&self) -> usize {
        self.uris.len()
    }

    /// Konfigurierte Quellen-URIs in Index-Reihenfolge
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Gibt true zurueck wenn alle Feeds laufen
    pub fn ist_initialisiert(&self) -> bool {
        self.satz.read().is_some()
    }

    /// Startet Pipeline und alle Feeds, falls das noch nicht geschehen ist
    ///
    /// Idempotent und sicher bei gleichzeitigen Aufrufen.
    pub async fn initialisieren(&self) -> SignalingResult<()> {
        if self.ist_initialisiert() {
            return Ok(());
        }

        let beobachtet = self.fehlversuche.load(Ordering::Acquire);
        let mut letzter_fehler = self.init.lock().await;

        if self.ist_initialisiert() {
            return Ok(());
        }
        // Ein Lauf ist fehlgeschlagen, waehrend wir gewartet haben
        if self.fehlversuche.load(Ordering::Acquire) > beobachtet {
            if let Some(fehler) = letzter_fehler.as_ref() {
                return Err(SignalingError::QuellenInit(fehler.clone()));
            }
        }

        tracing::info!(quellen = self.uris.len(), "Quellen werden initialisiert");

        match self.feeds_starten().await {
            Ok(satz) => {
                *self.satz.write() = Some(Arc::new(satz));
                *letzter_fehler = None;
                self.metriken.quellen_init_zaehlen(true);
                tracing::info!(quellen = self.uris.len(), "Alle Quellen gestartet");
                Ok(())
            }
            Err(fehler) => {
                *letzter_fehler = Some(fehler.clone());
                self.fehlversuche.fetch_add(1, Ordering::AcqRel);
                self.metriken.quellen_init_zaehlen(false);
                tracing::error!(fehler = %fehler, "Initialisierung der Quellen fehlgeschlagen");
                Err(SignalingError::QuellenInit(fehler))
            }
        }
    }

    async fn feeds_starten(&self) -> Result<FeedSatz, GatewayError> {
        let pipeline = self.gateway.pipeline_erstellen().await?;
        let mut feeds = Vec::with_capacity(self.uris.len());

        for (index, uri) in self.uris.iter().enumerate() {
            match self.gateway.feed_erstellen_und_starten(&pipeline, uri).await {
                Ok(feed) => {
                    tracing::debug!(quelle = index, feed = %feed, "Feed gestartet");
                    feeds.push(feed);
                }
                Err(fehler) => {
                    tracing::warn!(
                        quelle = index,
                        fehler = %fehler,
                        gestartet = feeds.len(),
                        "Feed-Start fehlgeschlagen, Rollback"
                    );
                    self.abbauen(&pipeline, &feeds).await;
                    return Err(fehler);
                }
            }
        }

        Ok(FeedSatz { pipeline, feeds })
    }

    /// Gibt Feeds (rueckwaerts) und Pipeline frei; Fehler werden nur geloggt
    async fn abbauen(&self, pipeline: &PipelineHandle, feeds: &[FeedHandle]) {
        for feed in feeds.iter().rev() {
            if let Err(e) = self.gateway.feed_freigeben(feed).await {
                tracing::warn!(feed = %feed, fehler = %e, "Feed-Freigabe fehlgeschlagen");
            }
        }
        if let Err(e) = self.gateway.pipeline_freigeben(pipeline).await {
            tracing::warn!(pipeline = %pipeline, fehler = %e, "Pipeline-Freigabe fehlgeschlagen");
        }
    }

    /// Prueft eine Quellen-ID vom Client gegen die konfigurierten Quellen
    pub fn quelle_aufloesen(&self, roh: i64) -> SignalingResult<SourceId> {
        usize::try_from(roh)
            .ok()
            .filter(|index| *index < self.uris.len())
            .map(SourceId)
            .ok_or(SignalingError::UnbekannteQuelle {
                angefragt: roh,
                anzahl: self.uris.len(),
            })
    }

    /// Gibt den Feed einer gueltigen Quelle zurueck
    pub fn feed_fuer(&self, quelle: SourceId) -> SignalingResult<FeedHandle> {
        if quelle.index() >= self.uris.len() {
            return Err(SignalingError::UnbekannteQuelle {
                angefragt: i64::try_from(quelle.index()).unwrap_or(i64::MAX),
                anzahl: self.uris.len(),
            });
        }
        let satz = self.satz.read();
        let satz = satz.as_ref().ok_or(SignalingError::NichtInitialisiert)?;
        satz.feeds
            .get(quelle.index())
            .cloned()
            .ok_or_else(|| SignalingError::intern(format!("Feed fuer {quelle} fehlt")))
    }

    /// Gibt die gemeinsame Pipeline zurueck
    pub fn pipeline(&self) -> SignalingResult<PipelineHandle> {
        self.satz
            .read()
            .as_ref()
            .map(|satz| satz.pipeline.clone())
            .ok_or(SignalingError::NichtInitialisiert)
    }

    /// Gibt alle Feeds und die Pipeline frei (Shutdown)
    ///
    /// Danach ist die Registry uninitialisiert. No-op wenn nichts laeuft.
    pub async fn freigeben(&self) {
        let _init = self.init.lock().await;
        let satz = self.satz.write().take();

        if let Some(satz) = satz {
            self.abbauen(&satz.pipeline, &satz.feeds).await;
            self.metriken.quellen_bereit.set(0);
            tracing::info!(quellen = satz.feeds.len(), "Quellen freigegeben");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

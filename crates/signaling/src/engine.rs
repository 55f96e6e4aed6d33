//! SignalingEngine – Attach/Stop-Zustandsautomat pro Verbindung
//!
//! ## Zustaende
//! ```text
//! (keine Session) --attach ok--> Verbunden --stop/close--> (keine Session)
//!        |                           |
//!        +--attach fehlgeschlagen    +--attach--> rejected ALREADY_ATTACHED
//!           (Session wird verworfen)
//! ```
//!
//! "Kein Endpunkt pruefen", "Endpunkt erstellen und binden" und "Endpunkt
//! speichern" laufen als eine Einheit unter der Sperre der Verbindung
//! ([`SperrStrategie`]). Fehler fuehren nie zum Verbindungsabbruch, der
//! Client bekommt eine `rejected`-Antwort.

use camrelay_core::{ConnectionId, SourceId};
use camrelay_media::{EndpointHandle, FeedHandle, MediaGateway};
use camrelay_observability::BrokerMetrics;
use camrelay_protocol::{AttachRequest, ServerMessage};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{SignalingError, SignalingResult};
use crate::registry::SourceRegistry;
use crate::session_store::SessionStore;

/// Label fuer erfolgreiche Attach-Versuche in `camrelay_attach_total`
pub const ATTACH_AKZEPTIERT: &str = "accepted";

// ---------------------------------------------------------------------------
// Sperr-Strategie
// ---------------------------------------------------------------------------

/// Wie Attach/Stop/Close serialisiert werden
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SperrStrategie {
    /// Eine Sperre fuer den gesamten Broker
    #[default]
    Global,
    /// Eine Sperre pro Verbindung; fremde Verbindungen laufen parallel
    ProVerbindung,
}

// ---------------------------------------------------------------------------
// SignalingEngine
// ---------------------------------------------------------------------------

/// Zentrale Logik des Brokers
pub struct SignalingEngine {
    registry: Arc<SourceRegistry>,
    sessions: SessionStore,
    gateway: Arc<dyn MediaGateway>,
    metriken: BrokerMetrics,
    strategie: SperrStrategie,
    global: Arc<Mutex<()>>,
    pro_verbindung: DashMap<ConnectionId, Arc<Mutex<()>>>,
}

impl SignalingEngine {
    /// Erstellt die Engine samt (noch uninitialisierter) SourceRegistry
    pub fn neu(
        uris: Vec<String>,
        gateway: Arc<dyn MediaGateway>,
        metriken: BrokerMetrics,
        strategie: SperrStrategie,
    ) -> Self {
        let registry = Arc::new(SourceRegistry::neu(
            uris,
            Arc::clone(&gateway),
            metriken.clone(),
        ));
        Self {
            registry,
            sessions: SessionStore::neu(),
            gateway,
            metriken,
            strategie,
            global: Arc::new(Mutex::new(())),
            pro_verbindung: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SourceRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn metriken(&self) -> &BrokerMetrics {
        &self.metriken
    }

    pub fn strategie(&self) -> SperrStrategie {
        self.strategie
    }

    async fn sperre(&self, verbindung: ConnectionId) -> OwnedMutexGuard<()> {
        let mutex = match self.strategie {
            SperrStrategie::Global => Arc::clone(&self.global),
            SperrStrategie::ProVerbindung => {
                Arc::clone(&self.pro_verbindung.entry(verbindung).or_default())
            }
        };
        mutex.lock_owned().await
    }

    // -----------------------------------------------------------------------
    // Attach
    // -----------------------------------------------------------------------

    /// Verarbeitet ein Attach und liefert immer eine Antwort fuer den Client
    ///
    /// Die Quellen werden ausserhalb der Sperre initialisiert, die Registry
    /// serialisiert das selbst. Alle Wartenden sehen dasselbe Ergebnis.
    pub async fn handle_attach(&self, verbindung: ConnectionId, anfrage: AttachRequest) -> ServerMessage {
        let ergebnis = match self.registry.initialisieren().await {
            Ok(()) => {
                let _sperre = self.sperre(verbindung).await;
                self.attach_intern(verbindung, &anfrage).await
            }
            Err(fehler) => Err(fehler),
        };

        let antwort = match ergebnis {
            Ok((quelle, answer)) => {
                self.metriken.attach_zaehlen(ATTACH_AKZEPTIERT);
                tracing::info!(verbindung = %verbindung, quelle = %quelle, "Viewer verbunden");
                ServerMessage::akzeptiert(answer)
            }
            Err(fehler) => {
                self.metriken.attach_zaehlen(fehler.metrik_label());
                if fehler.ist_konsistenzfehler() {
                    tracing::error!(verbindung = %verbindung, fehler = %fehler, "Attach inkonsistent");
                } else {
                    tracing::warn!(
                        verbindung = %verbindung,
                        quelle = anfrage.source_id,
                        fehler = %fehler,
                        "Attach abgelehnt"
                    );
                }
                ServerMessage::abgelehnt(fehler.reject_code(), fehler.client_grund())
            }
        };

        self.sitzungen_aktualisieren();
        antwort
    }

    async fn attach_intern(
        &self,
        verbindung: ConnectionId,
        anfrage: &AttachRequest,
    ) -> SignalingResult<(SourceId, String)> {
        let bestehend = self.sessions.holen(&verbindung);
        if bestehend.as_ref().is_some_and(|s| s.ist_verbunden()) {
            return Err(SignalingError::BereitsVerbunden);
        }

        let quelle = self.registry.quelle_aufloesen(anfrage.source_id)?;

        let neu_angelegt = bestehend.is_none();
        if neu_angelegt {
            self.sessions.erstellen(verbindung)?;
        }

        match self.viewer_verbinden(verbindung, quelle, &anfrage.offer).await {
            Ok(answer) => Ok((quelle, answer)),
            Err(fehler) => {
                if neu_angelegt {
                    self.sessions.entfernen(&verbindung);
                }
                Err(fehler)
            }
        }
    }

    /// Erstellt den Endpunkt, bindet den Feed und handelt aus
    ///
    /// Ein bereits erstellter Endpunkt wird bei jedem Fehler wieder freigegeben.
    async fn viewer_verbinden(
        &self,
        verbindung: ConnectionId,
        quelle: SourceId,
        offer: &str,
    ) -> SignalingResult<String> {
        let feed = self.registry.feed_fuer(quelle)?;
        let pipeline = self.registry.pipeline()?;
        let endpunkt = self.gateway.endpunkt_erstellen(&pipeline).await?;

        let answer = match self.aushandeln(&feed, &endpunkt, offer).await {
            Ok(answer) => answer,
            Err(fehler) => {
                self.endpunkt_freigeben(verbindung, &endpunkt).await;
                return Err(fehler);
            }
        };

        if let Err(fehler) = self.sessions.binden(&verbindung, quelle, endpunkt.clone()) {
            self.endpunkt_freigeben(verbindung, &endpunkt).await;
            return Err(fehler);
        }

        Ok(answer)
    }

    async fn aushandeln(
        &self,
        feed: &FeedHandle,
        endpunkt: &EndpointHandle,
        offer: &str,
    ) -> SignalingResult<String> {
        self.gateway.feed_verbinden(feed, endpunkt).await?;
        Ok(self.gateway.aushandeln(endpunkt, offer).await?)
    }

    // -----------------------------------------------------------------------
    // Stop / Close
    // -----------------------------------------------------------------------

    /// Beendet die Session einer Verbindung (idempotent, keine Antwort)
    pub async fn handle_stop(&self, verbindung: ConnectionId) {
        let _sperre = self.sperre(verbindung).await;
        self.session_beenden(verbindung, "stop").await;
    }

    /// Wird vom Transport genau einmal pro Verbindung beim Schliessen aufgerufen
    pub async fn verbindung_geschlossen(&self, verbindung: ConnectionId) {
        {
            let _sperre = self.sperre(verbindung).await;
            self.session_beenden(verbindung, "verbindung_geschlossen").await;
        }
        self.pro_verbindung.remove(&verbindung);
    }

    /// Entfernt die Session und gibt ihren Endpunkt frei
    ///
    /// Die Session wird vor der Freigabe entfernt, damit ein Endpunkt auch
    /// bei Wiederholung nur einmal freigegeben wird.
    async fn session_beenden(&self, verbindung: ConnectionId, grund: &'static str) {
        let Some(session) = self.sessions.entfernen(&verbindung) else {
            tracing::trace!(verbindung = %verbindung, grund, "Keine Session vorhanden");
            return;
        };

        if let Some(endpunkt) = &session.endpunkt {
            self.endpunkt_freigeben(verbindung, endpunkt).await;
        }
        self.sitzungen_aktualisieren();

        let dauer = Utc::now() - session.erstellt_am;
        tracing::info!(
            verbindung = %verbindung,
            quelle = ?session.quelle.map(|q| q.index()),
            dauer_ms = dauer.num_milliseconds(),
            grund,
            "Session beendet"
        );
    }

    async fn endpunkt_freigeben(&self, verbindung: ConnectionId, endpunkt: &EndpointHandle) {
        match self.gateway.endpunkt_freigeben(endpunkt).await {
            Ok(()) => self.metriken.endpunkt_freigaben.inc(),
            Err(e) => tracing::warn!(
                verbindung = %verbindung,
                endpunkt = %endpunkt,
                fehler = %e,
                "Endpunkt-Freigabe fehlgeschlagen"
            ),
        }
    }

    fn sitzungen_aktualisieren(&self) {
        self.metriken
            .aktive_sitzungen
            .set(i64::try_from(self.sessions.anzahl()).unwrap_or(i64::MAX));
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Beendet alle verbleibenden Sessions und gibt danach die Quellen frei
    pub async fn herunterfahren(&self) {
        let ids = self.sessions.alle_ids();
        tracing::info!(sessions = ids.len(), "Engine wird heruntergefahren");

        for verbindung in ids {
            let _sperre = self.sperre(verbindung).await;
            self.session_beenden(verbindung, "shutdown").await;
        }
        self.pro_verbindung.clear();
        self.registry.freigeben().await;
    }
}

//! InMemoryGateway – prozessinterne Media-Engine
//!
//! Erzeugt UUID-basierte Handles, fuehrt Buch ueber lebende Objekte und
//! zaehlt jeden Aufruf. Fehler koennen pro Operation oder pro Quellen-URI
//! injiziert werden; eine optionale Verzoegerung simuliert eine entfernte
//! Engine. Wird vom Server im Modus `in-memory` und von allen Tests genutzt.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::{EndpointHandle, FeedHandle, MediaGateway, PipelineHandle};

// ---------------------------------------------------------------------------
// Statistik & Fehlerinjektion
// ---------------------------------------------------------------------------

/// Operationen des Gateways (fuer Fehlerinjektion)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayOperation {
    PipelineErstellen,
    FeedStarten,
    EndpunktErstellen,
    FeedVerbinden,
    Aushandeln,
    EndpunktFreigeben,
    FeedFreigeben,
    PipelineFreigeben,
}

/// Anzahl der Aufrufe je Operation (auch fehlgeschlagene)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AufrufStatistik {
    pub pipelines_erstellt: usize,
    pub feeds_gestartet: usize,
    pub endpunkte_erstellt: usize,
    pub verbindungen: usize,
    pub aushandlungen: usize,
    pub endpunkte_freigegeben: usize,
    pub feeds_freigegeben: usize,
    pub pipelines_freigegeben: usize,
}

#[derive(Default)]
struct Zustand {
    pipelines: HashSet<PipelineHandle>,
    /// Feed -> URI der Quelle
    feeds: HashMap<FeedHandle, String>,
    /// Endpunkt -> verbundener Feed
    endpunkte: HashMap<EndpointHandle, Option<FeedHandle>>,
    /// Freigabe-Aufrufe je Endpunkt
    endpunkt_freigaben: HashMap<EndpointHandle, usize>,
    statistik: AufrufStatistik,
    fehler: HashSet<GatewayOperation>,
    fehler_uris: HashSet<String>,
}

impl Zustand {
    fn pruefen(&self, op: GatewayOperation) -> GatewayResult<()> {
        if !self.fehler.contains(&op) {
            return Ok(());
        }
        let grund = format!("injizierter Fehler bei {op:?}");
        Err(match op {
            GatewayOperation::PipelineErstellen | GatewayOperation::PipelineFreigeben => {
                GatewayError::Pipeline(grund)
            }
            GatewayOperation::FeedStarten | GatewayOperation::FeedFreigeben => GatewayError::Feed {
                uri: String::new(),
                grund,
            },
            GatewayOperation::EndpunktErstellen | GatewayOperation::EndpunktFreigeben => {
                GatewayError::Endpunkt(grund)
            }
            GatewayOperation::FeedVerbinden => GatewayError::Bindung(grund),
            GatewayOperation::Aushandeln => GatewayError::Aushandlung(grund),
        })
    }
}

// ---------------------------------------------------------------------------
// InMemoryGateway
// ---------------------------------------------------------------------------

/// Prozessinterne Media-Engine
///
/// Thread-safe via `parking_lot::Mutex`; der Lock wird nie ueber ein
/// `.await` gehalten.
#[derive(Default)]
pub struct InMemoryGateway {
    zustand: Mutex<Zustand>,
    verzoegerung: Option<Duration>,
}

impl InMemoryGateway {
    /// Erstellt ein Gateway ohne Verzoegerung
    pub fn neu() -> Self {
        Self::default()
    }

    /// Jede Operation wartet vor der Ausfuehrung `verzoegerung`
    pub fn mit_verzoegerung(verzoegerung: Duration) -> Self {
        Self {
            zustand: Mutex::new(Zustand::default()),
            verzoegerung: Some(verzoegerung),
        }
    }

    /// Laesst alle folgenden Aufrufe von `op` fehlschlagen
    pub fn fehler_injizieren(&self, op: GatewayOperation) {
        self.zustand.lock().fehler.insert(op);
    }

    /// Hebt eine Fehlerinjektion wieder auf
    pub fn fehler_entfernen(&self, op: GatewayOperation) {
        self.zustand.lock().fehler.remove(&op);
    }

    /// Laesst das Starten eines Feeds fuer genau diese URI fehlschlagen
    pub fn feed_fehler_fuer_uri(&self, uri: impl Into<String>) {
        self.zustand.lock().fehler_uris.insert(uri.into());
    }

    /// Entfernt alle Fehlerinjektionen
    pub fn fehler_zuruecksetzen(&self) {
        let mut z = self.zustand.lock();
        z.fehler.clear();
        z.fehler_uris.clear();
    }

    /// Momentaufnahme der Aufrufzaehler
    pub fn statistik(&self) -> AufrufStatistik {
        self.zustand.lock().statistik.clone()
    }

    /// Wie oft wurde dieser Endpunkt freigegeben (auch erfolglose Aufrufe)
    pub fn freigaben_fuer(&self, endpunkt: &EndpointHandle) -> usize {
        self.zustand
            .lock()
            .endpunkt_freigaben
            .get(endpunkt)
            .copied()
            .unwrap_or(0)
    }

    /// Anzahl lebender Viewer-Endpunkte
    pub fn aktive_endpunkte(&self) -> usize {
        self.zustand.lock().endpunkte.len()
    }

    /// Anzahl lebender Feeds
    pub fn aktive_feeds(&self) -> usize {
        self.zustand.lock().feeds.len()
    }

    /// Anzahl lebender Pipelines
    pub fn aktive_pipelines(&self) -> usize {
        self.zustand.lock().pipelines.len()
    }

    /// Gibt den Feed zurueck, mit dem ein Endpunkt verbunden ist
    pub fn feed_von_endpunkt(&self, endpunkt: &EndpointHandle) -> Option<FeedHandle> {
        self.zustand.lock().endpunkte.get(endpunkt).cloned().flatten()
    }

    async fn warten(&self) {
        if let Some(d) = self.verzoegerung {
            tokio::time::sleep(d).await;
        }
    }
}

fn neue_id(praefix: &str) -> String {
    format!("{praefix}-{}", Uuid::new_v4())
}

#[async_trait]
impl MediaGateway for InMemoryGateway {
    async fn pipeline_erstellen(&self) -> GatewayResult<PipelineHandle> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.pipelines_erstellt += 1;
        z.pruefen(GatewayOperation::PipelineErstellen)?;

        let pipeline = PipelineHandle::neu(neue_id("pipeline"));
        z.pipelines.insert(pipeline.clone());
        tracing::debug!(pipeline = %pipeline, "Pipeline erstellt");
        Ok(pipeline)
    }

    async fn feed_erstellen_und_starten(
        &self,
        pipeline: &PipelineHandle,
        uri: &str,
    ) -> GatewayResult<FeedHandle> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.feeds_gestartet += 1;
        z.pruefen(GatewayOperation::FeedStarten).map_err(|e| match e {
            GatewayError::Feed { grund, .. } => GatewayError::Feed {
                uri: uri.to_string(),
                grund,
            },
            andere => andere,
        })?;

        if !z.pipelines.contains(pipeline) {
            return Err(GatewayError::UnbekanntesObjekt(pipeline.to_string()));
        }
        if z.fehler_uris.contains(uri) {
            return Err(GatewayError::Feed {
                uri: uri.to_string(),
                grund: "Quelle nicht erreichbar".into(),
            });
        }

        let feed = FeedHandle::neu(neue_id("feed"));
        z.feeds.insert(feed.clone(), uri.to_string());
        tracing::debug!(feed = %feed, uri, "Feed gestartet");
        Ok(feed)
    }

    async fn endpunkt_erstellen(&self, pipeline: &PipelineHandle) -> GatewayResult<EndpointHandle> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.endpunkte_erstellt += 1;
        z.pruefen(GatewayOperation::EndpunktErstellen)?;

        if !z.pipelines.contains(pipeline) {
            return Err(GatewayError::UnbekanntesObjekt(pipeline.to_string()));
        }

        let endpunkt = EndpointHandle::neu(neue_id("endpoint"));
        z.endpunkte.insert(endpunkt.clone(), None);
        Ok(endpunkt)
    }

    async fn feed_verbinden(&self, feed: &FeedHandle, endpunkt: &EndpointHandle) -> GatewayResult<()> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.verbindungen += 1;
        z.pruefen(GatewayOperation::FeedVerbinden)?;

        if !z.feeds.contains_key(feed) {
            return Err(GatewayError::UnbekanntesObjekt(feed.to_string()));
        }
        match z.endpunkte.get_mut(endpunkt) {
            Some(slot) => {
                *slot = Some(feed.clone());
                Ok(())
            }
            None => Err(GatewayError::UnbekanntesObjekt(endpunkt.to_string())),
        }
    }

    async fn aushandeln(&self, endpunkt: &EndpointHandle, offer: &str) -> GatewayResult<String> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.aushandlungen += 1;
        z.pruefen(GatewayOperation::Aushandeln)?;

        if offer.trim().is_empty() {
            return Err(GatewayError::Aushandlung("leeres Offer".into()));
        }
        let feed = match z.endpunkte.get(endpunkt) {
            Some(feed) => feed.clone(),
            None => return Err(GatewayError::UnbekanntesObjekt(endpunkt.to_string())),
        };

        let feed_id = feed.as_ref().map(FeedHandle::as_str).unwrap_or("-");
        Ok(format!(
            "v=0\r\ns=camrelay\r\na=x-endpoint:{}\r\na=x-feed:{}\r\n",
            endpunkt.as_str(),
            feed_id
        ))
    }

    async fn endpunkt_freigeben(&self, endpunkt: &EndpointHandle) -> GatewayResult<()> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.endpunkte_freigegeben += 1;
        *z.endpunkt_freigaben.entry(endpunkt.clone()).or_insert(0) += 1;
        z.pruefen(GatewayOperation::EndpunktFreigeben)?;

        match z.endpunkte.remove(endpunkt) {
            Some(_) => Ok(()),
            None => Err(GatewayError::UnbekanntesObjekt(endpunkt.to_string())),
        }
    }

    async fn feed_freigeben(&self, feed: &FeedHandle) -> GatewayResult<()> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.feeds_freigegeben += 1;
        z.pruefen(GatewayOperation::FeedFreigeben)?;

        match z.feeds.remove(feed) {
            Some(_) => Ok(()),
            None => Err(GatewayError::UnbekanntesObjekt(feed.to_string())),
        }
    }

    async fn pipeline_freigeben(&self, pipeline: &PipelineHandle) -> GatewayResult<()> {
        self.warten().await;
        let mut z = self.zustand.lock();
        z.statistik.pipelines_freigegeben += 1;
        z.pruefen(GatewayOperation::PipelineFreigeben)?;

        if z.pipelines.remove(pipeline) {
            Ok(())
        } else {
            Err(GatewayError::UnbekanntesObjekt(pipeline.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn viewer_lebenszyklus() {
        let gw = InMemoryGateway::neu();
        let pipeline = gw.pipeline_erstellen().await.unwrap();
        let feed = gw
            .feed_erstellen_und_starten(&pipeline, "rtsp://kamera-0")
            .await
            .unwrap();
        let ep = gw.endpunkt_erstellen(&pipeline).await.unwrap();

        gw.feed_verbinden(&feed, &ep).await.unwrap();
        assert_eq!(gw.feed_von_endpunkt(&ep), Some(feed.clone()));

        let answer = gw.aushandeln(&ep, "v=0 offer").await.unwrap();
        assert!(answer.contains(feed.as_str()));

        gw.endpunkt_freigeben(&ep).await.unwrap();
        assert_eq!(gw.aktive_endpunkte(), 0);
        assert_eq!(gw.freigaben_fuer(&ep), 1);
    }

    #[tokio::test]
    async fn doppelte_freigabe_ist_fehler() {
        let gw = InMemoryGateway::neu();
        let pipeline = gw.pipeline_erstellen().await.unwrap();
        let ep = gw.endpunkt_erstellen(&pipeline).await.unwrap();

        gw.endpunkt_freigeben(&ep).await.unwrap();
        let zweite = gw.endpunkt_freigeben(&ep).await;
        assert!(matches!(zweite, Err(GatewayError::UnbekanntesObjekt(_))));
        assert_eq!(gw.freigaben_fuer(&ep), 2);
    }

    #[tokio::test]
    async fn leeres_offer_wird_abgelehnt() {
        let gw = InMemoryGateway::neu();
        let pipeline = gw.pipeline_erstellen().await.unwrap();
        let ep = gw.endpunkt_erstellen(&pipeline).await.unwrap();

        let result = gw.aushandeln(&ep, "  ").await;
        assert!(matches!(result, Err(GatewayError::Aushandlung(_))));
    }

    #[tokio::test]
    async fn fehlerinjektion_pro_operation() {
        let gw = InMemoryGateway::neu();
        gw.fehler_injizieren(GatewayOperation::PipelineErstellen);
        assert!(gw.pipeline_erstellen().await.is_err());

        gw.fehler_entfernen(GatewayOperation::PipelineErstellen);
        assert!(gw.pipeline_erstellen().await.is_ok());
        assert_eq!(gw.statistik().pipelines_erstellt, 2);
    }

    #[tokio::test]
    async fn fehlerinjektion_pro_uri() {
        let gw = InMemoryGateway::neu();
        gw.feed_fehler_fuer_uri("rtsp://kaputt");
        let pipeline = gw.pipeline_erstellen().await.unwrap();

        assert!(gw.feed_erstellen_und_starten(&pipeline, "rtsp://ok").await.is_ok());
        let fehler = gw
            .feed_erstellen_und_starten(&pipeline, "rtsp://kaputt")
            .await
            .unwrap_err();
        assert!(matches!(fehler, GatewayError::Feed { ref uri, .. } if uri == "rtsp://kaputt"));
        assert_eq!(gw.aktive_feeds(), 1);
    }

    #[tokio::test]
    async fn endpunkt_in_unbekannter_pipeline() {
        let gw = InMemoryGateway::neu();
        let fremd = PipelineHandle::neu("gibt-es-nicht");
        assert!(matches!(
            gw.endpunkt_erstellen(&fremd).await,
            Err(GatewayError::UnbekanntesObjekt(_))
        ));
    }
}

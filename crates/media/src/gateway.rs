//! MediaGateway-Trait und opake Handles
//!
//! Das Trait ist die einzige Stelle, ueber die der Broker mit der
//! Media-Engine spricht. Alle Operationen koennen fehlschlagen; der Broker
//! bildet die Fehler auf seine eigene Taxonomie ab.

use async_trait::async_trait;

use crate::error::GatewayResult;

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opakes Handle auf die gemeinsame Media-Pipeline
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineHandle(String);

impl PipelineHandle {
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PipelineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "pipeline:{}", self.0)
    }
}

/// Opakes Handle auf einen laufenden Quellen-Feed
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeedHandle(String);

impl FeedHandle {
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feed:{}", self.0)
    }
}

/// Opakes Handle auf den ausgehandelten Endpunkt eines Viewers
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointHandle(String);

impl EndpointHandle {
    pub fn neu(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EndpointHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "endpoint:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// MediaGateway
// ---------------------------------------------------------------------------

/// Schnittstelle zur externen Media-Engine
///
/// Implementierungen muessen `Send + Sync` sein, da Verbindungs-Tasks auf
/// dem Multi-Thread-Runtime parallel laufen.
#[async_trait]
pub trait MediaGateway: Send + Sync {
    /// Erstellt die gemeinsame Pipeline, in der alle Feeds und Endpunkte leben
    async fn pipeline_erstellen(&self) -> GatewayResult<PipelineHandle>;

    /// Erstellt einen Feed fuer die Quelle `uri` und startet die Wiedergabe
    async fn feed_erstellen_und_starten(
        &self,
        pipeline: &PipelineHandle,
        uri: &str,
    ) -> GatewayResult<FeedHandle>;

    /// Erstellt einen neuen Viewer-Endpunkt in der Pipeline
    async fn endpunkt_erstellen(&self, pipeline: &PipelineHandle) -> GatewayResult<EndpointHandle>;

    /// Verbindet den Ausgang eines Feeds mit einem Viewer-Endpunkt
    async fn feed_verbinden(&self, feed: &FeedHandle, endpunkt: &EndpointHandle) -> GatewayResult<()>;

    /// Verarbeitet das Offer des Clients und liefert die Answer
    async fn aushandeln(&self, endpunkt: &EndpointHandle, offer: &str) -> GatewayResult<String>;

    /// Gibt einen Viewer-Endpunkt frei
    async fn endpunkt_freigeben(&self, endpunkt: &EndpointHandle) -> GatewayResult<()>;

    /// Stoppt und gibt einen Feed frei (Rollback, Shutdown)
    async fn feed_freigeben(&self, feed: &FeedHandle) -> GatewayResult<()>;

    /// Gibt die Pipeline frei (Rollback, Shutdown)
    async fn pipeline_freigeben(&self, pipeline: &PipelineHandle) -> GatewayResult<()>;
}

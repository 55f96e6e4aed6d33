//! Message-Dispatcher – Routet eingehende Frames an die Engine
//!
//! - `attach` -> Engine-Attach, Antwort wird immer gesendet
//! - `stop` -> Engine-Stop, keine Antwort
//! - unbekannte `kind`-Werte werden ignoriert
//! - nicht dekodierbare Frames mit `kind: "attach"` werden mit
//!   `INVALID_REQUEST` abgelehnt, alle anderen ignoriert

use camrelay_core::ConnectionId;
use camrelay_protocol::{ClientMessage, Eingehend, RejectCode, ServerMessage};
use std::sync::Arc;

use crate::engine::SignalingEngine;

/// Metrik-Label fuer nicht dekodierbare Attach-Anfragen
const ATTACH_UNGUELTIG: &str = "invalid_request";

/// Zentraler Message-Dispatcher
pub struct MessageDispatcher {
    engine: Arc<SignalingEngine>,
}

impl MessageDispatcher {
    pub fn neu(engine: Arc<SignalingEngine>) -> Self {
        Self { engine }
    }

    /// Verarbeitet einen eingehenden Frame
    ///
    /// Gibt `None` zurueck wenn keine Antwort gesendet werden soll.
    pub async fn dispatch(&self, verbindung: ConnectionId, eingehend: Eingehend) -> Option<ServerMessage> {
        match eingehend {
            Eingehend::Nachricht(ClientMessage::Attach(anfrage)) => {
                Some(self.engine.handle_attach(verbindung, anfrage).await)
            }
            Eingehend::Nachricht(ClientMessage::Stop) => {
                self.engine.handle_stop(verbindung).await;
                None
            }
            Eingehend::Nachricht(ClientMessage::Unknown) => {
                tracing::debug!(verbindung = %verbindung, "Unbekannte Nachricht ignoriert");
                None
            }
            Eingehend::Ungueltig { kind, fehler } => {
                if kind.as_deref() == Some("attach") {
                    tracing::warn!(verbindung = %verbindung, fehler = %fehler, "Ungueltige Attach-Anfrage");
                    self.engine.metriken().attach_zaehlen(ATTACH_UNGUELTIG);
                    Some(ServerMessage::abgelehnt(
                        RejectCode::InvalidRequest,
                        format!("Ungueltige Attach-Anfrage: {fehler}"),
                    ))
                } else {
                    tracing::debug!(
                        verbindung = %verbindung,
                        kind = ?kind,
                        fehler = %fehler,
                        "Nicht dekodierbarer Frame ignoriert"
                    );
                    None
                }
            }
        }
    }
}

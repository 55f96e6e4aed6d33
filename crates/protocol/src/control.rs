//! Control-Protokoll (Signaling)
//!
//! Definiert die Nachrichten, die zwischen Viewer-Client und Broker
//! ausgetauscht werden.
//!
//! ## Design
//! - JSON-Serialisierung via serde, Diskriminator ist das Feld `kind`
//! - Unbekannte `kind`-Werte werden zu [`ClientMessage::Unknown`] und vom
//!   Broker ignoriert (vorwaertskompatibel)
//! - Offer/Answer sind opake Strings, der Broker inspiziert sie nie

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Fehler-Codes
// ---------------------------------------------------------------------------

/// Maschinenlesbarer Grund fuer ein abgelehntes Attach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectCode {
    /// Quellen-ID ausserhalb der konfigurierten Quellen
    UnknownSource,
    /// Verbindung ist bereits an eine Quelle gebunden
    AlreadyAttached,
    /// Die Quellen konnten nicht gestartet werden
    SourceInitFailed,
    /// Media-Engine hat Endpunkt, Bindung oder Aushandlung abgelehnt
    MediaError,
    /// Anfrage konnte nicht dekodiert werden
    InvalidRequest,
    /// Interner Konsistenzfehler
    InternalError,
}

// ---------------------------------------------------------------------------
// Client -> Broker
// ---------------------------------------------------------------------------

/// Attach-Anfrage: Quelle waehlen und Offer zur Aushandlung uebergeben
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    /// Gewaehlte Quelle (nullbasierter Index). Vorzeichenbehaftet, damit
    /// negative Werte als unbekannte Quelle abgelehnt statt verworfen werden.
    pub source_id: i64,
    /// Opakes Offer des Clients
    pub offer: String,
}

/// Eingehende Nachricht vom Viewer-Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ClientMessage {
    /// An eine Quelle anhaengen
    Attach(AttachRequest),
    /// Wiedergabe beenden, Session freigeben
    Stop,
    /// Jeder andere `kind`-Wert
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Erstellt eine Attach-Nachricht
    pub fn attach(source_id: i64, offer: impl Into<String>) -> Self {
        Self::Attach(AttachRequest {
            source_id,
            offer: offer.into(),
        })
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Broker -> Client
// ---------------------------------------------------------------------------

/// Ergebnis eines Attach-Versuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachStatus {
    Accepted,
    Rejected,
}

/// Antwort auf eine Attach-Anfrage
///
/// Bei `accepted` ist `answer` gesetzt, bei `rejected` sind `reason` und
/// `code` gesetzt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachResult {
    pub status: AttachStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<RejectCode>,
}

/// Ausgehende Nachricht an den Viewer-Client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ServerMessage {
    AttachResult(AttachResult),
}

impl ServerMessage {
    /// Erstellt eine `accepted`-Antwort mit der Answer der Media-Engine
    pub fn akzeptiert(answer: impl Into<String>) -> Self {
        Self::AttachResult(AttachResult {
            status: AttachStatus::Accepted,
            answer: Some(answer.into()),
            reason: None,
            code: None,
        })
    }

    /// Erstellt eine `rejected`-Antwort mit lesbarem Grund
    pub fn abgelehnt(code: RejectCode, reason: impl Into<String>) -> Self {
        Self::AttachResult(AttachResult {
            status: AttachStatus::Rejected,
            answer: None,
            reason: Some(reason.into()),
            code: Some(code),
        })
    }

    /// Gibt true zurueck wenn dies eine akzeptierte Attach-Antwort ist
    pub fn ist_akzeptiert(&self) -> bool {
        match self {
            Self::AttachResult(r) => r.status == AttachStatus::Accepted,
        }
    }

    /// Gibt den Ablehnungs-Code zurueck (None bei `accepted`)
    pub fn reject_code(&self) -> Option<RejectCode> {
        match self {
            Self::AttachResult(r) => r.code,
        }
    }

    /// Gibt die Answer zurueck (None bei `rejected`)
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::AttachResult(r) => r.answer.as_deref(),
        }
    }

    /// Serialisiert die Nachricht als JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialisiert eine Nachricht aus JSON
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Fehlertypen fuer den Signaling-Service

use camrelay_core::ConnectionId;
use camrelay_media::GatewayError;
use camrelay_protocol::RejectCode;
use thiserror::Error;

/// Fehlertyp fuer den Signaling-Service
#[derive(Debug, Error)]
pub enum SignalingError {
    /// IO-Fehler (TCP, Socket)
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    /// Quellen-ID ausserhalb der konfigurierten Quellen
    #[error("Unbekannte Quelle {angefragt} (konfiguriert: {anzahl} Quellen)")]
    UnbekannteQuelle { angefragt: i64, anzahl: usize },

    /// Verbindung ist bereits an eine Quelle gebunden
    #[error("Verbindung ist bereits an eine Quelle gebunden")]
    BereitsVerbunden,

    /// Fuer die Verbindung existiert bereits eine Session (Konsistenzfehler)
    #[error("Session fuer {0} existiert bereits")]
    DoppelteSession(ConnectionId),

    /// Session wurde waehrend des Attach entfernt (Konsistenzfehler)
    #[error("Session fuer {0} existiert nicht")]
    SessionFehlt(ConnectionId),

    /// Die Quellen-Feeds konnten nicht gestartet werden
    #[error("Quellen konnten nicht initialisiert werden: {0}")]
    QuellenInit(GatewayError),

    /// Zugriff auf Feeds vor erfolgreicher Initialisierung
    #[error("Quellen sind nicht initialisiert")]
    NichtInitialisiert,

    /// Media-Engine hat eine Viewer-Operation abgelehnt
    #[error("Media-Engine-Fehler: {0}")]
    Gateway(#[from] GatewayError),

    /// Interner Fehler
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl SignalingError {
    /// Erstellt einen internen Fehler
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Code fuer die `rejected`-Antwort an den Client
    pub fn reject_code(&self) -> RejectCode {
        match self {
            Self::UnbekannteQuelle { .. } => RejectCode::UnknownSource,
            Self::BereitsVerbunden => RejectCode::AlreadyAttached,
            Self::QuellenInit(_) | Self::NichtInitialisiert => RejectCode::SourceInitFailed,
            Self::Gateway(_) => RejectCode::MediaError,
            Self::Io(_) | Self::DoppelteSession(_) | Self::SessionFehlt(_) | Self::Intern(_) => {
                RejectCode::InternalError
            }
        }
    }

    /// Lesbarer Grund fuer den Client
    ///
    /// Details der Media-Engine (URIs, Zugangsdaten) bleiben im Server-Log.
    pub fn client_grund(&self) -> String {
        match self {
            Self::UnbekannteQuelle { .. } | Self::Gateway(_) => self.to_string(),
            Self::BereitsVerbunden => "Diese Verbindung empfaengt bereits eine Quelle. \
                 Fuer einen weiteren Viewer eine neue Verbindung oeffnen."
                .to_string(),
            Self::QuellenInit(_) | Self::NichtInitialisiert => {
                "Die Kameras sind derzeit nicht verfuegbar, bitte spaeter erneut versuchen."
                    .to_string()
            }
            Self::Io(_) | Self::DoppelteSession(_) | Self::SessionFehlt(_) | Self::Intern(_) => {
                "Interner Fehler".to_string()
            }
        }
    }

    /// Ergebnis-Label fuer `camrelay_attach_total`
    pub fn metrik_label(&self) -> &'static str {
        match self.reject_code() {
            RejectCode::UnknownSource => "unknown_source",
            RejectCode::AlreadyAttached => "already_attached",
            RejectCode::SourceInitFailed => "source_init_failed",
            RejectCode::MediaError => "media_error",
            RejectCode::InvalidRequest => "invalid_request",
            RejectCode::InternalError => "internal_error",
        }
    }

    /// Konsistenzfehler deuten auf einen Bug hin und werden als `error` geloggt
    pub fn ist_konsistenzfehler(&self) -> bool {
        matches!(
            self,
            Self::DoppelteSession(_) | Self::SessionFehlt(_) | Self::Intern(_)
        )
    }
}

/// Result-Typ fuer den Signaling-Service
pub type SignalingResult<T> = Result<T, SignalingError>;

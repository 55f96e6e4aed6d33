//! Fehlertypen fuer die Media-Engine-Anbindung

use thiserror::Error;

/// Fehler einer Media-Engine-Operation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Media-Engine nicht erreichbar
    #[error("Media-Engine nicht erreichbar: {0}")]
    Verbindung(String),

    /// Pipeline konnte nicht erstellt werden
    #[error("Pipeline konnte nicht erstellt werden: {0}")]
    Pipeline(String),

    /// Feed einer Quelle konnte nicht erstellt oder gestartet werden
    #[error("Feed '{uri}' konnte nicht gestartet werden: {grund}")]
    Feed { uri: String, grund: String },

    /// Viewer-Endpunkt konnte nicht erstellt oder freigegeben werden
    #[error("Endpunkt-Fehler: {0}")]
    Endpunkt(String),

    /// Feed konnte nicht mit dem Endpunkt verbunden werden
    #[error("Bindung fehlgeschlagen: {0}")]
    Bindung(String),

    /// Offer/Answer-Aushandlung fehlgeschlagen
    #[error("Aushandlung fehlgeschlagen: {0}")]
    Aushandlung(String),

    /// Handle ist der Media-Engine nicht (mehr) bekannt
    #[error("Unbekanntes Media-Objekt: {0}")]
    UnbekanntesObjekt(String),
}

/// Result-Typ fuer Media-Engine-Operationen
pub type GatewayResult<T> = Result<T, GatewayError>;

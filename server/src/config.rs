//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder ausser der
//! Quellenliste haben sinnvolle Standardwerte.

use anyhow::{bail, Context};
use camrelay_observability::logging::{log_format_gueltig, log_level_gueltig};
use camrelay_signaling::{SignalingConfig, SperrStrategie};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Gateway-Typ der prozessinternen Media-Engine
pub const GATEWAY_IN_MEMORY: &str = "in-memory";

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Allgemeine Server-Einstellungen
    pub server: ServerEinstellungen,
    /// Netzwerk-Einstellungen
    pub netzwerk: NetzwerkEinstellungen,
    /// Kamera-Quellen
    pub quellen: QuellenEinstellungen,
    /// Signaling-Einstellungen
    pub signaling: SignalingEinstellungen,
    /// Media-Engine-Anbindung
    pub gateway: GatewayEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
}

/// Allgemeine Server-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerEinstellungen {
    /// Anzeigename des Brokers (nur fuer Logs)
    pub name: String,
    /// Maximale Anzahl gleichzeitiger TCP-Verbindungen
    pub max_verbindungen: usize,
}

impl Default for ServerEinstellungen {
    fn default() -> Self {
        Self {
            name: "camrelay".into(),
            max_verbindungen: 1024,
        }
    }
}

/// Netzwerk-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer Signaling und Observability
    pub bind_adresse: String,
    /// Port fuer das TCP-Signaling
    pub tcp_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            tcp_port: 8443,
        }
    }
}

/// Kamera-Quellen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QuellenEinstellungen {
    /// Quellen-URIs; der Index ist die `sourceId` im Protokoll
    pub uris: Vec<String>,
}

/// Signaling-Einstellungen
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingEinstellungen {
    /// "global" oder "pro_verbindung"
    pub sperr_strategie: SperrStrategie,
}

/// Media-Engine-Anbindung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayEinstellungen {
    /// Gateway-Implementierung, derzeit nur "in-memory"
    pub typ: String,
    /// Kuenstliche Verzoegerung pro Gateway-Aufruf in ms (0 = keine)
    pub verzoegerung_ms: u64,
}

impl Default for GatewayEinstellungen {
    fn default() -> Self {
        Self {
            typ: GATEWAY_IN_MEMORY.into(),
            verzoegerung_ms: 0,
        }
    }
}

impl GatewayEinstellungen {
    pub fn verzoegerung(&self) -> Option<Duration> {
        (self.verzoegerung_ms > 0).then(|| Duration::from_millis(self.verzoegerung_ms))
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            port: 9300,
        }
    }
}

impl ServerConfig {
    /// Laedt und validiert die Konfiguration aus einer TOML-Datei.
    ///
    /// Fehlt die Datei, werden Standardwerte verwendet; die Validierung
    /// schlaegt dann ohne Quellen fehl.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Self::aus_toml(&inhalt)
                .with_context(|| format!("Konfigurationsfehler in '{pfad}'"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Konfigurationsdatei '{pfad}' nicht lesbar"))
            }
        };

        config.validieren()?;
        Ok(config)
    }

    /// Parst eine Konfiguration aus einem TOML-String (ohne Validierung)
    pub fn aus_toml(inhalt: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(inhalt)?)
    }

    /// Prueft die Werte, die der Server zum Start braucht
    pub fn validieren(&self) -> anyhow::Result<()> {
        if self.quellen.uris.is_empty() {
            bail!("Keine Quellen konfiguriert ([quellen] uris ist leer)");
        }
        if let Some(index) = self.quellen.uris.iter().position(|u| u.trim().is_empty()) {
            bail!("Quelle {index} hat eine leere URI");
        }
        if self.gateway.typ != GATEWAY_IN_MEMORY {
            bail!(
                "Unbekannter Gateway-Typ '{}' (unterstuetzt: {GATEWAY_IN_MEMORY})",
                self.gateway.typ
            );
        }
        if self.server.max_verbindungen == 0 {
            bail!("[server] max_verbindungen muss groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("Ungueltiges Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Ungueltiges Log-Format '{}'", self.logging.format);
        }
        self.tcp_bind_adresse()?;
        Ok(())
    }

    /// Gibt die vollstaendige Bind-Adresse fuer TCP zurueck
    pub fn tcp_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.netzwerk.tcp_port)
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> anyhow::Result<SocketAddr> {
        adresse(&self.netzwerk.bind_adresse, self.observability.port)
    }

    /// Signaling-Konfiguration fuer den TCP-Service
    pub fn signaling_config(&self) -> SignalingConfig {
        SignalingConfig {
            max_verbindungen: self.server.max_verbindungen,
            sperr_strategie: self.signaling.sperr_strategie,
            ..SignalingConfig::default()
        }
    }
}

fn adresse(host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Ungueltige Bind-Adresse '{host}:{port}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mit_quellen() -> ServerConfig {
        let mut cfg = ServerConfig::default();
        cfg.quellen.uris = vec!["rtsp://kamera-0".into()];
        cfg
    }

    #[test]
    fn standardwerte() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.server.max_verbindungen, 1024);
        assert_eq!(cfg.netzwerk.tcp_port, 8443);
        assert_eq!(cfg.gateway.typ, "in-memory");
        assert_eq!(cfg.signaling.sperr_strategie, SperrStrategie::Global);
        assert_eq!(cfg.logging.level, "info");
        assert!(cfg.observability.aktiviert);
    }

    #[test]
    fn ohne_quellen_ungueltig() {
        let fehler = ServerConfig::default().validieren().unwrap_err();
        assert!(fehler.to_string().contains("Keine Quellen"));
        assert!(mit_quellen().validieren().is_ok());
    }

    #[test]
    fn unbekannter_gateway_typ() {
        let mut cfg = mit_quellen();
        cfg.gateway.typ = "gstreamer".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn ungueltige_bind_adresse() {
        let mut cfg = mit_quellen();
        cfg.netzwerk.bind_adresse = "kein host".into();
        assert!(cfg.validieren().is_err());
    }

    #[test]
    fn bind_adressen() {
        let cfg = mit_quellen();
        assert_eq!(cfg.tcp_bind_adresse().unwrap().to_string(), "0.0.0.0:8443");
        assert_eq!(
            cfg.observability_bind_adresse().unwrap().to_string(),
            "0.0.0.0:9300"
        );
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [server]
            name = "Halle 3"

            [netzwerk]
            tcp_port = 10000

            [quellen]
            uris = ["rtsp://a", "rtsp://b"]

            [signaling]
            sperr_strategie = "pro_verbindung"

            [gateway]
            verzoegerung_ms = 25
        "#;
        let cfg = ServerConfig::aus_toml(toml).unwrap();
        assert_eq!(cfg.server.name, "Halle 3");
        assert_eq!(cfg.netzwerk.tcp_port, 10000);
        assert_eq!(cfg.quellen.uris.len(), 2);
        assert_eq!(cfg.signaling.sperr_strategie, SperrStrategie::ProVerbindung);
        assert_eq!(cfg.gateway.verzoegerung(), Some(Duration::from_millis(25)));
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.server.max_verbindungen, 1024);
        assert!(cfg.validieren().is_ok());

        let signaling = cfg.signaling_config();
        assert_eq!(signaling.sperr_strategie, SperrStrategie::ProVerbindung);
        assert_eq!(signaling.max_verbindungen, 1024);
    }

    #[test]
    fn unbekannte_sperr_strategie_ist_parse_fehler() {
        let toml = r#"
            [signaling]
            sperr_strategie = "keine"
        "#;
        assert!(ServerConfig::aus_toml(toml).is_err());
    }

    #[test]
    fn laden_ohne_datei_nutzt_standardwerte() {
        // Ohne Quellen schlaegt die Validierung fehl
        let ergebnis = ServerConfig::laden("/gibt/es/nicht/camrelay.toml");
        assert!(ergebnis.is_err());
    }
}

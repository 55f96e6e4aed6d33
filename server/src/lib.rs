//! camrelay-server – Bibliotheks-Root
//!
//! Deklariert alle Server-Module und stellt den oeffentlichen Einstiegspunkt
//! fuer Integrationstests bereit.

pub mod config;

use anyhow::{Context, Result};
use camrelay_media::{InMemoryGateway, MediaGateway};
use camrelay_observability::{observability_server_starten, BrokerMetrics};
use camrelay_signaling::{SignalingServer, SignalingState};
use config::ServerConfig;
use std::sync::Arc;
use tokio::sync::watch;

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    fn gateway_erstellen(&self) -> Arc<dyn MediaGateway> {
        match self.config.gateway.verzoegerung() {
            Some(verzoegerung) => Arc::new(InMemoryGateway::mit_verzoegerung(verzoegerung)),
            None => Arc::new(InMemoryGateway::neu()),
        }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Metriken und Media-Gateway aufbauen
    /// 2. TCP-Signaling-Listener binden
    /// 3. Observability-Server starten (falls aktiviert)
    /// 4. Auf Ctrl-C warten
    /// 5. Verbindungen schliessen, danach Sessions und Quellen abbauen
    ///
    /// Die Quellen-Feeds werden erst beim ersten Attach gestartet.
    pub async fn starten(self) -> Result<()> {
        let metriken = BrokerMetrics::neu().context("Metriken konnten nicht registriert werden")?;
        let gateway = self.gateway_erstellen();

        let state = SignalingState::aufbauen(
            self.config.signaling_config(),
            self.config.quellen.uris.clone(),
            gateway,
            metriken.clone(),
        );

        let tcp_adresse = self.config.tcp_bind_adresse()?;
        let signaling = SignalingServer::binden(Arc::clone(&state), tcp_adresse)
            .await
            .with_context(|| format!("TCP-Listener auf {tcp_adresse} konnte nicht gebunden werden"))?;

        tracing::info!(
            server_name = %self.config.server.name,
            tcp = %signaling.lokale_adresse()?,
            quellen = self.config.quellen.uris.len(),
            gateway = %self.config.gateway.typ,
            sperr_strategie = ?self.config.signaling.sperr_strategie,
            "Server startet"
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let signaling_task = tokio::spawn(signaling.starten(shutdown_rx.clone()));

        let observability_task = if self.config.observability.aktiviert {
            let adresse = self.config.observability_bind_adresse()?;
            let metriken = metriken.clone();
            let rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                if let Err(e) = observability_server_starten(adresse, metriken, rx).await {
                    tracing::error!(fehler = %e, "Observability-Server fehlgeschlagen");
                }
            }))
        } else {
            None
        };

        tracing::info!("Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)...");
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        let _ = shutdown_tx.send(true);

        match signaling_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(fehler = %e, "Signaling-Server mit Fehler beendet"),
            Err(e) => tracing::error!(fehler = %e, "Signaling-Task abgebrochen"),
        }

        state.engine.herunterfahren().await;

        if let Some(task) = observability_task {
            let _ = task.await;
        }

        tracing::info!("Server beendet");
        Ok(())
    }
}

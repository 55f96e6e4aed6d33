//! Client-Connection – Verwaltet eine einzelne TCP-Verbindung
//!
//! Jede TCP-Verbindung bekommt eine `ClientConnection` in einem eigenen
//! tokio-Task. Frames einer Verbindung werden strikt nacheinander
//! verarbeitet; beim Ende (EOF, Lesefehler, Shutdown) wird die Engine genau
//! einmal ueber das Schliessen informiert.

use camrelay_core::ConnectionId;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;

use camrelay_protocol::FrameCodec;

use crate::dispatcher::MessageDispatcher;
use crate::server_state::SignalingState;

/// Verarbeitet eine einzelne Verbindung
pub struct ClientConnection {
    state: Arc<SignalingState>,
    peer_addr: SocketAddr,
    id: ConnectionId,
}

impl ClientConnection {
    /// Erstellt eine neue ClientConnection mit frischer ConnectionId
    pub fn neu(state: Arc<SignalingState>, peer_addr: SocketAddr) -> Self {
        Self {
            state,
            peer_addr,
            id: ConnectionId::new(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Startet die Verarbeitungsschleife
    ///
    /// Laeuft bis der Client trennt oder `shutdown_rx` `true` meldet.
    pub async fn verarbeiten<S>(self, stream: S, mut shutdown_rx: tokio::sync::watch::Receiver<bool>)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let peer_addr = self.peer_addr;
        let id = self.id;
        let engine = Arc::clone(&self.state.engine);
        let dispatcher = MessageDispatcher::neu(Arc::clone(&engine));
        let codec = FrameCodec::with_max_size(self.state.config.max_frame_groesse);
        let mut framed = Framed::new(stream, codec);

        tracing::info!(peer = %peer_addr, verbindung = %id, "Neue Verbindung");

        loop {
            tokio::select! {
                frame = framed.next() => {
                    match frame {
                        Some(Ok(eingehend)) => {
                            if let Some(antwort) = dispatcher.dispatch(id, eingehend).await {
                                if let Err(e) = framed.send(antwort).await {
                                    tracing::warn!(verbindung = %id, fehler = %e, "Senden fehlgeschlagen");
                                    break;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(verbindung = %id, fehler = %e, "Frame-Lesefehler");
                            break;
                        }
                        None => {
                            tracing::info!(verbindung = %id, "Verbindung vom Client getrennt");
                            break;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!(verbindung = %id, "Shutdown-Signal – Verbindung wird getrennt");
                        break;
                    }
                }
            }
        }

        engine.verbindung_geschlossen(id).await;
        tracing::debug!(verbindung = %id, "Verbindungs-Task beendet");
    }
}

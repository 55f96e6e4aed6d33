//! camrelay-signaling – Viewer-Signaling ueber TCP
//!
//! Dieser Crate implementiert den Broker zwischen Viewer-Clients und der
//! Media-Engine: Quellen-Feeds werden beim ersten Attach gestartet, jede
//! Verbindung kann genau eine Quelle empfangen.
//!
//! ## Architektur
//!
//! ```text
//! TCP Listener (SignalingServer)
//!     |
//!     v
//! ClientConnection (pro Verbindung ein Task)
//!     |
//!     v
//! MessageDispatcher
//!     |
//!     v
//! SignalingEngine  (Attach / Stop / Close, SperrStrategie)
//!     |
//!     +-- SourceRegistry  (Pipeline + Feeds, lazy, alles-oder-nichts)
//!     +-- SessionStore    (ConnectionId -> ViewerSession)
//!     +-- MediaGateway    (externe Media-Engine)
//! ```

pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod registry;
pub mod server_state;
pub mod session_store;
pub mod tcp;

// Bequeme Re-Exporte
pub use connection::ClientConnection;
pub use dispatcher::MessageDispatcher;
pub use engine::{SignalingEngine, SperrStrategie};
pub use error::{SignalingError, SignalingResult};
pub use registry::SourceRegistry;
pub use server_state::{SignalingConfig, SignalingState, VerbindungsPlatz};
pub use session_store::{SessionStore, SessionZustand, ViewerSession};
pub use tcp::SignalingServer;

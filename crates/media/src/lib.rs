//! camrelay-media – Grenze zur externen Media-Engine
//!
//! Der Broker beruehrt nie Medien-Bytes. Alles, was Pipelines, Feeds und
//! Viewer-Endpunkte materialisiert oder Offer/Answer berechnet, laeuft ueber
//! das Trait [`MediaGateway`]. Handles sind opake IDs der Media-Engine.
//!
//! ## Implementierungen
//!
//! - [`InMemoryGateway`] – prozessinterne Engine fuer Entwicklung und Tests
//!   (zaehlt Aufrufe, kann Fehler injizieren)
//!
//! Anbindungen an echte Media-Server implementieren dasselbe Trait.

pub mod error;
pub mod gateway;
pub mod memory;

pub use error::{GatewayError, GatewayResult};
pub use gateway::{EndpointHandle, FeedHandle, MediaGateway, PipelineHandle};
pub use memory::{AufrufStatistik, GatewayOperation, InMemoryGateway};

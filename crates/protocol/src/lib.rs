//! camrelay-protocol – Signaling-Protokoll-Definitionen
//!
//! Dieses Crate definiert die Nachrichtentypen zwischen Viewer-Client und
//! Broker sowie das Frame-Format der TCP-Verbindung.

pub mod control;
pub mod wire;

pub use control::{AttachRequest, AttachResult, AttachStatus, ClientMessage, RejectCode, ServerMessage};
pub use wire::{Eingehend, FrameCodec};

//! SessionStore – Viewer-Sessions pro Verbindung
//!
//! Haelt den ephemeren Zustand aller Verbindungen, die ein Attach gesendet
//! haben. Thread-safe via Arc + DashMap; Clone teilt den inneren Zustand.

use camrelay_core::{ConnectionId, SourceId};
use camrelay_media::EndpointHandle;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

use crate::error::{SignalingError, SignalingResult};

// ---------------------------------------------------------------------------
// ViewerSession
// ---------------------------------------------------------------------------

/// Abgeleiteter Zustand einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionZustand {
    /// Session existiert, aber noch kein Endpunkt gebunden
    Unverbunden,
    /// Endpunkt ausgehandelt und an einen Feed gebunden
    Verbunden,
}

/// Zustand einer Viewer-Verbindung
#[derive(Debug, Clone)]
pub struct ViewerSession {
    pub verbindung: ConnectionId,
    /// Gebundene Quelle (gesetzt genau dann wenn `endpunkt` gesetzt ist)
    pub quelle: Option<SourceId>,
    pub endpunkt: Option<EndpointHandle>,
    pub erstellt_am: DateTime<Utc>,
}

impl ViewerSession {
    fn neu(verbindung: ConnectionId) -> Self {
        Self {
            verbindung,
            quelle: None,
            endpunkt: None,
            erstellt_am: Utc::now(),
        }
    }

    pub fn zustand(&self) -> SessionZustand {
        if self.endpunkt.is_some() {
            SessionZustand::Verbunden
        } else {
            SessionZustand::Unverbunden
        }
    }

    pub fn ist_verbunden(&self) -> bool {
        self.zustand() == SessionZustand::Verbunden
    }
}

// ---------------------------------------------------------------------------
// SessionStore
// ---------------------------------------------------------------------------

/// Nebenlaeufige Map ConnectionId -> ViewerSession
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<ConnectionId, ViewerSession>>,
}

impl SessionStore {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt eine leere Session an
    ///
    /// Schlaegt fehl, wenn fuer die Verbindung bereits eine Session existiert.
    pub fn erstellen(&self, verbindung: ConnectionId) -> SignalingResult<ViewerSession> {
        match self.sessions.entry(verbindung) {
            Entry::Occupied(_) => Err(SignalingError::DoppelteSession(verbindung)),
            Entry::Vacant(slot) => {
                let session = ViewerSession::neu(verbindung);
                slot.insert(session.clone());
                tracing::debug!(verbindung = %verbindung, "Session angelegt");
                Ok(session)
            }
        }
    }

    /// Momentaufnahme der Session einer Verbindung
    pub fn holen(&self, verbindung: &ConnectionId) -> Option<ViewerSession> {
        self.sessions.get(verbindung).map(|e| e.value().clone())
    }

    /// Entfernt die Session und gibt sie zurueck (idempotent)
    pub fn entfernen(&self, verbindung: &ConnectionId) -> Option<ViewerSession> {
        self.sessions.remove(verbindung).map(|(_, session)| session)
    }

    /// Haelt ein erfolgreiches Attach in der Session fest
    pub fn binden(
        &self,
        verbindung: &ConnectionId,
        quelle: SourceId,
        endpunkt: EndpointHandle,
    ) -> SignalingResult<()> {
        let mut session = self
            .sessions
            .get_mut(verbindung)
            .ok_or(SignalingError::SessionFehlt(*verbindung))?;

        if session.ist_verbunden() {
            return Err(SignalingError::BereitsVerbunden);
        }
        session.quelle = Some(quelle);
        session.endpunkt = Some(endpunkt);
        Ok(())
    }

    pub fn anzahl(&self) -> usize {
        self.sessions.len()
    }

    pub fn ist_leer(&self) -> bool {
        self.sessions.is_empty()
    }

    /// IDs aller Verbindungen mit Session
    pub fn alle_ids(&self) -> Vec<ConnectionId> {
        self.sessions.iter().map(|e| *e.key()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erstellen_und_holen() {
        let store = SessionStore::neu();
        let id = ConnectionId::new();

        let session = store.erstellen(id).unwrap();
        assert_eq!(session.zustand(), SessionZustand::Unverbunden);
        assert_eq!(store.anzahl(), 1);

        let geholt = store.holen(&id).unwrap();
        assert_eq!(geholt.verbindung, id);
        assert!(geholt.endpunkt.is_none());
    }

    #[test]
    fn doppeltes_erstellen_schlaegt_fehl() {
        let store = SessionStore::neu();
        let id = ConnectionId::new();
        store.erstellen(id).unwrap();

        assert!(matches!(
            store.erstellen(id),
            Err(SignalingError::DoppelteSession(x)) if x == id
        ));
        assert_eq!(store.anzahl(), 1);
    }

    #[test]
    fn entfernen_ist_idempotent() {
        let store = SessionStore::neu();
        let id = ConnectionId::new();
        store.erstellen(id).unwrap();

        assert!(store.entfernen(&id).is_some());
        assert!(store.entfernen(&id).is_none());
        assert!(store.ist_leer());
    }

    #[test]
    fn binden_setzt_zustand() {
        let store = SessionStore::neu();
        let id = ConnectionId::new();
        store.erstellen(id).unwrap();

        store
            .binden(&id, SourceId(1), EndpointHandle::neu("ep-1"))
            .unwrap();
        let session = store.holen(&id).unwrap();
        assert!(session.ist_verbunden());
        assert_eq!(session.quelle, Some(SourceId(1)));

        // Zweites Binden wird abgelehnt, der erste Endpunkt bleibt
        let zweites = store.binden(&id, SourceId(0), EndpointHandle::neu("ep-2"));
        assert!(matches!(zweites, Err(SignalingError::BereitsVerbunden)));
        assert_eq!(
            store.holen(&id).unwrap().endpunkt,
            Some(EndpointHandle::neu("ep-1"))
        );
    }

    #[test]
    fn binden_ohne_session() {
        let store = SessionStore::neu();
        let id = ConnectionId::new();
        let result = store.binden(&id, SourceId(0), EndpointHandle::neu("ep"));
        assert!(matches!(result, Err(SignalingError::SessionFehlt(_))));
    }

    #[test]
    fn clone_teilt_zustand() {
        let a = SessionStore::neu();
        let b = a.clone();
        let id = ConnectionId::new();
        a.erstellen(id).unwrap();

        assert_eq!(b.alle_ids(), vec![id]);
    }
}

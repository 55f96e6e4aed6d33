//! Wire-Format fuer TCP-Verbindungen
//!
//! Frame-basiertes Protokoll: Length(u32 big-endian) + JSON-Payload.
//!
//! ## Frame-Format
//!
//! ```text
//! +--------+--------+--------+--------+----...----+
//! | Laenge (u32 BE) | 4 Bytes        | Payload    |
//! +--------+--------+--------+--------+----...----+
//! ```
//!
//! Die Laenge gibt die Anzahl der Payload-Bytes an (ohne die 4 Laengen-Bytes).
//! Maximale Frame-Groesse ist konfigurierbar (Standard: 1 MB).
//!
//! Ein vollstaendig empfangener Frame mit ungueltigem JSON beendet die
//! Verbindung nicht: er wird als [`Eingehend::Ungueltig`] gemeldet, damit
//! die Verbindung danach weiterlesen kann.

use bytes::{Buf, BufMut, BytesMut};
use serde::{de::DeserializeOwned, Serialize};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

use crate::control::{ClientMessage, ServerMessage};

// ---------------------------------------------------------------------------
// Konstanten
// ---------------------------------------------------------------------------

/// Standard-maximale Frame-Groesse (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Groesse des Laengen-Felds in Bytes
pub const LENGTH_FIELD_SIZE: usize = 4;

// ---------------------------------------------------------------------------
// Eingehende Frames
// ---------------------------------------------------------------------------

/// Ergebnis der Dekodierung eines vollstaendigen Frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingehend {
    /// Gueltige Client-Nachricht
    Nachricht(ClientMessage),
    /// Frame war vollstaendig, aber kein gueltiges `ClientMessage`-JSON
    Ungueltig {
        /// Wert des `kind`-Felds, falls das JSON zumindest ein Objekt war
        kind: Option<String>,
        /// Beschreibung des Dekodierfehlers
        fehler: String,
    },
}

impl Eingehend {
    /// Dekodiert einen Payload ohne Laengen-Feld
    pub fn aus_payload(payload: &[u8]) -> Self {
        match serde_json::from_slice::<ClientMessage>(payload) {
            Ok(nachricht) => Self::Nachricht(nachricht),
            Err(e) => Self::Ungueltig {
                kind: kind_ermitteln(payload),
                fehler: e.to_string(),
            },
        }
    }
}

/// Liest das `kind`-Feld aus einem beliebigen JSON-Objekt
fn kind_ermitteln(payload: &[u8]) -> Option<String> {
    let wert: serde_json::Value = serde_json::from_slice(payload).ok()?;
    wert.get("kind")?.as_str().map(str::to_owned)
}

// ---------------------------------------------------------------------------
// FrameCodec
// ---------------------------------------------------------------------------

/// tokio-util Codec fuer die Broker-Seite einer TCP-Verbindung
///
/// Dekodiert [`Eingehend`] und kodiert [`ServerMessage`] fuer die
/// Integration mit `tokio_util::codec::Framed`.
///
/// # Beispiel
///
/// ```rust,no_run
/// use tokio_util::codec::Framed;
/// use camrelay_protocol::wire::FrameCodec;
///
/// // let stream = TcpStream::connect(...).await?;
/// // let framed = Framed::new(stream, FrameCodec::new());
/// ```
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Maximale erlaubte Frame-Groesse in Bytes
    max_frame_size: usize,
}

impl FrameCodec {
    /// Erstellt einen neuen `FrameCodec` mit Standard-Limits
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Erstellt einen `FrameCodec` mit benutzerdefinierter maximaler Frame-Groesse
    pub fn with_max_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Gibt die konfigurierte maximale Frame-Groesse zurueck
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn zu_gross(laenge: usize, maximum: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidData,
        format!("Frame zu gross: {laenge} Bytes (Maximum: {maximum} Bytes)"),
    )
}

impl Decoder for FrameCodec {
    type Item = Eingehend;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Warte auf mindestens 4 Bytes fuer das Laengen-Feld
        if src.len() < LENGTH_FIELD_SIZE {
            return Ok(None);
        }

        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        // Ein zu grosser Frame laesst sich nicht ueberspringen, ohne ihn zu puffern
        if length > self.max_frame_size {
            return Err(zu_gross(length, self.max_frame_size));
        }

        let total_size = LENGTH_FIELD_SIZE + length;
        if src.len() < total_size {
            src.reserve(total_size - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_FIELD_SIZE);
        let payload = src.split_to(length);

        Ok(Some(Eingehend::aus_payload(&payload)))
    }
}

impl Encoder<ServerMessage> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: ServerMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = json_kodieren(&item, self.max_frame_size)?;

        dst.reserve(LENGTH_FIELD_SIZE + json.len());
        dst.put_u32(json.len() as u32);
        dst.put_slice(&json);

        Ok(())
    }
}

fn json_kodieren<T: Serialize>(item: &T, max_frame_size: usize) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(item).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Serialisierung fehlgeschlagen: {e}"),
        )
    })?;

    if json.len() > max_frame_size {
        return Err(zu_gross(json.len(), max_frame_size));
    }
    Ok(json)
}

// ---------------------------------------------------------------------------
// Hilfsfunktionen fuer direktes async Lesen/Schreiben (Client-Seite, Tests)
// ---------------------------------------------------------------------------

/// Liest einen einzelnen Frame aus einem `AsyncRead` und dekodiert ihn als `T`
///
/// # Fehler
/// - `UnexpectedEof` wenn die Verbindung vor Abschluss des Frames getrennt wird
/// - `InvalidData` bei ungueltigem JSON oder zu grossem Frame
pub async fn read_frame<R, T>(reader: &mut R, max_frame_size: usize) -> io::Result<T>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; LENGTH_FIELD_SIZE];
    reader.read_exact(&mut len_buf).await?;
    let length = u32::from_be_bytes(len_buf) as usize;

    if length > max_frame_size {
        return Err(zu_gross(length, max_frame_size));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;

    serde_json::from_slice(&payload).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("JSON-Deserialisierung fehlgeschlagen: {e}"),
        )
    })
}

/// Schreibt einen einzelnen Frame in einen `AsyncWrite`
///
/// # Fehler
/// - `InvalidData` wenn die Nachricht nicht serialisiert werden kann oder zu gross ist
/// - IO-Fehler beim Schreiben
pub async fn write_frame<W, T>(writer: &mut W, message: &T, max_frame_size: usize) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let json = json_kodieren(message, max_frame_size)?;
    write_raw_frame(writer, &json).await
}

/// Schreibt einen Frame mit beliebigem Payload (ohne JSON-Pruefung)
pub async fn write_raw_frame<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::RejectCode;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(payload.len() as u32);
        buf.put_slice(payload);
        buf
    }

    #[test]
    fn decode_attach_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(br#"{"kind":"attach","sourceId":2,"offer":"o"}"#);

        let eingehend = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(eingehend, Eingehend::Nachricht(ClientMessage::attach(2, "o")));
        assert!(buf.is_empty());
    }

    #[test]
    fn unvollstaendiger_frame_wartet() {
        let mut codec = FrameCodec::new();
        let mut voll = frame(br#"{"kind":"stop"}"#);
        let half = voll.len() / 2;
        let mut partial = voll.split_to(half);

        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn zu_wenig_bytes_fuer_laengenfeld() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0x00, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn zu_grosser_frame_wird_abgelehnt() {
        let mut codec = FrameCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u32(200);
        buf.put_slice(&[b'x'; 200]);

        assert!(codec.decode(&mut buf).is_err());
    }

    #[test]
    fn ungueltiges_json_bricht_den_stream_nicht_ab() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(b"kein json");
        buf.extend_from_slice(&frame(br#"{"kind":"stop"}"#));

        let erster = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert!(matches!(erster, Eingehend::Ungueltig { kind: None, .. }));

        let zweiter = codec.decode(&mut buf).unwrap().expect("Frame erwartet");
        assert_eq!(zweiter, Eingehend::Nachricht(ClientMessage::Stop));
    }

    #[test]
    fn kaputtes_attach_meldet_kind() {
        let mut codec = FrameCodec::new();
        let mut buf = frame(br#"{"kind":"attach","sourceId":"eins"}"#);

        match codec.decode(&mut buf).unwrap() {
            Some(Eingehend::Ungueltig { kind, .. }) => assert_eq!(kind.as_deref(), Some("attach")),
            andere => panic!("Ungueltig erwartet, erhalten: {andere:?}"),
        }
    }

    #[test]
    fn encode_schreibt_laengenfeld() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(ServerMessage::abgelehnt(RejectCode::AlreadyAttached, "bereits"), &mut buf)
            .unwrap();

        let payload_len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(buf.len(), LENGTH_FIELD_SIZE + payload_len);
        let json = std::str::from_utf8(&buf[LENGTH_FIELD_SIZE..]).unwrap();
        assert!(json.contains("ALREADY_ATTACHED"));
    }

    #[test]
    fn encode_zu_grosse_nachricht() {
        let mut codec = FrameCodec::with_max_size(10);
        let mut buf = BytesMut::new();
        assert!(codec.encode(ServerMessage::akzeptiert("x".repeat(64)), &mut buf).is_err());
    }

    #[tokio::test]
    async fn async_write_und_read_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &ServerMessage::akzeptiert("answer"), DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();

        let mut cursor = io::Cursor::new(buffer);
        let decoded: ServerMessage = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE)
            .await
            .unwrap();
        assert_eq!(decoded.answer(), Some("answer"));
    }

    #[tokio::test]
    async fn async_read_frame_ablehnung_zu_grosser_frame() {
        let mut buffer: Vec<u8> = Vec::new();
        buffer.extend_from_slice(&(2u32 * 1024 * 1024).to_be_bytes());

        let mut cursor = io::Cursor::new(buffer);
        let result: io::Result<ServerMessage> = read_frame(&mut cursor, DEFAULT_MAX_FRAME_SIZE).await;
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}

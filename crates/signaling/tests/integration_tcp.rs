//! Integration-Tests fuer den TCP-Signaling-Server (127.0.0.1, freier Port)

use camrelay_media::InMemoryGateway;
use camrelay_observability::BrokerMetrics;
use camrelay_protocol::wire::{read_frame, write_frame, write_raw_frame, DEFAULT_MAX_FRAME_SIZE};
use camrelay_protocol::{ClientMessage, RejectCode, ServerMessage};
use camrelay_signaling::{SignalingConfig, SignalingServer, SignalingState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct TestServer {
    adresse: SocketAddr,
    state: Arc<SignalingState>,
    gateway: Arc<InMemoryGateway>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<std::io::Result<()>>,
}

async fn server_starten(config: SignalingConfig) -> TestServer {
    let gateway = Arc::new(InMemoryGateway::neu());
    let state = SignalingState::aufbauen(
        config,
        vec!["rtsp://kamera-0".into(), "rtsp://kamera-1".into()],
        gateway.clone(),
        BrokerMetrics::neu().expect("Metriken"),
    );

    let server = SignalingServer::binden(Arc::clone(&state), "127.0.0.1:0".parse().unwrap())
        .await
        .expect("Bind fehlgeschlagen");
    let adresse = server.lokale_adresse().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(server.starten(shutdown_rx));

    TestServer {
        adresse,
        state,
        gateway,
        shutdown_tx,
        task,
    }
}

async fn senden(stream: &mut TcpStream, nachricht: &ClientMessage) {
    write_frame(stream, nachricht, DEFAULT_MAX_FRAME_SIZE)
        .await
        .expect("Senden fehlgeschlagen");
}

async fn empfangen(stream: &mut TcpStream) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(5), read_frame(stream, DEFAULT_MAX_FRAME_SIZE))
        .await
        .expect("Timeout beim Empfangen")
        .expect("Empfangen fehlgeschlagen")
}

/// Wartet bis die Bedingung gilt (Cleanup laeuft asynchron im Verbindungs-Task)
async fn warten_bis(mut bedingung: impl FnMut() -> bool) {
    for _ in 0..200 {
        if bedingung() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Bedingung nicht erfuellt");
}

#[tokio::test]
async fn attach_ueber_tcp() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut client = TcpStream::connect(server.adresse).await.unwrap();

    senden(&mut client, &ClientMessage::attach(1, "v=0 offer")).await;
    let antwort = empfangen(&mut client).await;
    assert!(antwort.ist_akzeptiert());
    assert!(antwort.answer().unwrap().starts_with("v=0"));

    // Zweites Attach auf derselben Verbindung
    senden(&mut client, &ClientMessage::attach(0, "v=0 offer")).await;
    let antwort = empfangen(&mut client).await;
    assert_eq!(antwort.reject_code(), Some(RejectCode::AlreadyAttached));

    drop(client);
    let gw = Arc::clone(&server.gateway);
    warten_bis(|| gw.aktive_endpunkte() == 0).await;
    assert!(server.state.engine.sessions().ist_leer());
}

#[tokio::test]
async fn stop_und_unbekannte_nachrichten_ohne_antwort() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut client = TcpStream::connect(server.adresse).await.unwrap();

    senden(&mut client, &ClientMessage::attach(0, "offer")).await;
    assert!(empfangen(&mut client).await.ist_akzeptiert());

    write_raw_frame(&mut client, br#"{"kind":"ping"}"#).await.unwrap();
    write_raw_frame(&mut client, b"kein json").await.unwrap();
    senden(&mut client, &ClientMessage::Stop).await;

    // Die naechste Antwort gehoert zum folgenden Attach
    senden(&mut client, &ClientMessage::attach(1, "offer")).await;
    let antwort = empfangen(&mut client).await;
    assert!(antwort.ist_akzeptiert());
    assert_eq!(server.gateway.statistik().endpunkte_freigegeben, 1);
}

#[tokio::test]
async fn ungueltiges_attach_bekommt_invalid_request() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut client = TcpStream::connect(server.adresse).await.unwrap();

    write_raw_frame(&mut client, br#"{"kind":"attach","sourceId":"eins","offer":"x"}"#)
        .await
        .unwrap();
    let antwort = empfangen(&mut client).await;
    assert_eq!(antwort.reject_code(), Some(RejectCode::InvalidRequest));
}

#[tokio::test]
async fn unbekannte_quelle_ueber_tcp() {
    let server = server_starten(SignalingConfig::default()).await;
    let mut client = TcpStream::connect(server.adresse).await.unwrap();

    senden(&mut client, &ClientMessage::attach(99, "offer")).await;
    let antwort = empfangen(&mut client).await;
    assert_eq!(antwort.reject_code(), Some(RejectCode::UnknownSource));

    // Verbindung bleibt offen
    senden(&mut client, &ClientMessage::attach(0, "offer")).await;
    assert!(empfangen(&mut client).await.ist_akzeptiert());
}

#[tokio::test]
async fn shutdown_schliesst_verbindungen_und_quellen() {
    let server = server_starten(SignalingConfig::default()).await;

    let mut a = TcpStream::connect(server.adresse).await.unwrap();
    let mut b = TcpStream::connect(server.adresse).await.unwrap();
    senden(&mut a, &ClientMessage::attach(0, "offer")).await;
    senden(&mut b, &ClientMessage::attach(1, "offer")).await;
    assert!(empfangen(&mut a).await.ist_akzeptiert());
    assert!(empfangen(&mut b).await.ist_akzeptiert());

    server.shutdown_tx.send(true).unwrap();
    server.task.await.unwrap().unwrap();
    server.state.engine.herunterfahren().await;

    assert_eq!(server.gateway.aktive_endpunkte(), 0);
    assert_eq!(server.gateway.aktive_feeds(), 0);
    assert_eq!(server.state.verbindungen(), 0);
}

#[tokio::test]
async fn verbindungslimit_wird_durchgesetzt() {
    let server = server_starten(SignalingConfig {
        max_verbindungen: 1,
        ..Default::default()
    })
    .await;

    let mut erste = TcpStream::connect(server.adresse).await.unwrap();
    senden(&mut erste, &ClientMessage::attach(0, "offer")).await;
    assert!(empfangen(&mut erste).await.ist_akzeptiert());

    // Die zweite Verbindung wird sofort geschlossen
    let mut zweite = TcpStream::connect(server.adresse).await.unwrap();
    let _ = write_frame(&mut zweite, &ClientMessage::attach(1, "offer"), DEFAULT_MAX_FRAME_SIZE).await;
    let ergebnis = tokio::time::timeout(
        Duration::from_secs(5),
        read_frame::<_, ServerMessage>(&mut zweite, DEFAULT_MAX_FRAME_SIZE),
    )
    .await
    .expect("Timeout");
    assert!(ergebnis.is_err());
    assert_eq!(server.state.verbindungen(), 1);
}

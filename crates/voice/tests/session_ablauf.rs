//! Ablauf-Tests gegen einen lokalen Relay-Simulator
//!
//! Der Simulator spricht das Signaling-Protokoll ueber ein echtes
//! WebSocket (accept_async) und beantwortet Discovery-Anfragen per UDP.

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use voicelink_crypto::{CryptoCodec, EncryptionMode};
use voicelink_protocol::discovery::{discovery_antwort, DISCOVERY_PAKET_LAENGE, KEEP_ALIVE};
use voicelink_protocol::rtp::STILLE_FRAME;
use voicelink_voice::{
    AudioSource, ChannelId, CloseReason, ConnectionListener, ConnectionStatus, Peer, PeerId,
    PeerResolver, ServerId, VoiceConfig, VoiceSession, VoiceZugang,
};

const EIGENE_SSRC: u32 = 4711;
const SCHLUESSEL: [u8; 32] = [1u8; 32];

// ---------------------------------------------------------------------------
// Relay-Simulator
// ---------------------------------------------------------------------------

/// Verhalten des Simulators
#[derive(Clone)]
struct Verhalten {
    /// Schliesst das erste Socket kurz nach der SessionDescription
    close_code: Option<u16>,
    /// Angebotene Verschluesselungsmodi im Ready
    modi: Vec<&'static str>,
    /// Discovery-Anfragen bleiben unbeantwortet
    discovery_stumm: bool,
    /// Wartezeit vor dem WebSocket-Handshake
    handshake_verzoegerung: Duration,
    /// Resume wird mit einem neuen Ready statt Resumed beantwortet
    resume_ablehnen: bool,
}

impl Default for Verhalten {
    fn default() -> Self {
        Self {
            close_code: None,
            modi: vec!["aead_unbekannt", "xsalsa20_poly1305_lite", "xsalsa20_poly1305_suffix"],
            discovery_stumm: false,
            handshake_verzoegerung: Duration::ZERO,
            resume_ablehnen: false,
        }
    }
}

struct Relay {
    url: String,
    /// (Socket-Index, empfangene Nachricht)
    nachrichten: mpsc::UnboundedReceiver<(usize, Value)>,
    /// Audio-Pakete (ohne Discovery und Keep-Alive)
    audio: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Beantwortete Discovery-Anfragen
    discoveries: Arc<AtomicUsize>,
    /// Nachrichten an alle offenen Sockets
    push: broadcast::Sender<Value>,
}

impl Relay {
    /// Startet den Simulator; `close_code` schliesst das erste Socket nach
    /// der SessionDescription
    async fn starten(close_code: Option<u16>) -> Self {
        Self::mit_verhalten(Verhalten {
            close_code,
            ..Default::default()
        })
        .await
    }

    async fn mit_verhalten(verhalten: Verhalten) -> Self {
        let udp = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let udp_port = udp.local_addr().unwrap().port();
        let (audio_tx, audio) = mpsc::unbounded_channel();
        let discoveries = Arc::new(AtomicUsize::new(0));
        let zaehler = discoveries.clone();
        let stumm = verhalten.discovery_stumm;
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            loop {
                let Ok((n, von)) = udp.recv_from(&mut buf).await else {
                    break;
                };
                let paket = &buf[..n];
                if n == DISCOVERY_PAKET_LAENGE {
                    if stumm {
                        continue;
                    }
                    zaehler.fetch_add(1, Ordering::SeqCst);
                    let ssrc = u32::from_be_bytes([paket[0], paket[1], paket[2], paket[3]]);
                    let _ = udp.send_to(&discovery_antwort(ssrc, von), von).await;
                } else if paket != KEEP_ALIVE {
                    let _ = audio_tx.send(paket.to_vec());
                }
            }
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (tx, nachrichten) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel(16);
        let push_tx = push.clone();
        tokio::spawn(async move {
            let mut index = 0;
            while let Ok((stream, _)) = listener.accept().await {
                let mut v = verhalten.clone();
                if index > 0 {
                    v.close_code = None;
                }
                let socket = Socket {
                    index,
                    udp_port,
                    verhalten: v,
                    tx: tx.clone(),
                    push: push_tx.subscribe(),
                };
                tokio::spawn(socket.bedienen(stream));
                index += 1;
            }
        });

        Self {
            url,
            nachrichten,
            audio,
            discoveries,
            push,
        }
    }

    /// Wartet auf die naechste Nachricht mit `op`
    async fn warte_auf_op(&mut self, op: u64) -> (usize, Value) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let (index, wert) = self.nachrichten.recv().await.unwrap();
                if wert["op"].as_u64() == Some(op) {
                    return (index, wert);
                }
            }
        })
        .await
        .expect("Nachricht nicht rechtzeitig empfangen")
    }

    /// Sendet `wert` ueber alle offenen Sockets
    fn schicken(&self, wert: Value) {
        self.push.send(wert).unwrap();
    }
}

fn text(wert: Value) -> Message {
    Message::Text(wert.to_string().into())
}

/// Eine WebSocket-Verbindung des Simulators
struct Socket {
    index: usize,
    udp_port: u16,
    verhalten: Verhalten,
    tx: mpsc::UnboundedSender<(usize, Value)>,
    push: broadcast::Receiver<Value>,
}

impl Socket {
    fn ready(&self) -> Message {
        text(json!({"op": 2, "d": {
            "ssrc": EIGENE_SSRC,
            "ip": "127.0.0.1",
            "port": self.udp_port,
            "modes": self.verhalten.modi,
        }}))
    }

    async fn bedienen(mut self, stream: TcpStream) {
        tokio::time::sleep(self.verhalten.handshake_verzoegerung).await;
        let mut ws = accept_async(stream).await.unwrap();
        ws.send(text(json!({"op": 8, "d": {"heartbeat_interval": 41250.0}})))
            .await
            .unwrap();

        loop {
            let nachricht = tokio::select! {
                eingang = ws.next() => match eingang {
                    Some(Ok(nachricht)) => nachricht,
                    _ => return,
                },
                Ok(wert) = self.push.recv() => {
                    let _ = ws.send(text(wert)).await;
                    continue;
                }
            };
            let Message::Text(roh) = nachricht else {
                continue;
            };
            let wert: Value = serde_json::from_str(roh.as_str()).unwrap();
            let _ = self.tx.send((self.index, wert.clone()));

            match wert["op"].as_u64() {
                Some(0) => {
                    ws.send(self.ready()).await.unwrap();
                }
                Some(1) => {
                    let beschreibung = json!({"op": 4, "d": {
                        "mode": wert["d"]["data"]["mode"],
                        "secret_key": SCHLUESSEL.to_vec(),
                    }});
                    ws.send(text(beschreibung)).await.unwrap();

                    if let Some(code) = self.verhalten.close_code {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        let frame = CloseFrame {
                            code: CloseCode::from(code),
                            reason: String::new().into(),
                        };
                        let _ = ws.close(Some(frame)).await;
                        while ws.next().await.is_some() {}
                        return;
                    }
                }
                Some(3) => {
                    let _ = ws.send(text(json!({"op": 6, "d": wert["d"]}))).await;
                }
                Some(7) if self.verhalten.resume_ablehnen => {
                    ws.send(self.ready()).await.unwrap();
                }
                Some(7) => {
                    ws.send(text(json!({"op": 9, "d": null}))).await.unwrap();
                }
                _ => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Host-Seite
// ---------------------------------------------------------------------------

struct Namen;

impl PeerResolver for Namen {
    fn resolve_peer(&self, id: PeerId) -> Option<Peer> {
        Some(Peer {
            id,
            name: format!("teilnehmer-{}", id.inner()),
        })
    }
}

#[derive(Default)]
struct Verlauf {
    status: Mutex<Vec<ConnectionStatus>>,
}

impl Verlauf {
    fn enthaelt(&self, status: ConnectionStatus) -> bool {
        self.status.lock().contains(&status)
    }
}

impl ConnectionListener for Verlauf {
    fn on_status_change(&self, _alt: ConnectionStatus, neu: ConnectionStatus) {
        self.status.lock().push(neu);
    }
}

/// Liefert vorkodierte Frames aus einer Liste
struct OpusListe {
    frames: Mutex<VecDeque<Vec<u8>>>,
}

impl AudioSource for OpusListe {
    fn has_audio_ready(&self) -> bool {
        !self.frames.lock().is_empty()
    }

    fn next_frame(&self) -> Option<Vec<u8>> {
        self.frames.lock().pop_front()
    }

    fn is_pre_encoded(&self) -> bool {
        true
    }
}

fn session(relay: &Relay) -> (VoiceSession, Arc<Verlauf>) {
    session_mit(relay, VoiceConfig::default())
}

fn session_mit(relay: &Relay, config: VoiceConfig) -> (VoiceSession, Arc<Verlauf>) {
    let zugang = VoiceZugang {
        endpoint: relay.url.clone(),
        server_id: ServerId(41771983423143937),
        user_id: PeerId(104694319306248192),
        session_id: "sitzung-1".into(),
        token: "geheimes-token".into(),
    };
    let s = VoiceSession::neu(config, zugang, Arc::new(Namen), None).unwrap();
    let verlauf = Arc::new(Verlauf::default());
    s.listener_setzen(verlauf.clone());
    (s, verlauf)
}

async fn warte_auf_status(s: &VoiceSession, ziel: ConnectionStatus) {
    let mut rx = s.status_beobachten();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|st| *st == ziel))
        .await
        .expect("Status nicht rechtzeitig erreicht")
        .unwrap();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn aufbau_bis_connected() {
    let mut relay = Relay::starten(None).await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    let (_, identify) = relay.warte_auf_op(0).await;
    assert_eq!(identify["d"]["session_id"], "sitzung-1");
    assert_eq!(identify["d"]["token"], "geheimes-token");
    assert_eq!(identify["d"]["server_id"], "41771983423143937");

    let (_, auswahl) = relay.warte_auf_op(1).await;
    assert_eq!(auswahl["d"]["protocol"], "udp");
    assert_eq!(auswahl["d"]["data"]["mode"], "xsalsa20_poly1305_lite");
    assert_eq!(auswahl["d"]["data"]["address"], "127.0.0.1");

    warte_auf_status(&s, ConnectionStatus::Connected).await;
    assert_eq!(s.ssrc(), Some(EIGENE_SSRC));

    let ablauf = verlauf.status.lock().clone();
    assert_eq!(
        ablauf,
        vec![
            ConnectionStatus::Connecting,
            ConnectionStatus::Authenticating,
            ConnectionStatus::DiscoveringUdp,
            ConnectionStatus::AwaitingSession,
            ConnectionStatus::Connected,
        ]
    );

    s.close(CloseReason::Normal).await;
    assert_eq!(s.status(), ConnectionStatus::Closed(CloseReason::Normal));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serverabsturz_fuehrt_zu_resume() {
    let mut relay = Relay::starten(Some(4015)).await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    let (erster, _) = relay.warte_auf_op(0).await;
    assert_eq!(erster, 0);

    // Erstes Socket wird nach der SessionDescription mit 4015 geschlossen
    let (zweiter, resume) = relay.warte_auf_op(7).await;
    assert_eq!(zweiter, 1);
    assert_eq!(resume["d"]["session_id"], "sitzung-1");
    assert_eq!(resume["d"]["token"], "geheimes-token");
    assert_eq!(resume["d"]["server_id"], "41771983423143937");
    assert!(verlauf.enthaelt(ConnectionStatus::Reconnecting));

    warte_auf_status(&s, ConnectionStatus::Connected).await;
    // Nach Resumed keine erneute Discovery
    let ablauf = verlauf.status.lock().clone();
    let nach_reconnect: Vec<_> = ablauf
        .iter()
        .skip_while(|st| **st != ConnectionStatus::Reconnecting)
        .copied()
        .collect();
    assert!(!nach_reconnect.contains(&ConnectionStatus::DiscoveringUdp));
    assert_eq!(s.ssrc(), Some(EIGENE_SSRC));

    s.close(CloseReason::Normal).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn authentifizierung_abgelehnt_ist_endgueltig() {
    let relay = Relay::starten(Some(4004)).await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    warte_auf_status(
        &s,
        ConnectionStatus::Closed(CloseReason::AuthentifizierungFehlgeschlagen),
    )
    .await;
    assert!(!verlauf.enthaelt(ConnectionStatus::Reconnecting));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn audio_mit_vorlauf_und_speaking() {
    let mut relay = Relay::starten(None).await;
    let (s, _verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();
    warte_auf_status(&s, ConnectionStatus::Connected).await;

    let opus = vec![0xFC, 0x10, 0x20, 0x30];
    s.attach_source(Arc::new(OpusListe {
        frames: Mutex::new(vec![opus.clone(); 3].into()),
    }))
    .unwrap();

    let krypto = CryptoCodec::neu(EncryptionMode::Lite, &SCHLUESSEL).unwrap();
    let mut nutzlasten = Vec::new();
    for _ in 0..13 {
        let paket = tokio::time::timeout(Duration::from_secs(2), relay.audio.recv())
            .await
            .expect("Audio-Paket nicht rechtzeitig")
            .unwrap();
        let (header, nutzdaten) = krypto.oeffnen(&paket).unwrap();
        assert_eq!(header.ssrc, EIGENE_SSRC);
        nutzlasten.push((header.sequence, nutzdaten));
    }

    // 10 Frames Vorlauf-Stille, danach die echten Frames
    for (i, (sequenz, nutzdaten)) in nutzlasten.iter().enumerate() {
        assert_eq!(*sequenz, i as u16);
        if i < 10 {
            assert_eq!(nutzdaten.as_slice(), STILLE_FRAME.as_slice(), "Frame {i}");
        } else {
            assert_eq!(nutzdaten, &opus, "Frame {i}");
        }
    }

    let (_, speaking) = relay.warte_auf_op(5).await;
    assert_eq!(speaking["d"]["speaking"], 1);
    assert_eq!(speaking["d"]["ssrc"], EIGENE_SSRC);
    assert!(speaking["d"].get("user_id").is_none());

    s.close(CloseReason::Normal).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn close_waehrend_handshake_sendet_keine_anmeldung() {
    let mut relay = Relay::mit_verhalten(Verhalten {
        handshake_verzoegerung: Duration::from_millis(300),
        ..Default::default()
    })
    .await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    s.close(CloseReason::Normal).await;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(relay.nachrichten.try_recv().is_err());
    assert_eq!(s.status(), ConnectionStatus::Closed(CloseReason::Normal));
    assert!(!verlauf.enthaelt(ConnectionStatus::Authenticating));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn kein_gemeinsamer_modus_ist_endgueltig() {
    let relay = Relay::mit_verhalten(Verhalten {
        modi: vec!["aead_aes256_gcm_rtpsize", "aead_xchacha20_poly1305_rtpsize"],
        ..Default::default()
    })
    .await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    warte_auf_status(
        &s,
        ConnectionStatus::Closed(CloseReason::VerschluesselungNichtUnterstuetzt),
    )
    .await;
    assert!(!verlauf.enthaelt(ConnectionStatus::Reconnecting));
    assert!(!verlauf.enthaelt(ConnectionStatus::DiscoveringUdp));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn discovery_ohne_antwort_ist_endgueltig() {
    let relay = Relay::mit_verhalten(Verhalten {
        discovery_stumm: true,
        ..Default::default()
    })
    .await;
    let config = VoiceConfig {
        discovery_versuche: 2,
        discovery_timeout_ms: 50,
        ..Default::default()
    };
    let (s, verlauf) = session_mit(&relay, config);
    s.connect(ChannelId(7)).unwrap();

    warte_auf_status(&s, ConnectionStatus::Closed(CloseReason::UdpNichtErreichbar)).await;
    assert!(verlauf.enthaelt(ConnectionStatus::DiscoveringUdp));
    assert!(!verlauf.enthaelt(ConnectionStatus::Reconnecting));
    assert_eq!(relay.discoveries.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn abgelehnter_resume_startet_neuen_ready_zyklus() {
    let mut relay = Relay::mit_verhalten(Verhalten {
        close_code: Some(4015),
        resume_ablehnen: true,
        ..Default::default()
    })
    .await;
    let (s, verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();

    let (zweiter, _) = relay.warte_auf_op(7).await;
    assert_eq!(zweiter, 1);

    // Auf das neue Ready folgt eine neue Discovery und SelectProtocol
    let (index, auswahl) = relay.warte_auf_op(1).await;
    assert_eq!(index, 1);
    assert_eq!(auswahl["d"]["data"]["mode"], "xsalsa20_poly1305_lite");

    warte_auf_status(&s, ConnectionStatus::Connected).await;
    assert_eq!(relay.discoveries.load(Ordering::SeqCst), 2);
    let ablauf = verlauf.status.lock().clone();
    let nach_reconnect: Vec<_> = ablauf
        .iter()
        .skip_while(|st| **st != ConnectionStatus::Reconnecting)
        .copied()
        .collect();
    assert!(nach_reconnect.contains(&ConnectionStatus::DiscoveringUdp));
    assert_eq!(s.ssrc(), Some(EIGENE_SSRC));

    s.close(CloseReason::Normal).await;
}

/// Fragt `bedingung` bis zu zwei Sekunden lang ab
async fn warte_bis(mut bedingung: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !bedingung() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Bedingung nicht rechtzeitig erfuellt");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn client_disconnect_loest_ssrc_bindung() {
    let relay = Relay::starten(None).await;
    let (s, _verlauf) = session(&relay);
    s.connect(ChannelId(7)).unwrap();
    warte_auf_status(&s, ConnectionStatus::Connected).await;

    relay.schicken(json!({"op": 5, "d": {"user_id": "555", "ssrc": 99, "speaking": true}}));
    warte_bis(|| s.registry().peer_fuer(99) == Some(PeerId(555))).await;

    relay.schicken(json!({"op": 13, "d": {"user_id": "555"}}));
    warte_bis(|| s.registry().peer_fuer(99).is_none()).await;
    assert_eq!(s.registry().ssrc_fuer(PeerId(555)), None);

    s.close(CloseReason::Normal).await;
}

//! Signaling-Actor des Voice-WebSockets
//!
//! Ein einzelner Task pro Session besitzt das WebSocket und verarbeitet
//! eingehende Nachrichten und Befehle der uebrigen Tasks nacheinander.
//!
//! ```text
//! Disconnected ─► Connecting ─► Authenticating ─► DiscoveringUdp ─► AwaitingSession ─► Connected
//!                     ▲               │ Resumed ──────────────────────────────────────────►│
//!                     │               ▼                                                    │
//!                Reconnecting ◄── abnormales Close / Stream-Fehler / Routing-Fehler ◄──────┘
//!
//! 4004, 4006, 4011, 4016, Discovery-Fehler, Host-Close ─► Closed(grund)
//! ```
//!
//! Befehle ([`SignalBefehl`]) kommen aus Sendepipeline, Keep-Alive,
//! Heartbeat-Timer und Orchestrator ueber einen mpsc-Kanal.

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use voicelink_core::{CloseReason, ConnectionStatus};
use voicelink_crypto::{modus_waehlen, CryptoCodec, EncryptionMode};
use voicelink_protocol::signaling::{
    close_code_bewerten, HelloPayload, IdentifyPayload, ReadyPayload, ResumePayload,
    SelectProtocolPayload, SessionDescriptionPayload, SpeakingPayload,
};
use voicelink_protocol::{CloseAktion, SignalMessage, SprechModus};

use crate::session::{SessionDaten, SessionKontext};
use crate::udp::UdpTransport;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Befehle an den Signaling-Actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalBefehl {
    /// Speaking-Zustand der Sendepipeline
    Sprechen(bool),
    /// Neue Sprech-Flags, werden bei aktivem Sprechen sofort gemeldet
    SprechModus(SprechModus),
    /// Heartbeat-Timer ist abgelaufen
    Heartbeat,
    /// UDP-Route verloren, Reconnect ausloesen
    VerbindungVerloren(String),
    /// Host oder Teardown: WebSocket mit 1000 schliessen
    Schliessen,
}

/// Wie ein Socket geendet hat
#[derive(Debug, Clone, PartialEq, Eq)]
enum SocketEnde {
    Reconnect(String),
    Terminal(CloseReason),
    Beendet,
}

/// Zwischenstand nach Ready und Discovery, bis der Schluessel eintrifft
struct Vorbereitet {
    ssrc: u32,
    modus: EncryptionMode,
    udp: Arc<UdpTransport>,
    extern_adresse: SocketAddr,
}

/// Aktuelle Unix-Zeit in Millisekunden (Heartbeat-Nonce)
fn jetzt_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Baut die WebSocket-URL aus dem Endpoint
///
/// Ein Endpoint mit Schema wird unveraendert uebernommen. Ein nackter Host
/// verliert ein `:80`-Suffix und wird zu `wss://{host}/?v={version}`.
pub fn relay_url(endpoint: &str, version: u8) -> String {
    if endpoint.contains("://") {
        return endpoint.to_string();
    }
    let host = endpoint.strip_suffix(":80").unwrap_or(endpoint);
    format!("wss://{host}/?v={version}")
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

pub(crate) struct SignalingActor {
    kontext: Arc<SessionKontext>,
    befehle: mpsc::UnboundedReceiver<SignalBefehl>,
    url: String,
    resume: bool,
    reconnect_versuche: u32,
    spricht: bool,
    vorbereitet: Option<Vorbereitet>,
    heartbeat: Option<JoinHandle<()>>,
    bereitschaft: Option<JoinHandle<()>>,
}

impl SignalingActor {
    pub(crate) fn neu(
        kontext: Arc<SessionKontext>,
        befehle: mpsc::UnboundedReceiver<SignalBefehl>,
    ) -> Self {
        let url = relay_url(&kontext.zugang.endpoint, kontext.config.protokoll_version);
        Self {
            kontext,
            befehle,
            url,
            resume: false,
            reconnect_versuche: 0,
            spricht: false,
            vorbereitet: None,
            heartbeat: None,
            bereitschaft: None,
        }
    }

    /// Hauptschleife: ein Durchlauf pro WebSocket
    pub(crate) async fn ausfuehren(mut self) {
        tracing::info!(url = %self.url, "Signaling-Actor gestartet");

        loop {
            let Some(ws) = self.verbinden().await else {
                break;
            };
            let ende = self.socket_bedienen(ws).await;
            self.socket_aufraeumen();

            match ende {
                SocketEnde::Beendet => break,
                SocketEnde::Terminal(grund) => {
                    tracing::warn!(grund = %grund, "Voice-Verbindung endgueltig beendet");
                    self.kontext.schliessen_intern(grund);
                    break;
                }
                SocketEnde::Reconnect(ursache) => {
                    if !self
                        .reconnect_entscheiden(&ursache, CloseReason::VerbindungVerloren)
                        .await
                    {
                        break;
                    }
                }
            }
        }

        self.socket_aufraeumen();
        tracing::info!("Signaling-Actor beendet");
    }

    /// Oeffnet ein WebSocket, Fehlschlaege laufen ueber den Reconnect-Pfad
    async fn verbinden(&mut self) -> Option<WsStream> {
        loop {
            if self.kontext.ist_beendet() {
                return None;
            }
            self.kontext.status_setzen(ConnectionStatus::Connecting);

            let versuch =
                tokio::time::timeout(self.kontext.config.verbindungs_timeout(), connect_async(&self.url))
                    .await;
            let ursache = match versuch {
                Ok(Ok((ws, _))) => {
                    tracing::debug!(url = %self.url, "WebSocket verbunden");
                    return Some(ws);
                }
                Ok(Err(e)) => {
                    tracing::warn!(fehler = %e, url = %self.url, "WebSocket-Verbindung fehlgeschlagen");
                    format!("WebSocket-Verbindung fehlgeschlagen: {e}")
                }
                Err(_) => {
                    tracing::warn!(url = %self.url, "WebSocket-Verbindung: Zeitlimit");
                    "WebSocket-Verbindung: Zeitlimit".to_string()
                }
            };

            if !self
                .reconnect_entscheiden(&ursache, CloseReason::WebsocketNichtErreichbar)
                .await
            {
                return None;
            }
        }
    }

    /// Entscheidet unter dem Verbindungs-Lock ueber einen Reconnect
    ///
    /// `aufgeben` ist der Schliessgrund, wenn kein weiterer Versuch folgt.
    async fn reconnect_entscheiden(&mut self, ursache: &str, aufgeben: CloseReason) -> bool {
        let _lock = self.kontext.verbindungs_lock.lock().await;

        if self.kontext.ist_beendet() {
            return false;
        }
        if !self.kontext.auto_reconnect() {
            tracing::info!(ursache, "Verbindung verloren, Auto-Reconnect deaktiviert");
            self.kontext.schliessen_intern(aufgeben);
            return false;
        }

        self.reconnect_versuche += 1;
        if self.reconnect_versuche > self.kontext.config.max_reconnect_versuche {
            tracing::warn!(versuche = self.reconnect_versuche - 1, "Reconnect-Versuche erschoepft");
            self.kontext.schliessen_intern(aufgeben);
            return false;
        }

        self.resume = self.kontext.hat_sitzung();
        tracing::info!(
            ursache,
            versuch = self.reconnect_versuche,
            resume = self.resume,
            "Reconnect"
        );
        self.kontext.status_setzen(ConnectionStatus::Reconnecting);
        true
    }

    fn socket_aufraeumen(&mut self) {
        if let Some(h) = self.heartbeat.take() {
            h.abort();
        }
        if let Some(h) = self.bereitschaft.take() {
            h.abort();
        }
    }

    fn bereitschaft_starten(&mut self) {
        if let Some(h) = self.bereitschaft.take() {
            h.abort();
        }
        let kontext = self.kontext.clone();
        self.bereitschaft = Some(tokio::spawn(async move {
            kontext.bereitschaft_abwarten().await;
        }));
    }

    async fn socket_bedienen(&mut self, ws: WsStream) -> SocketEnde {
        let (mut sink, mut stream) = ws.split();

        // close() waehrend des Handshakes: keine Anmeldung mehr senden
        let kontext = self.kontext.clone();
        let lock = kontext.verbindungs_lock.lock().await;
        if kontext.ist_beendet() {
            drop(lock);
            normal_schliessen(&mut sink).await;
            return SocketEnde::Beendet;
        }
        self.kontext.status_setzen(ConnectionStatus::Authenticating);

        let anmeldung = self.anmeldung();
        if let Err(e) = senden(&mut sink, &anmeldung).await {
            return SocketEnde::Reconnect(format!("Anmeldung nicht gesendet: {e}"));
        }
        drop(lock);
        tracing::debug!(op = anmeldung.op(), "Anmeldung gesendet");
        self.bereitschaft_starten();

        loop {
            tokio::select! {
                eingang = stream.next() => {
                    let ende = match eingang {
                        Some(Ok(Message::Text(text))) => {
                            match SignalMessage::from_json(text.as_str()) {
                                Ok(nachricht) => self.nachricht_verarbeiten(nachricht, &mut sink).await,
                                Err(e) => {
                                    tracing::warn!(fehler = %e, "Ungueltige Signaling-Nachricht");
                                    None
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.as_ref().map(|f| u16::from(f.code));
                            tracing::info!(code = ?code, "WebSocket vom Relay geschlossen");
                            Some(self.close_bewerten(code))
                        }
                        Some(Ok(_)) => None,
                        Some(Err(e)) => Some(self.abbruch_bewerten(format!("WebSocket-Fehler: {e}"))),
                        None => Some(self.abbruch_bewerten("WebSocket ohne Close beendet".into())),
                    };
                    if let Some(ende) = ende {
                        return ende;
                    }
                }
                befehl = self.befehle.recv() => {
                    if let Some(ende) = self.befehl_verarbeiten(befehl, &mut sink).await {
                        return ende;
                    }
                }
            }
        }
    }

    fn anmeldung(&self) -> SignalMessage {
        let zugang = &self.kontext.zugang;
        if self.resume {
            SignalMessage::Resume(ResumePayload {
                server_id: zugang.server_id,
                session_id: zugang.session_id.clone(),
                token: zugang.token.clone(),
            })
        } else {
            SignalMessage::Identify(IdentifyPayload {
                server_id: zugang.server_id,
                user_id: zugang.user_id,
                session_id: zugang.session_id.clone(),
                token: zugang.token.clone(),
            })
        }
    }

    fn close_bewerten(&self, code: Option<u16>) -> SocketEnde {
        if self.kontext.ist_beendet() {
            return SocketEnde::Beendet;
        }
        match close_code_bewerten(code) {
            CloseAktion::Reconnect => SocketEnde::Reconnect(format!("Close-Code {code:?}")),
            CloseAktion::Terminal(grund) => SocketEnde::Terminal(grund),
        }
    }

    fn abbruch_bewerten(&self, ursache: String) -> SocketEnde {
        if self.kontext.ist_beendet() {
            SocketEnde::Beendet
        } else {
            SocketEnde::Reconnect(ursache)
        }
    }

    async fn befehl_verarbeiten(
        &mut self,
        befehl: Option<SignalBefehl>,
        sink: &mut WsSink,
    ) -> Option<SocketEnde> {
        match befehl {
            None | Some(SignalBefehl::Schliessen) => {
                normal_schliessen(sink).await;
                Some(SocketEnde::Beendet)
            }
            Some(SignalBefehl::Heartbeat) => {
                let nachricht = SignalMessage::Heartbeat(jetzt_ms());
                match senden(sink, &nachricht).await {
                    Ok(()) => None,
                    Err(e) => Some(self.abbruch_bewerten(format!("Heartbeat nicht gesendet: {e}"))),
                }
            }
            Some(SignalBefehl::Sprechen(an)) => {
                if self.spricht == an {
                    return None;
                }
                self.spricht = an;
                self.speaking_senden(sink).await;
                None
            }
            Some(SignalBefehl::SprechModus(modus)) => {
                self.kontext.sprech_modus_setzen(modus);
                if self.spricht {
                    self.speaking_senden(sink).await;
                }
                None
            }
            Some(SignalBefehl::VerbindungVerloren(ursache)) => {
                Some(self.abbruch_bewerten(ursache))
            }
        }
    }

    async fn speaking_senden(&self, sink: &mut WsSink) {
        let Some(ssrc) = self.kontext.eigene_ssrc() else {
            return;
        };
        let speaking = if self.spricht {
            self.kontext.sprech_modus()
        } else {
            SprechModus::AUS
        };
        let nachricht = SignalMessage::Speaking(SpeakingPayload {
            speaking,
            delay: 0,
            ssrc,
            user_id: None,
        });
        if let Err(e) = senden(sink, &nachricht).await {
            tracing::warn!(fehler = %e, "Speaking-Nachricht nicht gesendet");
        }
    }

    async fn nachricht_verarbeiten(
        &mut self,
        nachricht: SignalMessage,
        sink: &mut WsSink,
    ) -> Option<SocketEnde> {
        match nachricht {
            SignalMessage::Hello(hello) => {
                self.heartbeat_starten(&hello);
                None
            }
            SignalMessage::Ready(ready) => self.ready_verarbeiten(ready, sink).await,
            SignalMessage::SessionDescription(beschreibung) => {
                self.sitzung_aufbauen(beschreibung)
            }
            SignalMessage::Resumed => {
                if self.kontext.hat_sitzung() {
                    tracing::info!("Session fortgesetzt");
                    self.reconnect_versuche = 0;
                    self.kontext.status_setzen(ConnectionStatus::Connected);
                } else {
                    tracing::warn!("Resumed ohne bestehende Session ignoriert");
                }
                None
            }
            SignalMessage::HeartbeatAck(nonce) => {
                let rtt = jetzt_ms().saturating_sub(nonce);
                self.kontext.statistik.rtt_setzen(rtt);
                self.kontext.listener().on_ping(rtt);
                tracing::trace!(rtt_ms = rtt, "Heartbeat bestaetigt");
                None
            }
            SignalMessage::Speaking(speaking) => {
                self.peer_speaking(speaking);
                None
            }
            SignalMessage::ClientDisconnect(trennung) => {
                tracing::debug!(peer = %trennung.user_id, "Teilnehmer getrennt");
                self.kontext.peer_trennen(trennung.user_id);
                None
            }
            SignalMessage::Ignoriert { op } => {
                tracing::debug!(op, "Opcode ignoriert");
                None
            }
            andere => {
                tracing::debug!(op = andere.op(), "Unerwartete Client-Nachricht vom Relay");
                None
            }
        }
    }

    fn heartbeat_starten(&mut self, hello: &HelloPayload) {
        let intervall = hello.intervall();
        self.kontext.heartbeat_intervall_setzen(intervall);
        if let Some(h) = self.heartbeat.take() {
            h.abort();
        }

        let befehle = self.kontext.befehl_sender();
        self.heartbeat = Some(tokio::spawn(async move {
            let mut takt = tokio::time::interval(intervall);
            takt.tick().await;
            loop {
                takt.tick().await;
                if befehle.send(SignalBefehl::Heartbeat).is_err() {
                    break;
                }
            }
        }));
        tracing::debug!(intervall_ms = intervall.as_millis() as u64, "Heartbeat gestartet");
    }

    async fn ready_verarbeiten(
        &mut self,
        ready: ReadyPayload,
        sink: &mut WsSink,
    ) -> Option<SocketEnde> {
        // Neuer Zyklus: alte Verbindung verwerfen
        self.kontext.sitzung_verwerfen();
        self.vorbereitet = None;
        self.bereitschaft_starten();

        let modus = match modus_waehlen(&ready.modes) {
            Ok(modus) => modus,
            Err(e) => {
                tracing::error!(fehler = %e, "Kein gemeinsamer Verschluesselungsmodus");
                return Some(SocketEnde::Terminal(CloseReason::VerschluesselungNichtUnterstuetzt));
            }
        };

        self.kontext.status_setzen(ConnectionStatus::DiscoveringUdp);
        let udp = match self.udp_vorbereiten(&ready).await {
            Ok(ergebnis) => ergebnis,
            Err(e) if e.ist_wiederholbar() => {
                tracing::warn!(fehler = %e, "UDP-Socket nicht verfuegbar");
                return Some(self.abbruch_bewerten(format!("UDP-Vorbereitung: {e}")));
            }
            Err(e) => {
                tracing::error!(fehler = %e, "UDP-Discovery fehlgeschlagen");
                return Some(SocketEnde::Terminal(CloseReason::UdpNichtErreichbar));
            }
        };
        let (udp, extern_adresse) = udp;

        let auswahl = SignalMessage::SelectProtocol(SelectProtocolPayload::udp(
            extern_adresse.ip().to_string(),
            extern_adresse.port(),
            modus.wire_name(),
        ));
        if let Err(e) = senden(sink, &auswahl).await {
            return Some(self.abbruch_bewerten(format!("SelectProtocol nicht gesendet: {e}")));
        }

        tracing::info!(
            ssrc = ready.ssrc,
            modus = %modus,
            extern_adresse = %extern_adresse,
            "Protokoll ausgewaehlt"
        );
        self.kontext.status_setzen(ConnectionStatus::AwaitingSession);
        self.vorbereitet = Some(Vorbereitet {
            ssrc: ready.ssrc,
            modus,
            udp: Arc::new(udp),
            extern_adresse,
        });
        None
    }

    async fn udp_vorbereiten(
        &self,
        ready: &ReadyPayload,
    ) -> voicelink_core::VoiceResult<(UdpTransport, SocketAddr)> {
        let relay = UdpTransport::relay_aufloesen(&ready.ip, ready.port).await?;
        let udp = UdpTransport::verbinden(relay).await?;
        let extern_adresse = udp
            .discovery(
                ready.ssrc,
                self.kontext.config.discovery_versuche,
                self.kontext.config.discovery_timeout(),
            )
            .await?;
        Ok((udp, extern_adresse))
    }

    fn sitzung_aufbauen(&mut self, beschreibung: SessionDescriptionPayload) -> Option<SocketEnde> {
        let Some(vorbereitet) = self.vorbereitet.take() else {
            tracing::warn!("SessionDescription ohne vorheriges Ready ignoriert");
            return None;
        };

        let modus = match beschreibung.mode.parse::<EncryptionMode>() {
            Ok(modus) => modus,
            Err(_) => {
                tracing::error!(modus = %beschreibung.mode, "Relay bestaetigt unbekannten Modus");
                return Some(SocketEnde::Terminal(CloseReason::VerschluesselungNichtUnterstuetzt));
            }
        };
        if modus != vorbereitet.modus {
            tracing::warn!(gewaehlt = %vorbereitet.modus, bestaetigt = %modus, "Relay weicht vom gewaehlten Modus ab");
        }

        let krypto = match CryptoCodec::neu(modus, &beschreibung.secret_key) {
            Ok(krypto) => krypto,
            Err(e) => {
                tracing::error!(fehler = %e, "Schluessel unbrauchbar");
                return Some(SocketEnde::Terminal(CloseReason::VerschluesselungNichtUnterstuetzt));
            }
        };

        let daten = SessionDaten {
            session_id: self.kontext.zugang.session_id.clone(),
            relay: vorbereitet.udp.relay(),
            extern_adresse: vorbereitet.extern_adresse,
            ssrc: vorbereitet.ssrc,
            modus,
            krypto: Arc::new(krypto),
            udp: vorbereitet.udp,
        };
        tracing::info!(ssrc = daten.ssrc, modus = %modus, relay = %daten.relay, "Voice-Session aufgebaut");

        self.kontext.sitzung_setzen(daten);
        self.reconnect_versuche = 0;
        self.spricht = false;
        self.kontext.status_setzen(ConnectionStatus::Connected);
        None
    }

    fn peer_speaking(&self, speaking: SpeakingPayload) {
        let Some(peer_id) = speaking.user_id else {
            tracing::debug!(ssrc = speaking.ssrc, "Speaking ohne user_id");
            return;
        };
        self.kontext.registry.bind(speaking.ssrc, peer_id);

        match self.kontext.resolver.resolve_peer(peer_id) {
            Some(peer) => self
                .kontext
                .listener()
                .on_peer_speaking(&peer, speaking.speaking.spricht()),
            None => tracing::debug!(peer = %peer_id, "Teilnehmer nicht aufloesbar"),
        }
    }
}

/// Schliesst das WebSocket mit 1000
async fn normal_schliessen(sink: &mut WsSink) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: String::new().into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(fehler = %e, "Close-Frame nicht gesendet");
    }
}

async fn senden(sink: &mut WsSink, nachricht: &SignalMessage) -> Result<(), String> {
    let json = nachricht.to_json().map_err(|e| e.to_string())?;
    sink.send(Message::Text(json.into()))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_aus_nacktem_host() {
        assert_eq!(
            relay_url("voice.example.net:80", 4),
            "wss://voice.example.net/?v=4"
        );
        assert_eq!(relay_url("voice.example.net", 3), "wss://voice.example.net/?v=3");
    }

    #[test]
    fn url_mit_schema_bleibt() {
        assert_eq!(relay_url("ws://127.0.0.1:9000", 4), "ws://127.0.0.1:9000");
    }

    #[test]
    fn nonce_ist_aktuelle_zeit() {
        let vorher = jetzt_ms();
        assert!(vorher > 1_600_000_000_000);
        assert!(jetzt_ms() >= vorher);
    }
}

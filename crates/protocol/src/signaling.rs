//! Signaling-Protokoll (WebSocket, JSON)
//!
//! Jede Nachricht ist ein Umschlag `{"op": <u8>, "d": <payload>}`. Der
//! Opcode bestimmt den Typ der Nutzlast.
//!
//! ## Ablauf
//!
//! ```text
//! Client                                 Relay
//!   |  <------------------- Hello (8)      |   heartbeat_interval
//!   |  Identify (0) / Resume (7) -------->  |
//!   |  <------------------- Ready (2)      |   ssrc, ip, port, modes
//!   |  ~~~~~~~~ UDP-Discovery ~~~~~~~~~~~  |
//!   |  SelectProtocol (1) -------------->  |   externe Adresse, Modus
//!   |  <-------- SessionDescription (4)    |   secret_key
//!   |  <------------------- Resumed (9)    |   (nur nach Resume)
//!   |  Heartbeat (3) <-> HeartbeatAck (6)  |
//!   |  Speaking (5) <-> Speaking (5)       |
//!   |  <------------ ClientDisconnect (13) |
//! ```

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;
use voicelink_core::{CloseReason, PeerId, ServerId};

// ---------------------------------------------------------------------------
// OpCode
// ---------------------------------------------------------------------------

/// Opcodes des Voice-Signalings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpCode {
    Identify = 0,
    SelectProtocol = 1,
    Ready = 2,
    Heartbeat = 3,
    SessionDescription = 4,
    Speaking = 5,
    HeartbeatAck = 6,
    Resume = 7,
    Hello = 8,
    Resumed = 9,
    /// Video/Client-Connect, wird ignoriert
    ClientConnect = 12,
    ClientDisconnect = 13,
    /// Codec-Hinweise, wird ignoriert
    Codecs = 14,
}

impl OpCode {
    /// Konvertiert ein Byte in einen `OpCode`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Identify),
            1 => Some(Self::SelectProtocol),
            2 => Some(Self::Ready),
            3 => Some(Self::Heartbeat),
            4 => Some(Self::SessionDescription),
            5 => Some(Self::Speaking),
            6 => Some(Self::HeartbeatAck),
            7 => Some(Self::Resume),
            8 => Some(Self::Hello),
            9 => Some(Self::Resumed),
            12 => Some(Self::ClientConnect),
            13 => Some(Self::ClientDisconnect),
            14 => Some(Self::Codecs),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Sprechmodus
// ---------------------------------------------------------------------------

/// Bitmaske des Speaking-Felds
///
/// Aeltere Relays senden `true`/`false`, neuere eine Bitmaske.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SprechModus(pub u8);

impl SprechModus {
    pub const AUS: SprechModus = SprechModus(0);
    pub const STIMME: SprechModus = SprechModus(1);
    pub const SOUNDSHARE: SprechModus = SprechModus(2);
    pub const PRIORITAET: SprechModus = SprechModus(4);

    /// Gibt true zurueck wenn irgendein Sprech-Bit gesetzt ist
    pub fn spricht(&self) -> bool {
        self.0 != 0
    }
}

impl Serialize for SprechModus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for SprechModus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Bool(b) => Ok(Self(u8::from(b))),
            Value::Number(n) => n
                .as_u64()
                .and_then(|v| u8::try_from(v).ok())
                .map(Self)
                .ok_or_else(|| D::Error::custom(format!("ungueltiger Sprechmodus: {n}"))),
            andere => Err(D::Error::custom(format!("ungueltiger Sprechmodus: {andere}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Nutzlasten
// ---------------------------------------------------------------------------

/// Op 0: erste Anmeldung auf einem neuen Socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyPayload {
    pub server_id: ServerId,
    pub user_id: PeerId,
    pub session_id: String,
    pub token: String,
}

/// Op 7: Fortsetzung einer bestehenden Session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumePayload {
    pub server_id: ServerId,
    pub session_id: String,
    pub token: String,
}

/// Op 1: gewaehltes Transportprotokoll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocolPayload {
    pub protocol: String,
    pub data: SelectProtocolData,
}

/// Externe Adresse und Verschluesselungsmodus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectProtocolData {
    pub address: String,
    pub port: u16,
    pub mode: String,
}

impl SelectProtocolPayload {
    /// Erstellt die UDP-Auswahl
    pub fn udp(address: String, port: u16, mode: &str) -> Self {
        Self {
            protocol: "udp".into(),
            data: SelectProtocolData {
                address,
                port,
                mode: mode.to_string(),
            },
        }
    }
}

/// Op 2: eigene SSRC, UDP-Endpunkt des Relays und angebotene Modi
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyPayload {
    pub ssrc: u32,
    pub ip: String,
    pub port: u16,
    pub modes: Vec<String>,
}

/// Op 4: Schluessel und bestaetigter Modus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptionPayload {
    pub mode: String,
    pub secret_key: Vec<u8>,
}

/// Op 5: Sprechstatus, vom Client ohne `user_id`, vom Relay mit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakingPayload {
    pub speaking: SprechModus,
    #[serde(default)]
    pub delay: u32,
    pub ssrc: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<PeerId>,
}

/// Op 8: Heartbeat-Intervall in Millisekunden
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloPayload {
    pub heartbeat_interval: f64,
}

/// Obergrenze fuer das Heartbeat-Intervall
pub const MAX_HEARTBEAT_INTERVALL: Duration = Duration::from_secs(3600);

impl HelloPayload {
    /// Heartbeat-Intervall als Duration
    ///
    /// Zwischen 1 ms und [`MAX_HEARTBEAT_INTERVALL`]. Nicht darstellbare
    /// Werte (unendlich, NaN, zu gross) ergeben die Obergrenze.
    pub fn intervall(&self) -> Duration {
        if self.heartbeat_interval.is_nan() {
            return MAX_HEARTBEAT_INTERVALL;
        }
        let sekunden = (self.heartbeat_interval / 1000.0).max(0.001);
        Duration::try_from_secs_f64(sekunden)
            .unwrap_or(MAX_HEARTBEAT_INTERVALL)
            .min(MAX_HEARTBEAT_INTERVALL)
    }
}

/// Op 13: ein Teilnehmer hat den Kanal verlassen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientDisconnectPayload {
    pub user_id: PeerId,
}

// ---------------------------------------------------------------------------
// SignalMessage
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct Umschlag {
    op: u8,
    #[serde(default)]
    d: Value,
}

/// Typisierte Signaling-Nachricht
#[derive(Debug, Clone, PartialEq)]
pub enum SignalMessage {
    Identify(IdentifyPayload),
    SelectProtocol(SelectProtocolPayload),
    Ready(ReadyPayload),
    Heartbeat(u64),
    SessionDescription(SessionDescriptionPayload),
    Speaking(SpeakingPayload),
    HeartbeatAck(u64),
    Resume(ResumePayload),
    Hello(HelloPayload),
    Resumed,
    ClientDisconnect(ClientDisconnectPayload),
    /// Bekannter oder unbekannter Opcode ohne Bedeutung fuer den Client
    Ignoriert { op: u8 },
}

impl SignalMessage {
    /// Opcode der Nachricht
    pub fn op(&self) -> u8 {
        let code = match self {
            Self::Identify(_) => OpCode::Identify,
            Self::SelectProtocol(_) => OpCode::SelectProtocol,
            Self::Ready(_) => OpCode::Ready,
            Self::Heartbeat(_) => OpCode::Heartbeat,
            Self::SessionDescription(_) => OpCode::SessionDescription,
            Self::Speaking(_) => OpCode::Speaking,
            Self::HeartbeatAck(_) => OpCode::HeartbeatAck,
            Self::Resume(_) => OpCode::Resume,
            Self::Hello(_) => OpCode::Hello,
            Self::Resumed => OpCode::Resumed,
            Self::ClientDisconnect(_) => OpCode::ClientDisconnect,
            Self::Ignoriert { op } => return *op,
        };
        code as u8
    }

    /// Serialisiert die Nachricht in ihren JSON-Umschlag
    pub fn to_json(&self) -> serde_json::Result<String> {
        let d = match self {
            Self::Identify(p) => serde_json::to_value(p)?,
            Self::SelectProtocol(p) => serde_json::to_value(p)?,
            Self::Ready(p) => serde_json::to_value(p)?,
            Self::Heartbeat(n) | Self::HeartbeatAck(n) => Value::from(*n),
            Self::SessionDescription(p) => serde_json::to_value(p)?,
            Self::Speaking(p) => serde_json::to_value(p)?,
            Self::Resume(p) => serde_json::to_value(p)?,
            Self::Hello(p) => serde_json::to_value(p)?,
            Self::ClientDisconnect(p) => serde_json::to_value(p)?,
            Self::Resumed | Self::Ignoriert { .. } => Value::Null,
        };
        serde_json::to_string(&Umschlag { op: self.op(), d })
    }

    /// Parst einen JSON-Umschlag
    ///
    /// Unbekannte Opcodes ergeben `Ignoriert`, fehlerhafte Nutzlasten
    /// einen Fehler.
    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        let umschlag: Umschlag = serde_json::from_str(text)?;
        let d = umschlag.d;

        let nachricht = match OpCode::from_u8(umschlag.op) {
            Some(OpCode::Identify) => Self::Identify(serde_json::from_value(d)?),
            Some(OpCode::SelectProtocol) => Self::SelectProtocol(serde_json::from_value(d)?),
            Some(OpCode::Ready) => Self::Ready(serde_json::from_value(d)?),
            Some(OpCode::Heartbeat) => Self::Heartbeat(nonce_lesen(&d)?),
            Some(OpCode::SessionDescription) => {
                Self::SessionDescription(serde_json::from_value(d)?)
            }
            Some(OpCode::Speaking) => Self::Speaking(serde_json::from_value(d)?),
            Some(OpCode::HeartbeatAck) => Self::HeartbeatAck(nonce_lesen(&d)?),
            Some(OpCode::Resume) => Self::Resume(serde_json::from_value(d)?),
            Some(OpCode::Hello) => Self::Hello(serde_json::from_value(d)?),
            Some(OpCode::Resumed) => Self::Resumed,
            Some(OpCode::ClientDisconnect) => Self::ClientDisconnect(serde_json::from_value(d)?),
            Some(OpCode::ClientConnect) | Some(OpCode::Codecs) | None => {
                Self::Ignoriert { op: umschlag.op }
            }
        };
        Ok(nachricht)
    }
}

/// Heartbeat-Nonce als Zahl oder String
fn nonce_lesen(d: &Value) -> serde_json::Result<u64> {
    match d {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| f as u64))
            .ok_or_else(|| serde_json::Error::custom(format!("ungueltige Nonce: {n}"))),
        Value::String(s) => s
            .parse()
            .map_err(|_| serde_json::Error::custom(format!("ungueltige Nonce: '{s}'"))),
        andere => Err(serde_json::Error::custom(format!("ungueltige Nonce: {andere}"))),
    }
}

// ---------------------------------------------------------------------------
// Close-Codes
// ---------------------------------------------------------------------------

/// Close-Codes des Voice-WebSockets
///
/// 4015 (Server-Absturz) gilt als voruebergehend: das Relay hat die Session
/// noch und ein Resume auf einem neuen WebSocket setzt sie fort. Nur 4006
/// und 4011 bedeuten, dass keine Session mehr existiert.
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const UNBEKANNTER_OPCODE: u16 = 4001;
    pub const DEKODIERUNG_FEHLGESCHLAGEN: u16 = 4002;
    pub const NICHT_AUTHENTIFIZIERT: u16 = 4003;
    pub const AUTHENTIFIZIERUNG_FEHLGESCHLAGEN: u16 = 4004;
    pub const BEREITS_AUTHENTIFIZIERT: u16 = 4005;
    pub const SESSION_UNGUELTIG: u16 = 4006;
    pub const SESSION_TIMEOUT: u16 = 4009;
    pub const SERVER_NICHT_GEFUNDEN: u16 = 4011;
    pub const UNBEKANNTES_PROTOKOLL: u16 = 4012;
    pub const GETRENNT: u16 = 4014;
    pub const SERVER_ABSTURZ: u16 = 4015;
    pub const UNBEKANNTER_VERSCHLUESSELUNGSMODUS: u16 = 4016;
}

/// Reaktion der Session auf ein vom Relay geschlossenes WebSocket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAktion {
    /// Neues WebSocket oeffnen und mit Resume fortsetzen
    Reconnect,
    /// Session beenden
    Terminal(CloseReason),
}

/// Bewertet den Close-Code eines nicht vom Host ausgeloesten Schliessens
///
/// `None` steht fuer einen Abbruch ohne Close-Frame.
pub fn close_code_bewerten(code: Option<u16>) -> CloseAktion {
    match code {
        Some(close_code::AUTHENTIFIZIERUNG_FEHLGESCHLAGEN) => {
            CloseAktion::Terminal(CloseReason::AuthentifizierungFehlgeschlagen)
        }
        Some(close_code::SESSION_UNGUELTIG) | Some(close_code::SERVER_NICHT_GEFUNDEN) => {
            CloseAktion::Terminal(CloseReason::ResumeUnmoeglich)
        }
        Some(close_code::UNBEKANNTER_VERSCHLUESSELUNGSMODUS) => {
            CloseAktion::Terminal(CloseReason::VerschluesselungNichtUnterstuetzt)
        }
        _ => CloseAktion::Reconnect,
    }
}

//! voicelink-voice – Voice-Transport zum Relay
//!
//! Baut die Voice-Verbindung auf, haelt sie am Leben und transportiert
//! Audio in beide Richtungen.
//!
//! ## Module
//! - [`session`] – Orchestrator und Host-API ([`VoiceSession`])
//! - [`signaling`] – WebSocket-Actor mit Resume/Reconnect
//! - [`udp`] – Discovery, Keep-Alive und rohes UDP
//! - [`send`] – 20-ms-Sendepipeline mit Speaking-Zustand
//! - [`receive`] – Entschluesseln, Reihenfolge, Dekodieren
//! - [`jitter`] – Mischpuffer fuer kombiniertes Audio
//! - [`ssrc`] – SSRC-Registry
//! - [`handler`] – Schnittstellen zur Host-Anwendung
//! - [`config`] – Laufzeit-Konfiguration
//! - [`stats`] – Verbindungsstatistik

pub mod config;
pub mod handler;
pub mod jitter;
pub mod receive;
pub mod send;
pub mod session;
pub mod signaling;
pub mod ssrc;
pub mod stats;
pub mod udp;

pub use config::VoiceConfig;
pub use handler::{AudioSink, AudioSource, ConnectionListener, KeinListener, PeerResolver};
pub use session::{SessionDaten, VoiceSession, VoiceZugang};
pub use signaling::{relay_url, SignalBefehl};
pub use ssrc::SsrcRegistry;
pub use stats::{StatistikSnapshot, VoiceStatistik};
pub use udp::UdpTransport;

pub use voicelink_core::{ChannelId, CloseReason, ConnectionStatus, Peer, PeerId, ServerId};
pub use voicelink_protocol::SprechModus;

//! voicelink-protocol – Netzwerkprotokoll-Definitionen
//!
//! Dieses Crate definiert alle Nachrichten und Paketformate, die zwischen
//! Client und Voice-Relay ausgetauscht werden:
//!
//! - [`signaling`] – JSON-Nachrichten `{op, d}` ueber den WebSocket
//! - [`rtp`] – RTP-Header der UDP-Audiopakete
//! - [`discovery`] – IP-Discovery und Keep-Alive ueber UDP
//! - [`crypto`] – Namen der Verschluesselungsmodi
//! - [`codec`] – Audio-Profil (48 kHz, Stereo, 20 ms)

pub mod codec;
pub mod crypto;
pub mod discovery;
pub mod rtp;
pub mod signaling;

pub use codec::AudioProfil;
pub use crypto::EncryptionMode;
pub use rtp::RtpHeader;
pub use signaling::{CloseAktion, OpCode, SignalMessage, SprechModus};

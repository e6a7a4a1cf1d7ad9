//! voicelink-core – Gemeinsame Typen, Verbindungsstatus und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Voicelink-Crates gemeinsam genutzt werden.

pub mod error;
pub mod status;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FehlerKategorie, VoiceError, VoiceResult};
pub use status::{CloseReason, ConnectionStatus};
pub use types::{ChannelId, Peer, PeerId, ServerId};

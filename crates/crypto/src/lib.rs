//! # voicelink-crypto
//!
//! Verschluesselung der UDP-Voice-Pakete.
//!
//! ## Module
//! - `mode` - Auswahl des Verschluesselungsmodus aus dem Angebot des Relays
//! - `codec` - Versiegeln und Oeffnen von Paketen, Nonce-Zaehler
//! - `error` - Fehlertypen

pub mod codec;
pub mod error;
pub mod mode;

// Bequeme Re-Exports
pub use codec::{CryptoCodec, NonceZaehler, SCHLUESSEL_LAENGE};
pub use error::{CryptoError, CryptoResult};
pub use mode::modus_waehlen;
pub use voicelink_protocol::EncryptionMode;

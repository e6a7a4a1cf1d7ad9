//! Verschluesselungsmodi der Voice-Pakete
//!
//! Alle Modi verwenden XSalsa20-Poly1305 (secretbox). Sie unterscheiden
//! sich nur darin, woher die 24-Byte-Nonce stammt und ob sie an das Paket
//! angehaengt wird.

use serde::{Deserialize, Serialize};

/// Verschluesselungsmodus einer Voice-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionMode {
    /// Zufaellige 24-Byte-Nonce hinter dem Ciphertext
    #[serde(rename = "xsalsa20_poly1305_suffix")]
    Suffix,
    /// 4-Byte-Zaehler (big-endian) hinter dem Ciphertext
    #[serde(rename = "xsalsa20_poly1305_lite")]
    Lite,
    /// RTP-Header als Nonce, kein Suffix
    #[serde(rename = "xsalsa20_poly1305")]
    Plain,
}

impl EncryptionMode {
    /// Alle vom Client unterstuetzten Modi
    pub const ALLE: [EncryptionMode; 3] = [Self::Suffix, Self::Lite, Self::Plain];

    /// Name des Modus auf dem Draht
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Suffix => "xsalsa20_poly1305_suffix",
            Self::Lite => "xsalsa20_poly1305_lite",
            Self::Plain => "xsalsa20_poly1305",
        }
    }

    /// Laenge des angehaengten Nonce-Suffix in Bytes
    pub fn suffix_laenge(&self) -> usize {
        match self {
            Self::Suffix => 24,
            Self::Lite => 4,
            Self::Plain => 0,
        }
    }
}

impl std::fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl std::str::FromStr for EncryptionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALLE
            .into_iter()
            .find(|m| m.wire_name() == s)
            .ok_or_else(|| format!("Unbekannter Verschluesselungsmodus: '{s}'"))
    }
}

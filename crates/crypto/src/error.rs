//! Fehlertypen fuer das Kryptografie-Subsystem

use thiserror::Error;
use voicelink_core::VoiceError;

/// Fehler im Kryptografie-Subsystem
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Verschluesselung fehlgeschlagen: {0}")]
    Verschluesselung(String),

    #[error("Entschluesselung fehlgeschlagen: {0}")]
    Entschluesselung(String),

    #[error("Ungueltige Schluessel-Laenge: erwartet {min}..={max}, erhalten {erhalten}")]
    UngueltigeSchluesselLaenge { min: usize, max: usize, erhalten: usize },

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("Kein gemeinsamer Verschluesselungsmodus (angeboten: {angeboten:?})")]
    KeinGemeinsamerModus { angeboten: Vec<String> },
}

pub type CryptoResult<T> = Result<T, CryptoError>;

impl From<CryptoError> for VoiceError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::KeinGemeinsamerModus { angeboten } => {
                VoiceError::VerschluesselungNichtUnterstuetzt { angeboten }
            }
            andere => VoiceError::Krypto(andere.to_string()),
        }
    }
}

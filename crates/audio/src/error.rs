//! Fehlertypen fuer die Audio-Bausteine

use thiserror::Error;
use voicelink_core::VoiceError;

/// Alle moeglichen Fehler der Audio-Bausteine
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Codec-Fehler: {0}")]
    CodecFehler(String),

    #[error("Ungueltige Frame-Groesse: {erhalten} Bytes (erlaubt: {erlaubt:?})")]
    UngueltigeFrameGroesse { erlaubt: Vec<usize>, erhalten: usize },

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for VoiceError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::Konfiguration(msg) => VoiceError::Konfiguration(msg),
            andere => VoiceError::Codec(andere.to_string()),
        }
    }
}

//! Fehlertypen fuer Voicelink
//!
//! Zentraler Fehler-Enum der alle Fehlerzustaende einer Voice-Verbindung
//! abdeckt. Jeder Fehler gehoert zu genau einer [`FehlerKategorie`], die
//! bestimmt wie die Session darauf reagiert:
//!
//! | Kategorie            | Reaktion                                       |
//! |----------------------|------------------------------------------------|
//! | `TransportFatal`     | Terminaler Statuswechsel, kein Retry           |
//! | `TransportTransient` | Reconnect mit Resume                           |
//! | `Codec`              | Frame verwerfen, Verbindung bleibt bestehen    |
//! | `Protokoll`          | Nachricht/Paket ignorieren                     |
//! | `Fehlbedienung`      | Sofortiger Fehler an den Aufrufer              |

use thiserror::Error;

/// Globaler Result-Alias fuer Voicelink
pub type VoiceResult<T> = std::result::Result<T, VoiceError>;

/// Fehlerkategorie fuer die Fehlerbehandlung der Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FehlerKategorie {
    TransportFatal,
    TransportTransient,
    Codec,
    Protokoll,
    Fehlbedienung,
}

/// Alle moeglichen Fehler einer Voice-Verbindung
#[derive(Debug, Error)]
pub enum VoiceError {
    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    #[error("UDP-Discovery fehlgeschlagen nach {versuche} Versuchen")]
    Discovery { versuche: u32 },

    // --- Fatal ---
    #[error("Kein unterstuetzter Verschluesselungsmodus (angeboten: {angeboten:?})")]
    VerschluesselungNichtUnterstuetzt { angeboten: Vec<String> },

    #[error("Session kann nicht fortgesetzt werden: {0}")]
    ResumeUnmoeglich(String),

    // --- Codec ---
    #[error("Codec-Fehler: {0}")]
    Codec(String),

    #[error("Krypto-Fehler: {0}")]
    Krypto(String),

    // --- Fehlbedienung ---
    #[error("Fehlbedienung: {0}")]
    Fehlbedienung(String),

    #[error("Session ist bereits geschlossen")]
    SessionGeschlossen,

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Protokoll & IO ---
    #[error("IO-Fehler: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),
}

impl VoiceError {
    /// Erstellt einen Fehlbedienungs-Fehler
    pub fn fehlbedienung(msg: impl Into<String>) -> Self {
        Self::Fehlbedienung(msg.into())
    }

    /// Ordnet den Fehler einer Kategorie zu
    pub fn kategorie(&self) -> FehlerKategorie {
        match self {
            Self::VerschluesselungNichtUnterstuetzt { .. }
            | Self::ResumeUnmoeglich(_)
            | Self::Discovery { .. } => FehlerKategorie::TransportFatal,
            Self::Verbindung(_) | Self::Zeitlimit(_) | Self::Io(_) => {
                FehlerKategorie::TransportTransient
            }
            Self::Codec(_) | Self::Krypto(_) => FehlerKategorie::Codec,
            Self::Json(_) => FehlerKategorie::Protokoll,
            Self::Fehlbedienung(_)
            | Self::SessionGeschlossen
            | Self::Konfiguration(_) => FehlerKategorie::Fehlbedienung,
        }
    }

    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        self.kategorie() == FehlerKategorie::TransportTransient
    }
}

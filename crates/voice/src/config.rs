//! Laufzeit-Konfiguration einer Voice-Session
//!
//! Alle Felder haben Standardwerte, sodass eine Session ohne
//! Konfigurationsdatei lauffaehig ist. Die Struktur wird im Client-Binary
//! als Abschnitt `[voice]` aus TOML geladen.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use voicelink_core::{VoiceError, VoiceResult};
use voicelink_protocol::SprechModus;

/// Unterstuetzte Versionen des Signaling-Protokolls
const PROTOKOLL_VERSIONEN: [u8; 2] = [3, 4];

/// Konfiguration einer Voice-Session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    /// Maximale Zeit bis zum Status `Connected`
    pub verbindungs_timeout_ms: u64,
    /// Anzahl Discovery-Anfragen bevor die Verbindung als unbrauchbar gilt
    pub discovery_versuche: u32,
    /// Wartezeit auf eine Discovery-Antwort
    pub discovery_timeout_ms: u64,
    /// Aufeinanderfolgende Reconnects ohne Erfolg bis zum Abbruch
    pub max_reconnect_versuche: u32,
    /// Maximales Alter eines Frames im Mischpuffer
    pub jitter_fenster_ms: u64,
    /// Stille-Frames vor dem ersten echten Frame einer Verbindung
    pub vorlauf_stille_frames: u32,
    /// Stille-Frames nachdem die Quelle verstummt
    pub nachlauf_stille_frames: u32,
    /// Socket-Timeout der Empfangsschleife
    pub empfangs_timeout_ms: u64,
    /// Version des Signaling-Protokolls in der URL
    pub protokoll_version: u8,
    /// Bei abnormalem Verbindungsende automatisch fortsetzen
    pub auto_reconnect: bool,
    /// Bitmaske fuer Speaking-Nachrichten (1 = Stimme)
    pub sprech_modus: u8,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            verbindungs_timeout_ms: 10_000,
            discovery_versuche: 5,
            discovery_timeout_ms: 1_000,
            max_reconnect_versuche: 5,
            jitter_fenster_ms: 100,
            vorlauf_stille_frames: 10,
            nachlauf_stille_frames: 5,
            empfangs_timeout_ms: 1_000,
            protokoll_version: 4,
            auto_reconnect: true,
            sprech_modus: 1,
        }
    }
}

impl VoiceConfig {
    /// Prueft die Konfiguration auf unbrauchbare Werte
    pub fn validieren(&self) -> VoiceResult<()> {
        if self.discovery_versuche == 0 {
            return Err(VoiceError::Konfiguration(
                "discovery_versuche muss mindestens 1 sein".into(),
            ));
        }
        if self.max_reconnect_versuche == 0 {
            return Err(VoiceError::Konfiguration(
                "max_reconnect_versuche muss mindestens 1 sein".into(),
            ));
        }
        if self.jitter_fenster_ms == 0 {
            return Err(VoiceError::Konfiguration(
                "jitter_fenster_ms muss groesser als 0 sein".into(),
            ));
        }
        if self.discovery_timeout_ms == 0 || self.empfangs_timeout_ms == 0 {
            return Err(VoiceError::Konfiguration(
                "Timeouts muessen groesser als 0 sein".into(),
            ));
        }
        if !PROTOKOLL_VERSIONEN.contains(&self.protokoll_version) {
            return Err(VoiceError::Konfiguration(format!(
                "Protokollversion {} nicht unterstuetzt (erlaubt: {:?})",
                self.protokoll_version, PROTOKOLL_VERSIONEN
            )));
        }
        if self.sprech_modus == 0 {
            return Err(VoiceError::Konfiguration(
                "sprech_modus 0 wuerde nie als sprechend gelten".into(),
            ));
        }
        Ok(())
    }

    pub fn verbindungs_timeout(&self) -> Duration {
        Duration::from_millis(self.verbindungs_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    pub fn jitter_fenster(&self) -> Duration {
        Duration::from_millis(self.jitter_fenster_ms)
    }

    pub fn empfangs_timeout(&self) -> Duration {
        Duration::from_millis(self.empfangs_timeout_ms)
    }

    pub fn sprech_modus(&self) -> SprechModus {
        SprechModus(self.sprech_modus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte_sind_gueltig() {
        let config = VoiceConfig::default();
        assert!(config.validieren().is_ok());
        assert_eq!(config.vorlauf_stille_frames, 10);
        assert_eq!(config.nachlauf_stille_frames, 5);
        assert_eq!(config.jitter_fenster(), Duration::from_millis(100));
        assert_eq!(config.empfangs_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn null_versuche_werden_abgelehnt() {
        let config = VoiceConfig {
            discovery_versuche: 0,
            ..Default::default()
        };
        assert!(matches!(config.validieren(), Err(VoiceError::Konfiguration(_))));
    }

    #[test]
    fn unbekannte_protokollversion() {
        let config = VoiceConfig {
            protokoll_version: 9,
            ..Default::default()
        };
        assert!(config.validieren().is_err());
    }

    #[test]
    fn leerer_sprechmodus_wird_abgelehnt() {
        let config = VoiceConfig {
            sprech_modus: 0,
            ..Default::default()
        };
        assert!(config.validieren().is_err());
    }
}

//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Fehlende Abschnitte und
//! Felder behalten ihre Standardwerte. Die Zugangsdaten im Abschnitt
//! `[verbindung]` stammen aus dem Gateway und muessen gesetzt werden.

use serde::{Deserialize, Serialize};
use voicelink_core::{ChannelId, PeerId, ServerId};
use voicelink_voice::{VoiceConfig, VoiceZugang};

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Zugangsdaten fuer das Voice-Relay
    pub verbindung: VerbindungsEinstellungen,
    /// Laufzeitparameter der Voice-Session
    pub voice: VoiceConfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Testton und Pegelanzeige
    pub demo: DemoEinstellungen,
}

/// Zugangsdaten aus Voice-Server-Update und Voice-State
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerbindungsEinstellungen {
    /// Host des Relays (z.B. "voice.example.net:80") oder ws(s)-URL
    pub endpoint: String,
    pub server_id: u64,
    pub user_id: u64,
    pub session_id: String,
    pub token: String,
    pub kanal_id: u64,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Einstellungen des Demo-Tons
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoEinstellungen {
    /// Tonfrequenz in Hz
    pub ton_frequenz_hz: f32,
    /// Lautstaerke 0.0..=1.0
    pub lautstaerke: f32,
    /// Dauer einer Sprech- bzw. Pausenphase
    pub phase_ms: u64,
}

impl Default for DemoEinstellungen {
    fn default() -> Self {
        Self {
            ton_frequenz_hz: 440.0,
            lautstaerke: 0.2,
            phase_ms: 2_000,
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Zugangsdaten fuer die Voice-Session
    pub fn zugang(&self) -> VoiceZugang {
        let v = &self.verbindung;
        VoiceZugang {
            endpoint: v.endpoint.clone(),
            server_id: ServerId(v.server_id),
            user_id: PeerId(v.user_id),
            session_id: v.session_id.clone(),
            token: v.token.clone(),
        }
    }

    pub fn kanal(&self) -> ChannelId {
        ChannelId(self.verbindung.kanal_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_config() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.voice.jitter_fenster_ms, 100);
        assert!(cfg.verbindung.endpoint.is_empty());
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            [verbindung]
            endpoint = "voice.example.net:80"
            server_id = 41771983423143937
            session_id = "abc"
            token = "xyz"

            [voice]
            vorlauf_stille_frames = 3
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.zugang().server_id, ServerId(41771983423143937));
        assert_eq!(cfg.zugang().session_id, "abc");
        assert_eq!(cfg.voice.vorlauf_stille_frames, 3);
        // Nicht angegebene Felder behalten Standardwerte
        assert_eq!(cfg.voice.nachlauf_stille_frames, 5);
        assert_eq!(cfg.demo.ton_frequenz_hz, 440.0);
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let cfg = ClientConfig::laden("/nicht/vorhanden/voicelink.toml").unwrap();
        assert_eq!(cfg.logging.format, "text");
    }
}

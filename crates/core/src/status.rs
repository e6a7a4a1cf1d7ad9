//! Verbindungsstatus einer Voice-Session
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> DiscoveringUdp
//!                     ^                                 |
//!                     |                                 v
//!                Reconnecting <------------ AwaitingSession -> Connected
//!                                                                  |
//!                                 Closed(grund) <------------------+
//! ```
//!
//! `Reconnecting` ist aus jedem verbundenen Zustand erreichbar und fuehrt
//! mit gesetztem Resume-Flag zurueck nach `Connecting`. `Closed` ist
//! terminal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grund fuer das terminale Schliessen einer Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Vom Host angefordert (Close-Code 1000)
    Normal,
    /// Relay hat die Authentifizierung abgelehnt
    AuthentifizierungFehlgeschlagen,
    /// Kein gemeinsamer Verschluesselungsmodus
    VerschluesselungNichtUnterstuetzt,
    /// Relay kennt die Session nicht mehr (4006) oder den Server nicht (4011)
    ResumeUnmoeglich,
    /// UDP-Discovery nach allen Versuchen fehlgeschlagen
    UdpNichtErreichbar,
    /// WebSocket konnte nach allen Versuchen nicht geoeffnet werden
    WebsocketNichtErreichbar,
    /// Verbindung verloren und kein Reconnect erlaubt
    VerbindungVerloren,
    /// Session wurde nicht rechtzeitig bereit
    Zeitlimit,
}

impl CloseReason {
    /// Gibt true zurueck wenn der Grund dem Host als Fehler gemeldet wird
    pub fn ist_fehler(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Normal => "normal",
            Self::AuthentifizierungFehlgeschlagen => "authentifizierung_fehlgeschlagen",
            Self::VerschluesselungNichtUnterstuetzt => "verschluesselung_nicht_unterstuetzt",
            Self::ResumeUnmoeglich => "resume_unmoeglich",
            Self::UdpNichtErreichbar => "udp_nicht_erreichbar",
            Self::WebsocketNichtErreichbar => "websocket_nicht_erreichbar",
            Self::VerbindungVerloren => "verbindung_verloren",
            Self::Zeitlimit => "zeitlimit",
        };
        f.write_str(s)
    }
}

/// Lebenszyklus-Status einer Voice-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Authenticating,
    DiscoveringUdp,
    AwaitingSession,
    Connected,
    Reconnecting,
    Closed(CloseReason),
}

impl ConnectionStatus {
    /// Gibt true zurueck wenn der Status terminal ist
    pub fn ist_geschlossen(&self) -> bool {
        matches!(self, Self::Closed(_))
    }

    /// Gibt true zurueck solange ein Verbindungsaufbau laeuft
    pub fn ist_im_aufbau(&self) -> bool {
        matches!(
            self,
            Self::Connecting
                | Self::Authenticating
                | Self::DiscoveringUdp
                | Self::AwaitingSession
                | Self::Reconnecting
        )
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting => f.write_str("connecting"),
            Self::Authenticating => f.write_str("authenticating"),
            Self::DiscoveringUdp => f.write_str("discovering_udp"),
            Self::AwaitingSession => f.write_str("awaiting_session"),
            Self::Connected => f.write_str("connected"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Closed(grund) => write!(f, "closed({grund})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geschlossen_ist_terminal() {
        assert!(ConnectionStatus::Closed(CloseReason::Normal).ist_geschlossen());
        assert!(!ConnectionStatus::Connected.ist_geschlossen());
    }

    #[test]
    fn aufbau_zustaende() {
        assert!(ConnectionStatus::Reconnecting.ist_im_aufbau());
        assert!(ConnectionStatus::DiscoveringUdp.ist_im_aufbau());
        assert!(!ConnectionStatus::Connected.ist_im_aufbau());
        assert!(!ConnectionStatus::Disconnected.ist_im_aufbau());
    }

    #[test]
    fn normaler_abschluss_ist_kein_fehler() {
        assert!(!CloseReason::Normal.ist_fehler());
        assert!(CloseReason::AuthentifizierungFehlgeschlagen.ist_fehler());
    }

    #[test]
    fn anzeige() {
        assert_eq!(
            ConnectionStatus::Closed(CloseReason::Zeitlimit).to_string(),
            "closed(zeitlimit)"
        );
    }
}

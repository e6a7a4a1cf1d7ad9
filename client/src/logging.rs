//! Logging-Setup des Clients
//!
//! Umgebungsvariablen ueberschreiben die Konfigurationsdatei:
//! - `VL_LOG_LEVEL`: Filter-Direktiven, z.B. `debug` oder `voicelink_voice=trace`
//! - `VL_LOG_FORMAT`: `text` oder `json`
//!
//! WebSocket- und TLS-Crates werden unterhalb von `warn` stummgeschaltet,
//! solange der Filter sie nicht selbst nennt.

use tracing_subscriber::{fmt, EnvFilter};

const LEVEL_VAR: &str = "VL_LOG_LEVEL";
const FORMAT_VAR: &str = "VL_LOG_FORMAT";

/// Abhaengigkeiten, deren Handshake-Logs das Voice-Log ueberfluten
const LAUTE_CRATES: [&str; 3] = ["tungstenite", "tokio_tungstenite", "rustls"];

/// Ausgabeformat der Log-Zeilen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn aus_str(format: &str) -> Option<Self> {
        match format {
            "text" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Ergaenzt `basis` um `warn`-Direktiven fuer laute Crates
fn direktiven(basis: &str) -> String {
    let mut direktiven = basis.trim().to_string();
    for krate in LAUTE_CRATES {
        let erwaehnt = direktiven
            .split(',')
            .any(|d| d.trim().split('=').next() == Some(krate));
        if !erwaehnt {
            direktiven.push_str(&format!(",{krate}=warn"));
        }
    }
    direktiven
}

/// Initialisiert den globalen Subscriber.
pub fn logging_initialisieren(level: &str, format: &str) {
    let basis = std::env::var(LEVEL_VAR).unwrap_or_else(|_| level.to_string());
    let filter = EnvFilter::try_new(direktiven(&basis))
        .unwrap_or_else(|_| EnvFilter::new(direktiven("info")));

    let format = std::env::var(FORMAT_VAR).unwrap_or_else(|_| format.to_string());

    match LogFormat::aus_str(&format).unwrap_or(LogFormat::Text) {
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        LogFormat::Text => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Einfaches Level ohne Modul-Direktiven?
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

pub fn log_format_gueltig(format: &str) -> bool {
    LogFormat::aus_str(format).is_some()
}

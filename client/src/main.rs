//! Voicelink Demo-Client
//!
//! Verbindet eine Voice-Session mit den Zugangsdaten aus der
//! Konfigurationsdatei, sendet einen Testton und protokolliert empfangenes
//! Audio. Beendet sich bei Ctrl-C oder wenn die Session geschlossen wird.
//!
//! Konfigurationspfad: `VOICELINK_CONFIG` (Standard: `voicelink.toml`)

mod config;
mod demo;
mod logging;

use std::sync::Arc;

use anyhow::Context;
use voicelink_audio::OpusCodecProvider;
use voicelink_voice::{CloseReason, VoiceSession};

use config::ClientConfig;
use demo::{IdResolver, LogListener, PegelSenke, TonQuelle};

const STANDARD_CONFIG_PFAD: &str = "voicelink.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let pfad =
        std::env::var("VOICELINK_CONFIG").unwrap_or_else(|_| STANDARD_CONFIG_PFAD.to_string());
    let config = ClientConfig::laden(&pfad)?;

    let level = &config.logging.level;
    if !logging::log_level_gueltig(level) && !level.contains('=') {
        eprintln!("Unbekanntes Log-Level '{}', verwende info", config.logging.level);
    }
    if !logging::log_format_gueltig(&config.logging.format) {
        eprintln!("Unbekanntes Log-Format '{}', verwende text", config.logging.format);
    }
    logging::logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %pfad,
        "Voicelink-Client startet"
    );

    let session = VoiceSession::neu(
        config.voice.clone(),
        config.zugang(),
        Arc::new(IdResolver),
        Some(Arc::new(OpusCodecProvider)),
    )
    .context("Voice-Session konnte nicht erstellt werden")?;

    session.listener_setzen(Arc::new(LogListener));
    session.attach_sink(Arc::new(PegelSenke::neu()))?;
    session.attach_source(Arc::new(TonQuelle::neu(&config.demo)))?;
    session.connect(config.kanal())?;

    let mut status = session.status_beobachten();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl-C empfangen, Session wird geschlossen");
            session.close(CloseReason::Normal).await;
        }
        ergebnis = status.wait_for(|s| s.ist_geschlossen()) => {
            match ergebnis {
                Ok(s) => tracing::warn!(status = %*s, "Session beendet"),
                Err(_) => tracing::warn!("Statuskanal geschlossen"),
            }
        }
    }

    tracing::info!(statistik = %session.statistik().zusammenfassung(), "Voicelink-Client beendet");
    Ok(())
}

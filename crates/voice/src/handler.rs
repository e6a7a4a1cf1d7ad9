//! Schnittstellen zur Host-Anwendung
//!
//! Der Host liefert Audio ueber eine [`AudioSource`], empfaengt Audio ueber
//! eine [`AudioSink`], beobachtet die Verbindung ueber einen
//! [`ConnectionListener`] und loest Teilnehmer ueber einen [`PeerResolver`]
//! auf. Alle Methoden werden aus Hintergrund-Tasks heraus aufgerufen und
//! muessen schnell zurueckkehren.

use voicelink_core::{ConnectionStatus, Peer, PeerId};

/// Audioquelle fuer die Sendepipeline
pub trait AudioSource: Send + Sync {
    /// Liegt ein Frame fuer den naechsten 20-ms-Takt bereit?
    fn has_audio_ready(&self) -> bool;

    /// Naechster Frame: PCM (16 Bit, big-endian, 1920 oder 3840 Bytes) oder Opus
    fn next_frame(&self) -> Option<Vec<u8>>;

    /// Liefert die Quelle bereits kodierte Opus-Frames?
    fn is_pre_encoded(&self) -> bool {
        false
    }
}

/// Audiosenke fuer die Empfangspipeline
pub trait AudioSink: Send + Sync {
    fn wants_per_peer(&self) -> bool {
        false
    }

    fn wants_combined(&self) -> bool {
        false
    }

    /// Dekodierter Stereo-Frame eines einzelnen Teilnehmers
    fn on_peer_audio(&self, _peer: PeerId, _pcm: &[i16]) {}

    /// Gemischter Frame aller Teilnehmer des Takts (leer = Stille)
    fn on_combined_audio(&self, _peers: &[PeerId], _pcm: &[i16]) {}
}

/// Beobachter fuer Statuswechsel, Ping und Sprechereignisse
pub trait ConnectionListener: Send + Sync {
    fn on_status_change(&self, _alt: ConnectionStatus, _neu: ConnectionStatus) {}

    fn on_ping(&self, _rtt_ms: u64) {}

    fn on_peer_speaking(&self, _peer: &Peer, _spricht: bool) {}
}

/// Loest Teilnehmer-IDs in Teilnehmer auf
pub trait PeerResolver: Send + Sync {
    fn resolve_peer(&self, id: PeerId) -> Option<Peer>;
}

/// Listener ohne Reaktion
#[derive(Debug, Default, Clone, Copy)]
pub struct KeinListener;

impl ConnectionListener for KeinListener {}

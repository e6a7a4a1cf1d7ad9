//! Demo-Implementierungen der Host-Schnittstellen
//!
//! - [`TonQuelle`] sendet abwechselnd einen Sinuston und Pausen
//! - [`PegelSenke`] protokolliert Spitzenpegel empfangener Frames
//! - [`LogListener`] protokolliert Status, Ping und Sprechereignisse
//! - [`IdResolver`] benennt Teilnehmer nach ihrer ID

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use voicelink_audio::pcm_zu_bytes_be;
use voicelink_voice::{
    AudioSink, AudioSource, ConnectionListener, ConnectionStatus, Peer, PeerId, PeerResolver,
};

use crate::config::DemoEinstellungen;

const ABTASTRATE: f32 = 48_000.0;
const SAMPLES_PRO_KANAL: usize = 960;

// ---------------------------------------------------------------------------
// Tonquelle
// ---------------------------------------------------------------------------

/// Sinuston im Wechsel von Sprech- und Pausenphasen
pub struct TonQuelle {
    frequenz: f32,
    amplitude: f32,
    phase: Duration,
    start: Instant,
    /// Laufender Phasenwinkel des Oszillators
    winkel: Mutex<f32>,
}

impl TonQuelle {
    pub fn neu(einstellungen: &DemoEinstellungen) -> Self {
        Self {
            frequenz: einstellungen.ton_frequenz_hz,
            amplitude: einstellungen.lautstaerke.clamp(0.0, 1.0) * i16::MAX as f32,
            phase: Duration::from_millis(einstellungen.phase_ms.max(20)),
            start: Instant::now(),
            winkel: Mutex::new(0.0),
        }
    }

    fn in_sprechphase(&self) -> bool {
        let vergangen = self.start.elapsed().as_millis();
        (vergangen / self.phase.as_millis()) % 2 == 0
    }
}

impl AudioSource for TonQuelle {
    fn has_audio_ready(&self) -> bool {
        self.in_sprechphase()
    }

    fn next_frame(&self) -> Option<Vec<u8>> {
        if !self.in_sprechphase() {
            return None;
        }
        let schritt = std::f32::consts::TAU * self.frequenz / ABTASTRATE;
        let mut winkel = self.winkel.lock();
        let mut samples = Vec::with_capacity(SAMPLES_PRO_KANAL * 2);
        for _ in 0..SAMPLES_PRO_KANAL {
            let wert = (winkel.sin() * self.amplitude) as i16;
            samples.push(wert);
            samples.push(wert);
            *winkel = (*winkel + schritt) % std::f32::consts::TAU;
        }
        Some(pcm_zu_bytes_be(&samples))
    }
}

// ---------------------------------------------------------------------------
// Pegelsenke
// ---------------------------------------------------------------------------

/// Protokolliert hoechstens einmal pro Sekunde den Spitzenpegel
pub struct PegelSenke {
    letzte_meldung: Mutex<Option<Instant>>,
}

impl PegelSenke {
    pub fn neu() -> Self {
        Self {
            letzte_meldung: Mutex::new(None),
        }
    }

    fn melden_faellig(&self) -> bool {
        let mut letzte = self.letzte_meldung.lock();
        match *letzte {
            Some(t) if t.elapsed() < Duration::from_secs(1) => false,
            _ => {
                *letzte = Some(Instant::now());
                true
            }
        }
    }
}

impl Default for PegelSenke {
    fn default() -> Self {
        Self::neu()
    }
}

fn spitzenpegel(pcm: &[i16]) -> u16 {
    pcm.iter().map(|s| s.unsigned_abs()).max().unwrap_or(0)
}

impl AudioSink for PegelSenke {
    fn wants_per_peer(&self) -> bool {
        true
    }

    fn wants_combined(&self) -> bool {
        true
    }

    fn on_peer_audio(&self, peer: PeerId, pcm: &[i16]) {
        tracing::trace!(peer = %peer, pegel = spitzenpegel(pcm), "Frame empfangen");
    }

    fn on_combined_audio(&self, peers: &[PeerId], pcm: &[i16]) {
        if peers.is_empty() || !self.melden_faellig() {
            return;
        }
        tracing::info!(
            sprecher = peers.len(),
            pegel = spitzenpegel(pcm),
            "Gemischtes Audio"
        );
    }
}

// ---------------------------------------------------------------------------
// Listener und Resolver
// ---------------------------------------------------------------------------

pub struct LogListener;

impl ConnectionListener for LogListener {
    fn on_status_change(&self, alt: ConnectionStatus, neu: ConnectionStatus) {
        tracing::info!(alt = %alt, neu = %neu, "Verbindungsstatus");
    }

    fn on_ping(&self, rtt_ms: u64) {
        tracing::debug!(rtt_ms, "Heartbeat");
    }

    fn on_peer_speaking(&self, peer: &Peer, spricht: bool) {
        tracing::info!(peer = %peer.name, spricht, "Sprechzustand");
    }
}

/// Vergibt Namen der Form `teilnehmer-<id>`
pub struct IdResolver;

impl PeerResolver for IdResolver {
    fn resolve_peer(&self, id: PeerId) -> Option<Peer> {
        Some(Peer {
            id,
            name: format!("teilnehmer-{id}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicelink_audio::pcm_aus_bytes_be;

    #[test]
    fn ton_frame_hat_stereo_groesse() {
        let quelle = TonQuelle::neu(&DemoEinstellungen::default());
        assert!(quelle.has_audio_ready());
        let frame = quelle.next_frame().unwrap();
        assert_eq!(frame.len(), 3840);

        let samples = pcm_aus_bytes_be(&frame);
        // Beide Kanaele identisch
        assert!(samples.chunks(2).all(|p| p[0] == p[1]));
        assert!(spitzenpegel(&samples) > 0);
    }

    #[test]
    fn spitzenpegel_ueber_betrag() {
        assert_eq!(spitzenpegel(&[]), 0);
        assert_eq!(spitzenpegel(&[3, -7, 5]), 7);
        assert_eq!(spitzenpegel(&[i16::MIN]), 32768);
    }

    #[test]
    fn resolver_benennt_nach_id() {
        let peer = IdResolver.resolve_peer(PeerId(42)).unwrap();
        assert_eq!(peer.name, "teilnehmer-42");
    }
}

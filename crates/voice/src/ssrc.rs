//! SSRC-Registry
//!
//! Ordnet jeder SSRC einer Verbindung genau einen Teilnehmer zu und haelt
//! pro SSRC den Dekodier-Zustand (letzte Sequenznummer und Decoder),
//! solange die Empfangspipeline aktiv ist.
//!
//! ```text
//! Speaking (Op 5) ──bind──►  ssrc ──► PeerId
//!                              │
//! RTP-Paket ──────────────────►└──► PeerDecodeState { letzte_sequenz, decoder }
//! ClientDisconnect (Op 13) ──unbind──► Bindung + Decoder entfernt
//! ```
//!
//! Die Registry ist `Clone` und teilt ihren Zustand ueber `Arc`.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use voicelink_audio::{AudioResult, CodecProvider, FrameDecoder};
use voicelink_core::PeerId;
use voicelink_protocol::rtp::sequenz_ist_neuer;

// ---------------------------------------------------------------------------
// PeerDecodeState
// ---------------------------------------------------------------------------

/// Empfangszustand einer SSRC
pub struct PeerDecodeState {
    pub ssrc: u32,
    letzte_sequenz: Option<u16>,
    decoder: Box<dyn FrameDecoder>,
}

impl PeerDecodeState {
    fn neu(ssrc: u32, decoder: Box<dyn FrameDecoder>) -> Self {
        Self {
            ssrc,
            letzte_sequenz: None,
            decoder,
        }
    }

    /// Prueft die Reihenfolge und merkt sich eine angenommene Sequenznummer
    ///
    /// Das erste Paket wird immer angenommen.
    pub fn sequenz_annehmen(&mut self, sequenz: u16) -> bool {
        match self.letzte_sequenz {
            Some(letzte) if !sequenz_ist_neuer(letzte, sequenz) => false,
            _ => {
                self.letzte_sequenz = Some(sequenz);
                true
            }
        }
    }

    pub fn letzte_sequenz(&self) -> Option<u16> {
        self.letzte_sequenz
    }

    pub fn dekodieren(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>> {
        self.decoder.decode(opus)
    }
}

impl std::fmt::Debug for PeerDecodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerDecodeState")
            .field("ssrc", &self.ssrc)
            .field("letzte_sequenz", &self.letzte_sequenz)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// SsrcRegistry
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RegistryInner {
    peers: DashMap<u32, PeerId>,
    ssrcs: DashMap<PeerId, u32>,
    dekoder: Mutex<HashMap<u32, PeerDecodeState>>,
    /// Gesetzt solange die Empfangspipeline laeuft
    codec: RwLock<Option<Arc<dyn CodecProvider>>>,
}

/// Zuordnung SSRC -> Teilnehmer mit Dekodier-Zustand
#[derive(Clone, Default)]
pub struct SsrcRegistry {
    inner: Arc<RegistryInner>,
}

impl SsrcRegistry {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Bindet eine SSRC an einen Teilnehmer
    ///
    /// Ist die SSRC bereits an einen anderen Teilnehmer gebunden, bleibt die
    /// alte Bindung bestehen. Wechselt ein Teilnehmer die SSRC, wird die
    /// alte SSRC freigegeben. Gibt `true` zurueck wenn die Bindung gilt.
    pub fn bind(&self, ssrc: u32, peer: PeerId) -> bool {
        if let Some(bestehend) = self.inner.peers.get(&ssrc) {
            if *bestehend != peer {
                tracing::warn!(
                    ssrc,
                    bestehend = %*bestehend,
                    neu = %peer,
                    "SSRC bereits vergeben, Bindung ignoriert"
                );
                return false;
            }
            return true;
        }

        if let Some(alte_ssrc) = self.inner.ssrcs.insert(peer, ssrc) {
            if alte_ssrc != ssrc {
                self.inner.peers.remove(&alte_ssrc);
                self.inner.dekoder.lock().remove(&alte_ssrc);
                tracing::debug!(peer = %peer, alt = alte_ssrc, neu = ssrc, "SSRC gewechselt");
            }
        }
        self.inner.peers.insert(ssrc, peer);

        if self.empfang_aktiv() {
            self.dekoder_anlegen(ssrc);
        }
        tracing::debug!(ssrc, peer = %peer, "SSRC gebunden");
        true
    }

    /// Entfernt die Bindung eines Teilnehmers samt Decoder (unbekannt = no-op)
    pub fn unbind(&self, peer: PeerId) {
        if let Some((_, ssrc)) = self.inner.ssrcs.remove(&peer) {
            self.inner.peers.remove(&ssrc);
            self.inner.dekoder.lock().remove(&ssrc);
            tracing::debug!(ssrc, peer = %peer, "SSRC-Bindung entfernt");
        }
    }

    pub fn peer_fuer(&self, ssrc: u32) -> Option<PeerId> {
        self.inner.peers.get(&ssrc).map(|p| *p)
    }

    pub fn ssrc_fuer(&self, peer: PeerId) -> Option<u32> {
        self.inner.ssrcs.get(&peer).map(|s| *s)
    }

    pub fn anzahl(&self) -> usize {
        self.inner.peers.len()
    }

    pub fn empfang_aktiv(&self) -> bool {
        self.inner.codec.read().is_some()
    }

    /// Aktiviert die Dekodier-Zustaende fuer die Empfangspipeline
    pub fn empfang_aktivieren(&self, codec: Arc<dyn CodecProvider>) {
        *self.inner.codec.write() = Some(codec);
        let ssrcs: Vec<u32> = self.inner.peers.iter().map(|e| *e.key()).collect();
        for ssrc in ssrcs {
            self.dekoder_anlegen(ssrc);
        }
    }

    /// Gibt alle Decoder frei, die Bindungen bleiben bestehen
    pub fn empfang_deaktivieren(&self) {
        *self.inner.codec.write() = None;
        let freigegeben = {
            let mut dekoder = self.inner.dekoder.lock();
            let anzahl = dekoder.len();
            dekoder.clear();
            anzahl
        };
        if freigegeben > 0 {
            tracing::debug!(anzahl = freigegeben, "Decoder freigegeben");
        }
    }

    /// Fuehrt `f` mit dem Dekodier-Zustand einer SSRC aus
    ///
    /// Der Zustand wird beim ersten Paket angelegt. `None` wenn der Empfang
    /// inaktiv ist oder kein Decoder erzeugt werden konnte.
    pub fn mit_dekoder<R>(
        &self,
        ssrc: u32,
        f: impl FnOnce(&mut PeerDecodeState) -> R,
    ) -> Option<R> {
        if !self.inner.dekoder.lock().contains_key(&ssrc) {
            self.dekoder_anlegen(ssrc);
        }
        let mut dekoder = self.inner.dekoder.lock();
        dekoder.get_mut(&ssrc).map(f)
    }

    /// Entfernt alle Bindungen und Decoder einer Verbindung
    pub fn leeren(&self) {
        self.inner.peers.clear();
        self.inner.ssrcs.clear();
        self.inner.dekoder.lock().clear();
    }

    fn dekoder_anlegen(&self, ssrc: u32) {
        let codec = match self.inner.codec.read().clone() {
            Some(codec) => codec,
            None => return,
        };
        let mut dekoder = self.inner.dekoder.lock();
        if dekoder.contains_key(&ssrc) {
            return;
        }
        match codec.decoder() {
            Ok(decoder) => {
                dekoder.insert(ssrc, PeerDecodeState::neu(ssrc, decoder));
            }
            Err(e) => tracing::warn!(ssrc, fehler = %e, "Decoder konnte nicht erstellt werden"),
        }
    }
}

impl std::fmt::Debug for SsrcRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SsrcRegistry")
            .field("bindungen", &self.inner.peers.len())
            .field("empfang_aktiv", &self.empfang_aktiv())
            .finish()
    }
}

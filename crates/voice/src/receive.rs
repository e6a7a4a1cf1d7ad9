//! Empfangspipeline
//!
//! ```text
//! UDP recv ──► RTP v2? ──► oeffnen() ──► SSRC -> Peer ──► Sequenz neuer?
//!                                                            │
//!                                         Stille-Marker? ◄───┘
//!                                              │ nein
//!                                          dekodieren
//!                                     ┌────────┴─────────┐
//!                               on_peer_audio()    JitterPuffer (Mischtask)
//! ```
//!
//! Fehler einzelner Pakete werden lokal behandelt und verwerfen nur das
//! Paket. Der Decoder des Teilnehmers bleibt erhalten.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use voicelink_core::PeerId;
use voicelink_crypto::CryptoCodec;
use voicelink_protocol::codec::FRAME_MS;
use voicelink_protocol::rtp::{ist_stille, RTP_VERSION_FLAGS};
use voicelink_protocol::RtpHeader;

use crate::handler::AudioSink;
use crate::jitter::JitterPuffer;
use crate::ssrc::SsrcRegistry;
use crate::stats::VoiceStatistik;
use crate::udp::{UdpTransport, UDP_PUFFER_GROESSE};

/// RTCP-Pakettypen teilen sich den Port mit RTP
const RTCP_TYPEN: std::ops::RangeInclusive<u8> = 200..=204;

/// Ergebnis der Verarbeitung eines Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verarbeitung {
    /// Dekodiert und ausgeliefert
    Geliefert(PeerId),
    /// Stille-Marker, ohne Dekodierung verworfen
    Stille,
    /// Kein Audio-Paket (Discovery, Keep-Alive, RTCP)
    KeinAudio,
    Entschluesselung,
    UnbekannteSsrc(u32),
    Reihenfolge,
    /// Empfang inaktiv oder Decoder nicht verfuegbar
    KeinDecoder,
    Dekodierung,
}

/// Verarbeitet empfangene Pakete einer Verbindung
pub struct ReceivePipeline {
    krypto: Arc<CryptoCodec>,
    registry: SsrcRegistry,
    senke: Arc<dyn AudioSink>,
    jitter: Option<Arc<JitterPuffer>>,
    statistik: Arc<VoiceStatistik>,
    krypto_fehler_gemeldet: bool,
    codec_fehler_gemeldet: bool,
}

impl ReceivePipeline {
    pub fn neu(
        krypto: Arc<CryptoCodec>,
        registry: SsrcRegistry,
        senke: Arc<dyn AudioSink>,
        jitter: Option<Arc<JitterPuffer>>,
        statistik: Arc<VoiceStatistik>,
    ) -> Self {
        Self {
            krypto,
            registry,
            senke,
            jitter,
            statistik,
            krypto_fehler_gemeldet: false,
            codec_fehler_gemeldet: false,
        }
    }

    pub fn paket_verarbeiten(&mut self, roh: &[u8], jetzt: Instant) -> Verarbeitung {
        if roh.len() < RtpHeader::SIZE
            || roh[0] & 0xC0 != RTP_VERSION_FLAGS
            || RTCP_TYPEN.contains(&roh[1])
        {
            return Verarbeitung::KeinAudio;
        }

        let (header, opus) = match self.krypto.oeffnen(roh) {
            Ok(ergebnis) => ergebnis,
            Err(e) => {
                self.statistik.entschluesselung_fehlgeschlagen();
                if !self.krypto_fehler_gemeldet {
                    self.krypto_fehler_gemeldet = true;
                    tracing::warn!(fehler = %e, "Paket konnte nicht entschluesselt werden");
                }
                return Verarbeitung::Entschluesselung;
            }
        };
        let stille = ist_stille(&opus);

        let Some(peer) = self.registry.peer_fuer(header.ssrc) else {
            if !stille {
                self.statistik.unbekannt_verworfen();
                tracing::debug!(ssrc = header.ssrc, "Paket von unbekannter SSRC verworfen");
            }
            return Verarbeitung::UnbekannteSsrc(header.ssrc);
        };

        let ergebnis = self.registry.mit_dekoder(header.ssrc, |zustand| {
            if !zustand.sequenz_annehmen(header.sequence) {
                return Err(Verarbeitung::Reihenfolge);
            }
            if stille {
                return Err(Verarbeitung::Stille);
            }
            zustand.dekodieren(&opus).map_err(|e| {
                tracing::trace!(ssrc = header.ssrc, fehler = %e, "Dekodierung fehlgeschlagen");
                Verarbeitung::Dekodierung
            })
        });

        let pcm = match ergebnis {
            Some(Ok(pcm)) => pcm,
            Some(Err(Verarbeitung::Reihenfolge)) => {
                self.statistik.reihenfolge_verworfen();
                tracing::trace!(
                    ssrc = header.ssrc,
                    sequenz = header.sequence,
                    "Paket ausserhalb der Reihenfolge verworfen"
                );
                return Verarbeitung::Reihenfolge;
            }
            Some(Err(Verarbeitung::Dekodierung)) => {
                self.statistik.dekodierung_fehlgeschlagen();
                if !self.codec_fehler_gemeldet {
                    self.codec_fehler_gemeldet = true;
                    tracing::warn!(peer = %peer, "Opus-Frame konnte nicht dekodiert werden");
                }
                return Verarbeitung::Dekodierung;
            }
            Some(Err(andere)) => return andere,
            None => return Verarbeitung::KeinDecoder,
        };

        self.statistik.empfangen();
        if self.senke.wants_per_peer() {
            self.senke.on_peer_audio(peer, &pcm);
        }
        if let Some(jitter) = &self.jitter {
            jitter.einreihen(peer, pcm, jetzt);
        }
        Verarbeitung::Geliefert(peer)
    }
}

/// Empfangsschleife
///
/// Der Timeout erlaubt es, `abbruch` zwischen zwei Lesevorgaengen zu pruefen.
pub async fn empfangs_loop(
    mut pipeline: ReceivePipeline,
    transport: Arc<UdpTransport>,
    abbruch: Arc<AtomicBool>,
    timeout: Duration,
) {
    let mut puffer = vec![0u8; UDP_PUFFER_GROESSE];

    while !abbruch.load(Ordering::Acquire) {
        match transport.empfangen(&mut puffer, timeout).await {
            Ok(Some(laenge)) => {
                pipeline.paket_verarbeiten(&puffer[..laenge], Instant::now());
            }
            Ok(None) => {}
            Err(_) if abbruch.load(Ordering::Acquire) => break,
            Err(e) => {
                tracing::warn!(fehler = %e, "UDP-Empfang fehlgeschlagen");
                tokio::time::sleep(Duration::from_millis(FRAME_MS)).await;
            }
        }
    }
    tracing::debug!("Empfangsschleife beendet");
}

//! Sendepipeline
//!
//! Wird im 20-ms-Takt nach dem naechsten Paket gefragt (Pull-Modell) und
//! durchlaeuft pro Takt genau einen der folgenden Zweige:
//!
//! ```text
//! nicht primed        -> Stille-Frame (Vorlauf, einmal pro Verbindung)
//! Quelle hat Audio    -> kodieren, versiegeln, Speaking an (einmalig)
//! Quelle verstummt    -> Nachlauf-Stille, danach Speaking aus
//! sonst               -> kein Paket, Zeitstempel bleibt stehen
//! ```
//!
//! Sequenz (mod 2^16) und Zeitstempel (+960, mod 2^32) laufen nur bei
//! tatsaechlich erzeugten Paketen weiter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use voicelink_audio::{stereo_frame_aus_quelle, FrameEncoder};
use voicelink_crypto::{CryptoCodec, NonceZaehler};
use voicelink_protocol::codec::{FRAME_MS, SAMPLES_PRO_KANAL};
use voicelink_protocol::rtp::STILLE_FRAME;
use voicelink_protocol::RtpHeader;

use crate::handler::AudioSource;
use crate::signaling::SignalBefehl;
use crate::stats::VoiceStatistik;
use crate::udp::UdpTransport;

/// Zustand der Sendepipeline einer Verbindung
pub struct SendPipeline {
    quelle: Arc<dyn AudioSource>,
    encoder: Option<Box<dyn FrameEncoder>>,
    krypto: Arc<CryptoCodec>,
    ssrc: u32,

    sequenz: u16,
    zeitstempel: u32,
    nonce: NonceZaehler,

    vorlauf_frames: u32,
    vorlauf_gesendet: u32,
    /// Geteilt mit dem Orchestrator, gilt fuer die ganze Verbindung
    primed: Arc<AtomicBool>,

    nachlauf_frames: u32,
    nachlauf_rest: u32,
    spricht: bool,

    befehle: mpsc::UnboundedSender<SignalBefehl>,
    statistik: Arc<VoiceStatistik>,
    fehler_gemeldet: bool,
}

impl SendPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn neu(
        quelle: Arc<dyn AudioSource>,
        encoder: Option<Box<dyn FrameEncoder>>,
        krypto: Arc<CryptoCodec>,
        ssrc: u32,
        vorlauf_frames: u32,
        nachlauf_frames: u32,
        primed: Arc<AtomicBool>,
        befehle: mpsc::UnboundedSender<SignalBefehl>,
        statistik: Arc<VoiceStatistik>,
    ) -> Self {
        Self {
            quelle,
            encoder,
            krypto,
            ssrc,
            sequenz: 0,
            zeitstempel: 0,
            nonce: NonceZaehler::default(),
            vorlauf_frames,
            vorlauf_gesendet: 0,
            primed,
            nachlauf_frames,
            nachlauf_rest: 0,
            spricht: false,
            befehle,
            statistik,
            fehler_gemeldet: false,
        }
    }

    pub fn sequenz(&self) -> u16 {
        self.sequenz
    }

    pub fn zeitstempel(&self) -> u32 {
        self.zeitstempel
    }

    pub fn spricht(&self) -> bool {
        self.spricht
    }

    /// Liefert das Paket fuer den aktuellen Takt
    pub fn naechstes_paket(&mut self) -> Option<Vec<u8>> {
        if !self.primed.load(Ordering::Acquire) {
            if self.vorlauf_gesendet < self.vorlauf_frames {
                self.vorlauf_gesendet += 1;
                if self.vorlauf_gesendet >= self.vorlauf_frames {
                    self.primed.store(true, Ordering::Release);
                    tracing::debug!(frames = self.vorlauf_frames, "Vorlauf abgeschlossen");
                }
                return self.stille_paket();
            }
            self.primed.store(true, Ordering::Release);
        }

        if self.quelle.has_audio_ready() {
            if let Some(frame) = self.quelle.next_frame() {
                let opus = self.kodieren(frame)?;
                let paket = self.paket_bauen(&opus, false)?;
                if !self.spricht {
                    self.spricht = true;
                    let _ = self.befehle.send(SignalBefehl::Sprechen(true));
                }
                self.nachlauf_rest = self.nachlauf_frames;
                return Some(paket);
            }
        }

        if self.spricht {
            if self.nachlauf_rest > 0 {
                self.nachlauf_rest -= 1;
                let paket = self.stille_paket();
                if self.nachlauf_rest == 0 {
                    self.sprechen_beenden();
                }
                return paket;
            }
            self.sprechen_beenden();
        }
        None
    }

    /// Meldet Speaking aus, falls die Pipeline noch als sprechend gilt
    pub fn sprechen_beenden(&mut self) {
        if self.spricht {
            self.spricht = false;
            let _ = self.befehle.send(SignalBefehl::Sprechen(false));
        }
    }

    fn stille_paket(&mut self) -> Option<Vec<u8>> {
        self.paket_bauen(&STILLE_FRAME, true)
    }

    fn kodieren(&mut self, frame: Vec<u8>) -> Option<Vec<u8>> {
        if self.quelle.is_pre_encoded() {
            return Some(frame);
        }
        let ergebnis = match self.encoder.as_mut() {
            Some(encoder) => stereo_frame_aus_quelle(&frame).and_then(|pcm| encoder.encode(&pcm)),
            None => Err(voicelink_audio::AudioError::Konfiguration(
                "kein Encoder fuer PCM-Quelle".into(),
            )),
        };
        match ergebnis {
            Ok(opus) => Some(opus),
            Err(e) => {
                self.statistik.kodierung_fehlgeschlagen();
                if !self.fehler_gemeldet {
                    self.fehler_gemeldet = true;
                    tracing::warn!(fehler = %e, "Frame konnte nicht kodiert werden, wird verworfen");
                }
                None
            }
        }
    }

    fn paket_bauen(&mut self, opus: &[u8], stille: bool) -> Option<Vec<u8>> {
        let header = RtpHeader::neu(self.sequenz, self.zeitstempel, self.ssrc);
        match self.krypto.versiegeln(&header, opus, &mut self.nonce) {
            Ok(paket) => {
                self.sequenz = self.sequenz.wrapping_add(1);
                self.zeitstempel = self.zeitstempel.wrapping_add(SAMPLES_PRO_KANAL as u32);
                self.statistik.gesendet(stille);
                Some(paket)
            }
            Err(e) => {
                if !self.fehler_gemeldet {
                    self.fehler_gemeldet = true;
                    tracing::warn!(fehler = %e, "Paket konnte nicht verschluesselt werden");
                }
                None
            }
        }
    }
}

/// 20-ms-Sendeschleife
///
/// Endet wenn `abbruch` gesetzt wird. Der Encoder wird mit der Pipeline
/// freigegeben.
pub async fn sende_loop(
    mut pipeline: SendPipeline,
    transport: Arc<UdpTransport>,
    abbruch: Arc<AtomicBool>,
) {
    let mut takt = tokio::time::interval(Duration::from_millis(FRAME_MS));
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sendefehler_gemeldet = false;

    loop {
        takt.tick().await;
        if abbruch.load(Ordering::Acquire) {
            break;
        }
        let Some(paket) = pipeline.naechstes_paket() else {
            continue;
        };
        if let Err(e) = transport.senden(&paket).await {
            if !sendefehler_gemeldet {
                sendefehler_gemeldet = true;
                tracing::warn!(fehler = %e, "UDP-Senden fehlgeschlagen");
            }
        }
    }

    pipeline.sprechen_beenden();
    tracing::debug!(sequenz = pipeline.sequenz(), "Sendepipeline beendet");
}

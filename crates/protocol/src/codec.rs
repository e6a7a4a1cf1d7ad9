//! Audio-Profil fuer die Uebertragung
//!
//! Das Relay erwartet Opus mit 48 kHz, Stereo und 20 ms pro Frame. PCM
//! von Quellen und an Senken ist 16-Bit signed, big-endian.

use serde::{Deserialize, Serialize};

/// Abtastrate in Hz
pub const ABTASTRATE: u32 = 48_000;

/// Anzahl Kanaele
pub const KANAELE: usize = 2;

/// Frame-Dauer in Millisekunden
pub const FRAME_MS: u64 = 20;

/// Samples pro Kanal in einem Frame (= Zeitstempel-Schritt)
pub const SAMPLES_PRO_KANAL: usize = 960;

/// Samples eines Stereo-Frames (interleaved)
pub const SAMPLES_PRO_FRAME: usize = SAMPLES_PRO_KANAL * KANAELE;

/// Bytes eines Stereo-PCM-Frames (16 Bit)
pub const PCM_FRAME_BYTES: usize = SAMPLES_PRO_FRAME * 2;

/// Bytes eines Mono-PCM-Frames (16 Bit)
pub const PCM_MONO_FRAME_BYTES: usize = SAMPLES_PRO_KANAL * 2;

/// Obergrenze fuer ein kodiertes Opus-Paket
pub const MAX_OPUS_PAKET: usize = 4000;

/// Beschreibung eines PCM-Audioformats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProfil {
    pub abtastrate: u32,
    pub kanaele: usize,
    pub frame_ms: u64,
}

impl AudioProfil {
    /// Das feste Uebertragungsprofil
    pub const UEBERTRAGUNG: AudioProfil = AudioProfil {
        abtastrate: ABTASTRATE,
        kanaele: KANAELE,
        frame_ms: FRAME_MS,
    };

    /// Samples pro Kanal und Frame
    pub fn samples_pro_kanal(&self) -> usize {
        (self.abtastrate as u64 * self.frame_ms / 1000) as usize
    }

    /// Interleaved Samples pro Frame
    pub fn samples_pro_frame(&self) -> usize {
        self.samples_pro_kanal() * self.kanaele
    }

    /// Bytes pro Frame bei 16-Bit PCM
    pub fn bytes_pro_frame(&self) -> usize {
        self.samples_pro_frame() * 2
    }
}

impl Default for AudioProfil {
    fn default() -> Self {
        Self::UEBERTRAGUNG
    }
}

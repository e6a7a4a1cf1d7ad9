//! Opus Encoder/Decoder Wrapper
//!
//! Kapselt audiopus hinter den Traits [`FrameEncoder`] und [`FrameDecoder`].
//! Die Session bekommt einen [`CodecProvider`] und fordert darueber einen
//! Encoder pro Sendepipeline und einen Decoder pro entferntem Sprecher an.
//! Beide werden beim Drop freigegeben.
//!
//! Format: 48 kHz, Stereo, 20 ms Frames, 16-Bit PCM interleaved.

use audiopus::{
    coder::{Decoder, Encoder},
    Application, Channels, SampleRate,
};
use tracing::debug;
use voicelink_protocol::codec::{MAX_OPUS_PAKET, SAMPLES_PRO_FRAME, SAMPLES_PRO_KANAL};

use crate::error::{AudioError, AudioResult};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Kodiert einen Stereo-PCM-Frame zu Opus
pub trait FrameEncoder: Send {
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>>;
}

/// Dekodiert Opus zu einem Stereo-PCM-Frame
pub trait FrameDecoder: Send {
    fn decode(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>>;
}

/// Faehigkeit, native Codec-Instanzen zu erzeugen
pub trait CodecProvider: Send + Sync {
    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>>;
    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>>;
}

// ---------------------------------------------------------------------------
// audiopus-Implementierung
// ---------------------------------------------------------------------------

/// Opus-Encoder: kodiert i16-PCM zu Opus-Bytes
pub struct OpusEncoder {
    encoder: Encoder,
}

impl OpusEncoder {
    /// Erstellt einen Encoder fuer 48 kHz Stereo (Anwendungsmodus Audio)
    pub fn new() -> AudioResult<Self> {
        let encoder = Encoder::new(SampleRate::Hz48000, Channels::Stereo, Application::Audio)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        debug!(frame_size = SAMPLES_PRO_KANAL, "OpusEncoder erstellt");
        Ok(Self { encoder })
    }
}

impl FrameEncoder for OpusEncoder {
    /// Die Eingabe muss exakt einen Stereo-Frame (1920 Samples) enthalten
    fn encode(&mut self, pcm: &[i16]) -> AudioResult<Vec<u8>> {
        if pcm.len() != SAMPLES_PRO_FRAME {
            return Err(AudioError::UngueltigeFrameGroesse {
                erlaubt: vec![SAMPLES_PRO_FRAME],
                erhalten: pcm.len(),
            });
        }

        let mut output = vec![0u8; MAX_OPUS_PAKET];
        let written = self
            .encoder
            .encode(pcm, &mut output)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(written);
        Ok(output)
    }
}

/// Opus-Decoder: dekodiert Opus-Bytes zu i16-PCM
pub struct OpusDecoder {
    decoder: Decoder,
}

impl OpusDecoder {
    /// Erstellt einen Decoder fuer 48 kHz Stereo
    pub fn new() -> AudioResult<Self> {
        let decoder = Decoder::new(SampleRate::Hz48000, Channels::Stereo)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;
        Ok(Self { decoder })
    }
}

impl FrameDecoder for OpusDecoder {
    fn decode(&mut self, opus: &[u8]) -> AudioResult<Vec<i16>> {
        let mut output = vec![0i16; SAMPLES_PRO_FRAME];
        let decoded = self
            .decoder
            .decode(Some(opus), &mut output, false)
            .map_err(|e| AudioError::CodecFehler(e.to_string()))?;

        output.truncate(decoded * 2);
        Ok(output)
    }
}

/// Stellt audiopus-Encoder und -Decoder bereit
#[derive(Debug, Clone, Copy, Default)]
pub struct OpusCodecProvider;

impl CodecProvider for OpusCodecProvider {
    fn encoder(&self) -> AudioResult<Box<dyn FrameEncoder>> {
        Ok(Box::new(OpusEncoder::new()?))
    }

    fn decoder(&self) -> AudioResult<Box<dyn FrameDecoder>> {
        Ok(Box::new(OpusDecoder::new()?))
    }
}

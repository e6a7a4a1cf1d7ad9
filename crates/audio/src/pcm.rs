//! PCM-Konvertierung
//!
//! Quellen und Senken tauschen 16-Bit signed PCM im big-endian-Format aus.
//! Mono-Frames werden durch Verdoppeln jedes Samples auf Stereo gebracht.

use voicelink_protocol::codec::{PCM_FRAME_BYTES, PCM_MONO_FRAME_BYTES};

use crate::error::{AudioError, AudioResult};

/// Liest big-endian 16-Bit-Samples; ein ungerades Restbyte wird ignoriert
pub fn pcm_aus_bytes_be(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|paar| i16::from_be_bytes([paar[0], paar[1]]))
        .collect()
}

/// Schreibt Samples als big-endian 16-Bit
pub fn pcm_zu_bytes_be(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_be_bytes()).collect()
}

/// Verdoppelt jedes Mono-Sample auf linken und rechten Kanal
pub fn mono_zu_stereo(mono: &[i16]) -> Vec<i16> {
    mono.iter().flat_map(|&s| [s, s]).collect()
}

/// Wandelt einen Quell-Frame in einen Stereo-Frame um
///
/// 3840 Bytes gelten als Stereo, 1920 Bytes als Mono. Andere Laengen
/// passen nicht in das 20-ms-Raster und werden abgelehnt.
pub fn stereo_frame_aus_quelle(bytes: &[u8]) -> AudioResult<Vec<i16>> {
    match bytes.len() {
        PCM_FRAME_BYTES => Ok(pcm_aus_bytes_be(bytes)),
        PCM_MONO_FRAME_BYTES => Ok(mono_zu_stereo(&pcm_aus_bytes_be(bytes))),
        andere => Err(AudioError::UngueltigeFrameGroesse {
            erlaubt: vec![PCM_FRAME_BYTES, PCM_MONO_FRAME_BYTES],
            erhalten: andere,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_lesen_und_schreiben() {
        let bytes = [0x12, 0x34, 0xFF, 0xFE];
        let samples = pcm_aus_bytes_be(&bytes);
        assert_eq!(samples, vec![0x1234, -2]);
        assert_eq!(pcm_zu_bytes_be(&samples), bytes.to_vec());
    }

    #[test]
    fn mono_wird_verdoppelt() {
        assert_eq!(mono_zu_stereo(&[1, -2, 3]), vec![1, 1, -2, -2, 3, 3]);
    }

    #[test]
    fn quell_frame_stereo_und_mono() {
        let stereo = stereo_frame_aus_quelle(&[0u8; PCM_FRAME_BYTES]).unwrap();
        assert_eq!(stereo.len(), 1920);

        let mut mono_bytes = vec![0u8; PCM_MONO_FRAME_BYTES];
        mono_bytes[0] = 0x01;
        let aus_mono = stereo_frame_aus_quelle(&mono_bytes).unwrap();
        assert_eq!(aus_mono.len(), 1920);
        assert_eq!(aus_mono[0], 0x0100);
        assert_eq!(aus_mono[1], 0x0100);
    }

    #[test]
    fn quell_frame_falsche_laenge() {
        assert!(matches!(
            stereo_frame_aus_quelle(&[0u8; 100]),
            Err(AudioError::UngueltigeFrameGroesse { erhalten: 100, .. })
        ));
    }
}

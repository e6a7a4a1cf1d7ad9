//! Mischen gleichzeitiger Sprecher
//!
//! Samples werden in i32 addiert und danach auf den i16-Bereich begrenzt.
//! Ein Ueberlauf fuehrt so zur Saettigung statt zum Vorzeichenwechsel.

use voicelink_protocol::codec::SAMPLES_PRO_FRAME;

/// Ein stiller Stereo-Frame (20 ms)
pub fn stille_frame() -> Vec<i16> {
    vec![0i16; SAMPLES_PRO_FRAME]
}

/// Summiert Frames samplegenau mit Saettigung
///
/// Die Ausgabe ist so lang wie der laengste Eingabe-Frame. Ohne Eingaben
/// entsteht ein stiller Frame.
pub fn mischen(frames: &[&[i16]]) -> Vec<i16> {
    let laenge = match frames.iter().map(|f| f.len()).max() {
        Some(l) => l,
        None => return stille_frame(),
    };

    let mut summe = vec![0i32; laenge];
    for frame in frames {
        for (ziel, &sample) in summe.iter_mut().zip(frame.iter()) {
            *ziel += sample as i32;
        }
    }

    summe
        .into_iter()
        .map(|s| s.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zwei_laute_sprecher_saettigen() {
        let a = vec![20000i16; 1920];
        let b = vec![20000i16; 1920];
        let mix = mischen(&[&a, &b]);
        assert!(mix.iter().all(|&s| s == 32767));
    }

    #[test]
    fn negative_saettigung() {
        let a = vec![-30000i16; 4];
        let b = vec![-30000i16; 4];
        assert_eq!(mischen(&[&a, &b]), vec![-32768; 4]);
    }

    #[test]
    fn ausgabe_laenge_ist_frame_laenge() {
        let a = vec![1i16; 1920];
        let b = vec![2i16; 1920];
        let mix = mischen(&[&a, &b]);
        assert_eq!(mix.len(), 1920);
        assert_eq!(mix[0], 3);
    }

    #[test]
    fn viele_sprecher_bleiben_im_bereich() {
        let frames: Vec<Vec<i16>> = (0..8)
            .map(|i| vec![if i % 2 == 0 { i16::MAX } else { i16::MIN }; 16])
            .collect();
        let refs: Vec<&[i16]> = frames.iter().map(|f| f.as_slice()).collect();
        let mix = mischen(&refs);
        assert_eq!(mix.len(), 16);
        // 4 * 32767 + 4 * -32768 = -4
        assert!(mix.iter().all(|&s| s == -4));
    }

    #[test]
    fn ohne_eingaben_stille() {
        let mix = mischen(&[]);
        assert_eq!(mix.len(), 1920);
        assert!(mix.iter().all(|&s| s == 0));
    }
}

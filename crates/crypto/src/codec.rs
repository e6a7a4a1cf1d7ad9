//! Versiegeln und Oeffnen von Voice-Paketen
//!
//! ## Paketformat
//! ```text
//! [rtp_header(12)] [mac(16)] [ciphertext] [nonce_suffix(0|4|24)]
//! ```
//!
//! ## Nonce (24 Bytes) je Modus
//! ```text
//! Suffix: 24 Zufallsbytes, komplett als Suffix angehaengt
//! Lite:   [zaehler BE(4)] [0 x 20], nur die 4 Zaehlerbytes als Suffix
//! Plain:  [rtp_header(12)] [0 x 12], kein Suffix
//! ```

use crypto_secretbox::aead::{AeadInPlace, KeyInit, Nonce, Tag};
use crypto_secretbox::XSalsa20Poly1305;
use rand::rngs::OsRng;
use rand::RngCore;
use voicelink_protocol::rtp::{self, RtpHeader};
use voicelink_protocol::EncryptionMode;

use crate::error::{CryptoError, CryptoResult};

/// Laenge des secretbox-Schluessels
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Minimale Laenge eines vom Relay gelieferten Schluessels
const MIN_SCHLUESSEL_LAENGE: usize = 16;

const NONCE_LAENGE: usize = 24;
const MAC_LAENGE: usize = 16;

// ---------------------------------------------------------------------------
// NonceZaehler
// ---------------------------------------------------------------------------

/// Nonce-Zaehler fuer den Lite-Modus
///
/// Wird pro Paket erhoeht und springt nach `u32::MAX` auf 0.
#[derive(Debug, Clone, Default)]
pub struct NonceZaehler {
    wert: u32,
}

impl NonceZaehler {
    /// Startet den Zaehler bei einem bestimmten Wert
    pub fn ab(wert: u32) -> Self {
        Self { wert }
    }

    /// Erhoeht den Zaehler und gibt den neuen Wert zurueck
    pub fn naechste(&mut self) -> u32 {
        self.wert = self.wert.wrapping_add(1);
        self.wert
    }

    pub fn aktuell(&self) -> u32 {
        self.wert
    }
}

// ---------------------------------------------------------------------------
// CryptoCodec
// ---------------------------------------------------------------------------

/// Verschluesselt und entschluesselt Pakete im ausgehandelten Modus
///
/// Der Codec selbst ist zustandslos. Der Nonce-Zaehler gehoert der
/// Sendepipeline und wird beim Versiegeln mitgegeben.
pub struct CryptoCodec {
    modus: EncryptionMode,
    cipher: XSalsa20Poly1305,
}

impl std::fmt::Debug for CryptoCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoCodec").field("modus", &self.modus).finish()
    }
}

impl CryptoCodec {
    /// Erstellt einen Codec fuer Modus und Schluessel
    ///
    /// Schluessel zwischen 16 und 32 Bytes werden mit Nullen auf 32 Bytes
    /// aufgefuellt.
    pub fn neu(modus: EncryptionMode, schluessel: &[u8]) -> CryptoResult<Self> {
        if !(MIN_SCHLUESSEL_LAENGE..=SCHLUESSEL_LAENGE).contains(&schluessel.len()) {
            tracing::warn!(laenge = schluessel.len(), modus = %modus, "Schluessel mit ungueltiger Laenge");
            return Err(CryptoError::UngueltigeSchluesselLaenge {
                min: MIN_SCHLUESSEL_LAENGE,
                max: SCHLUESSEL_LAENGE,
                erhalten: schluessel.len(),
            });
        }

        let mut key = [0u8; SCHLUESSEL_LAENGE];
        key[..schluessel.len()].copy_from_slice(schluessel);
        if schluessel.len() < SCHLUESSEL_LAENGE {
            tracing::debug!(laenge = schluessel.len(), "Schluessel auf 32 Bytes aufgefuellt");
        }

        let cipher = XSalsa20Poly1305::new_from_slice(&key)
            .map_err(|e| CryptoError::Verschluesselung(format!("Cipher-Init: {e}")))?;

        Ok(Self { modus, cipher })
    }

    pub fn modus(&self) -> EncryptionMode {
        self.modus
    }

    /// Baut ein verschluesseltes Paket aus Header und Opus-Nutzlast
    pub fn versiegeln(
        &self,
        header: &RtpHeader,
        opus: &[u8],
        zaehler: &mut NonceZaehler,
    ) -> CryptoResult<Vec<u8>> {
        let header_bytes = header.encode();
        let mut nonce = [0u8; NONCE_LAENGE];

        let suffix_laenge = match self.modus {
            EncryptionMode::Suffix => {
                OsRng.fill_bytes(&mut nonce);
                NONCE_LAENGE
            }
            EncryptionMode::Lite => {
                nonce[..4].copy_from_slice(&zaehler.naechste().to_be_bytes());
                4
            }
            EncryptionMode::Plain => {
                nonce[..RtpHeader::SIZE].copy_from_slice(&header_bytes);
                0
            }
        };

        let mut ciphertext = opus.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(
                Nonce::<XSalsa20Poly1305>::from_slice(&nonce),
                b"",
                &mut ciphertext,
            )
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))?;

        let mut paket =
            Vec::with_capacity(RtpHeader::SIZE + MAC_LAENGE + ciphertext.len() + suffix_laenge);
        paket.extend_from_slice(&header_bytes);
        paket.extend_from_slice(tag.as_slice());
        paket.extend_from_slice(&ciphertext);
        paket.extend_from_slice(&nonce[..suffix_laenge]);
        Ok(paket)
    }

    /// Oeffnet ein empfangenes Paket
    ///
    /// Gibt den Klartext-Header und die Opus-Nutzlast zurueck. Eine
    /// RTP-Header-Extension wird dabei entfernt.
    pub fn oeffnen(&self, paket: &[u8]) -> CryptoResult<(RtpHeader, Vec<u8>)> {
        let header = RtpHeader::decode(paket)
            .map_err(|e| CryptoError::UngueltigeDaten(e.to_string()))?;

        let start = header.laenge();
        let suffix_laenge = self.modus.suffix_laenge();
        if paket.len() < start + MAC_LAENGE + suffix_laenge {
            return Err(CryptoError::UngueltigeDaten(format!(
                "Paket zu kurz fuer {}: {} Bytes",
                self.modus,
                paket.len()
            )));
        }
        let ende = paket.len() - suffix_laenge;

        let mut nonce = [0u8; NONCE_LAENGE];
        match self.modus {
            EncryptionMode::Suffix => nonce.copy_from_slice(&paket[ende..]),
            EncryptionMode::Lite => nonce[..4].copy_from_slice(&paket[ende..]),
            EncryptionMode::Plain => nonce[..RtpHeader::SIZE].copy_from_slice(&paket[..RtpHeader::SIZE]),
        }

        let tag = Tag::<XSalsa20Poly1305>::from_slice(&paket[start..start + MAC_LAENGE]);
        let mut klartext = paket[start + MAC_LAENGE..ende].to_vec();
        self.cipher
            .decrypt_in_place_detached(
                Nonce::<XSalsa20Poly1305>::from_slice(&nonce),
                b"",
                &mut klartext,
                tag,
            )
            .map_err(|_| {
                CryptoError::Entschluesselung(format!("MAC ungueltig (ssrc={})", header.ssrc))
            })?;

        if header.hat_extension() {
            let rest = rtp::extension_entfernen(&klartext)
                .map_err(|e| CryptoError::UngueltigeDaten(e.to_string()))?;
            klartext = rest.to_vec();
        }

        Ok((header, klartext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schluessel() -> [u8; 32] {
        let mut key = [0u8; 32];
        for (i, b) in key.iter_mut().enumerate() {
            *b = i as u8;
        }
        key
    }

    #[test]
    fn alle_modi_versiegeln_und_oeffnen() {
        for modus in EncryptionMode::ALLE {
            let codec = CryptoCodec::neu(modus, &test_schluessel()).unwrap();
            let header = RtpHeader::neu(7, 960, 0xABCD);
            let mut zaehler = NonceZaehler::default();

            let paket = codec.versiegeln(&header, b"opus-daten", &mut zaehler).unwrap();
            assert_eq!(
                paket.len(),
                12 + 16 + b"opus-daten".len() + modus.suffix_laenge(),
                "Laenge fuer {modus}"
            );
            assert_eq!(&paket[..12], &header.encode());

            let (h, nutzlast) = codec.oeffnen(&paket).unwrap();
            assert_eq!(h, header);
            assert_eq!(nutzlast, b"opus-daten");
        }
    }

    #[test]
    fn lite_suffix_ist_zaehler_big_endian() {
        let codec = CryptoCodec::neu(EncryptionMode::Lite, &test_schluessel()).unwrap();
        let mut zaehler = NonceZaehler::ab(0x0102_0303);
        let paket = codec
            .versiegeln(&RtpHeader::neu(1, 0, 1), &[1, 2, 3], &mut zaehler)
            .unwrap();
        assert_eq!(&paket[paket.len() - 4..], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn nonce_zaehler_wrappt_auf_null() {
        let mut zaehler = NonceZaehler::ab(u32::MAX - 1);
        assert_eq!(zaehler.naechste(), u32::MAX);
        assert_eq!(zaehler.naechste(), 0);
        assert_eq!(zaehler.naechste(), 1);
    }

    #[test]
    fn suffix_nonce_ist_zufaellig() {
        let codec = CryptoCodec::neu(EncryptionMode::Suffix, &test_schluessel()).unwrap();
        let mut zaehler = NonceZaehler::default();
        let header = RtpHeader::neu(1, 0, 1);
        let a = codec.versiegeln(&header, &[9; 10], &mut zaehler).unwrap();
        let b = codec.versiegeln(&header, &[9; 10], &mut zaehler).unwrap();
        assert_ne!(&a[a.len() - 24..], &b[b.len() - 24..]);
        assert_eq!(zaehler.aktuell(), 0);
    }

    #[test]
    fn manipuliertes_paket_wird_abgelehnt() {
        let codec = CryptoCodec::neu(EncryptionMode::Lite, &test_schluessel()).unwrap();
        let mut zaehler = NonceZaehler::default();
        let mut paket = codec
            .versiegeln(&RtpHeader::neu(1, 0, 1), &[5; 20], &mut zaehler)
            .unwrap();
        paket[20] ^= 0xFF;
        assert!(matches!(
            codec.oeffnen(&paket),
            Err(CryptoError::Entschluesselung(_))
        ));
    }

    #[test]
    fn falscher_schluessel_wird_abgelehnt() {
        let codec = CryptoCodec::neu(EncryptionMode::Plain, &test_schluessel()).unwrap();
        let anderer = CryptoCodec::neu(EncryptionMode::Plain, &[0xAA; 32]).unwrap();
        let paket = codec
            .versiegeln(&RtpHeader::neu(1, 0, 1), &[5; 20], &mut NonceZaehler::default())
            .unwrap();
        assert!(anderer.oeffnen(&paket).is_err());
    }

    #[test]
    fn kurzer_schluessel_wird_aufgefuellt() {
        let kurz = CryptoCodec::neu(EncryptionMode::Plain, &[7u8; 16]).unwrap();
        let mut lang = [0u8; 32];
        lang[..16].copy_from_slice(&[7u8; 16]);
        let voll = CryptoCodec::neu(EncryptionMode::Plain, &lang).unwrap();

        let paket = kurz
            .versiegeln(&RtpHeader::neu(3, 0, 1), b"abc", &mut NonceZaehler::default())
            .unwrap();
        assert_eq!(voll.oeffnen(&paket).unwrap().1, b"abc");
    }

    #[test]
    fn schluessel_laenge_wird_geprueft() {
        assert!(matches!(
            CryptoCodec::neu(EncryptionMode::Lite, &[0u8; 8]),
            Err(CryptoError::UngueltigeSchluesselLaenge { erhalten: 8, .. })
        ));
        assert!(CryptoCodec::neu(EncryptionMode::Lite, &[0u8; 33]).is_err());
    }

    #[test]
    fn zu_kurzes_paket() {
        let codec = CryptoCodec::neu(EncryptionMode::Suffix, &test_schluessel()).unwrap();
        let mut paket = RtpHeader::neu(1, 0, 1).encode().to_vec();
        paket.extend_from_slice(&[0u8; 20]);
        assert!(matches!(codec.oeffnen(&paket), Err(CryptoError::UngueltigeDaten(_))));
    }

    #[test]
    fn extension_wird_nach_entschluesselung_entfernt() {
        let codec = CryptoCodec::neu(EncryptionMode::Lite, &test_schluessel()).unwrap();
        let mut header = RtpHeader::neu(1, 0, 1);
        header.flags |= 0x10;
        let mut nutzlast = vec![0xBE, 0xDE, 0x00, 0x01, 1, 2, 3, 4];
        nutzlast.extend_from_slice(b"opus");
        let paket = codec
            .versiegeln(&header, &nutzlast, &mut NonceZaehler::default())
            .unwrap();
        assert_eq!(codec.oeffnen(&paket).unwrap().1, b"opus");
    }
}

//! Auswahl des Verschluesselungsmodus
//!
//! Es gibt keine Verhandlungsrunde: das Relay schickt im Ready seine Modi,
//! der Client nimmt den ersten davon, den er selbst beherrscht.

use crate::error::{CryptoError, CryptoResult};
use voicelink_protocol::EncryptionMode;

/// Waehlt den ersten angebotenen Modus, den der Client unterstuetzt
pub fn modus_waehlen(angeboten: &[String]) -> CryptoResult<EncryptionMode> {
    for name in angeboten {
        match name.parse::<EncryptionMode>() {
            Ok(modus) => return Ok(modus),
            Err(_) => tracing::trace!(modus = %name, "Modus nicht unterstuetzt, uebersprungen"),
        }
    }
    Err(CryptoError::KeinGemeinsamerModus {
        angeboten: angeboten.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn liste(namen: &[&str]) -> Vec<String> {
        namen.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn erster_bekannter_modus_gewinnt() {
        let angebot = liste(&[
            "aead_aes256_gcm_rtpsize",
            "xsalsa20_poly1305_lite",
            "xsalsa20_poly1305_suffix",
        ]);
        assert_eq!(modus_waehlen(&angebot).unwrap(), EncryptionMode::Lite);
    }

    #[test]
    fn reihenfolge_des_relays_zaehlt() {
        let angebot = liste(&["xsalsa20_poly1305", "xsalsa20_poly1305_suffix"]);
        assert_eq!(modus_waehlen(&angebot).unwrap(), EncryptionMode::Plain);
    }

    #[test]
    fn kein_gemeinsamer_modus() {
        let angebot = liste(&["aead_aes256_gcm", "aead_xchacha20_poly1305_rtpsize"]);
        match modus_waehlen(&angebot) {
            Err(CryptoError::KeinGemeinsamerModus { angeboten }) => assert_eq!(angeboten.len(), 2),
            andere => panic!("unerwartet: {andere:?}"),
        }
    }

    #[test]
    fn leeres_angebot() {
        assert!(modus_waehlen(&[]).is_err());
    }
}

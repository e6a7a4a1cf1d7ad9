//! RTP-Header der Voice-Pakete (UDP)
//!
//! Jedes Audiopaket beginnt mit einem 12-Byte RTP-Header im Klartext. Der
//! Header dient gleichzeitig als Nonce-Quelle fuer den einfachen
//! Verschluesselungsmodus.
//!
//! ## Paketformat (Header = 12 Bytes, kein serde)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version/Flags (0x80 = RTP v2, ohne Padding/Extension/CSRC)
//!  1       1   Payload-Typ (0x78 = Opus)
//!  2       2   Sequenznummer (big-endian, wraps bei 2^16)
//!  4       4   Zeitstempel (big-endian, 48 kHz-Ticks)
//!  8       4   SSRC (big-endian)
//! 12+      N   verschluesselte Nutzdaten + Nonce-Suffix
//! ```

use std::io;

/// Version/Flags-Byte fuer ausgehende Pakete
pub const RTP_VERSION_FLAGS: u8 = 0x80;

/// Payload-Typ fuer Opus
pub const RTP_PAYLOAD_TYP: u8 = 0x78;

/// Extension-Bit im ersten Header-Byte
const FLAG_EXTENSION: u8 = 0x10;

/// Maske fuer die CSRC-Anzahl im ersten Header-Byte
const MASKE_CSRC_ANZAHL: u8 = 0x0F;

/// Opus-Stilleframe, wird von Sendern am Sprechende und beim Start geschickt
pub const STILLE_FRAME: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Prueft ob eine Nutzlast der bekannte Stillemarker ist
pub fn ist_stille(nutzdaten: &[u8]) -> bool {
    nutzdaten == STILLE_FRAME
}

/// Wrap-bewusster Vergleich zweier 16-Bit-Sequenznummern
///
/// `neu` gilt als neuer wenn der Abstand modulo 2^16 in der vorderen
/// Haelfte des Zahlenraums liegt. Gleiche Nummern sind nicht neuer.
pub fn sequenz_ist_neuer(letzte: u16, neu: u16) -> bool {
    let abstand = neu.wrapping_sub(letzte);
    abstand != 0 && abstand < 0x8000
}

// ---------------------------------------------------------------------------
// RtpHeader
// ---------------------------------------------------------------------------

/// 12-Byte RTP-Header eines Voice-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Version/Flags-Byte
    pub flags: u8,
    /// Payload-Typ
    pub payload_typ: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
}

impl RtpHeader {
    /// Header-Groesse in Bytes (ohne CSRC-Liste)
    pub const SIZE: usize = 12;

    /// Erstellt einen Header fuer ein ausgehendes Opus-Paket
    pub fn neu(sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            flags: RTP_VERSION_FLAGS,
            payload_typ: RTP_PAYLOAD_TYP,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Serialisiert den Header in ein 12-Byte-Array (big-endian)
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.flags;
        buf[1] = self.payload_typ;
        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());
        buf
    }

    /// Deserialisiert einen Header aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `InvalidData` wenn das Slice kuerzer als der Header inkl. CSRC-Liste ist
    /// - `InvalidData` wenn die RTP-Version nicht 2 ist
    pub fn decode(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("RTP-Header zu kurz: {} Bytes (erwartet {})", buf.len(), Self::SIZE),
            ));
        }

        if buf[0] >> 6 != 2 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Ungueltige RTP-Version im Byte 0x{:02X}", buf[0]),
            ));
        }

        let header = Self {
            flags: buf[0],
            payload_typ: buf[1],
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        };

        if buf.len() < header.laenge() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "CSRC-Liste abgeschnitten: {} Bytes (erwartet {})",
                    buf.len(),
                    header.laenge()
                ),
            ));
        }
        Ok(header)
    }

    /// Laenge des Klartext-Headers inklusive CSRC-Liste
    pub fn laenge(&self) -> usize {
        Self::SIZE + 4 * (self.flags & MASKE_CSRC_ANZAHL) as usize
    }

    /// Gibt true zurueck wenn eine Header-Extension in der Nutzlast steckt
    pub fn hat_extension(&self) -> bool {
        self.flags & FLAG_EXTENSION != 0
    }
}

/// Entfernt eine RTP-Header-Extension vom Anfang der entschluesselten Nutzlast
///
/// Format: 2 Bytes Profil, 2 Bytes Laenge in 32-Bit-Worten, dann die Worte.
pub fn extension_entfernen(nutzdaten: &[u8]) -> io::Result<&[u8]> {
    if nutzdaten.len() < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "Header-Extension zu kurz",
        ));
    }
    let worte = u16::from_be_bytes([nutzdaten[2], nutzdaten[3]]) as usize;
    let ende = 4 + worte * 4;
    nutzdaten.get(ende..).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Header-Extension laenger als Nutzlast: {ende} > {}", nutzdaten.len()),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_byte_layout() {
        let h = RtpHeader::neu(0x1234, 0xDEADBEEF, 0x0102_0304);
        let buf = h.encode();
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 0x78);
        assert_eq!(&buf[2..4], &[0x12, 0x34]);
        assert_eq!(&buf[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&buf[8..12], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(RtpHeader::decode(&buf).unwrap(), h);
    }

    #[test]
    fn header_zu_kurz() {
        let err = RtpHeader::decode(&[0x80, 0x78, 0, 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn falsche_version_wird_abgelehnt() {
        let mut buf = RtpHeader::neu(1, 1, 1).encode();
        buf[0] = 0xC9;
        assert!(RtpHeader::decode(&buf).is_err());
    }

    #[test]
    fn csrc_liste_verlaengert_header() {
        let mut buf = RtpHeader::neu(1, 2, 3).encode().to_vec();
        buf[0] = 0x82;
        buf.extend_from_slice(&[0u8; 8]);
        let h = RtpHeader::decode(&buf).unwrap();
        assert_eq!(h.laenge(), 20);

        // Abgeschnittene CSRC-Liste
        assert!(RtpHeader::decode(&buf[..16]).is_err());
    }

    #[test]
    fn extension_wird_entfernt() {
        let daten = [0xBE, 0xDE, 0x00, 0x01, 0x10, 0x20, 0x30, 0x40, 0xAA, 0xBB];
        assert_eq!(extension_entfernen(&daten).unwrap(), &[0xAA, 0xBB]);
        assert!(extension_entfernen(&[0xBE, 0xDE, 0x00, 0x05]).is_err());
    }

    #[test]
    fn sequenz_vergleich_ohne_wrap() {
        assert!(sequenz_ist_neuer(100, 101));
        assert!(!sequenz_ist_neuer(100, 50));
        assert!(!sequenz_ist_neuer(100, 100));
    }

    #[test]
    fn sequenz_vergleich_mit_wrap() {
        // 5 ist nur nach einem Ueberlauf neuer als die letzte Nummer
        assert!(!sequenz_ist_neuer(100, 5));
        assert!(sequenz_ist_neuer(65530, 5));
        assert!(sequenz_ist_neuer(u16::MAX, 0));
    }

    #[test]
    fn sequenz_zaehler_wrappt_auf_null() {
        let seq: u16 = u16::MAX;
        assert_eq!(seq.wrapping_add(1), 0);
    }

    #[test]
    fn stille_erkennung() {
        assert!(ist_stille(&[0xF8, 0xFF, 0xFE]));
        assert!(!ist_stille(&[0xF8, 0xFF]));
    }
}

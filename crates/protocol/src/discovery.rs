//! IP-Discovery und Keep-Alive (UDP)
//!
//! Vor dem ersten Audiopaket muss der Client seine von aussen sichtbare
//! Adresse kennen. Dazu schickt er ein 70-Byte-Paket mit seiner SSRC an
//! den UDP-Endpunkt des Relays und erhaelt ein gleich grosses Paket zurueck.
//!
//! ```text
//! Anfrage:  [ssrc BE u32][66 Bytes 0x00]
//! Antwort:  [4 Bytes    ][IP als ASCII, mit 0x00 aufgefuellt][Port LE u16]
//!           0           4                                  68           70
//! ```

use std::io;
use std::net::{IpAddr, SocketAddr};

/// Groesse von Discovery-Anfrage und -Antwort
pub const DISCOVERY_PAKET_LAENGE: usize = 70;

/// Offset der IP-Adresse in der Antwort
const IP_OFFSET: usize = 4;

/// Keep-Alive-Marker, bleibt fuer die gesamte Session gleich
pub const KEEP_ALIVE: [u8; 9] = [0xC9, 0, 0, 0, 0, 0, 0, 0, 0];

/// Erstellt die Discovery-Anfrage fuer die eigene SSRC
pub fn discovery_anfrage(ssrc: u32) -> [u8; DISCOVERY_PAKET_LAENGE] {
    let mut buf = [0u8; DISCOVERY_PAKET_LAENGE];
    buf[..4].copy_from_slice(&ssrc.to_be_bytes());
    buf
}

/// Liest externe IP und externen Port aus einer Discovery-Antwort
///
/// # Fehler
/// - `InvalidData` bei falscher Laenge, nicht-ASCII oder unparsbarer IP
pub fn discovery_antwort_parsen(buf: &[u8]) -> io::Result<SocketAddr> {
    if buf.len() != DISCOVERY_PAKET_LAENGE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "Discovery-Antwort hat {} Bytes (erwartet {})",
                buf.len(),
                DISCOVERY_PAKET_LAENGE
            ),
        ));
    }

    let ip_bytes = &buf[IP_OFFSET..DISCOVERY_PAKET_LAENGE - 2];
    let ip_text = std::str::from_utf8(ip_bytes)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("IP nicht lesbar: {e}")))?
        .trim_matches(|c: char| c == '\0' || c.is_whitespace());

    let ip: IpAddr = ip_text.parse().map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Ungueltige IP in Discovery-Antwort: '{ip_text}'"),
        )
    })?;

    // Port steht little-endian in den letzten zwei Bytes
    let port = u16::from_le_bytes([
        buf[DISCOVERY_PAKET_LAENGE - 2],
        buf[DISCOVERY_PAKET_LAENGE - 1],
    ]);

    Ok(SocketAddr::new(ip, port))
}

/// Baut eine Discovery-Antwort wie sie das Relay schickt
///
/// Wird vom Relay-Simulator in den Tests verwendet.
pub fn discovery_antwort(ssrc: u32, adresse: SocketAddr) -> [u8; DISCOVERY_PAKET_LAENGE] {
    let mut buf = [0u8; DISCOVERY_PAKET_LAENGE];
    buf[..4].copy_from_slice(&ssrc.to_be_bytes());
    let ip = adresse.ip().to_string();
    let ende = (IP_OFFSET + ip.len()).min(DISCOVERY_PAKET_LAENGE - 2);
    buf[IP_OFFSET..ende].copy_from_slice(&ip.as_bytes()[..ende - IP_OFFSET]);
    buf[DISCOVERY_PAKET_LAENGE - 2..].copy_from_slice(&adresse.port().to_le_bytes());
    buf
}

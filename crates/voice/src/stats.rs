//! Verbindungsstatistik
//!
//! Zaehler werden lock-frei aus den Pipeline-Tasks erhoeht. Ein
//! [`StatistikSnapshot`] friert die Werte fuer Host und Logging ein.

use std::sync::atomic::{AtomicU64, Ordering};

/// Eingefrorene Zaehlerstaende
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatistikSnapshot {
    pub pakete_gesendet: u64,
    pub stille_gesendet: u64,
    pub pakete_empfangen: u64,
    pub verworfen_reihenfolge: u64,
    pub verworfen_unbekannt: u64,
    pub entschluesselung_fehler: u64,
    pub dekodier_fehler: u64,
    pub kodier_fehler: u64,
    pub rtt_ms: u64,
}

impl StatistikSnapshot {
    /// Gibt eine lesbare Zusammenfassung zurueck
    pub fn zusammenfassung(&self) -> String {
        format!(
            "TX={} (Stille={}) RX={} Verworfen: Reihenfolge={} Unbekannt={} Krypto={} Codec-Fehler: dec={} enc={} RTT={}ms",
            self.pakete_gesendet,
            self.stille_gesendet,
            self.pakete_empfangen,
            self.verworfen_reihenfolge,
            self.verworfen_unbekannt,
            self.entschluesselung_fehler,
            self.dekodier_fehler,
            self.kodier_fehler,
            self.rtt_ms,
        )
    }
}

/// Laufende Zaehler einer Session
#[derive(Debug, Default)]
pub struct VoiceStatistik {
    pakete_gesendet: AtomicU64,
    stille_gesendet: AtomicU64,
    pakete_empfangen: AtomicU64,
    verworfen_reihenfolge: AtomicU64,
    verworfen_unbekannt: AtomicU64,
    entschluesselung_fehler: AtomicU64,
    dekodier_fehler: AtomicU64,
    kodier_fehler: AtomicU64,
    rtt_ms: AtomicU64,
}

impl VoiceStatistik {
    pub fn gesendet(&self, stille: bool) {
        self.pakete_gesendet.fetch_add(1, Ordering::Relaxed);
        if stille {
            self.stille_gesendet.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn empfangen(&self) {
        self.pakete_empfangen.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reihenfolge_verworfen(&self) {
        self.verworfen_reihenfolge.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unbekannt_verworfen(&self) {
        self.verworfen_unbekannt.fetch_add(1, Ordering::Relaxed);
    }

    pub fn entschluesselung_fehlgeschlagen(&self) {
        self.entschluesselung_fehler.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dekodierung_fehlgeschlagen(&self) {
        self.dekodier_fehler.fetch_add(1, Ordering::Relaxed);
    }

    pub fn kodierung_fehlgeschlagen(&self) {
        self.kodier_fehler.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rtt_setzen(&self, rtt_ms: u64) {
        self.rtt_ms.store(rtt_ms, Ordering::Relaxed);
    }

    /// Erstellt einen Snapshot aller Zaehler
    pub fn snapshot(&self) -> StatistikSnapshot {
        StatistikSnapshot {
            pakete_gesendet: self.pakete_gesendet.load(Ordering::Relaxed),
            stille_gesendet: self.stille_gesendet.load(Ordering::Relaxed),
            pakete_empfangen: self.pakete_empfangen.load(Ordering::Relaxed),
            verworfen_reihenfolge: self.verworfen_reihenfolge.load(Ordering::Relaxed),
            verworfen_unbekannt: self.verworfen_unbekannt.load(Ordering::Relaxed),
            entschluesselung_fehler: self.entschluesselung_fehler.load(Ordering::Relaxed),
            dekodier_fehler: self.dekodier_fehler.load(Ordering::Relaxed),
            kodier_fehler: self.kodier_fehler.load(Ordering::Relaxed),
            rtt_ms: self.rtt_ms.load(Ordering::Relaxed),
        }
    }
}

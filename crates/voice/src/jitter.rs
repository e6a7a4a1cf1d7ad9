//! Mischpuffer fuer kombiniertes Audio
//!
//! Die Empfangspipeline reiht dekodierte Frames pro Teilnehmer ein. Ein
//! eigener Task mischt alle 20 ms den jeweils aeltesten Frame jedes
//! Teilnehmers, der juenger als das Jitter-Fenster ist. Aeltere Frames
//! werden verworfen. Ohne Beitrag liefert der Takt einen Stille-Frame.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use voicelink_audio::{mischen, stille_frame};
use voicelink_core::PeerId;
use voicelink_protocol::codec::FRAME_MS;

use crate::handler::AudioSink;

/// Ein dekodierter Frame mit Empfangszeitpunkt
#[derive(Debug, Clone)]
pub struct JitterEntry {
    pub peer: PeerId,
    pub pcm: Vec<i16>,
    pub zeitpunkt: Instant,
}

/// Warteschlangen pro Teilnehmer
#[derive(Debug)]
pub struct JitterPuffer {
    fenster: Duration,
    queues: Mutex<HashMap<PeerId, VecDeque<JitterEntry>>>,
}

impl JitterPuffer {
    pub fn neu(fenster: Duration) -> Self {
        Self {
            fenster,
            queues: Mutex::new(HashMap::new()),
        }
    }

    pub fn einreihen(&self, peer: PeerId, pcm: Vec<i16>, zeitpunkt: Instant) {
        self.queues
            .lock()
            .entry(peer)
            .or_default()
            .push_back(JitterEntry { peer, pcm, zeitpunkt });
    }

    /// Entfernt die Warteschlange eines Teilnehmers
    pub fn entfernen(&self, peer: PeerId) {
        self.queues.lock().remove(&peer);
    }

    /// Stellt den Frame fuer den Takt `jetzt` zusammen
    ///
    /// Gibt die beitragenden Teilnehmer und den gemischten Frame zurueck.
    /// Ohne Beitrag: leere Liste und ein Stille-Frame.
    pub fn kombinieren(&self, jetzt: Instant) -> (Vec<PeerId>, Vec<i16>) {
        let mut beitraege: Vec<JitterEntry> = Vec::new();
        {
            let mut queues = self.queues.lock();
            for queue in queues.values_mut() {
                while let Some(eintrag) = queue.pop_front() {
                    if jetzt.saturating_duration_since(eintrag.zeitpunkt) <= self.fenster {
                        beitraege.push(eintrag);
                        break;
                    }
                }
            }
            queues.retain(|_, queue| !queue.is_empty());
        }

        if beitraege.is_empty() {
            return (Vec::new(), stille_frame());
        }

        beitraege.sort_by_key(|e| e.peer);
        let peers = beitraege.iter().map(|e| e.peer).collect();
        let frames: Vec<&[i16]> = beitraege.iter().map(|e| e.pcm.as_slice()).collect();
        (peers, mischen(&frames))
    }
}

/// 20-ms-Mischschleife
pub async fn misch_loop(
    puffer: Arc<JitterPuffer>,
    senke: Arc<dyn AudioSink>,
    abbruch: Arc<AtomicBool>,
) {
    let mut takt = tokio::time::interval(Duration::from_millis(FRAME_MS));
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let jetzt = takt.tick().await;
        if abbruch.load(Ordering::Acquire) {
            break;
        }
        let (peers, pcm) = puffer.kombinieren(jetzt);
        senke.on_combined_audio(&peers, &pcm);
    }
    tracing::debug!("Mischschleife beendet");
}

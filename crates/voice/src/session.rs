//! Voice-Session (Orchestrator)
//!
//! Besitzt Signaling-Actor, UDP-Transport, Pipelines und SSRC-Registry
//! einer Verbindung und stellt dem Host den Lebenszyklus bereit.
//!
//! ```text
//! VoiceSession ──Arc──► SessionKontext
//!                          ├── status (watch)      <- einziger Schreiber: status_setzen()
//!                          ├── daten               <- SessionDaten, atomar ersetzt
//!                          ├── pipelines (Mutex)   <- Sender / Empfaenger / Mischer / Keep-Alive
//!                          └── befehl_tx ───────►  SignalingActor (eigener Task)
//! ```
//!
//! Der Abbau laeuft genau einmal (explizites close, fataler Fehler oder
//! Drop) in fester Reihenfolge: Senden stoppen, UDP-Socket freigeben,
//! Empfang unterbrechen, Mischer und Keep-Alive beenden, Codecs
//! freigeben, WebSocket schliessen.

use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use voicelink_audio::CodecProvider;
use voicelink_core::{
    ChannelId, CloseReason, ConnectionStatus, PeerId, ServerId, VoiceError, VoiceResult,
};
use voicelink_crypto::{CryptoCodec, EncryptionMode};
use voicelink_protocol::SprechModus;

use crate::config::VoiceConfig;
use crate::handler::{AudioSink, AudioSource, ConnectionListener, KeinListener, PeerResolver};
use crate::jitter::{misch_loop, JitterPuffer};
use crate::receive::{empfangs_loop, ReceivePipeline};
use crate::send::{sende_loop, SendPipeline};
use crate::signaling::{SignalBefehl, SignalingActor};
use crate::ssrc::SsrcRegistry;
use crate::stats::{StatistikSnapshot, VoiceStatistik};
use crate::udp::keep_alive_loop;

/// Keep-Alive-Intervall solange kein Hello eingetroffen ist
const KEEP_ALIVE_STANDARD: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Zugangsdaten und Sitzungsdaten
// ---------------------------------------------------------------------------

/// Zugangsdaten aus dem Gateway (Voice-Server-Update und Voice-State)
#[derive(Debug, Clone)]
pub struct VoiceZugang {
    /// Host des Voice-Relays oder vollstaendige URL
    pub endpoint: String,
    pub server_id: ServerId,
    pub user_id: PeerId,
    pub session_id: String,
    pub token: String,
}

impl VoiceZugang {
    fn validieren(&self) -> VoiceResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(VoiceError::fehlbedienung("Endpoint fehlt"));
        }
        if self.session_id.is_empty() {
            return Err(VoiceError::fehlbedienung("Session-ID fehlt"));
        }
        if self.token.is_empty() {
            return Err(VoiceError::fehlbedienung("Token fehlt"));
        }
        Ok(())
    }
}

/// Parameter einer aufgebauten Verbindung
///
/// Wird nach der SessionDescription als Ganzes gesetzt und nie veraendert.
/// Ein neuer Ready-Zyklus erzeugt neue Sitzungsdaten.
#[derive(Debug)]
pub struct SessionDaten {
    pub session_id: String,
    pub relay: SocketAddr,
    pub extern_adresse: SocketAddr,
    pub ssrc: u32,
    pub modus: EncryptionMode,
    pub krypto: Arc<CryptoCodec>,
    pub udp: Arc<crate::udp::UdpTransport>,
}

// ---------------------------------------------------------------------------
// Pipeline-Tasks
// ---------------------------------------------------------------------------

/// Laufender Hintergrund-Task mit Abbruch-Flag
struct Aufgabe {
    abbruch: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Aufgabe {
    fn starten<F>(runtime: &Handle, f: impl FnOnce(Arc<AtomicBool>) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let abbruch = Arc::new(AtomicBool::new(false));
        let handle = runtime.spawn(f(abbruch.clone()));
        Self { abbruch, handle }
    }

    fn laeuft(&self) -> bool {
        !self.handle.is_finished()
    }

    fn stoppen(self) {
        self.abbruch.store(true, Ordering::Release);
        self.handle.abort();
    }
}

#[derive(Default)]
struct PipelineZustand {
    sender: Option<Aufgabe>,
    empfaenger: Option<Aufgabe>,
    mischer: Option<Aufgabe>,
    keep_alive: Option<Aufgabe>,
    /// Mischpuffer der laufenden Empfangspipeline
    mischpuffer: Option<Arc<JitterPuffer>>,
    /// Vorlauf-Stille bereits gesendet (pro Verbindung)
    primed: Arc<AtomicBool>,
}

fn laufend(aufgabe: &Option<Aufgabe>) -> bool {
    aufgabe.as_ref().is_some_and(Aufgabe::laeuft)
}

fn stoppen(aufgabe: &mut Option<Aufgabe>) {
    if let Some(a) = aufgabe.take() {
        a.stoppen();
    }
}

// ---------------------------------------------------------------------------
// SessionKontext
// ---------------------------------------------------------------------------

/// Gemeinsamer Zustand von Session-Handle, Actor und Hilfstasks
pub(crate) struct SessionKontext {
    pub(crate) config: VoiceConfig,
    pub(crate) zugang: VoiceZugang,
    pub(crate) registry: SsrcRegistry,
    pub(crate) resolver: Arc<dyn PeerResolver>,
    pub(crate) statistik: Arc<VoiceStatistik>,
    pub(crate) verbindungs_lock: tokio::sync::Mutex<()>,

    runtime: Handle,
    codec: Option<Arc<dyn CodecProvider>>,
    status_tx: watch::Sender<ConnectionStatus>,
    listener: RwLock<Arc<dyn ConnectionListener>>,
    quelle: Mutex<Option<Arc<dyn AudioSource>>>,
    senke: Mutex<Option<Arc<dyn AudioSink>>>,
    kanal: Mutex<Option<ChannelId>>,

    auto_reconnect: AtomicBool,
    sprech_modus: AtomicU8,
    /// Session wird abgebaut, alle Tasks beenden sich
    beendet: AtomicBool,
    /// Abbau bereits ausgefuehrt
    abgebaut: AtomicBool,

    daten: RwLock<Option<Arc<SessionDaten>>>,
    pipelines: Mutex<PipelineZustand>,
    heartbeat_intervall: Mutex<Option<Duration>>,

    befehl_tx: mpsc::UnboundedSender<SignalBefehl>,
    befehl_rx: Mutex<Option<mpsc::UnboundedReceiver<SignalBefehl>>>,
    actor: Mutex<Option<JoinHandle<()>>>,
}

impl SessionKontext {
    pub(crate) fn ist_beendet(&self) -> bool {
        self.beendet.load(Ordering::Acquire)
    }

    pub(crate) fn auto_reconnect(&self) -> bool {
        self.auto_reconnect.load(Ordering::Acquire)
    }

    pub(crate) fn sprech_modus(&self) -> SprechModus {
        SprechModus(self.sprech_modus.load(Ordering::Acquire))
    }

    pub(crate) fn sprech_modus_setzen(&self, modus: SprechModus) {
        self.sprech_modus.store(modus.0, Ordering::Release);
    }

    pub(crate) fn befehl_sender(&self) -> mpsc::UnboundedSender<SignalBefehl> {
        self.befehl_tx.clone()
    }

    pub(crate) fn listener(&self) -> Arc<dyn ConnectionListener> {
        self.listener.read().clone()
    }

    pub(crate) fn hat_sitzung(&self) -> bool {
        self.daten.read().is_some()
    }

    pub(crate) fn eigene_ssrc(&self) -> Option<u32> {
        self.daten.read().as_ref().map(|d| d.ssrc)
    }

    pub(crate) fn heartbeat_intervall_setzen(&self, intervall: Duration) {
        *self.heartbeat_intervall.lock() = Some(intervall);
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status_tx.borrow()
    }

    /// Setzt den Status und benachrichtigt den Listener
    ///
    /// `Closed` ist endgueltig, danach werden keine Wechsel mehr angenommen.
    pub(crate) fn status_setzen(&self, neu: ConnectionStatus) {
        let mut alt = None;
        self.status_tx.send_if_modified(|status| {
            if status.ist_geschlossen() || *status == neu {
                return false;
            }
            alt = Some(std::mem::replace(status, neu));
            true
        });

        if let Some(alt) = alt {
            tracing::info!(alt = %alt, neu = %neu, "Verbindungsstatus");
            self.listener().on_status_change(alt, neu);
        }
    }

    /// Ersetzt die Sitzungsdaten nach einer SessionDescription
    pub(crate) fn sitzung_setzen(&self, daten: SessionDaten) {
        self.pipelines_stoppen();
        self.pipelines.lock().primed = Arc::new(AtomicBool::new(false));
        *self.daten.write() = Some(Arc::new(daten));
    }

    /// Verwirft die aktuelle Verbindung vor einem neuen Ready-Zyklus
    pub(crate) fn sitzung_verwerfen(&self) {
        self.pipelines_stoppen();
        if self.daten.write().take().is_some() {
            tracing::debug!("Bisherige Sitzungsdaten verworfen");
        }
        self.registry.leeren();
    }

    /// Wartet begrenzt auf `Connected` und aktiviert dann die Pipelines
    pub(crate) async fn bereitschaft_abwarten(&self) {
        let mut status_rx = self.status_tx.subscribe();
        let warten = status_rx.wait_for(|s| *s == ConnectionStatus::Connected || s.ist_geschlossen());
        let ergebnis = tokio::time::timeout(self.config.verbindungs_timeout(), warten)
            .await
            .map(|r| r.map(|status| *status));

        match ergebnis {
            Ok(Ok(ConnectionStatus::Connected)) => self.pipelines_sicherstellen(),
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.config.verbindungs_timeout_ms,
                    "Voice-Verbindung nicht rechtzeitig bereit"
                );
                self.schliessen_intern(CloseReason::Zeitlimit);
            }
        }
    }

    /// Startet alle fehlenden Pipeline-Tasks der aktuellen Verbindung
    pub(crate) fn pipelines_sicherstellen(&self) {
        if self.ist_beendet() || self.status() != ConnectionStatus::Connected {
            return;
        }
        let Some(daten) = self.daten.read().clone() else {
            return;
        };
        let mut p = self.pipelines.lock();

        if !laufend(&p.keep_alive) {
            let intervall = self.heartbeat_intervall.lock().unwrap_or(KEEP_ALIVE_STANDARD);
            let udp = daten.udp.clone();
            let befehle = self.befehl_tx.clone();
            p.keep_alive = Some(Aufgabe::starten(&self.runtime, move |abbruch| {
                keep_alive_loop(udp, intervall, abbruch, befehle)
            }));
        }

        if !laufend(&p.sender) {
            if let Some(quelle) = self.quelle.lock().clone() {
                let encoder = if quelle.is_pre_encoded() {
                    None
                } else {
                    self.codec.as_ref().and_then(|c| match c.encoder() {
                        Ok(encoder) => Some(encoder),
                        Err(e) => {
                            tracing::error!(fehler = %e, "Encoder konnte nicht erstellt werden");
                            None
                        }
                    })
                };
                let pipeline = SendPipeline::neu(
                    quelle,
                    encoder,
                    daten.krypto.clone(),
                    daten.ssrc,
                    self.config.vorlauf_stille_frames,
                    self.config.nachlauf_stille_frames,
                    p.primed.clone(),
                    self.befehl_tx.clone(),
                    self.statistik.clone(),
                );
                let udp = daten.udp.clone();
                p.sender = Some(Aufgabe::starten(&self.runtime, move |abbruch| {
                    sende_loop(pipeline, udp, abbruch)
                }));
                tracing::debug!(ssrc = daten.ssrc, "Sendepipeline gestartet");
            }
        }

        if !laufend(&p.empfaenger) {
            let senke = self.senke.lock().clone();
            if let (Some(senke), Some(codec)) = (senke, self.codec.clone()) {
                self.registry.empfang_aktivieren(codec);

                let jitter = senke
                    .wants_combined()
                    .then(|| Arc::new(JitterPuffer::neu(self.config.jitter_fenster())));
                p.mischpuffer = jitter.clone();
                if let Some(puffer) = jitter.clone() {
                    let misch_senke = senke.clone();
                    p.mischer = Some(Aufgabe::starten(&self.runtime, move |abbruch| {
                        misch_loop(puffer, misch_senke, abbruch)
                    }));
                }

                let pipeline = ReceivePipeline::neu(
                    daten.krypto.clone(),
                    self.registry.clone(),
                    senke,
                    jitter,
                    self.statistik.clone(),
                );
                let udp = daten.udp.clone();
                let timeout = self.config.empfangs_timeout();
                p.empfaenger = Some(Aufgabe::starten(&self.runtime, move |abbruch| {
                    empfangs_loop(pipeline, udp, abbruch, timeout)
                }));
                tracing::debug!("Empfangspipeline gestartet");
            }
        }
    }

    fn sender_stoppen(&self, p: &mut PipelineZustand) {
        if p.sender.is_some() {
            stoppen(&mut p.sender);
            let _ = self.befehl_tx.send(SignalBefehl::Sprechen(false));
        }
    }

    fn empfang_stoppen(&self, p: &mut PipelineZustand) {
        stoppen(&mut p.empfaenger);
        stoppen(&mut p.mischer);
        p.mischpuffer = None;
        self.registry.empfang_deaktivieren();
    }

    /// Teilnehmer hat den Kanal verlassen: SSRC-Bindung und Mischpuffer leeren
    pub(crate) fn peer_trennen(&self, peer: PeerId) {
        self.registry.unbind(peer);
        if let Some(puffer) = self.pipelines.lock().mischpuffer.as_ref() {
            puffer.entfernen(peer);
        }
    }

    /// Stoppt alle Pipeline-Tasks, die Sitzungsdaten bleiben erhalten
    pub(crate) fn pipelines_stoppen(&self) {
        let mut p = self.pipelines.lock();
        self.sender_stoppen(&mut p);
        self.empfang_stoppen(&mut p);
        stoppen(&mut p.keep_alive);
    }

    /// Beendet die Session mit `grund` und baut alles ab
    pub(crate) fn schliessen_intern(&self, grund: CloseReason) {
        if self.abgebaut.load(Ordering::Acquire) {
            return;
        }
        self.status_setzen(ConnectionStatus::Closed(grund));
        self.abbauen();
    }

    /// Geordneter Abbau, laeuft genau einmal
    fn abbauen(&self) {
        if self.abgebaut.swap(true, Ordering::AcqRel) {
            return;
        }
        self.beendet.store(true, Ordering::Release);

        {
            let mut p = self.pipelines.lock();
            // 1. keine neuen Pakete
            stoppen(&mut p.sender);
            // 2. UDP-Socket freigeben
            self.daten.write().take();
            // 3. Empfang unterbrechen
            stoppen(&mut p.empfaenger);
            // 4. Mischer und Keep-Alive
            stoppen(&mut p.mischer);
            p.mischpuffer = None;
            stoppen(&mut p.keep_alive);
        }
        // 5. Decoder freigeben (Encoder gehoert dem Sende-Task)
        self.registry.empfang_deaktivieren();
        self.registry.leeren();
        // 6. WebSocket schliessen
        let _ = self.befehl_tx.send(SignalBefehl::Schliessen);

        tracing::info!(statistik = %self.statistik.snapshot().zusammenfassung(), "Voice-Session abgebaut");
    }
}

// ---------------------------------------------------------------------------
// VoiceSession
// ---------------------------------------------------------------------------

/// Handle einer Voice-Verbindung
///
/// Beim Drop wird die Session geschlossen, falls das nicht schon geschehen
/// ist.
pub struct VoiceSession {
    kontext: Arc<SessionKontext>,
}

impl VoiceSession {
    /// Erstellt eine Session, muss innerhalb einer Tokio-Runtime laufen
    ///
    /// Ohne `codec` koennen nur vorkodierte Quellen gesendet werden.
    pub fn neu(
        config: VoiceConfig,
        zugang: VoiceZugang,
        resolver: Arc<dyn PeerResolver>,
        codec: Option<Arc<dyn CodecProvider>>,
    ) -> VoiceResult<Self> {
        config.validieren()?;
        zugang.validieren()?;
        let runtime = Handle::try_current()
            .map_err(|_| VoiceError::fehlbedienung("VoiceSession ausserhalb einer Tokio-Runtime"))?;

        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        let (befehl_tx, befehl_rx) = mpsc::unbounded_channel();

        let kontext = SessionKontext {
            auto_reconnect: AtomicBool::new(config.auto_reconnect),
            sprech_modus: AtomicU8::new(config.sprech_modus),
            config,
            zugang,
            registry: SsrcRegistry::neu(),
            resolver,
            statistik: Arc::new(VoiceStatistik::default()),
            verbindungs_lock: tokio::sync::Mutex::new(()),
            runtime,
            codec,
            status_tx,
            listener: RwLock::new(Arc::new(KeinListener)),
            quelle: Mutex::new(None),
            senke: Mutex::new(None),
            kanal: Mutex::new(None),
            beendet: AtomicBool::new(false),
            abgebaut: AtomicBool::new(false),
            daten: RwLock::new(None),
            pipelines: Mutex::new(PipelineZustand::default()),
            heartbeat_intervall: Mutex::new(None),
            befehl_tx,
            befehl_rx: Mutex::new(Some(befehl_rx)),
            actor: Mutex::new(None),
        };

        Ok(Self {
            kontext: Arc::new(kontext),
        })
    }

    pub fn listener_setzen(&self, listener: Arc<dyn ConnectionListener>) {
        *self.kontext.listener.write() = listener;
    }

    /// Baut die Verbindung fuer `kanal` auf
    ///
    /// Kehrt sofort zurueck, der Fortschritt ist ueber den Status sichtbar.
    pub fn connect(&self, kanal: ChannelId) -> VoiceResult<()> {
        if self.kontext.ist_beendet() {
            return Err(VoiceError::SessionGeschlossen);
        }
        let Some(befehle) = self.kontext.befehl_rx.lock().take() else {
            return Err(VoiceError::fehlbedienung("connect() bereits aufgerufen"));
        };
        *self.kontext.kanal.lock() = Some(kanal);
        tracing::info!(kanal = %kanal, server = %self.kontext.zugang.server_id, "Voice-Verbindung wird aufgebaut");

        let actor = SignalingActor::neu(self.kontext.clone(), befehle);
        let handle = self.kontext.runtime.spawn(actor.ausfuehren());
        *self.kontext.actor.lock() = Some(handle);
        Ok(())
    }

    /// Schliesst die Session
    ///
    /// Serialisiert mit Reconnect-Entscheidungen ueber das Verbindungs-Lock.
    pub async fn close(&self, grund: CloseReason) {
        let _lock = self.kontext.verbindungs_lock.lock().await;
        self.kontext.schliessen_intern(grund);
    }

    pub fn set_auto_reconnect(&self, aktiv: bool) {
        self.kontext.auto_reconnect.store(aktiv, Ordering::Release);
    }

    /// Setzt die Sprech-Flags fuer Speaking-Nachrichten
    pub fn set_speaking_mode(&self, modus: SprechModus) -> VoiceResult<()> {
        if modus == SprechModus::AUS {
            return Err(VoiceError::fehlbedienung("Sprechmodus ohne Flags"));
        }
        self.kontext.sprech_modus_setzen(modus);
        let _ = self.kontext.befehl_tx.send(SignalBefehl::SprechModus(modus));
        Ok(())
    }

    /// Setzt die Audioquelle, eine bestehende wird ersetzt
    pub fn attach_source(&self, quelle: Arc<dyn AudioSource>) -> VoiceResult<()> {
        if self.kontext.ist_beendet() {
            return Err(VoiceError::SessionGeschlossen);
        }
        if !quelle.is_pre_encoded() && self.kontext.codec.is_none() {
            return Err(VoiceError::Codec(
                "PCM-Quelle benoetigt einen Opus-Codec".into(),
            ));
        }
        {
            let mut p = self.kontext.pipelines.lock();
            self.kontext.sender_stoppen(&mut p);
        }
        *self.kontext.quelle.lock() = Some(quelle);
        self.kontext.pipelines_sicherstellen();
        Ok(())
    }

    pub fn detach_source(&self) {
        let mut p = self.kontext.pipelines.lock();
        self.kontext.sender_stoppen(&mut p);
        *self.kontext.quelle.lock() = None;
    }

    /// Setzt die Audiosenke, eine bestehende wird ersetzt
    pub fn attach_sink(&self, senke: Arc<dyn AudioSink>) -> VoiceResult<()> {
        if self.kontext.ist_beendet() {
            return Err(VoiceError::SessionGeschlossen);
        }
        if self.kontext.codec.is_none() {
            return Err(VoiceError::Codec(
                "Empfang benoetigt einen Opus-Codec".into(),
            ));
        }
        {
            let mut p = self.kontext.pipelines.lock();
            self.kontext.empfang_stoppen(&mut p);
        }
        *self.kontext.senke.lock() = Some(senke);
        self.kontext.pipelines_sicherstellen();
        Ok(())
    }

    pub fn detach_sink(&self) {
        let mut p = self.kontext.pipelines.lock();
        self.kontext.empfang_stoppen(&mut p);
        *self.kontext.senke.lock() = None;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.kontext.status()
    }

    /// Empfaenger fuer Statuswechsel
    pub fn status_beobachten(&self) -> watch::Receiver<ConnectionStatus> {
        self.kontext.status_tx.subscribe()
    }

    pub fn statistik(&self) -> StatistikSnapshot {
        self.kontext.statistik.snapshot()
    }

    pub fn kanal(&self) -> Option<ChannelId> {
        *self.kontext.kanal.lock()
    }

    /// Eigene SSRC der aktuellen Verbindung
    pub fn ssrc(&self) -> Option<u32> {
        self.kontext.eigene_ssrc()
    }

    /// Registry der entfernten Sprecher
    pub fn registry(&self) -> &SsrcRegistry {
        &self.kontext.registry
    }
}

impl Drop for VoiceSession {
    fn drop(&mut self) {
        self.kontext.schliessen_intern(CloseReason::Normal);
    }
}

impl std::fmt::Debug for VoiceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoiceSession")
            .field("status", &self.status())
            .field("kanal", &self.kanal())
            .finish()
    }
}

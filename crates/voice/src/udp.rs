//! UDP-Transport zum Voice-Relay
//!
//! Besitzt den UDP-Socket einer Verbindung und uebernimmt:
//!
//! ```text
//! discovery()        70-Byte-Anfrage mit eigener SSRC -> externe IP/Port
//! keep_alive_loop()  9-Byte-Marker im Heartbeat-Intervall (NAT-Bindung)
//! senden()           fertige RTP-Pakete an das Relay
//! empfangen()        rohe Pakete vom Relay (mit Timeout)
//! ```
//!
//! Der Socket wird zwischen Sende- und Empfangspipeline geteilt und nur
//! vom Orchestrator beim (Re-)Connect ersetzt.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::mpsc;
use voicelink_core::{VoiceError, VoiceResult};
use voicelink_protocol::discovery::{
    discovery_anfrage, discovery_antwort_parsen, DISCOVERY_PAKET_LAENGE, KEEP_ALIVE,
};

use crate::signaling::SignalBefehl;

/// Empfangspuffer: groesser als jedes Opus-Paket plus Header und Nonce
pub const UDP_PUFFER_GROESSE: usize = 4096;

/// UDP-Socket einer Voice-Verbindung
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
    relay: SocketAddr,
}

impl UdpTransport {
    /// Bindet einen lokalen Socket passend zur Adressfamilie des Relays
    pub async fn verbinden(relay: SocketAddr) -> VoiceResult<Self> {
        let lokal: SocketAddr = if relay.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(lokal).await?;
        tracing::debug!(
            lokal = ?socket.local_addr().ok(),
            relay = %relay,
            "UDP-Socket gebunden"
        );
        Ok(Self { socket, relay })
    }

    /// Loest die Relay-Adresse aus dem Ready-Payload auf
    pub async fn relay_aufloesen(ip: &str, port: u16) -> VoiceResult<SocketAddr> {
        lookup_host((ip, port))
            .await
            .map_err(|e| VoiceError::Verbindung(format!("Relay {ip}:{port} nicht aufloesbar: {e}")))?
            .next()
            .ok_or_else(|| VoiceError::Verbindung(format!("Relay {ip}:{port} ohne Adresse")))
    }

    pub fn relay(&self) -> SocketAddr {
        self.relay
    }

    pub fn lokale_adresse(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Ermittelt die externe Adresse (Hole Punching)
    ///
    /// Sendet bis zu `versuche` Anfragen und wartet jeweils `timeout` auf
    /// eine Antwort. Antworten mit falscher Laenge zaehlen als Fehlversuch.
    pub async fn discovery(
        &self,
        ssrc: u32,
        versuche: u32,
        timeout: Duration,
    ) -> VoiceResult<SocketAddr> {
        let anfrage = discovery_anfrage(ssrc);
        let mut puffer = [0u8; UDP_PUFFER_GROESSE];

        for versuch in 1..=versuche {
            if let Err(e) = self.socket.send_to(&anfrage, self.relay).await {
                tracing::warn!(versuch, fehler = %e, "Discovery-Anfrage fehlgeschlagen");
                continue;
            }

            match tokio::time::timeout(timeout, self.socket.recv_from(&mut puffer)).await {
                Ok(Ok((laenge, von))) if laenge == DISCOVERY_PAKET_LAENGE => {
                    match discovery_antwort_parsen(&puffer[..laenge]) {
                        Ok(extern_adresse) => {
                            tracing::info!(
                                versuch,
                                extern_adresse = %extern_adresse,
                                relay = %von,
                                "Discovery erfolgreich"
                            );
                            return Ok(extern_adresse);
                        }
                        Err(e) => {
                            tracing::warn!(versuch, fehler = %e, "Discovery-Antwort ungueltig")
                        }
                    }
                }
                Ok(Ok((laenge, _))) => {
                    tracing::debug!(versuch, laenge, "Unerwartetes Paket waehrend Discovery");
                }
                Ok(Err(e)) => tracing::warn!(versuch, fehler = %e, "Discovery-Empfang fehlgeschlagen"),
                Err(_) => tracing::debug!(versuch, "Discovery-Timeout"),
            }
        }

        Err(VoiceError::Discovery { versuche })
    }

    /// Sendet ein fertiges Paket an das Relay
    pub async fn senden(&self, paket: &[u8]) -> io::Result<usize> {
        self.socket.send_to(paket, self.relay).await
    }

    /// Empfaengt ein Paket; `Ok(None)` bei Timeout
    pub async fn empfangen(
        &self,
        puffer: &mut [u8],
        timeout: Duration,
    ) -> io::Result<Option<usize>> {
        match tokio::time::timeout(timeout, self.socket.recv_from(puffer)).await {
            Ok(Ok((laenge, _))) => Ok(Some(laenge)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    pub async fn keep_alive_senden(&self) -> io::Result<()> {
        self.socket.send_to(&KEEP_ALIVE, self.relay).await.map(|_| ())
    }
}

/// Routing-Fehler, die als Verbindungsverlust gelten
pub fn ist_routing_fehler(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::HostUnreachable | io::ErrorKind::NetworkUnreachable
    )
}

/// Sendet periodisch den Keep-Alive-Marker
///
/// Ein Routing-Fehler meldet den Verbindungsverlust an den Signaling-Actor
/// und beendet den Task.
pub async fn keep_alive_loop(
    transport: Arc<UdpTransport>,
    intervall: Duration,
    abbruch: Arc<AtomicBool>,
    befehle: mpsc::UnboundedSender<SignalBefehl>,
) {
    let mut takt = tokio::time::interval(intervall);
    takt.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        takt.tick().await;
        if abbruch.load(Ordering::Acquire) {
            break;
        }
        let ergebnis = transport.keep_alive_senden().await;
        if !keep_alive_auswerten(ergebnis, transport.relay(), &befehle) {
            break;
        }
    }
    tracing::debug!("Keep-Alive-Task beendet");
}

/// Wertet einen Keep-Alive aus, `false` beendet den Task
fn keep_alive_auswerten(
    ergebnis: io::Result<()>,
    relay: SocketAddr,
    befehle: &mpsc::UnboundedSender<SignalBefehl>,
) -> bool {
    match ergebnis {
        Ok(()) => {
            tracing::trace!(relay = %relay, "Keep-Alive gesendet");
            true
        }
        Err(e) if ist_routing_fehler(&e) => {
            tracing::warn!(fehler = %e, relay = %relay, "Keep-Alive: Relay nicht erreichbar");
            let _ = befehle.send(SignalBefehl::VerbindungVerloren(e.to_string()));
            false
        }
        Err(e) => {
            tracing::debug!(fehler = %e, "Keep-Alive fehlgeschlagen");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicelink_protocol::discovery::discovery_antwort;

    #[tokio::test]
    async fn discovery_gegen_lokales_relay() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let relay_addr = relay.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 128];
            let (n, von) = relay.recv_from(&mut buf).await.unwrap();
            assert_eq!(n, DISCOVERY_PAKET_LAENGE);
            assert_eq!(&buf[..4], &42u32.to_be_bytes());
            relay.send_to(&discovery_antwort(42, von), von).await.unwrap();
        });

        let transport = UdpTransport::verbinden(relay_addr).await.unwrap();
        let lokal = transport.lokale_adresse().unwrap();
        let extern_adresse = transport
            .discovery(42, 3, Duration::from_millis(500))
            .await
            .unwrap();
        assert_eq!(extern_adresse.port(), lokal.port());
    }

    #[tokio::test]
    async fn discovery_gibt_nach_versuchen_auf() {
        // Relay, das nie antwortet
        let stumm = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = UdpTransport::verbinden(stumm.local_addr().unwrap())
            .await
            .unwrap();

        let err = transport
            .discovery(1, 2, Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, VoiceError::Discovery { versuche: 2 }));
    }

    #[tokio::test]
    async fn keep_alive_marker_kommt_an() {
        let relay = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let transport = Arc::new(
            UdpTransport::verbinden(relay.local_addr().unwrap())
                .await
                .unwrap(),
        );
        let abbruch = Arc::new(AtomicBool::new(false));
        let (tx, _rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(keep_alive_loop(
            transport,
            Duration::from_millis(10),
            abbruch.clone(),
            tx,
        ));

        let mut buf = [0u8; 32];
        let (n, _) = relay.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &KEEP_ALIVE);

        abbruch.store(true, Ordering::Release);
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn routing_fehler_erkennung() {
        assert!(ist_routing_fehler(&io::Error::from(io::ErrorKind::HostUnreachable)));
        assert!(!ist_routing_fehler(&io::Error::from(io::ErrorKind::TimedOut)));
    }

    #[test]
    fn routing_fehler_meldet_verbindungsverlust() {
        let relay: SocketAddr = "127.0.0.1:50000".parse().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert!(keep_alive_auswerten(Ok(()), relay, &tx));
        assert!(keep_alive_auswerten(
            Err(io::Error::from(io::ErrorKind::TimedOut)),
            relay,
            &tx
        ));
        assert!(rx.try_recv().is_err());

        assert!(!keep_alive_auswerten(
            Err(io::Error::from(io::ErrorKind::NetworkUnreachable)),
            relay,
            &tx
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(SignalBefehl::VerbindungVerloren(_))
        ));
    }
}

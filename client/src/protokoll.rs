//! Darstellung der Sitzungs-Ereignisse im Log
//!
//! Statusleiste, Kanal-Log und SDP-Anzeige der Bedienoberflaeche werden im
//! Konsolen-Client zu tracing-Zeilen.

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Level};
use voicelink_core::SessionEvent;

/// Log-Stufe eines Ereignisses
pub fn stufe(event: &SessionEvent) -> Level {
    match event {
        SessionEvent::Fehler { .. } => Level::ERROR,
        SessionEvent::HostNichtErreichbar
        | SessionEvent::UngueltigeNachricht { .. }
        | SessionEvent::KanalGeschlossen
        | SessionEvent::StreamGeschlossen
        | SessionEvent::StreamAbbruch => Level::WARN,
        SessionEvent::AngebotGesendet { .. }
        | SessionEvent::AntwortEmpfangen { .. }
        | SessionEvent::PeerZustand(_)
        | SessionEvent::Latenz { .. }
        | SessionEvent::WiedergabeBeendet { .. } => Level::DEBUG,
        _ => Level::INFO,
    }
}

/// Schreibt ein Ereignis ins Log
pub fn protokollieren(event: &SessionEvent) {
    match event {
        SessionEvent::VersuchZustand { versuch, zustand } => {
            info!(versuch = %versuch, "Status: {}", zustand)
        }
        SessionEvent::HostNichtErreichbar => warn!("Host nicht erreichbar"),
        SessionEvent::Fehler {
            versuch,
            art,
            meldung,
        } => error!(versuch = ?versuch, art = ?art, "{}", meldung),
        SessionEvent::AngebotGesendet { sdp } => debug!("Angebot:\n{}", sdp),
        SessionEvent::AntwortEmpfangen { sdp } => debug!("Antwort:\n{}", sdp),
        SessionEvent::PeerZustand(z) => debug!(
            verbindung = ?z.connection,
            ice = ?z.ice_connection,
            sammlung = ?z.ice_gathering,
            signalisierung = ?z.signaling,
            "Peer-Zustand"
        ),
        SessionEvent::SpurEmpfangen { art, id } => info!(art = %art, id = %id, "Spur empfangen"),
        SessionEvent::KanalGeoeffnet => info!("Kanal offen"),
        SessionEvent::KanalGeschlossen => warn!("Kanal geschlossen"),
        SessionEvent::Latenz { rtt_ms } => debug!(rtt_ms, "Latenz"),
        SessionEvent::NachrichtEmpfangen { ts, role, content } => {
            info!(ts, "< {}: {}", role, content)
        }
        SessionEvent::TextEmpfangen { text } => info!("< {}", text),
        SessionEvent::KommandoGesendet { name } => info!("> {}", name),
        SessionEvent::UngueltigeNachricht { grund } => warn!("Nachricht verworfen: {}", grund),
        SessionEvent::StreamVerbunden => info!("WebSocket verbunden"),
        SessionEvent::StreamGeschlossen => warn!("WebSocket geschlossen"),
        SessionEvent::MikrofonBereit => info!("Mikrofon bereit"),
        SessionEvent::StreamStatus { text } => info!("Status: {}", text),
        SessionEvent::StreamAntwort { text } => info!("Antwort: {}", text),
        SessionEvent::StreamAnfrage { text } => info!("Anfrage: {}", text),
        SessionEvent::StreamAbbruch => warn!("Antwort abgebrochen"),
        SessionEvent::WiedergabeBeendet { verbleibend } => {
            debug!(verbleibend, "Wiedergabe beendet")
        }
    }
}

/// Startet den Task der alle Ereignisse des Empfaengers protokolliert
pub fn starten(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => protokollieren(&event),
                Err(RecvError::Lagged(n)) => warn!(verpasst = n, "Ereignisse uebersprungen"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

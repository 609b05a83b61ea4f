//! Ereignis-Bus der Sitzung
//!
//! Alles, was der Bediener sehen soll (Statuszeilen, Kanal-Log, SDP-Anzeige),
//! fliesst als `SessionEvent` ueber einen tokio-Broadcast-Kanal. Die
//! Darstellung uebernimmt der Abonnent (im Binary: tracing).

use crate::error::FehlerArt;
use crate::types::{AttemptId, AttemptState, PeerStates};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Standard-Kapazitaet des Broadcast-Kanals
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Alle Ereignisse die eine Sitzung nach aussen meldet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "snake_case")]
pub enum SessionEvent {
    // --- Versuchs-Ereignisse ---
    /// Ein Verbindungsversuch hat seinen Zustand gewechselt
    VersuchZustand {
        versuch: AttemptId,
        zustand: AttemptState,
    },
    /// Erreichbarkeitspruefung negativ, kein Versuch gestartet
    HostNichtErreichbar,
    /// Fehler innerhalb eines Versuchs (wird dem Bediener angezeigt)
    Fehler {
        versuch: Option<AttemptId>,
        art: FehlerArt,
        meldung: String,
    },

    // --- Verhandlung ---
    /// Das tatsaechlich gesendete Angebot (ggf. gefiltert)
    AngebotGesendet { sdp: String },
    /// Die Antwort der Gegenstelle
    AntwortEmpfangen { sdp: String },
    /// Peer-Zustaende haben sich geaendert (oder synthetische Nachmeldung)
    PeerZustand(PeerStates),
    /// Gegenstelle hat eine Medien-Spur geliefert
    SpurEmpfangen { art: String, id: String },

    // --- Steuerkanal ---
    /// Steuerkanal ist offen
    KanalGeoeffnet,
    /// Steuerkanal wurde geschlossen
    KanalGeschlossen,
    /// Round-Trip-Zeit aus Ping/Pong
    Latenz { rtt_ms: u64 },
    /// Strukturierte Nachricht der Gegenstelle
    NachrichtEmpfangen {
        ts: i64,
        role: String,
        content: String,
    },
    /// Unstrukturierter Text der Gegenstelle
    TextEmpfangen { text: String },
    /// Kommando an die Gegenstelle gesendet
    KommandoGesendet { name: String },
    /// Nachricht konnte nicht gelesen werden
    UngueltigeNachricht { grund: String },

    // --- Streaming (WebSocket) ---
    /// WebSocket verbunden
    StreamVerbunden,
    /// WebSocket geschlossen
    StreamGeschlossen,
    /// Mikrofon fuer die Aufnahme bereit
    MikrofonBereit,
    /// Statuszeile vom Server
    StreamStatus { text: String },
    /// Antwort des Servers
    StreamAntwort { text: String },
    /// Erkannte Anfrage des Benutzers
    StreamAnfrage { text: String },
    /// Server hat die laufende Antwort abgebrochen
    StreamAbbruch,

    // --- Wiedergabe ---
    /// Warteschlange leergelaufen
    WiedergabeBeendet { verbleibend: usize },
}

/// Broadcast-basierter Ereignis-Bus
///
/// Klonbar; alle Klone senden in denselben Kanal. Senden ohne Abonnenten
/// ist kein Fehler.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Erstellt einen neuen Bus mit Standard-Kapazitaet
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Erstellt einen neuen Bus mit gegebener Kapazitaet
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Sendet ein Ereignis an alle Abonnenten
    pub fn senden(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("Ereignis ohne Abonnenten verworfen");
        }
    }

    /// Abonniert alle zukuenftigen Ereignisse
    pub fn abonnieren(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ist_serde_kompatibel() {
        let event = SessionEvent::VersuchZustand {
            versuch: AttemptId::new(),
            zustand: AttemptState::Connecting,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"typ\":\"versuch_zustand\""));
        let zurueck: SessionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(zurueck, event);
    }

    #[tokio::test]
    async fn bus_verteilt_an_alle_abonnenten() {
        let bus = EventBus::new();
        let mut a = bus.abonnieren();
        let mut b = bus.abonnieren();

        bus.senden(SessionEvent::KanalGeoeffnet);

        assert_eq!(a.recv().await.unwrap(), SessionEvent::KanalGeoeffnet);
        assert_eq!(b.recv().await.unwrap(), SessionEvent::KanalGeoeffnet);
    }

    #[test]
    fn senden_ohne_abonnenten_ist_ok() {
        let bus = EventBus::new();
        bus.senden(SessionEvent::HostNichtErreichbar);
    }
}

//! Gemeinsame Identifikations- und Zustandstypen fuer Voicelink
//!
//! IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! Sitzung und Verbindungsversuch zur Compilezeit auszuschliessen.
//! Die Zustands-Enums spiegeln die Zustaende der Peer-Connection wider,
//! unabhaengig davon welche Implementierung sie liefert.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eindeutige Sitzungs-ID (eine pro `Session`-Objekt)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Erstellt eine neue zufaellige SessionId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Eindeutige ID eines Verbindungsversuchs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Erstellt eine neue zufaellige AttemptId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Versuchs-Zustand
// ---------------------------------------------------------------------------

/// Lebenszyklus eines Verbindungsversuchs
///
/// ```text
/// Idle -> Connecting -> Connected -> Closing -> Closed
///              |            |
///              +-> Failed <-+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    /// Angelegt, Verhandlung noch nicht begonnen
    Idle,
    /// Medien werden angefordert und Offer/Answer ausgetauscht
    Connecting,
    /// Antwort angewendet, Steuerkanal aktiv
    Connected,
    /// Abbau laeuft
    Closing,
    /// Vollstaendig abgebaut
    Closed,
    /// Abgebrochen wegen Fehler
    Failed,
}

impl AttemptState {
    /// Versuch ist beendet und darf ersetzt werden
    pub fn ist_beendet(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Versuch darf vom Supervisor durch einen neuen ersetzt werden
    pub fn ist_ersetzbar(self) -> bool {
        matches!(self, Self::Closed | Self::Failed | Self::Idle)
    }
}

impl std::fmt::Display for AttemptState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Peer-Zustaende
// ---------------------------------------------------------------------------

/// Fortschritt der ICE-Kandidatensammlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceGatheringState {
    #[default]
    New,
    Gathering,
    Complete,
}

/// Zustand der ICE-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IceConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

/// Gesamtzustand der Peer-Connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// Verbindung ist endgueltig weg
    pub fn ist_beendet(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Zustand der Offer/Answer-Signalisierung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// Momentaufnahme aller Peer-Zustaende
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PeerStates {
    pub connection: PeerConnectionState,
    pub ice_connection: IceConnectionState,
    pub ice_gathering: IceGatheringState,
    pub signaling: SignalingState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_id_eindeutig() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b, "Zwei neue AttemptIds muessen verschieden sein");
    }

    #[test]
    fn session_id_display() {
        let id = SessionId(Uuid::nil());
        assert!(id.to_string().starts_with("session:"));
    }

    #[test]
    fn ersetzbare_zustaende() {
        assert!(AttemptState::Failed.ist_ersetzbar());
        assert!(AttemptState::Closed.ist_ersetzbar());
        assert!(AttemptState::Idle.ist_ersetzbar());
        assert!(!AttemptState::Connecting.ist_ersetzbar());
        assert!(!AttemptState::Connected.ist_ersetzbar());
        assert!(!AttemptState::Closing.ist_ersetzbar());
    }

    #[test]
    fn zustaende_serialisieren_snake_case() {
        let json = serde_json::to_string(&SignalingState::HaveLocalOffer).unwrap();
        assert_eq!(json, "\"have_local_offer\"");
        let json = serde_json::to_string(&AttemptState::Connected).unwrap();
        assert_eq!(json, "\"connected\"");
    }
}

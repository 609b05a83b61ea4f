//! Plattform-Faehigkeiten
//!
//! Die Sitzungslogik kennt weder WebRTC-Bibliothek noch Audiogeraet. Alles
//! was sie von der Plattform braucht, steht hier als Trait:
//!
//! | Trait                | Aufgabe                                        |
//! |----------------------|------------------------------------------------|
//! | `PeerConnector`      | erzeugt pro Verbindungsversuch eine Verbindung |
//! | `PeerConnection`     | Offer/Answer, Spuren, Datenkanal, Zustaende    |
//! | `DataChannel`        | Text/Binaer senden, Ereignisse empfangen       |
//! | `MediaCapture`       | Geraete auflisten, Mikrofon anfordern          |
//! | `MediaRecorder`      | Aufnahme in Zeitscheiben (Streaming-Variante)  |
//! | `SignalingTransport` | Offer gegen Answer tauschen                    |
//! | `LivenessProbe`      | Erreichbarkeit des Hosts pruefen               |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use voicelink_audio::{CaptureDevice, MediaConstraints};
use voicelink_core::{PeerStates, Result};
use voicelink_protocol::SessionDescription;

// ---------------------------------------------------------------------------
// Peer-Verbindung
// ---------------------------------------------------------------------------

/// Erzeugt neue Peer-Verbindungen
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>>;
}

/// Eine Peer-Verbindung (ein Verbindungsversuch)
#[async_trait]
pub trait PeerConnection: Send + Sync {
    /// Erstellt ein lokales Angebot
    async fn create_offer(&self) -> Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()>;

    /// Aktuelle lokale Beschreibung inkl. gesammelter Kandidaten
    async fn local_description(&self) -> Option<SessionDescription>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()>;

    /// Fuegt eine lokale Spur hinzu
    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()>;

    async fn create_data_channel(
        &self,
        options: &DataChannelOptions,
    ) -> Result<Arc<dyn DataChannel>>;

    /// Alle Peer-Zustaende; der Empfaenger sieht immer den aktuellen Stand
    fn states(&self) -> watch::Receiver<PeerStates>;

    /// Naechste Spur der Gegenstelle; `None` wenn die Verbindung zu ist
    async fn next_remote_track(&self) -> Option<RemoteTrack>;

    /// Stoppt alle Transceiver
    async fn stop_transceivers(&self);

    async fn close(&self) -> Result<()>;
}

/// Eine von der Gegenstelle gelieferte Spur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub kind: String,
    pub id: String,
}

// ---------------------------------------------------------------------------
// Datenkanal
// ---------------------------------------------------------------------------

/// Parameter beim Anlegen des Datenkanals
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataChannelOptions {
    pub label: String,
    pub ordered: bool,
}

impl Default for DataChannelOptions {
    fn default() -> Self {
        Self {
            label: "chat".into(),
            ordered: true,
        }
    }
}

/// Nutzlast einer Datenkanal-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelMessage {
    Text(String),
    Binary(Bytes),
}

/// Ereignis auf dem Datenkanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Open,
    Message(ChannelMessage),
    Close,
}

#[async_trait]
pub trait DataChannel: Send + Sync {
    fn label(&self) -> &str;

    fn is_open(&self) -> bool;

    async fn send_text(&self, text: &str) -> Result<()>;

    async fn send_binary(&self, data: Bytes) -> Result<()>;

    /// Naechstes Ereignis; `None` nach `Close`
    async fn recv(&self) -> Option<ChannelEvent>;

    async fn close(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Medien
// ---------------------------------------------------------------------------

/// Ein kodierter Medien-Block einer lokalen Spur
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSample {
    pub data: Bytes,
    pub duration: Duration,
}

/// Eine lokale Aufnahme-Spur
#[async_trait]
pub trait LocalTrack: Send + Sync {
    fn id(&self) -> &str;

    /// "audio" oder "video"
    fn kind(&self) -> &str;

    /// Naechster Block; `None` nachdem die Spur gestoppt wurde
    async fn next_sample(&self) -> Option<MediaSample>;

    fn stop(&self);

    fn is_stopped(&self) -> bool;
}

/// Ergebnis einer Medien-Anforderung
#[derive(Clone, Default)]
pub struct LocalStream {
    pub tracks: Vec<Arc<dyn LocalTrack>>,
}

impl LocalStream {
    pub fn new(tracks: Vec<Arc<dyn LocalTrack>>) -> Self {
        Self { tracks }
    }

    /// Stoppt alle Spuren
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl std::fmt::Debug for LocalStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStream")
            .field("tracks", &self.tracks.len())
            .finish()
    }
}

#[async_trait]
pub trait MediaCapture: Send + Sync {
    /// Listet die Audio-Eingaenge
    async fn devices(&self) -> Result<Vec<CaptureDevice>>;

    /// Fordert das Mikrofon an; Verweigerung ist `VoicelinkError::Medien`
    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream>;
}

/// Nimmt eine Spur in Zeitscheiben auf
#[async_trait]
pub trait MediaRecorder: Send + Sync {
    /// Startet die Aufnahme; jede Zeitscheibe kommt als ein Chunk
    async fn start(&self, stream: &LocalStream, timeslice: Duration) -> Result<mpsc::Receiver<Bytes>>;

    async fn stop(&self);

    fn is_recording(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Netzwerk
// ---------------------------------------------------------------------------

/// Tauscht ein Angebot gegen die Antwort der Gegenstelle
#[async_trait]
pub trait SignalingTransport: Send + Sync {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription>;
}

/// Prueft ob der Host erreichbar ist
///
/// Ueberschreitet die Pruefung `timeout`, gilt der Host als nicht erreichbar.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn is_up(&self, timeout: Duration) -> bool;
}

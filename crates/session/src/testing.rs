//! In-Memory-Faelschungen aller Plattform-Faehigkeiten
//!
//! Nur mit Feature `test-util` (oder in Unit-Tests) verfuegbar. Jede
//! Faelschung zeichnet auf, was mit ihr gemacht wurde, und laesst sich von
//! aussen steuern (Kanal oeffnen, Gegenstelle schliessen, Probe umschalten).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use voicelink_audio::{AudioFrame, AudioResult, AudioSink, CaptureDevice, MediaConstraints};
use voicelink_core::{
    IceConnectionState, IceGatheringState, PeerConnectionState, PeerStates, Result,
    SignalingState, VoicelinkError,
};
use voicelink_protocol::SessionDescription;

use crate::capabilities::{
    ChannelEvent, ChannelMessage, DataChannel, DataChannelOptions, LivenessProbe, LocalStream,
    LocalTrack, MediaCapture, MediaRecorder, MediaSample, PeerConnection, PeerConnector,
    RemoteTrack, SignalingTransport,
};

/// Minimales Angebot mit einem Audio-Abschnitt
pub const FAKE_OFFER: &str = "v=0\r\n\
o=- 0 0 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=rtpmap:0 PCMU/8000\r\n\
m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n";

// ---------------------------------------------------------------------------
// Datenkanal
// ---------------------------------------------------------------------------

pub struct FakeDataChannel {
    label: String,
    offen: AtomicBool,
    geschlossen: AtomicBool,
    gesendet: Mutex<Vec<ChannelMessage>>,
    tx: mpsc::UnboundedSender<ChannelEvent>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelEvent>>,
}

impl FakeDataChannel {
    pub fn new(label: &str) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            label: label.to_string(),
            offen: AtomicBool::new(false),
            geschlossen: AtomicBool::new(false),
            gesendet: Mutex::new(Vec::new()),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        })
    }

    /// Kanal geht auf (wie nach erfolgreichem DTLS/SCTP)
    pub fn oeffnen(&self) {
        if !self.offen.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ChannelEvent::Open);
        }
    }

    pub fn eingang_text(&self, text: &str) {
        let _ = self
            .tx
            .send(ChannelEvent::Message(ChannelMessage::Text(text.to_string())));
    }

    pub fn eingang_binaer(&self, daten: Bytes) {
        let _ = self
            .tx
            .send(ChannelEvent::Message(ChannelMessage::Binary(daten)));
    }

    /// Gegenstelle schliesst den Kanal
    pub fn gegenstelle_schliesst(&self) {
        self.schliessen();
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }

    pub fn gesendete_texte(&self) -> Vec<String> {
        self.gesendet
            .lock()
            .iter()
            .filter_map(|m| match m {
                ChannelMessage::Text(t) => Some(t.clone()),
                ChannelMessage::Binary(_) => None,
            })
            .collect()
    }

    fn schliessen(&self) {
        self.offen.store(false, Ordering::SeqCst);
        if !self.geschlossen.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(ChannelEvent::Close);
        }
    }
}

#[async_trait]
impl DataChannel for FakeDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.offen.load(Ordering::SeqCst)
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        if !self.is_open() {
            return Err(VoicelinkError::KanalNichtOffen(self.label.clone()));
        }
        self.gesendet
            .lock()
            .push(ChannelMessage::Text(text.to_string()));
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(VoicelinkError::KanalNichtOffen(self.label.clone()));
        }
        self.gesendet.lock().push(ChannelMessage::Binary(data));
        Ok(())
    }

    async fn recv(&self) -> Option<ChannelEvent> {
        self.rx.lock().await.recv().await
    }

    async fn close(&self) -> Result<()> {
        self.schliessen();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Peer-Verbindung
// ---------------------------------------------------------------------------

pub struct FakePeerConnection {
    angebot: String,
    automatisch: bool,
    lokal: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    zustaende: Mutex<Option<watch::Sender<PeerStates>>>,
    spuren: Mutex<Vec<Arc<dyn LocalTrack>>>,
    kanaele: Mutex<Vec<Arc<FakeDataChannel>>>,
    transceiver_gestoppt: AtomicBool,
    geschlossen: AtomicBool,
    remote_tx: mpsc::UnboundedSender<RemoteTrack>,
    remote_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteTrack>>,
}

impl FakePeerConnection {
    /// Verbindung, deren Zustaende nur von aussen gesetzt werden
    pub fn new(angebot: &str) -> Arc<Self> {
        Self::erstellen(angebot, false)
    }

    /// Verbindung, die sich wie eine gutwillige Gegenstelle verhaelt:
    /// ICE-Sammlung endet sofort, nach der Antwort ist alles verbunden und
    /// der Datenkanal offen
    pub fn automatisch(angebot: &str) -> Arc<Self> {
        Self::erstellen(angebot, true)
    }

    fn erstellen(angebot: &str, automatisch: bool) -> Arc<Self> {
        let (tx, _) = watch::channel(PeerStates::default());
        let (remote_tx, remote_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            angebot: angebot.to_string(),
            automatisch,
            lokal: Mutex::new(None),
            remote: Mutex::new(None),
            zustaende: Mutex::new(Some(tx)),
            spuren: Mutex::new(Vec::new()),
            kanaele: Mutex::new(Vec::new()),
            transceiver_gestoppt: AtomicBool::new(false),
            geschlossen: AtomicBool::new(false),
            remote_tx,
            remote_rx: tokio::sync::Mutex::new(remote_rx),
        })
    }

    fn aendern(&self, f: impl FnOnce(&mut PeerStates)) {
        if let Some(tx) = self.zustaende.lock().as_ref() {
            tx.send_modify(f);
        }
    }

    pub fn set_gathering(&self, zustand: IceGatheringState) {
        self.aendern(|s| s.ice_gathering = zustand);
    }

    pub fn set_connection(&self, zustand: PeerConnectionState) {
        self.aendern(|s| s.connection = zustand);
    }

    /// Verwirft den Zustands-Sender; wartende Empfaenger sehen das Ende
    pub fn zustaende_beenden(&self) {
        self.zustaende.lock().take();
    }

    /// Gegenstelle liefert eine Spur
    pub fn remote_spur(&self, kind: &str, id: &str) {
        let _ = self.remote_tx.send(RemoteTrack {
            kind: kind.to_string(),
            id: id.to_string(),
        });
    }

    pub fn local_sdp(&self) -> Option<String> {
        self.lokal.lock().as_ref().map(|d| d.sdp.clone())
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn kanal(&self, index: usize) -> Option<Arc<FakeDataChannel>> {
        self.kanaele.lock().get(index).cloned()
    }

    pub fn spuren(&self) -> Vec<Arc<dyn LocalTrack>> {
        self.spuren.lock().clone()
    }

    pub fn transceiver_gestoppt(&self) -> bool {
        self.transceiver_gestoppt.load(Ordering::SeqCst)
    }

    pub fn ist_geschlossen(&self) -> bool {
        self.geschlossen.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        if self.ist_geschlossen() {
            return Err(VoicelinkError::Verbindung("geschlossen".into()));
        }
        Ok(SessionDescription::offer(self.angebot.clone()))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        *self.lokal.lock() = Some(desc);
        let automatisch = self.automatisch;
        self.aendern(|s| {
            s.signaling = SignalingState::HaveLocalOffer;
            if automatisch {
                s.ice_gathering = IceGatheringState::Complete;
            } else if s.ice_gathering == IceGatheringState::New {
                s.ice_gathering = IceGatheringState::Gathering;
            }
        });
        Ok(())
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.lokal.lock().clone()
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        *self.remote.lock() = Some(desc);
        let automatisch = self.automatisch;
        self.aendern(|s| {
            s.signaling = SignalingState::Stable;
            if automatisch {
                s.ice_connection = IceConnectionState::Connected;
                s.connection = PeerConnectionState::Connected;
            }
        });
        if self.automatisch {
            let kanaele = self.kanaele.lock().clone();
            for kanal in kanaele {
                kanal.oeffnen();
            }
        }
        Ok(())
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        self.spuren.lock().push(track);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        options: &DataChannelOptions,
    ) -> Result<Arc<dyn DataChannel>> {
        let kanal = FakeDataChannel::new(&options.label);
        self.kanaele.lock().push(kanal.clone());
        Ok(kanal)
    }

    fn states(&self) -> watch::Receiver<PeerStates> {
        match self.zustaende.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            // Sender schon weg: Empfaenger sieht sofort das Ende
            None => watch::channel(PeerStates::default()).1,
        }
    }

    async fn next_remote_track(&self) -> Option<RemoteTrack> {
        self.remote_rx.lock().await.recv().await
    }

    async fn stop_transceivers(&self) {
        self.transceiver_gestoppt.store(true, Ordering::SeqCst);
    }

    async fn close(&self) -> Result<()> {
        self.geschlossen.store(true, Ordering::SeqCst);
        let kanaele = self.kanaele.lock().clone();
        for kanal in kanaele {
            kanal.schliessen();
        }
        self.aendern(|s| {
            s.connection = PeerConnectionState::Closed;
            s.ice_connection = IceConnectionState::Closed;
            s.signaling = SignalingState::Closed;
        });
        Ok(())
    }
}

/// Liefert pro `create` eine neue automatische Verbindung
pub struct FakeConnector {
    angebot: String,
    verbindungen: Mutex<Vec<Arc<FakePeerConnection>>>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            angebot: FAKE_OFFER.to_string(),
            verbindungen: Mutex::new(Vec::new()),
        })
    }

    /// Anzahl bisher erzeugter Verbindungen
    pub fn erstellt(&self) -> usize {
        self.verbindungen.lock().len()
    }

    pub fn letzte(&self) -> Option<Arc<FakePeerConnection>> {
        self.verbindungen.lock().last().cloned()
    }
}

#[async_trait]
impl PeerConnector for FakeConnector {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>> {
        let pc = FakePeerConnection::automatisch(&self.angebot);
        self.verbindungen.lock().push(pc.clone());
        Ok(pc)
    }
}

// ---------------------------------------------------------------------------
// Medien
// ---------------------------------------------------------------------------

/// Spur die alle 20 ms einen Opus-Stille-Frame liefert
pub struct FakeTrack {
    id: String,
    gestoppt: AtomicBool,
}

impl FakeTrack {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            gestoppt: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &str {
        "audio"
    }

    async fn next_sample(&self) -> Option<MediaSample> {
        if self.is_stopped() {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        Some(MediaSample {
            data: Bytes::from_static(&[0xF8, 0xFF, 0xFE]),
            duration: Duration::from_millis(20),
        })
    }

    fn stop(&self) {
        self.gestoppt.store(true, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.gestoppt.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct FakeCapture {
    verweigern: AtomicBool,
    anforderungen: Mutex<Vec<MediaConstraints>>,
    spuren: Mutex<Vec<Arc<FakeTrack>>>,
}

impl FakeCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Naechste Anforderungen schlagen fehl (wie "Permission denied")
    pub fn set_verweigern(&self, verweigern: bool) {
        self.verweigern.store(verweigern, Ordering::SeqCst);
    }

    pub fn anforderungen(&self) -> Vec<MediaConstraints> {
        self.anforderungen.lock().clone()
    }

    /// Alle bisher ausgegebenen Spuren
    pub fn spuren(&self) -> Vec<Arc<FakeTrack>> {
        self.spuren.lock().clone()
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn devices(&self) -> Result<Vec<CaptureDevice>> {
        Ok(vec![
            CaptureDevice::new("default", Some("Standard"), 0),
            CaptureDevice::new("usb-1", None, 1),
        ])
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        self.anforderungen.lock().push(constraints.clone());
        if self.verweigern.load(Ordering::SeqCst) {
            return Err(VoicelinkError::medien("Zugriff verweigert"));
        }
        let nummer = self.spuren.lock().len();
        let spur = FakeTrack::new(&format!("mic-{nummer}"));
        self.spuren.lock().push(spur.clone());
        Ok(LocalStream::new(vec![spur]))
    }
}

/// Rekorder, dessen Chunks der Test selbst einspeist
#[derive(Default)]
pub struct FakeRecorder {
    tx: Mutex<Option<mpsc::Sender<Bytes>>>,
    zeitscheiben: Mutex<Vec<Duration>>,
}

impl FakeRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Speist einen Chunk ein, false wenn nicht aufgenommen wird
    pub async fn chunk(&self, daten: &'static [u8]) -> bool {
        let tx = self.tx.lock().clone();
        match tx {
            Some(tx) => tx.send(Bytes::from_static(daten)).await.is_ok(),
            None => false,
        }
    }

    pub fn zeitscheiben(&self) -> Vec<Duration> {
        self.zeitscheiben.lock().clone()
    }
}

#[async_trait]
impl MediaRecorder for FakeRecorder {
    async fn start(&self, _stream: &LocalStream, timeslice: Duration) -> Result<mpsc::Receiver<Bytes>> {
        let (tx, rx) = mpsc::channel(16);
        *self.tx.lock() = Some(tx);
        self.zeitscheiben.lock().push(timeslice);
        Ok(rx)
    }

    async fn stop(&self) {
        self.tx.lock().take();
    }

    fn is_recording(&self) -> bool {
        self.tx.lock().is_some()
    }
}

// ---------------------------------------------------------------------------
// Netzwerk
// ---------------------------------------------------------------------------

/// Signalisierung die das Angebot als Antwort zurueckspiegelt
pub struct FakeSignaling {
    fehler: Mutex<VecDeque<String>>,
    dauerhaft: Option<String>,
    angebote: Mutex<Vec<SessionDescription>>,
}

impl FakeSignaling {
    pub fn echo() -> Self {
        Self {
            fehler: Mutex::new(VecDeque::new()),
            dauerhaft: None,
            angebote: Mutex::new(Vec::new()),
        }
    }

    /// Jeder Austausch schlaegt fehl
    pub fn fehlerhaft(meldung: &str) -> Self {
        Self {
            dauerhaft: Some(meldung.to_string()),
            ..Self::echo()
        }
    }

    /// Die naechsten `n` Austausche schlagen fehl, danach Echo
    pub fn erst_fehler(n: usize, meldung: &str) -> Self {
        let s = Self::echo();
        s.fehler
            .lock()
            .extend(std::iter::repeat(meldung.to_string()).take(n));
        s
    }

    pub fn angebote(&self) -> Vec<SessionDescription> {
        self.angebote.lock().clone()
    }
}

#[async_trait]
impl SignalingTransport for FakeSignaling {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        self.angebote.lock().push(offer.clone());
        if let Some(meldung) = &self.dauerhaft {
            return Err(VoicelinkError::Verhandlung(meldung.clone()));
        }
        if let Some(meldung) = self.fehler.lock().pop_front() {
            return Err(VoicelinkError::Verhandlung(meldung));
        }
        Ok(SessionDescription::answer(offer.sdp.clone()))
    }
}

/// Umschaltbare Erreichbarkeit; laesst sich anhalten
pub struct FakeProbe {
    erreichbar: AtomicBool,
    aufrufe: AtomicUsize,
    gesperrt: watch::Sender<bool>,
}

impl FakeProbe {
    pub fn new(erreichbar: bool) -> Arc<Self> {
        Arc::new(Self {
            erreichbar: AtomicBool::new(erreichbar),
            aufrufe: AtomicUsize::new(0),
            gesperrt: watch::channel(false).0,
        })
    }

    pub fn set_erreichbar(&self, erreichbar: bool) {
        self.erreichbar.store(erreichbar, Ordering::SeqCst);
    }

    pub fn aufrufe(&self) -> usize {
        self.aufrufe.load(Ordering::SeqCst)
    }

    /// Folgende Pruefungen haengen bis `freigeben()`
    pub fn sperren(&self) {
        self.gesperrt.send_replace(true);
    }

    pub fn freigeben(&self) {
        self.gesperrt.send_replace(false);
    }
}

#[async_trait]
impl LivenessProbe for FakeProbe {
    async fn is_up(&self, _timeout: Duration) -> bool {
        self.aufrufe.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.gesperrt.subscribe();
        let _ = rx.wait_for(|gesperrt| !*gesperrt).await;
        self.erreichbar.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

/// Sink der sofort "fertig" meldet und die Frames aufhebt
#[derive(Default)]
pub struct FakeSink {
    frames: Mutex<Vec<AudioFrame>>,
}

impl FakeSink {
    pub fn frames(&self) -> Vec<AudioFrame> {
        self.frames.lock().clone()
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn play(&self, frame: AudioFrame) -> AudioResult<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

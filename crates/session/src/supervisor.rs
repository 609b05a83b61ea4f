//! Sitzung mit automatischer Wiederverbindung
//!
//! Eine `Session` besitzt hoechstens einen Verbindungsversuch. Ein fester
//! Takt (Standard 3 s) prueft bei gesetztem Wiederverbindungs-Flag, ob der
//! Versuch fehlt oder ersetzt werden darf; dann wird der Host per
//! Erreichbarkeitspruefung abgefragt und bei Erfolg ein neuer Versuch
//! gestartet. Es gibt kein exponentielles Backoff.
//!
//! Lebenszyklus: `create -> start -> stop -> dispose`.
//!
//! Das Flag liegt in einem `AtomicBool`, das `start`/`stop` synchron setzen
//! und jeder Takt frisch liest. Nach `stop()` startet daher kein Takt mehr
//! einen Versuch, auch wenn er gerade parallel feuert.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use voicelink_audio::{CaptureDevice, PlaybackQueue, VolumeControl};
use voicelink_core::{AttemptState, EventBus, Result, SessionEvent, SessionId, VoicelinkError};

use crate::attempt::{AttemptDeps, AttemptHandle};
use crate::capabilities::{LivenessProbe, MediaCapture, PeerConnector, SignalingTransport};
use crate::config::SessionConfig;
use crate::control::sende_kommando;
use crate::negotiation::NegotiationEngine;

/// Plattform-Faehigkeiten einer Sitzung
#[derive(Clone)]
pub struct Faehigkeiten {
    pub connector: Arc<dyn PeerConnector>,
    pub capture: Arc<dyn MediaCapture>,
    pub signaling: Arc<dyn SignalingTransport>,
    pub probe: Arc<dyn LivenessProbe>,
    /// Wiedergabe fuer Binaerrahmen auf dem Steuerkanal
    pub playback: Option<PlaybackQueue>,
}

enum Befehl {
    Start(oneshot::Sender<()>),
    Stop(oneshot::Sender<()>),
    Kommando {
        name: String,
        antwort: oneshot::Sender<Result<()>>,
    },
    Zustand(oneshot::Sender<Option<AttemptState>>),
    Beenden(oneshot::Sender<()>),
}

/// Eine Audio-Sitzung mit Wiederverbindung
pub struct Session {
    id: SessionId,
    befehle: mpsc::Sender<Befehl>,
    reconnect: Arc<AtomicBool>,
    events: EventBus,
    volume: VolumeControl,
    capture: Arc<dyn MediaCapture>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Legt die Sitzung an und startet den Takt; verbunden wird erst mit `start()`
    pub fn create(faehigkeiten: Faehigkeiten, config: SessionConfig, events: EventBus) -> Self {
        let id = SessionId::new();
        let reconnect = Arc::new(AtomicBool::new(false));
        // Derselbe Regler wie in der Wiedergabe
        let volume = faehigkeiten
            .playback
            .as_ref()
            .map(|p| p.volume().clone())
            .unwrap_or_default();
        let (tx, rx) = mpsc::channel(32);

        let deps = AttemptDeps {
            connector: faehigkeiten.connector,
            capture: faehigkeiten.capture.clone(),
            negotiation: NegotiationEngine::new(faehigkeiten.signaling, events.clone()),
            events: events.clone(),
            volume: volume.clone(),
            playback: faehigkeiten.playback,
            config,
        };

        let supervisor = Supervisor {
            deps,
            probe: faehigkeiten.probe,
            reconnect: reconnect.clone(),
            versuch: None,
        };
        let task = tokio::spawn(supervisor.run(rx));
        info!(sitzung = %id, "Sitzung angelegt");

        Self {
            id,
            befehle: tx,
            reconnect,
            events,
            volume,
            capture: faehigkeiten.capture,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Ereignis-Bus der Sitzung
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Lautstaerke-Regler der Wiedergabe
    pub fn volume(&self) -> &VolumeControl {
        &self.volume
    }

    /// Wiederverbindung aktiv?
    pub fn reconnect_enabled(&self) -> bool {
        self.reconnect.load(Ordering::SeqCst)
    }

    /// Aktiviert die Wiederverbindung und verbindet sofort
    pub async fn start(&self) -> Result<()> {
        self.reconnect.store(true, Ordering::SeqCst);
        self.anfrage(Befehl::Start).await
    }

    /// Deaktiviert die Wiederverbindung und baut den Versuch ab
    ///
    /// Idempotent; kehrt zurueck wenn der Versuch geschlossen ist.
    pub async fn stop(&self) -> Result<()> {
        self.reconnect.store(false, Ordering::SeqCst);
        self.anfrage(Befehl::Stop).await
    }

    /// Sendet ein Kommando woertlich ueber den offenen Steuerkanal
    pub async fn send_command(&self, name: &str) -> Result<()> {
        let (antwort, rx) = oneshot::channel();
        self.senden(Befehl::Kommando {
            name: name.to_string(),
            antwort,
        })
        .await?;
        rx.await.map_err(|_| beendet())?
    }

    /// Zustand des aktuellen Versuchs, `None` wenn keiner existiert
    pub async fn attempt_state(&self) -> Result<Option<AttemptState>> {
        self.anfrage(Befehl::Zustand).await
    }

    /// Listet die Audio-Eingaenge
    pub async fn devices(&self) -> Result<Vec<CaptureDevice>> {
        self.capture.devices().await
    }

    /// Stoppt die Sitzung endgueltig; weitere Aufrufe schlagen fehl
    pub async fn dispose(&self) -> Result<()> {
        self.reconnect.store(false, Ordering::SeqCst);
        let ergebnis = self.anfrage(Befehl::Beenden).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(sitzung = %self.id, "Supervisor-Task abgebrochen: {}", e);
            }
        }
        info!(sitzung = %self.id, "Sitzung beendet");
        ergebnis
    }

    async fn anfrage<T>(&self, befehl: impl FnOnce(oneshot::Sender<T>) -> Befehl) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.senden(befehl(tx)).await?;
        rx.await.map_err(|_| beendet())
    }

    async fn senden(&self, befehl: Befehl) -> Result<()> {
        self.befehle.send(befehl).await.map_err(|_| beendet())
    }
}

fn beendet() -> VoicelinkError {
    VoicelinkError::intern("Sitzung bereits beendet")
}

/// Besitzer des aktuellen Versuchs
struct Supervisor {
    deps: AttemptDeps,
    probe: Arc<dyn LivenessProbe>,
    reconnect: Arc<AtomicBool>,
    versuch: Option<AttemptHandle>,
}

impl Supervisor {
    async fn run(mut self, mut befehle: mpsc::Receiver<Befehl>) {
        let periode = self.deps.config.reconnect_intervall();
        let mut takt = interval_at(Instant::now() + periode, periode);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                befehl = befehle.recv() => {
                    let Some(befehl) = befehl else {
                        // Alle Session-Griffe weg
                        self.abbauen().await;
                        break;
                    };
                    if !self.ausfuehren(befehl).await {
                        break;
                    }
                }
                _ = takt.tick() => self.tick().await,
            }
        }
        debug!("Supervisor beendet");
    }

    /// false wenn die Schleife enden soll
    async fn ausfuehren(&mut self, befehl: Befehl) -> bool {
        match befehl {
            Befehl::Start(ack) => {
                if self.ersetzbar() {
                    self.verbinden().await;
                } else {
                    debug!("Start ignoriert, Versuch laeuft bereits");
                }
                let _ = ack.send(());
            }
            Befehl::Stop(ack) => {
                self.abbauen().await;
                let _ = ack.send(());
            }
            Befehl::Kommando { name, antwort } => {
                let _ = antwort.send(self.kommando(&name).await);
            }
            Befehl::Zustand(ack) => {
                let _ = ack.send(self.versuch.as_ref().map(|v| v.zustand()));
            }
            Befehl::Beenden(ack) => {
                self.abbauen().await;
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    async fn tick(&mut self) {
        if !self.reconnect.load(Ordering::SeqCst) {
            return;
        }
        if !self.ersetzbar() {
            return;
        }
        debug!("Takt: kein aktiver Versuch, pruefe Host");
        self.verbinden().await;
    }

    /// Kein Versuch oder der aktuelle ist beendet
    fn ersetzbar(&self) -> bool {
        self.versuch
            .as_ref()
            .map_or(true, |v| v.zustand().ist_ersetzbar())
    }

    async fn verbinden(&mut self) {
        let timeout = self.deps.config.probe_timeout();
        if !self.probe.is_up(timeout).await {
            info!("Host nicht erreichbar, naechster Versuch beim naechsten Takt");
            self.deps.events.senden(SessionEvent::HostNichtErreichbar);
            return;
        }

        // stop() kann waehrend der Pruefung gekommen sein
        if !self.reconnect.load(Ordering::SeqCst) {
            debug!("Wiederverbindung inzwischen deaktiviert");
            return;
        }

        if let Some(alt) = self.versuch.take() {
            alt.beenden().await;
        }
        let neu = AttemptHandle::spawn(self.deps.clone());
        info!(versuch = %neu.id(), "Neuer Verbindungsversuch");
        self.versuch = Some(neu);
    }

    async fn abbauen(&mut self) {
        if let Some(versuch) = self.versuch.take() {
            info!(versuch = %versuch.id(), "Versuch wird abgebaut");
            versuch.beenden().await;
        }
    }

    async fn kommando(&self, name: &str) -> Result<()> {
        let kanal = self
            .versuch
            .as_ref()
            .and_then(|v| v.kanal())
            .ok_or_else(|| VoicelinkError::KanalNichtOffen("kein Versuch".into()))?;
        sende_kommando(
            kanal.as_ref(),
            name,
            &self.deps.events,
            &self.deps.volume,
            self.deps.config.fade_dauer(),
        )
        .await
    }
}

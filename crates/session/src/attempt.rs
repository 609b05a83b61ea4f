//! Ein einzelner Verbindungsversuch
//!
//! ```text
//! Idle -> Connecting -> Connected -> Closing -> Closed
//!              |            |
//!              +-> Failed <-+
//! ```
//!
//! Der Versuch laeuft als eigener Task und gehoert exklusiv dem
//! Supervisor. Er endet wenn die Gegenstelle den Steuerkanal schliesst,
//! die Peer-Verbindung ausfaellt oder `beenden()` aufgerufen wird.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use voicelink_audio::{PlaybackQueue, VolumeControl};
use voicelink_core::{AttemptId, AttemptState, EventBus, Result, SessionEvent, VoicelinkError};

use crate::capabilities::{DataChannel, LocalStream, MediaCapture, PeerConnection, PeerConnector};
use crate::config::SessionConfig;
use crate::control::ControlChannel;
use crate::negotiation::NegotiationEngine;

/// Alles was ein Versuch zum Laufen braucht
#[derive(Clone)]
pub struct AttemptDeps {
    pub connector: Arc<dyn PeerConnector>,
    pub capture: Arc<dyn MediaCapture>,
    pub negotiation: NegotiationEngine,
    pub events: EventBus,
    pub volume: VolumeControl,
    pub playback: Option<PlaybackQueue>,
    pub config: SessionConfig,
}

/// Wie der Versuch nach dem Verbinden endete
enum Ende {
    /// Gegenstelle hat den Steuerkanal geschlossen
    KanalZu,
    /// Peer-Verbindung ist ausgefallen
    VerbindungWeg,
    /// `beenden()` wurde aufgerufen
    Gestoppt,
}

/// Griff auf einen laufenden Versuch
pub struct AttemptHandle {
    id: AttemptId,
    zustand: watch::Receiver<AttemptState>,
    kanal: Arc<Mutex<Option<Arc<dyn DataChannel>>>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl AttemptHandle {
    /// Startet einen neuen Versuch als Task
    pub fn spawn(deps: AttemptDeps) -> Self {
        let id = AttemptId::new();
        // Ab dem Spawn gilt der Versuch als laufend
        let (zustand_tx, zustand) = watch::channel(AttemptState::Connecting);
        let kanal = Arc::new(Mutex::new(None));
        let cancel = CancellationToken::new();

        let versuch = ConnectionAttempt {
            id,
            deps,
            zustand: zustand_tx,
            kanal: kanal.clone(),
            medien: Mutex::new(None),
            cancel: cancel.clone(),
        };
        let span = tracing::info_span!("versuch", id = %id);
        let task = tokio::spawn(versuch.run().instrument(span));

        Self {
            id,
            zustand,
            kanal,
            cancel,
            task,
        }
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    /// Aktueller Zustand
    pub fn zustand(&self) -> AttemptState {
        *self.zustand.borrow()
    }

    /// Empfaenger fuer Zustandswechsel
    pub fn zustaende(&self) -> watch::Receiver<AttemptState> {
        self.zustand.clone()
    }

    /// Datenkanal des Versuchs, sobald angelegt
    pub fn kanal(&self) -> Option<Arc<dyn DataChannel>> {
        self.kanal.lock().clone()
    }

    /// Baut den Versuch ab und wartet bis er vollstaendig geschlossen ist
    pub async fn beenden(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(versuch = %self.id, "Versuch-Task abgebrochen: {}", e);
        }
    }
}

struct ConnectionAttempt {
    id: AttemptId,
    deps: AttemptDeps,
    zustand: watch::Sender<AttemptState>,
    kanal: Arc<Mutex<Option<Arc<dyn DataChannel>>>>,
    medien: Mutex<Option<LocalStream>>,
    cancel: CancellationToken,
}

impl ConnectionAttempt {
    async fn run(self) {
        self.setze(AttemptState::Connecting);

        let pc = match self.deps.connector.create().await {
            Ok(pc) => pc,
            Err(e) => {
                self.melde_fehler(&e);
                self.setze(AttemptState::Failed);
                return;
            }
        };

        // Beobachter laufen bis zum Ende des Versuchs
        let beobachter = self.cancel.child_token();
        self.beobachter_starten(&pc, &beobachter);

        let verbunden = tokio::select! {
            r = self.verbinden(pc.as_ref()) => r,
            _ = self.cancel.cancelled() => {
                debug!("Abbruch waehrend des Verbindens");
                self.abbauen_nach_stop(pc.as_ref()).await;
                beobachter.cancel();
                return;
            }
        };

        let kanal = match verbunden {
            Ok(kanal) => kanal,
            Err(e) => {
                self.melde_fehler(&e);
                self.abbauen(pc.as_ref()).await;
                self.setze(AttemptState::Failed);
                beobachter.cancel();
                return;
            }
        };

        self.setze(AttemptState::Connected);

        let protokoll = ControlChannel::new(
            self.id,
            kanal,
            self.deps.events.clone(),
            self.deps.volume.clone(),
            self.deps.playback.clone(),
            self.deps.config.clone(),
        );

        let mut zustaende = pc.states();
        let ende = tokio::select! {
            _ = protokoll.run() => Ende::KanalZu,
            _ = zustaende.wait_for(|s| s.connection.ist_beendet()) => Ende::VerbindungWeg,
            _ = self.cancel.cancelled() => Ende::Gestoppt,
        };

        match ende {
            Ende::Gestoppt => {
                self.abbauen_nach_stop(pc.as_ref()).await;
            }
            Ende::KanalZu => {
                self.setze(AttemptState::Closing);
                self.abbauen(pc.as_ref()).await;
                self.nachmelden(pc.as_ref()).await;
                self.setze(AttemptState::Closed);
            }
            Ende::VerbindungWeg => {
                warn!("Peer-Verbindung ausgefallen");
                self.abbauen(pc.as_ref()).await;
                self.setze(AttemptState::Failed);
            }
        }
        beobachter.cancel();
    }

    /// Datenkanal, Medien, Verhandlung
    ///
    /// Kanal und Medien landen sofort in den Feldern des Versuchs, damit
    /// jeder Abbaupfad sie findet.
    async fn verbinden(&self, pc: &dyn PeerConnection) -> Result<Arc<dyn DataChannel>> {
        let kanal = pc.create_data_channel(&self.deps.config.kanal).await?;
        *self.kanal.lock() = Some(kanal.clone());

        let stream = self
            .deps
            .capture
            .acquire(&self.deps.config.aufnahme)
            .await
            .map_err(als_medienfehler)?;
        let spuren = stream.tracks.clone();
        *self.medien.lock() = Some(stream);

        for spur in spuren {
            pc.add_track(spur).await.map_err(als_medienfehler)?;
        }

        self.deps
            .negotiation
            .negotiate(pc, &self.deps.config.codec)
            .await?;
        Ok(kanal)
    }

    fn beobachter_starten(&self, pc: &Arc<dyn PeerConnection>, stopp: &CancellationToken) {
        let mut zustaende = pc.states();
        let events = self.deps.events.clone();
        let stopp_zustand = stopp.clone();
        tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        r = zustaende.changed() => {
                            if r.is_err() {
                                break;
                            }
                            let jetzt = *zustaende.borrow_and_update();
                            debug!(
                                verbindung = ?jetzt.connection,
                                ice = ?jetzt.ice_connection,
                                sammlung = ?jetzt.ice_gathering,
                                signalisierung = ?jetzt.signaling,
                                "Peer-Zustand"
                            );
                            events.senden(SessionEvent::PeerZustand(jetzt));
                        }
                        _ = stopp_zustand.cancelled() => break,
                    }
                }
            }
            .in_current_span(),
        );

        let pc = pc.clone();
        let events = self.deps.events.clone();
        let stopp_spuren = stopp.clone();
        tokio::spawn(
            async move {
                loop {
                    let spur = tokio::select! {
                        s = pc.next_remote_track() => s,
                        _ = stopp_spuren.cancelled() => break,
                    };
                    let Some(spur) = spur else { break };
                    info!(art = %spur.kind, id = %spur.id, "Spur der Gegenstelle");
                    events.senden(SessionEvent::SpurEmpfangen {
                        art: spur.kind,
                        id: spur.id,
                    });
                }
            }
            .in_current_span(),
        );
    }

    /// Abbau durch `stop()`: Transceiver und Spuren stoppen, Kanal zu,
    /// kurze Frist fuer ausstehende Zustandsmeldungen, dann Verbindung zu
    async fn abbauen_nach_stop(&self, pc: &dyn PeerConnection) {
        self.setze(AttemptState::Closing);
        pc.stop_transceivers().await;
        self.medien_stoppen();
        if let Some(playback) = &self.deps.playback {
            let verworfen = playback.clear();
            debug!(verworfen, "Wartendes Audio verworfen");
        }
        if let Some(kanal) = self.kanal() {
            if let Err(e) = kanal.close().await {
                debug!("Kanal schliessen: {}", e);
            }
        }

        tokio::time::sleep(self.deps.config.stop_gnadenfrist()).await;

        if let Err(e) = pc.close().await {
            warn!("Verbindung schliessen fehlgeschlagen: {}", e);
        }
        self.setze(AttemptState::Closed);
    }

    /// Abbau nach Kanal-Ende oder Fehler: Spuren stoppen, Kanal und
    /// Verbindung sofort schliessen
    async fn abbauen(&self, pc: &dyn PeerConnection) {
        self.medien_stoppen();
        if let Some(kanal) = self.kanal() {
            if let Err(e) = kanal.close().await {
                debug!("Kanal schliessen: {}", e);
            }
        }
        if let Err(e) = pc.close().await {
            warn!("Verbindung schliessen fehlgeschlagen: {}", e);
        }
    }

    /// Meldet den Endzustand nach kurzer Verzoegerung erneut, damit alle
    /// Abonnenten einen konsistenten Stand sehen
    async fn nachmelden(&self, pc: &dyn PeerConnection) {
        tokio::time::sleep(self.deps.config.nachmeldung()).await;
        let stand = *pc.states().borrow();
        self.deps.events.senden(SessionEvent::PeerZustand(stand));
    }

    fn kanal(&self) -> Option<Arc<dyn DataChannel>> {
        self.kanal.lock().clone()
    }

    fn medien_stoppen(&self) {
        if let Some(stream) = self.medien.lock().take() {
            stream.stop_all();
        }
    }

    fn melde_fehler(&self, e: &VoicelinkError) {
        error!(
            art = ?e.art(),
            wiederholbar = e.ist_wiederholbar(),
            "Verbindungsversuch fehlgeschlagen: {}",
            e
        );
        self.deps.events.senden(SessionEvent::Fehler {
            versuch: Some(self.id),
            art: e.art(),
            meldung: e.to_string(),
        });
    }

    fn setze(&self, zustand: AttemptState) {
        self.zustand.send_replace(zustand);
        info!(zustand = %zustand, "Versuch");
        self.deps.events.senden(SessionEvent::VersuchZustand {
            versuch: self.id,
            zustand,
        });
    }
}

fn als_medienfehler(e: VoicelinkError) -> VoicelinkError {
    match e {
        VoicelinkError::Medien(_) => e,
        other => VoicelinkError::Medien(other.to_string()),
    }
}

//! Wiedergabe-Warteschlange
//!
//! Frames werden in Empfangsreihenfolge abgespielt, immer nur einer
//! gleichzeitig. Die Abspiel-Schleife laeuft als eigener Task und beendet
//! sich, sobald die Warteschlange leer ist; das naechste `enqueue` startet
//! sie neu.
//!
//! ```text
//! Netzwerk ──enqueue──▶ VecDeque ──pop──▶ AudioSink::play (bis Ende)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};
use voicelink_core::{EventBus, SessionEvent};

use crate::error::AudioResult;
use crate::pcm::AudioFrame;
use crate::volume::VolumeControl;

/// Ausgabegeraet der Plattform
///
/// `play` kehrt erst zurueck, wenn der Frame vollstaendig abgespielt ist.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn play(&self, frame: AudioFrame) -> AudioResult<()>;
}

#[derive(Default)]
struct QueueState {
    frames: VecDeque<AudioFrame>,
    playing: bool,
}

struct Inner {
    state: Mutex<QueueState>,
    sink: Arc<dyn AudioSink>,
    events: Option<EventBus>,
    volume: VolumeControl,
}

/// Geordnete, nicht ueberlappende Wiedergabe
///
/// Klonbar; alle Klone teilen dieselbe Warteschlange.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self::with_volume(sink, None, VolumeControl::new())
    }

    /// Wie `new`, meldet leergelaufene Warteschlangen auf dem Bus
    pub fn with_events(sink: Arc<dyn AudioSink>, events: EventBus) -> Self {
        Self::with_volume(sink, Some(events), VolumeControl::new())
    }

    /// Spielt jeden Frame mit der Lautstaerke von `volume` ab, gelesen beim Start des Frames
    pub fn with_volume(
        sink: Arc<dyn AudioSink>,
        events: Option<EventBus>,
        volume: VolumeControl,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                sink,
                events,
                volume,
            }),
        }
    }

    /// Regler der auf alle Frames dieser Warteschlange wirkt
    pub fn volume(&self) -> &VolumeControl {
        &self.inner.volume
    }

    /// Haengt einen Frame an und startet die Abspiel-Schleife falls noetig
    ///
    /// Muss innerhalb einer tokio-Runtime aufgerufen werden.
    pub fn enqueue(&self, frame: AudioFrame) {
        let starten = {
            let mut state = self.inner.state.lock();
            state.frames.push_back(frame);
            if state.playing {
                false
            } else {
                state.playing = true;
                true
            }
        };

        if starten {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(inner.drain());
        }
    }

    /// Anzahl wartender Frames (ohne den gerade spielenden)
    pub fn len(&self) -> usize {
        self.inner.state.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Laeuft die Abspiel-Schleife gerade?
    pub fn is_playing(&self) -> bool {
        self.inner.state.lock().playing
    }

    /// Verwirft alle wartenden Frames; der laufende spielt zu Ende
    pub fn clear(&self) -> usize {
        let mut state = self.inner.state.lock();
        let verworfen = state.frames.len();
        state.frames.clear();
        verworfen
    }
}

impl Inner {
    async fn drain(self: Arc<Self>) {
        debug!("Wiedergabe gestartet");
        loop {
            // Entnehmen und "playing" zuruecksetzen unter demselben Lock,
            // sonst kann ein paralleles enqueue haengen bleiben
            let mut frame = {
                let mut state = self.state.lock();
                match state.frames.pop_front() {
                    Some(frame) => frame,
                    None => {
                        state.playing = false;
                        break;
                    }
                }
            };

            self.volume.apply(&mut frame.samples);
            if let Err(e) = self.sink.play(frame).await {
                warn!("Fehler bei der Wiedergabe: {}", e);
            }
        }

        let verbleibend = self.state.lock().frames.len();
        debug!(verbleibend, "Wiedergabe beendet");
        if let Some(events) = &self.events {
            events.senden(SessionEvent::WiedergabeBeendet { verbleibend });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AudioError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Protokolliert Startreihenfolge und maximale Gleichzeitigkeit
    #[derive(Default)]
    struct AufzeichnungsSink {
        gestartet: Mutex<Vec<f32>>,
        aktiv: AtomicUsize,
        max_aktiv: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for AufzeichnungsSink {
        async fn play(&self, frame: AudioFrame) -> AudioResult<()> {
            self.gestartet.lock().push(frame.samples[0]);
            let jetzt = self.aktiv.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_aktiv.fetch_max(jetzt, Ordering::SeqCst);
            tokio::time::sleep(frame.duration()).await;
            self.aktiv.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn frame(marke: f32, ms: usize) -> AudioFrame {
        AudioFrame::new(1000, vec![marke; ms]).unwrap()
    }

    async fn warte_auf_ende(rx: &mut tokio::sync::broadcast::Receiver<SessionEvent>) {
        loop {
            if let SessionEvent::WiedergabeBeendet { .. } = rx.recv().await.unwrap() {
                return;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reihenfolge_und_keine_ueberlappung() {
        let sink = Arc::new(AufzeichnungsSink::default());
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let queue = PlaybackQueue::with_events(sink.clone(), bus);

        queue.enqueue(frame(1.0, 30));
        queue.enqueue(frame(2.0, 10));
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Kommt waehrend Frame 1 spielt
        queue.enqueue(frame(3.0, 20));

        warte_auf_ende(&mut rx).await;

        assert_eq!(*sink.gestartet.lock(), vec![1.0, 2.0, 3.0]);
        assert_eq!(sink.max_aktiv.load(Ordering::SeqCst), 1);
        assert!(!queue.is_playing());
    }

    #[tokio::test(start_paused = true)]
    async fn neustart_nach_leerlauf() {
        let sink = Arc::new(AufzeichnungsSink::default());
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let queue = PlaybackQueue::with_events(sink.clone(), bus);

        queue.enqueue(frame(1.0, 10));
        warte_auf_ende(&mut rx).await;
        assert!(!queue.is_playing());

        queue.enqueue(frame(2.0, 10));
        assert!(queue.is_playing());
        warte_auf_ende(&mut rx).await;

        assert_eq!(*sink.gestartet.lock(), vec![1.0, 2.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_verwirft_wartende() {
        let sink = Arc::new(AufzeichnungsSink::default());
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let queue = PlaybackQueue::with_events(sink.clone(), bus);

        queue.enqueue(frame(1.0, 50));
        queue.enqueue(frame(2.0, 50));
        queue.enqueue(frame(3.0, 50));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(queue.clear(), 2);
        warte_auf_ende(&mut rx).await;
        assert_eq!(*sink.gestartet.lock(), vec![1.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn lautstaerke_wirkt_beim_abspielen() {
        let sink = Arc::new(AufzeichnungsSink::default());
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let volume = VolumeControl::new();
        let queue = PlaybackQueue::with_volume(sink.clone(), Some(bus), volume.clone());

        volume.set(0.5);
        queue.enqueue(frame(0.8, 10));
        warte_auf_ende(&mut rx).await;

        volume.set(1.0);
        queue.enqueue(frame(0.8, 10));
        warte_auf_ende(&mut rx).await;

        assert_eq!(*sink.gestartet.lock(), vec![0.4, 0.8]);
        assert_eq!(queue.volume().get(), 1.0);
    }

    struct KaputterSink {
        aufrufe: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for KaputterSink {
        async fn play(&self, _frame: AudioFrame) -> AudioResult<()> {
            self.aufrufe.fetch_add(1, Ordering::SeqCst);
            Err(AudioError::Wiedergabe("Geraet weg".into()))
        }
    }

    #[tokio::test]
    async fn sink_fehler_stoppt_schleife_nicht() {
        let sink = Arc::new(KaputterSink {
            aufrufe: AtomicUsize::new(0),
        });
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let queue = PlaybackQueue::with_events(sink.clone(), bus);

        queue.enqueue(frame(1.0, 1));
        queue.enqueue(frame(2.0, 1));
        warte_auf_ende(&mut rx).await;

        assert_eq!(sink.aufrufe.load(Ordering::SeqCst), 2);
    }
}

//! Streaming-Variante ueber WebSocket
//!
//! Statt Peer-Verbindung und Datenkanal laeuft alles ueber einen WebSocket:
//! Mikrofon-Chunks gehen als Binaerrahmen raus, Kommandos als JSON. Vom
//! Server kommen PCM16-Rahmen (24 kHz, mono) fuer die Wiedergabe und
//! JSON-Meldungen (`status`, `response`, `request`, `abort`).
//!
//! Ein Abbruch des Servers wird nur gemeldet; die Wiedergabe laeuft weiter.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use voicelink_audio::{AudioFrame, PlaybackQueue};
use voicelink_core::{EventBus, Result, SessionEvent, VoicelinkError};
use voicelink_protocol::{StreamingCommand, StreamingNotice};

use crate::capabilities::{LocalStream, MediaCapture, MediaRecorder};
use crate::config::StreamingConfig;

/// Client der Streaming-Variante
pub struct StreamingClient {
    config: StreamingConfig,
    ausgang: mpsc::UnboundedSender<Message>,
    capture: Arc<dyn MediaCapture>,
    recorder: Arc<dyn MediaRecorder>,
    events: EventBus,
    medien: Arc<Mutex<Option<LocalStream>>>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    /// Hoechstens eine Weiterleitung Rekorder -> Socket
    weiterleitung: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingClient {
    /// Verbindet den WebSocket und startet Lese- und Schreib-Task
    pub async fn connect(
        config: StreamingConfig,
        capture: Arc<dyn MediaCapture>,
        recorder: Arc<dyn MediaRecorder>,
        playback: Option<PlaybackQueue>,
        events: EventBus,
    ) -> Result<Self> {
        let (ws, _) = connect_async(config.url.as_str())
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("WebSocket {}: {e}", config.url)))?;
        info!(url = %config.url, "WebSocket verbunden");

        let (mut schreiber, mut leser) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let cancel = CancellationToken::new();
        let medien: Arc<Mutex<Option<LocalStream>>> = Arc::new(Mutex::new(None));

        let schreib_task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                let ist_close = matches!(msg, Message::Close(_));
                if let Err(e) = schreiber.send(msg).await {
                    debug!("WebSocket-Senden fehlgeschlagen: {}", e);
                    break;
                }
                if ist_close {
                    break;
                }
            }
        });

        let lese_task = {
            let events = events.clone();
            let recorder = recorder.clone();
            let medien = medien.clone();
            let cancel = cancel.clone();
            let abtastrate = config.abtastrate;
            tokio::spawn(async move {
                loop {
                    let msg = tokio::select! {
                        msg = leser.next() => msg,
                        _ = cancel.cancelled() => break,
                    };
                    match msg {
                        Some(Ok(Message::Binary(daten))) => {
                            audio_einreihen(&daten, abtastrate, playback.as_ref());
                        }
                        Some(Ok(Message::Text(text))) => meldung_verarbeiten(&text, &events),
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!("WebSocket-Fehler: {}", e);
                            break;
                        }
                    }
                }
                info!("WebSocket geschlossen");
                cancel.cancel();
                recorder.stop().await;
                if let Some(stream) = medien.lock().take() {
                    stream.stop_all();
                }
                events.senden(SessionEvent::StreamGeschlossen);
            })
        };

        events.senden(SessionEvent::StreamVerbunden);

        Ok(Self {
            config,
            ausgang: tx,
            capture,
            recorder,
            events,
            medien,
            cancel,
            tasks: Mutex::new(vec![schreib_task, lese_task]),
            weiterleitung: Mutex::new(None),
        })
    }

    /// Socket noch offen?
    pub fn is_open(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Fordert das Mikrofon an, startet die Aufnahme und meldet sie dem Server
    pub async fn start_recording(&self) -> Result<()> {
        self.offen()?;
        let stream = self.capture.acquire(&self.config.aufnahme).await?;
        self.events.senden(SessionEvent::MikrofonBereit);

        let mut chunks = match self.recorder.start(&stream, self.config.zeitscheibe()).await {
            Ok(chunks) => chunks,
            Err(e) => {
                stream.stop_all();
                return Err(e);
            }
        };
        if let Some(alt) = self.medien.lock().replace(stream) {
            alt.stop_all();
        }

        let ausgang = self.ausgang.clone();
        let cancel = self.cancel.clone();
        let weiterleitung = tokio::spawn(async move {
            loop {
                let chunk = tokio::select! {
                    chunk = chunks.recv() => chunk,
                    _ = cancel.cancelled() => break,
                };
                let Some(chunk) = chunk else { break };
                if chunk.is_empty() {
                    continue;
                }
                if ausgang.send(Message::Binary(chunk.to_vec())).is_err() {
                    break;
                }
            }
            debug!("Aufnahme-Weiterleitung beendet");
        });
        if let Some(alt) = self.weiterleitung.lock().replace(weiterleitung) {
            alt.abort();
        }

        self.kommando_senden(StreamingCommand::start_recording())?;
        info!("Aufnahme gestartet");
        Ok(())
    }

    /// Beendet die Aufnahme; der Socket bleibt offen
    pub async fn stop_recording(&self) -> Result<()> {
        self.kommando_senden(StreamingCommand::stop_recording())?;
        self.recorder.stop().await;
        if let Some(stream) = self.medien.lock().take() {
            stream.stop_all();
        }
        self.weiterleitung_beenden().await;
        info!("Aufnahme gestoppt");
        Ok(())
    }

    /// Sendet ein beliebiges Kommando als JSON
    pub fn send_command(&self, name: &str) -> Result<()> {
        self.kommando_senden(StreamingCommand::new(name))
    }

    /// Schliesst den Socket und wartet auf alle Tasks
    pub async fn close(&self) {
        if self.is_open() {
            let _ = self.ausgang.send(Message::Close(None));
        }
        self.recorder.stop().await;
        if let Some(stream) = self.medien.lock().take() {
            stream.stop_all();
        }
        self.weiterleitung_beenden().await;

        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        // Schreiber zuerst, er beendet sich nach dem Close-Rahmen
        for task in tasks {
            if tokio::time::timeout(std::time::Duration::from_secs(1), task)
                .await
                .is_err()
            {
                debug!("Task beim Schliessen abgebrochen");
            }
        }
        self.cancel.cancel();
    }

    /// Wartet bis die restlichen Chunks raus sind; der Rekorder ist schon gestoppt
    async fn weiterleitung_beenden(&self) {
        let Some(task) = self.weiterleitung.lock().take() else {
            return;
        };
        let abbruch = task.abort_handle();
        if tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .is_err()
        {
            debug!("Aufnahme-Weiterleitung abgebrochen");
            abbruch.abort();
        }
    }

    fn kommando_senden(&self, kommando: StreamingCommand) -> Result<()> {
        self.offen()?;
        let json = kommando
            .to_json()
            .map_err(|e| VoicelinkError::UngueltigeNachricht(e.to_string()))?;
        self.ausgang
            .send(Message::Text(json))
            .map_err(|_| VoicelinkError::KanalNichtOffen("WebSocket".into()))?;
        self.events.senden(SessionEvent::KommandoGesendet {
            name: kommando.command,
        });
        Ok(())
    }

    fn offen(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VoicelinkError::KanalNichtOffen("WebSocket".into()))
        }
    }
}

fn audio_einreihen(daten: &[u8], abtastrate: u32, playback: Option<&PlaybackQueue>) {
    let Some(playback) = playback else {
        return;
    };
    match AudioFrame::from_pcm16(daten, abtastrate) {
        Ok(frame) if !frame.is_empty() => playback.enqueue(frame),
        Ok(_) => {}
        Err(e) => warn!("Audiorahmen verworfen: {}", e),
    }
}

fn meldung_verarbeiten(text: &str, events: &EventBus) {
    let meldung = match StreamingNotice::from_text(text) {
        Ok(m) => m,
        Err(_) => {
            debug!(text, "Text ohne JSON");
            events.senden(SessionEvent::TextEmpfangen {
                text: text.to_string(),
            });
            return;
        }
    };

    if let Some(status) = meldung.status {
        events.senden(SessionEvent::StreamStatus { text: status });
    }
    if let Some(response) = meldung.response {
        events.senden(SessionEvent::StreamAntwort { text: response });
    }
    if let Some(request) = meldung.request {
        events.senden(SessionEvent::StreamAnfrage { text: request });
    }
    if meldung.abort.is_some() {
        info!("Server hat abgebrochen");
        events.senden(SessionEvent::StreamAbbruch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::LocalTrack;
    use crate::testing::{FakeCapture, FakeRecorder, FakeSink};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::broadcast;
    use tokio_tungstenite::accept_async;

    async fn server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        (listener, url)
    }

    async fn warte_auf(
        rx: &mut broadcast::Receiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let e = rx.recv().await.unwrap();
                if pred(&e) {
                    return e;
                }
            }
        })
        .await
        .expect("Ereignis nicht eingetroffen")
    }

    fn config(url: String) -> StreamingConfig {
        StreamingConfig {
            url,
            ..StreamingConfig::default()
        }
    }

    #[tokio::test]
    async fn aufnahme_sendet_kommando_und_chunks() {
        let (listener, url) = server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let mut empfangen = Vec::new();
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Close(_) => break,
                    other => empfangen.push(other),
                }
            }
            empfangen
        });

        let capture = FakeCapture::new();
        let recorder = FakeRecorder::new();
        let events = EventBus::new();
        let mut rx = events.abonnieren();

        let client = StreamingClient::connect(
            config(url),
            capture.clone(),
            recorder.clone(),
            None,
            events.clone(),
        )
        .await
        .unwrap();
        warte_auf(&mut rx, |e| *e == SessionEvent::StreamVerbunden).await;

        client.start_recording().await.unwrap();
        warte_auf(&mut rx, |e| *e == SessionEvent::MikrofonBereit).await;
        assert!(client.is_recording());
        assert_eq!(recorder.zeitscheiben(), vec![Duration::from_millis(250)]);

        let anforderung = &capture.anforderungen()[0];
        assert_eq!(anforderung.sample_rate, Some(24_000));
        assert_eq!(anforderung.channel_count, Some(1));

        assert!(recorder.chunk(b"\x01\x02").await);
        // Weiterleitung laeuft in eigenem Task
        tokio::time::sleep(Duration::from_millis(50)).await;

        client.stop_recording().await.unwrap();
        assert!(!client.is_recording());
        assert!(capture.spuren()[0].is_stopped());
        client.close().await;

        let empfangen = server.await.unwrap();
        assert!(empfangen.contains(&Message::Text(
            r#"{"command":"start_recording"}"#.to_string()
        )));
        assert!(empfangen.contains(&Message::Binary(vec![1, 2])));
        assert!(empfangen.contains(&Message::Text(
            r#"{"command":"stop_recording"}"#.to_string()
        )));
    }

    #[tokio::test]
    async fn wiederholte_aufnahmen_sammeln_keine_tasks() {
        let (listener, url) = server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let mut binaer = 0;
            while let Some(Ok(msg)) = ws.next().await {
                match msg {
                    Message::Close(_) => break,
                    Message::Binary(_) => binaer += 1,
                    _ => {}
                }
            }
            binaer
        });

        let recorder = FakeRecorder::new();
        let client = StreamingClient::connect(
            config(url),
            FakeCapture::new(),
            recorder.clone(),
            None,
            EventBus::new(),
        )
        .await
        .unwrap();

        for _ in 0..5 {
            client.start_recording().await.unwrap();
            assert!(recorder.chunk(b"\x01\x02").await);
            client.stop_recording().await.unwrap();
            assert!(client.weiterleitung.lock().is_none());
        }
        assert_eq!(client.tasks.lock().len(), 2);

        // Neustart ohne Stop ersetzt die laufende Weiterleitung
        client.start_recording().await.unwrap();
        let erste = client.weiterleitung.lock().as_ref().unwrap().abort_handle();
        client.start_recording().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !erste.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(client.weiterleitung.lock().is_some());

        client.close().await;
        assert!(client.weiterleitung.lock().is_none());
        assert_eq!(server.await.unwrap(), 5);
    }

    #[tokio::test]
    async fn meldungen_und_audio_vom_server() {
        let (listener, url) = server().await;
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"status": "listening"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![0x00, 0x40, 0x00, 0xC0]))
                .await
                .unwrap();
            ws.send(Message::Text("kein json".into())).await.unwrap();
            ws.send(Message::Text(r#"{"abort": true}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let sink = Arc::new(FakeSink::default());
        let playback = PlaybackQueue::new(sink.clone());
        let recorder = FakeRecorder::new();
        let events = EventBus::new();
        let mut rx = events.abonnieren();

        let client = StreamingClient::connect(
            config(url),
            FakeCapture::new(),
            recorder,
            Some(playback),
            events.clone(),
        )
        .await
        .unwrap();

        let status = warte_auf(&mut rx, |e| matches!(e, SessionEvent::StreamStatus { .. })).await;
        assert_eq!(
            status,
            SessionEvent::StreamStatus {
                text: "listening".into()
            }
        );
        let text = warte_auf(&mut rx, |e| matches!(e, SessionEvent::TextEmpfangen { .. })).await;
        assert_eq!(
            text,
            SessionEvent::TextEmpfangen {
                text: "kein json".into()
            }
        );
        warte_auf(&mut rx, |e| *e == SessionEvent::StreamAbbruch).await;
        warte_auf(&mut rx, |e| *e == SessionEvent::StreamGeschlossen).await;
        assert!(!client.is_open());
        assert!(matches!(
            client.send_command("do_something"),
            Err(VoicelinkError::KanalNichtOffen(_))
        ));

        server.await.unwrap();
        let frames = sink.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sample_rate, 24_000);
        assert_eq!(frames[0].samples, vec![0.5, -0.5]);
        client.close().await;
    }

    #[tokio::test]
    async fn verbindung_ohne_server_schlaegt_fehl() {
        let ergebnis = StreamingClient::connect(
            config("ws://127.0.0.1:9/ws".into()),
            FakeCapture::new(),
            FakeRecorder::new(),
            None,
            EventBus::new(),
        )
        .await;
        assert!(matches!(ergebnis, Err(VoicelinkError::Verbindung(_))));
    }
}

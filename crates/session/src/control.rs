//! Steuerkanal eines verbundenen Versuchs
//!
//! Solange der Datenkanal offen ist, geht im festen Abstand ein
//! `ping <ms>` raus; das `pong` dient nur der Latenzmessung. Eingehender
//! Text wird als Ereignis oder Rohtext gemeldet, Binaerrahmen landen als
//! PCM16 in der Wiedergabe-Warteschlange. Schliesst der Kanal, endet
//! `run` und der Versuch wird abgebaut.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};
use voicelink_audio::{AudioFrame, PlaybackQueue, VolumeControl, STREAMING_SAMPLE_RATE};
use voicelink_core::{AttemptId, EventBus, Result, SessionEvent, VoicelinkError};
use voicelink_protocol::control::{CMD_ABORT, CMD_F4};
use voicelink_protocol::{ControlMessage, ProtocolError};

use crate::capabilities::{ChannelEvent, ChannelMessage, DataChannel};
use crate::config::SessionConfig;

/// Protokoll-Schleife auf einem Datenkanal
pub struct ControlChannel {
    versuch: AttemptId,
    kanal: Arc<dyn DataChannel>,
    events: EventBus,
    volume: VolumeControl,
    playback: Option<PlaybackQueue>,
    config: SessionConfig,
    start: Instant,
}

impl ControlChannel {
    pub fn new(
        versuch: AttemptId,
        kanal: Arc<dyn DataChannel>,
        events: EventBus,
        volume: VolumeControl,
        playback: Option<PlaybackQueue>,
        config: SessionConfig,
    ) -> Self {
        Self {
            versuch,
            kanal,
            events,
            volume,
            playback,
            config,
            start: Instant::now(),
        }
    }

    /// Laeuft bis die Gegenstelle den Kanal schliesst
    pub async fn run(self) {
        let mut ping: Option<Interval> = None;
        if self.kanal.is_open() {
            ping = Some(self.geoeffnet());
        }

        loop {
            let ereignis = tokio::select! {
                _ = naechster_tick(&mut ping) => {
                    self.ping_senden().await;
                    continue;
                }
                ereignis = self.kanal.recv() => ereignis,
            };

            match ereignis {
                Some(ChannelEvent::Open) => {
                    if ping.is_none() {
                        ping = Some(self.geoeffnet());
                    }
                }
                Some(ChannelEvent::Message(ChannelMessage::Text(text))) => {
                    self.text_verarbeiten(&text).await;
                }
                Some(ChannelEvent::Message(ChannelMessage::Binary(daten))) => {
                    self.audio_verarbeiten(&daten);
                }
                Some(ChannelEvent::Close) | None => {
                    info!(versuch = %self.versuch, "Steuerkanal geschlossen");
                    self.events.senden(SessionEvent::KanalGeschlossen);
                    return;
                }
            }
        }
    }

    fn geoeffnet(&self) -> Interval {
        info!(versuch = %self.versuch, kanal = self.kanal.label(), "Steuerkanal offen");
        self.events.senden(SessionEvent::KanalGeoeffnet);

        let periode = self.config.ping_intervall();
        let mut takt = interval_at(Instant::now() + periode, periode);
        takt.set_missed_tick_behavior(MissedTickBehavior::Delay);
        takt
    }

    fn jetzt_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    async fn ping_senden(&self) {
        let ping = ControlMessage::ping(self.jetzt_ms());
        if let Err(e) = self.senden(&ping).await {
            warn!(versuch = %self.versuch, "Ping nicht gesendet: {}", e);
        }
    }

    async fn senden(&self, msg: &ControlMessage) -> Result<()> {
        let text = msg
            .encode()
            .map_err(|e| VoicelinkError::UngueltigeNachricht(e.to_string()))?;
        self.kanal.send_text(&text).await
    }

    async fn text_verarbeiten(&self, text: &str) {
        let msg = match ControlMessage::decode(text) {
            Ok(msg) => msg,
            Err(ProtocolError::Zeitstempel(rest)) => {
                debug!(versuch = %self.versuch, rest = %rest, "Pong ohne Zeitstempel ignoriert");
                return;
            }
            Err(e) => {
                warn!(versuch = %self.versuch, "Nachricht nicht lesbar: {}", e);
                self.events.senden(SessionEvent::UngueltigeNachricht {
                    grund: e.to_string(),
                });
                return;
            }
        };

        match msg {
            ControlMessage::Pong { timestamp_ms } => {
                let rtt_ms = self.jetzt_ms().saturating_sub(timestamp_ms);
                debug!(versuch = %self.versuch, rtt_ms, "Pong");
                self.events.senden(SessionEvent::Latenz { rtt_ms });
            }
            ControlMessage::Ping { timestamp_ms } => {
                let pong = ControlMessage::Pong { timestamp_ms };
                if let Err(e) = self.senden(&pong).await {
                    warn!(versuch = %self.versuch, "Pong nicht gesendet: {}", e);
                }
            }
            ControlMessage::Event(ereignis) => {
                if ereignis.is_mute() {
                    self.volume
                        .duck(self.config.duck_pegel, self.config.duck_dauer());
                }
                self.events.senden(SessionEvent::NachrichtEmpfangen {
                    ts: ereignis.ts,
                    role: ereignis.role,
                    content: ereignis.content,
                });
            }
            ControlMessage::Command { name } => {
                if name == CMD_ABORT {
                    info!(versuch = %self.versuch, "Abbruch durch Gegenstelle, blende aus");
                    self.volume.fade_out(
                        self.config.fade_dauer(),
                        Some(self.config.fade_wiederherstellen()),
                    );
                }
                self.events.senden(SessionEvent::TextEmpfangen { text: name });
            }
        }
    }

    fn audio_verarbeiten(&self, daten: &[u8]) {
        let Some(playback) = &self.playback else {
            debug!(bytes = daten.len(), "Audio ohne Wiedergabe verworfen");
            return;
        };
        match AudioFrame::from_pcm16(daten, STREAMING_SAMPLE_RATE) {
            Ok(frame) if !frame.is_empty() => playback.enqueue(frame),
            Ok(_) => {}
            Err(e) => warn!("Audio nicht lesbar: {}", e),
        }
    }
}

async fn naechster_tick(takt: &mut Option<Interval>) {
    match takt {
        Some(takt) => {
            takt.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Sendet ein Kommando woertlich ueber einen offenen Kanal
///
/// `f4` blendet zusaetzlich die lokale Wiedergabe aus.
pub async fn sende_kommando(
    kanal: &dyn DataChannel,
    name: &str,
    events: &EventBus,
    volume: &VolumeControl,
    fade_dauer: Duration,
) -> Result<()> {
    if !kanal.is_open() {
        return Err(VoicelinkError::KanalNichtOffen(kanal.label().to_string()));
    }

    let text = ControlMessage::command(name)
        .encode()
        .map_err(|e| VoicelinkError::UngueltigeNachricht(e.to_string()))?;
    kanal.send_text(&text).await?;
    info!(kommando = name, "Kommando gesendet");
    events.senden(SessionEvent::KommandoGesendet {
        name: name.to_string(),
    });

    if name == CMD_F4 {
        volume.fade_out(fade_dauer, None);
    }
    Ok(())
}

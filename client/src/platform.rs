//! Plattform-Anbindung ohne Audiohardware
//!
//! Der Konsolen-Client spielt nichts hoerbar ab und nimmt nichts auf:
//! `NullSink` haelt nur das Timing der Wiedergabe ein, `StilleRecorder`
//! liefert PCM16-Stille in Zeitscheiben.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use voicelink_audio::{AudioFrame, AudioResult, AudioSink};
use voicelink_core::Result;
use voicelink_session::{LocalStream, MediaRecorder};

/// Ausgabe die nur wartet, bis der Frame "gespielt" waere
#[derive(Debug, Default)]
pub struct NullSink;

#[async_trait]
impl AudioSink for NullSink {
    async fn play(&self, frame: AudioFrame) -> AudioResult<()> {
        tokio::time::sleep(frame.duration()).await;
        Ok(())
    }
}

/// Rekorder der pro Zeitscheibe einen Block PCM16-Stille liefert
pub struct StilleRecorder {
    abtastrate: u32,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StilleRecorder {
    pub fn new(abtastrate: u32) -> Arc<Self> {
        Arc::new(Self {
            abtastrate,
            task: Mutex::new(None),
        })
    }
}

/// Samples einer Zeitscheibe (Mono)
fn samples_pro_scheibe(abtastrate: u32, zeitscheibe: Duration) -> usize {
    (abtastrate as f64 * zeitscheibe.as_secs_f64()) as usize
}

/// Eine Zeitscheibe Stille als PCM16 LE
fn stille_chunk(abtastrate: u32, zeitscheibe: Duration) -> Result<Bytes> {
    let frame = AudioFrame::new(abtastrate, vec![0.0; samples_pro_scheibe(abtastrate, zeitscheibe)])?;
    Ok(Bytes::from(frame.to_pcm16()))
}

#[async_trait]
impl MediaRecorder for StilleRecorder {
    async fn start(&self, stream: &LocalStream, timeslice: Duration) -> Result<mpsc::Receiver<Bytes>> {
        let (tx, rx) = mpsc::channel(16);
        let stream = stream.clone();
        let chunk = stille_chunk(self.abtastrate, timeslice)?;

        let task = tokio::spawn(async move {
            let mut takt = tokio::time::interval_at(tokio::time::Instant::now() + timeslice, timeslice);
            loop {
                takt.tick().await;
                if stream.tracks.iter().all(|t| t.is_stopped()) {
                    break;
                }
                if tx.send(chunk.clone()).await.is_err() {
                    break;
                }
            }
            debug!("Aufnahme beendet");
        });

        if let Some(alt) = self.task.lock().replace(task) {
            alt.abort();
        }
        Ok(rx)
    }

    async fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }

    fn is_recording(&self) -> bool {
        self.task.lock().as_ref().is_some_and(|t| !t.is_finished())
    }
}

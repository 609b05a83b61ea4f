//! Lokale Audio-Spuren
//!
//! Ohne Audiogeraet liefert `SilenceCapture` eine Spur aus Opus-Stille
//! (ein Frame alle 20 ms). Die Gegenstelle sieht damit einen normalen
//! Audio-Sender; echte Mikrofon-Anbindung ist Sache der Plattform.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::debug;
use voicelink_audio::{CaptureDevice, MediaConstraints};
use voicelink_core::{Result, VoicelinkError};
use voicelink_session::{LocalStream, LocalTrack, MediaCapture, MediaSample};

/// Ein Opus-Frame (TOC 0xF8) mit 20 ms Stille
pub const OPUS_SILENCE: [u8; 3] = [0xF8, 0xFF, 0xFE];

/// Dauer eines Frames
pub const FRAME_DAUER: Duration = Duration::from_millis(20);

const SILENCE_DEVICE_ID: &str = "silence";

/// Spur die im 20-ms-Takt Stille liefert
pub struct SilenceTrack {
    id: String,
    takt: tokio::sync::Mutex<Interval>,
    gestoppt: AtomicBool,
}

impl SilenceTrack {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        let mut takt = interval(FRAME_DAUER);
        takt.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Arc::new(Self {
            id: id.into(),
            takt: tokio::sync::Mutex::new(takt),
            gestoppt: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LocalTrack for SilenceTrack {
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
        self.takt.lock().await.tick().await;
        if self.is_stopped() {
            return None;
        }
        Some(MediaSample {
            data: Bytes::from_static(&OPUS_SILENCE),
            duration: FRAME_DAUER,
        })
    }

    fn stop(&self) {
        if !self.gestoppt.swap(true, Ordering::SeqCst) {
            debug!(spur = %self.id, "Spur gestoppt");
        }
    }

    fn is_stopped(&self) -> bool {
        self.gestoppt.load(Ordering::SeqCst)
    }
}

/// Aufnahme-Faehigkeit ohne Hardware
#[derive(Default)]
pub struct SilenceCapture {
    zaehler: AtomicUsize,
}

impl SilenceCapture {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl MediaCapture for SilenceCapture {
    async fn devices(&self) -> Result<Vec<CaptureDevice>> {
        Ok(vec![CaptureDevice::new(SILENCE_DEVICE_ID, None, 0)])
    }

    async fn acquire(&self, constraints: &MediaConstraints) -> Result<LocalStream> {
        if let Some(id) = constraints.device_id.as_deref() {
            if id != SILENCE_DEVICE_ID {
                return Err(VoicelinkError::medien(format!("Geraet '{id}' nicht gefunden")));
            }
        }
        let nummer = self.zaehler.fetch_add(1, Ordering::SeqCst);
        debug!(nummer, "Stille-Spur angelegt");
        Ok(LocalStream::new(vec![SilenceTrack::new(format!(
            "silence-{nummer}"
        ))]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn stille_im_20ms_takt() {
        let spur = SilenceTrack::new("t");
        let beginn = tokio::time::Instant::now();

        // Erster Tick kommt sofort
        let erster = spur.next_sample().await.unwrap();
        assert_eq!(&erster.data[..], &OPUS_SILENCE);
        spur.next_sample().await.unwrap();
        spur.next_sample().await.unwrap();

        assert_eq!(beginn.elapsed(), Duration::from_millis(40));
    }

    #[tokio::test(start_paused = true)]
    async fn gestoppte_spur_endet() {
        let spur = SilenceTrack::new("t");
        spur.stop();
        assert!(spur.is_stopped());
        assert!(spur.next_sample().await.is_none());
    }

    #[tokio::test]
    async fn unbekanntes_geraet_ist_medienfehler() {
        let capture = SilenceCapture::new();
        let vorgaben = MediaConstraints::default().with_device("usb-7");
        assert!(matches!(
            capture.acquire(&vorgaben).await,
            Err(VoicelinkError::Medien(_))
        ));

        let stream = capture.acquire(&MediaConstraints::default()).await.unwrap();
        assert_eq!(stream.tracks.len(), 1);
        assert_eq!(stream.tracks[0].kind(), "audio");

        let geraete = capture.devices().await.unwrap();
        assert_eq!(geraete[0].label, "Device #1");
    }
}

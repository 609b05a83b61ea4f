//! Datenkanal ueber `RTCDataChannel`
//!
//! Die Callbacks von webrtc-rs (`on_open`, `on_message`, `on_close`) landen
//! in einem mpsc-Kanal, den `recv()` der Reihe nach abarbeitet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use voicelink_core::{Result, VoicelinkError};
use voicelink_session::{ChannelEvent, ChannelMessage, DataChannel};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

pub struct RtcDataChannel {
    label: String,
    dc: Arc<RTCDataChannel>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ChannelEvent>>,
    beendet: AtomicBool,
}

impl RtcDataChannel {
    pub fn new(dc: Arc<RTCDataChannel>) -> Arc<Self> {
        let label = dc.label().to_string();
        let (tx, rx) = mpsc::unbounded_channel();

        let tx_open = tx.clone();
        let label_open = label.clone();
        dc.on_open(Box::new(move || {
            debug!(kanal = %label_open, "Datenkanal offen");
            let _ = tx_open.send(ChannelEvent::Open);
            Box::pin(async {})
        }));

        let tx_msg = tx.clone();
        dc.on_message(Box::new(move |msg: DataChannelMessage| {
            let _ = tx_msg.send(ChannelEvent::Message(nachricht(msg)));
            Box::pin(async {})
        }));

        let label_close = label.clone();
        dc.on_close(Box::new(move || {
            debug!(kanal = %label_close, "Datenkanal geschlossen");
            let _ = tx.send(ChannelEvent::Close);
            Box::pin(async {})
        }));

        let label_err = label.clone();
        dc.on_error(Box::new(move |err| {
            warn!(kanal = %label_err, "Datenkanal-Fehler: {}", err);
            Box::pin(async {})
        }));

        Arc::new(Self {
            label,
            dc,
            rx: tokio::sync::Mutex::new(rx),
            beendet: AtomicBool::new(false),
        })
    }

    fn pruefe_offen(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(VoicelinkError::KanalNichtOffen(self.label.clone()))
        }
    }
}

fn nachricht(msg: DataChannelMessage) -> ChannelMessage {
    if msg.is_string {
        ChannelMessage::Text(String::from_utf8_lossy(&msg.data).into_owned())
    } else {
        ChannelMessage::Binary(msg.data)
    }
}

#[async_trait]
impl DataChannel for RtcDataChannel {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_open(&self) -> bool {
        self.dc.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.pruefe_offen()?;
        self.dc
            .send_text(text.to_string())
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Senden auf '{}': {e}", self.label)))?;
        Ok(())
    }

    async fn send_binary(&self, data: Bytes) -> Result<()> {
        self.pruefe_offen()?;
        self.dc
            .send(&data)
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Senden auf '{}': {e}", self.label)))?;
        Ok(())
    }

    async fn recv(&self) -> Option<ChannelEvent> {
        if self.beendet.load(Ordering::SeqCst) {
            return None;
        }
        let ereignis = self.rx.lock().await.recv().await;
        if matches!(ereignis, Some(ChannelEvent::Close) | None) {
            self.beendet.store(true, Ordering::SeqCst);
        }
        ereignis
    }

    async fn close(&self) -> Result<()> {
        self.dc
            .close()
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Schliessen von '{}': {e}", self.label)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_und_binaer_unterschieden() {
        let text = DataChannelMessage {
            is_string: true,
            data: Bytes::from_static(b"pong 42"),
        };
        assert_eq!(nachricht(text), ChannelMessage::Text("pong 42".into()));

        let binaer = DataChannelMessage {
            is_string: false,
            data: Bytes::from_static(&[0x00, 0x40]),
        };
        assert_eq!(
            nachricht(binaer),
            ChannelMessage::Binary(Bytes::from_static(&[0x00, 0x40]))
        );
    }
}

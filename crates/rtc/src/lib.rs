//! voicelink-rtc – WebRTC-Faehigkeiten auf Basis von webrtc-rs
//!
//! ## Module
//! - [`peer`] – `RtcPeerConnector` / `RtcPeerConnection`
//! - [`channel`] – Datenkanal mit async Empfang
//! - [`media`] – Stille-Spur als Mikrofon-Ersatz
//! - [`config`] – ICE-Server

pub mod channel;
pub mod config;
pub mod media;
pub mod peer;

pub use channel::RtcDataChannel;
pub use config::{IceServerConfig, RtcConfig};
pub use media::{SilenceCapture, SilenceTrack};
pub use peer::{RtcPeerConnection, RtcPeerConnector};

//! voicelink-session – Sitzungs-Logik des Clients
//!
//! Baut aus den Plattform-Faehigkeiten eine selbstheilende Audio-Sitzung.
//!
//! ## Module
//! - [`capabilities`] – Traits fuer Peer-Verbindung, Datenkanal, Mikrofon, Signalisierung
//! - [`negotiation`] – Offer/Answer mit Warten auf die ICE-Sammlung
//! - [`attempt`] – Ein Verbindungsversuch und sein Abbau
//! - [`supervisor`] – `Session` mit Wiederverbindung im festen Takt
//! - [`control`] – Steuerkanal: Ping/Pong, Kommandos, Audio-Rahmen
//! - [`liveness`] / [`signaling`] – HTTP-Adapter
//! - [`streaming`] – WebSocket-Variante ohne Peer-Verbindung
//! - [`config`] – Zeiten und Vorgaben der Sitzung

pub mod attempt;
pub mod capabilities;
pub mod config;
pub mod control;
pub mod liveness;
pub mod negotiation;
pub mod signaling;
pub mod streaming;
pub mod supervisor;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use capabilities::{
    ChannelEvent, ChannelMessage, DataChannel, DataChannelOptions, LivenessProbe, LocalStream,
    LocalTrack, MediaCapture, MediaRecorder, MediaSample, PeerConnection, PeerConnector,
    RemoteTrack, SignalingTransport,
};
pub use config::{SessionConfig, StreamingConfig};
pub use liveness::HttpLivenessProbe;
pub use negotiation::NegotiationEngine;
pub use signaling::{HttpSignaling, SignalingConfig};
pub use streaming::StreamingClient;
pub use supervisor::{Faehigkeiten, Session};

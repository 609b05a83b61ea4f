//! voicelink-core – Gemeinsame Typen, Zustaende, Ereignisse und Fehlertypen
//!
//! Dieses Crate stellt die fundamentalen Bausteine bereit, die von allen
//! anderen Voicelink-Crates gemeinsam genutzt werden.

pub mod error;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{FehlerArt, Result, VoicelinkError};
pub use event::{EventBus, SessionEvent};
pub use types::{
    AttemptId, AttemptState, IceConnectionState, IceGatheringState, PeerConnectionState,
    PeerStates, SessionId, SignalingState,
};

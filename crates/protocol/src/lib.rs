//! voicelink-protocol – Protokoll-Definitionen
//!
//! Dieses Crate definiert alles was zwischen Client und Gegenstelle
//! ausgetauscht wird:
//! - `SessionDescription` fuer den Offer/Answer-Austausch
//! - Codec-Filter fuer lokale SDP-Angebote
//! - Textnachrichten des Steuerkanals (Ping/Pong, Kommandos, Ereignisse)
//! - JSON-Steuerrahmen der WebSocket-Streaming-Variante

pub mod codec_filter;
pub mod control;
pub mod error;
pub mod sdp;
pub mod streaming;

pub use codec_filter::{filter_codec, CodecSelection};
pub use control::{ControlMessage, EventMessage};
pub use error::{ProtocolError, ProtocolResult};
pub use sdp::{SdpType, SessionDescription};
pub use streaming::{StreamingCommand, StreamingNotice};

//! voicelink-audio – Audio-Bausteine des Clients
//!
//! - PCM16-Umrechnung fuer Streaming-Antworten
//! - Wiedergabe-Warteschlange (geordnet, nie ueberlappend)
//! - Gemeinsamer Lautstaerke-Regler mit Absenken und Ausblenden
//! - Vorgaben fuer die Mikrofon-Aufnahme und Geraeteliste
//!
//! Ein- und Ausgabegeraete selbst sind Plattform-Faehigkeiten und werden
//! ueber `AudioSink` bzw. die Session-Traits eingebunden.

pub mod capture;
pub mod error;
pub mod pcm;
pub mod playback;
pub mod volume;

// Bequeme Re-Exporte der wichtigsten Typen
pub use capture::{CaptureDevice, MediaConstraints};
pub use error::{AudioError, AudioResult};
pub use pcm::{AudioFrame, STREAMING_SAMPLE_RATE};
pub use playback::{AudioSink, PlaybackQueue};
pub use volume::{VolumeControl, FADE_STEPS};

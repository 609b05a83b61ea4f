//! Nachrichten der Streaming-Variante (WebSocket `/ws`)
//!
//! Der Client sendet Audio-Chunks als Binaerrahmen und Kommandos als JSON.
//! Der Server antwortet mit PCM16-Binaerrahmen (24 kHz, mono) und
//! JSON-Statusmeldungen.
//!
//! ```text
//! Client -> Server: {"command": "start_recording"}
//! Server -> Client: {"status": "..."} | {"response": "..."}
//!                   {"request": "..."} | {"abort": "..."}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// Kommando an den Streaming-Server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingCommand {
    pub command: String,
}

impl StreamingCommand {
    pub const START_RECORDING: &'static str = "start_recording";
    pub const STOP_RECORDING: &'static str = "stop_recording";
    pub const DO_SOMETHING: &'static str = "do_something";

    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    pub fn start_recording() -> Self {
        Self::new(Self::START_RECORDING)
    }

    pub fn stop_recording() -> Self {
        Self::new(Self::STOP_RECORDING)
    }

    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Meldung des Streaming-Servers
///
/// Alle Felder optional; eine Meldung kann mehrere davon tragen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamingNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "beliebiger_wert"
    )]
    pub abort: Option<String>,
}

impl StreamingNotice {
    /// Liest eine Textmeldung. Nicht-JSON ergibt einen Fehler,
    /// der Aufrufer protokolliert dann den Rohtext.
    pub fn from_text(text: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Server verlangt Abbruch der laufenden Wiedergabe
    pub fn is_abort(&self) -> bool {
        self.abort.is_some()
    }
}

// `abort` kommt je nach Server als String, Bool oder Zahl
fn beliebiger_wert<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let wert = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(wert.map(|v| match v {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}

//! Steuerkanal-Protokoll (Data-Channel)
//!
//! Alle Nachrichten sind einzelne Textrahmen ohne Zeilenumbruch.
//!
//! ## Format
//! ```text
//! ping <ms>                                  Client -> Server
//! pong <ms>                                  Server -> Client (Echo des Zeitstempels)
//! save_audio | time_test | ...               Kommando, wortwoertlich
//! {"ts": <ms>, "role": "...", "content": ""} Ereignis vom Server (JSON)
//! ```
//!
//! Alles was weder Ping/Pong noch JSON ist, wird als Kommando gelesen.

use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// Kommando: Aufnahme serverseitig speichern
pub const CMD_SAVE_AUDIO: &str = "save_audio";
/// Kommando: Laufzeitmessung
pub const CMD_TIME_TEST: &str = "time_test";
/// Freie Funktionstasten der Gegenstelle
pub const CMD_F3: &str = "f3";
/// Wie f3, blendet lokal zusaetzlich die Wiedergabe aus
pub const CMD_F4: &str = "f4";
/// Vom Server gesendetes Abbruch-Signal
pub const CMD_ABORT: &str = "abort";

/// Rolle eines Ereignisses, das ein Kommando an den Client traegt
pub const ROLE_COMMAND: &str = "command";
/// Inhalt fuer kurzes Absenken der Wiedergabe
pub const CONTENT_MUTE: &str = "mute";

const PING_PREFIX: &str = "ping";
const PONG_PREFIX: &str = "pong";

/// Strukturiertes Ereignis der Gegenstelle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    /// Unix-Zeit in Millisekunden
    #[serde(deserialize_with = "ts_lesen")]
    pub ts: i64,
    pub role: String,
    pub content: String,
}

impl EventMessage {
    /// Gegenstelle verlangt kurzes Absenken der Lautstaerke
    pub fn is_mute(&self) -> bool {
        self.role == ROLE_COMMAND && self.content == CONTENT_MUTE
    }
}

/// Nachricht auf dem Steuerkanal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Lebenszeichen mit Sende-Zeitstempel
    Ping { timestamp_ms: u64 },
    /// Antwort mit dem Zeitstempel des Pings
    Pong { timestamp_ms: u64 },
    /// Woertliches Kommando bzw. unstrukturierter Text
    Command { name: String },
    /// Strukturiertes Ereignis
    Event(EventMessage),
}

impl ControlMessage {
    /// Erstellt einen Ping
    pub fn ping(timestamp_ms: u64) -> Self {
        Self::Ping { timestamp_ms }
    }

    /// Erstellt ein Kommando
    pub fn command(name: impl Into<String>) -> Self {
        Self::Command { name: name.into() }
    }

    /// Kodiert die Nachricht als Textrahmen
    pub fn encode(&self) -> ProtocolResult<String> {
        let text = match self {
            Self::Ping { timestamp_ms } => format!("{PING_PREFIX} {timestamp_ms}"),
            Self::Pong { timestamp_ms } => format!("{PONG_PREFIX} {timestamp_ms}"),
            Self::Command { name } => name.clone(),
            Self::Event(event) => serde_json::to_string(event)?,
        };

        if text.is_empty() {
            return Err(ProtocolError::Leer);
        }
        if text.contains('\n') {
            return Err(ProtocolError::Zeilenumbruch);
        }
        Ok(text)
    }

    /// Dekodiert einen Textrahmen
    ///
    /// Ping/Pong nur in der Form `ping <ms>` bzw. `pong <ms>`; anderer Text
    /// mit `ping` am Anfang ist ein gewoehnliches Kommando.
    ///
    /// # Fehler
    /// - `Leer` bei leerem Rahmen
    /// - `Zeilenumbruch` wenn der Rahmen mehrere Zeilen enthaelt
    /// - `Zeitstempel` bei Text mit `pong` am Anfang ohne lesbare Zahl
    /// - `Json` bei JSON-Objekten ohne `ts`/`role`/`content`
    pub fn decode(text: &str) -> ProtocolResult<Self> {
        if text.is_empty() {
            return Err(ProtocolError::Leer);
        }
        if text.contains('\n') {
            return Err(ProtocolError::Zeilenumbruch);
        }

        if let Some(rest) = text.strip_prefix(PONG_PREFIX) {
            return match zeitstempel(rest) {
                Some(timestamp_ms) => Ok(Self::Pong { timestamp_ms }),
                None => Err(ProtocolError::Zeitstempel(rest.trim().to_string())),
            };
        }
        if let Some(timestamp_ms) = text.strip_prefix(PING_PREFIX).and_then(zeitstempel) {
            return Ok(Self::Ping { timestamp_ms });
        }
        if text.trim_start().starts_with('{') {
            let event: EventMessage = serde_json::from_str(text)?;
            return Ok(Self::Event(event));
        }

        Ok(Self::Command {
            name: text.to_string(),
        })
    }
}

/// `" <ms>"` nach dem Praefix
fn zeitstempel(rest: &str) -> Option<u64> {
    rest.strip_prefix(' ')?.trim().parse().ok()
}

/// `ts` kommt je nach Server als Ganzzahl oder Gleitkommazahl
fn ts_lesen<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let zahl = serde_json::Number::deserialize(deserializer)?;
    zahl.as_i64()
        .or_else(|| zahl.as_f64().map(|f| f as i64))
        .ok_or_else(|| de::Error::custom(format!("ungueltiger Zeitstempel: {zahl}")))
}

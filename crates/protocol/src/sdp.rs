//! Session-Beschreibungen fuer den Offer/Answer-Austausch
//!
//! Wire-Format am Signalisierungs-Endpunkt (`POST /offer`):
//!
//! ```text
//! Anfrage:  {"sdp": "<text>", "type": "offer"}
//! Antwort:  {"sdp": "<text>", "type": "answer"}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;

/// Art der Session-Beschreibung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl std::fmt::Display for SdpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offer => f.write_str("offer"),
            Self::Answer => f.write_str("answer"),
        }
    }
}

/// Offer oder Answer mit SDP-Text
///
/// Unveraenderlich nachdem sie gesendet wurde. Die lokale Kopie kann vor
/// dem Senden durch den Codec-Filter umgeschrieben werden.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    /// Erstellt ein Angebot
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    /// Erstellt eine Antwort
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }

    /// Gibt eine Kopie mit ersetztem SDP-Text zurueck
    pub fn with_sdp(&self, sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: self.sdp_type,
            sdp: sdp.into(),
        }
    }

    /// Serialisiert zu JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialisiert aus JSON
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Zaehlt die Medien-Abschnitte (`m=`-Zeilen)
    pub fn media_section_count(&self) -> usize {
        self.sdp.lines().filter(|l| l.starts_with("m=")).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_json_format() {
        let offer = SessionDescription::offer("v=0\r\n");
        let json = offer.to_json().unwrap();
        assert!(json.contains("\"type\":\"offer\""));
        assert!(json.contains("\"sdp\":\"v=0\\r\\n\""));
    }

    #[test]
    fn answer_aus_server_json() {
        let json = r#"{"sdp": "v=0\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111\r\n", "type": "answer"}"#;
        let answer = SessionDescription::from_json(json).unwrap();
        assert_eq!(answer.sdp_type, SdpType::Answer);
        assert_eq!(answer.media_section_count(), 1);
    }

    #[test]
    fn unbekannter_typ_wird_abgelehnt() {
        let json = r#"{"sdp": "v=0", "type": "rollback"}"#;
        assert!(SessionDescription::from_json(json).is_err());
    }

    #[test]
    fn with_sdp_behaelt_typ() {
        let offer = SessionDescription::offer("a");
        let gefiltert = offer.with_sdp("b");
        assert_eq!(gefiltert.sdp_type, SdpType::Offer);
        assert_eq!(gefiltert.sdp, "b");
        assert_eq!(offer.sdp, "a");
    }
}

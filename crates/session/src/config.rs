//! Sitzungs-Konfiguration
//!
//! Alle Zeiten in Millisekunden. Jedes Feld hat einen Standardwert,
//! ein leerer `[sitzung]`-Abschnitt ist also gueltig.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use voicelink_audio::MediaConstraints;
use voicelink_protocol::CodecSelection;

use crate::capabilities::DataChannelOptions;

/// Einstellungen einer Sitzung (Data-Channel-Variante)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Periode des Wiederverbindungs-Takts
    pub reconnect_intervall_ms: u64,
    /// Zeitlimit der Erreichbarkeitspruefung
    pub probe_timeout_ms: u64,
    /// Abstand der Pings auf dem Steuerkanal
    pub ping_intervall_ms: u64,
    /// Wartezeit zwischen Kanal-Schliessen und Verbindungs-Schliessen bei stop()
    pub stop_gnadenfrist_ms: u64,
    /// Verzoegerung der synthetischen Zustandsmeldung nach Kanal-Ende
    pub nachmeldung_ms: u64,
    /// Lautstaerke waehrend eines "mute"-Ereignisses
    pub duck_pegel: f32,
    pub duck_dauer_ms: u64,
    /// Ausblenden bei "abort"
    pub fade_dauer_ms: u64,
    /// Wiederherstellen nach "abort", ab Beginn des Ausblendens
    pub fade_wiederherstellen_ms: u64,
    /// Codec fuer den Audio-Abschnitt des Angebots
    pub codec: CodecSelection,
    pub kanal: DataChannelOptions,
    pub aufnahme: MediaConstraints,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect_intervall_ms: 3000,
            probe_timeout_ms: 300,
            ping_intervall_ms: 5000,
            stop_gnadenfrist_ms: 200,
            nachmeldung_ms: 100,
            duck_pegel: 0.2,
            duck_dauer_ms: 1500,
            fade_dauer_ms: 800,
            fade_wiederherstellen_ms: 1000,
            codec: CodecSelection::Default,
            kanal: DataChannelOptions::default(),
            aufnahme: MediaConstraints::default(),
        }
    }
}

impl SessionConfig {
    pub fn reconnect_intervall(&self) -> Duration {
        Duration::from_millis(self.reconnect_intervall_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn ping_intervall(&self) -> Duration {
        Duration::from_millis(self.ping_intervall_ms)
    }

    pub fn stop_gnadenfrist(&self) -> Duration {
        Duration::from_millis(self.stop_gnadenfrist_ms)
    }

    pub fn nachmeldung(&self) -> Duration {
        Duration::from_millis(self.nachmeldung_ms)
    }

    pub fn duck_dauer(&self) -> Duration {
        Duration::from_millis(self.duck_dauer_ms)
    }

    pub fn fade_dauer(&self) -> Duration {
        Duration::from_millis(self.fade_dauer_ms)
    }

    pub fn fade_wiederherstellen(&self) -> Duration {
        Duration::from_millis(self.fade_wiederherstellen_ms)
    }
}

/// Einstellungen der Streaming-Variante (WebSocket)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// z.B. `ws://localhost:8080/ws`
    pub url: String,
    /// Abtastrate der PCM16-Antworten
    pub abtastrate: u32,
    /// Zeitscheibe des Rekorders
    pub zeitscheibe_ms: u64,
    pub aufnahme: MediaConstraints,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".into(),
            abtastrate: voicelink_audio::STREAMING_SAMPLE_RATE,
            zeitscheibe_ms: 250,
            aufnahme: MediaConstraints::streaming(),
        }
    }
}

impl StreamingConfig {
    pub fn zeitscheibe(&self) -> Duration {
        Duration::from_millis(self.zeitscheibe_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standardwerte() {
        let c = SessionConfig::default();
        assert_eq!(c.reconnect_intervall(), Duration::from_secs(3));
        assert_eq!(c.probe_timeout(), Duration::from_millis(300));
        assert_eq!(c.ping_intervall(), Duration::from_secs(5));
        assert_eq!(c.kanal.label, "chat");
        assert!(c.codec.is_default());
    }

    #[test]
    fn teilweise_aus_toml() {
        let toml_str = r#"
            ping_intervall_ms = 3000
            codec = "opus/48000/2"

            [kanal]
            ordered = false
        "#;
        let c: SessionConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(c.ping_intervall_ms, 3000);
        assert_eq!(c.codec, CodecSelection::Named("opus/48000/2".into()));
        assert!(!c.kanal.ordered);
        assert_eq!(c.kanal.label, "chat");
        assert_eq!(c.reconnect_intervall_ms, 3000);
    }

    #[test]
    fn streaming_standard() {
        let c = StreamingConfig::default();
        assert_eq!(c.abtastrate, 24_000);
        assert_eq!(c.zeitscheibe(), Duration::from_millis(250));
        assert_eq!(c.aufnahme.channel_count, Some(1));
    }
}

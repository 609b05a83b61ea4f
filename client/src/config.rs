//! Client-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Client ohne Konfigurationsdatei
//! gegen `http://localhost:8080` laeuft.

use serde::{Deserialize, Serialize};
use voicelink_rtc::RtcConfig;
use voicelink_session::{SessionConfig, SignalingConfig, StreamingConfig};

/// Welche Variante der Client faehrt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modus {
    /// Peer-Verbindung mit Datenkanal
    #[default]
    Rtc,
    /// WebSocket ohne Peer-Verbindung
    Streaming,
}

/// Vollstaendige Client-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub modus: Modus,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Signalisierungs-Endpunkt; die Basis-URL dient auch der Erreichbarkeitspruefung
    pub signaling: SignalingConfig,
    /// Zeiten und Vorgaben der Sitzung
    pub sitzung: SessionConfig,
    /// STUN/TURN-Server
    pub ice: RtcConfig,
    /// Streaming-Variante
    pub streaming: StreamingConfig,
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: trace, debug, info, warn, error
    pub level: String,
    /// Format: "text" oder "json"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl ClientConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// URL der Erreichbarkeitspruefung (eigener Ursprung)
    pub fn probe_url(&self) -> String {
        self.signaling.basis_url.trim_end_matches('/').to_string() + "/"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voicelink_protocol::CodecSelection;

    #[test]
    fn standard_config_ist_valide() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.modus, Modus::Rtc);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.sitzung.reconnect_intervall_ms, 3000);
        assert_eq!(cfg.streaming.zeitscheibe_ms, 250);
        assert!(cfg.ice.ice_servers.is_empty());
        assert_eq!(cfg.probe_url(), "http://localhost:8080/");
    }

    #[test]
    fn config_aus_toml_string() {
        let toml = r#"
            modus = "streaming"

            [signaling]
            basis_url = "https://voice.example.org/"

            [sitzung]
            probe_timeout_ms = 500
            codec = "opus/48000/2"

            [sitzung.kanal]
            label = "steuerung"

            [[ice.ice_servers]]
            urls = ["turns:turn.example.org:5349"]
            username = "tester"
            credential = "geheim"

            [streaming]
            url = "wss://voice.example.org/ws"
        "#;
        let cfg: ClientConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.modus, Modus::Streaming);
        assert_eq!(cfg.probe_url(), "https://voice.example.org/");
        assert_eq!(cfg.sitzung.probe_timeout_ms, 500);
        assert_eq!(cfg.sitzung.codec, CodecSelection::Named("opus/48000/2".into()));
        assert_eq!(cfg.sitzung.kanal.label, "steuerung");
        // Nicht angegebene Felder behalten Standardwerte
        assert!(cfg.sitzung.kanal.ordered);
        assert_eq!(cfg.sitzung.ping_intervall_ms, 5000);
        assert_eq!(cfg.ice.ice_servers.len(), 1);
        assert_eq!(cfg.streaming.url, "wss://voice.example.org/ws");
        assert_eq!(cfg.streaming.abtastrate, 24_000);
    }

    #[test]
    fn fehlende_datei_ergibt_standard() {
        let cfg = ClientConfig::laden("/nicht/vorhanden/voicelink.toml").unwrap();
        assert_eq!(cfg.modus, Modus::Rtc);
    }

    #[test]
    fn unbekannter_modus_ist_fehler() {
        assert!(toml::from_str::<ClientConfig>(r#"modus = "udp""#).is_err());
    }
}

//! Vorgaben fuer die Mikrofon-Aufnahme
//!
//! Beschreibt, welche Eigenschaften der Client von der Aufnahme verlangt.
//! Die eigentliche Aufnahme liefert eine Plattform-Implementierung.

use serde::{Deserialize, Serialize};

use crate::pcm::STREAMING_SAMPLE_RATE;

/// Anforderungen an einen Audio-Eingang
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    /// Exaktes Geraet; `None` = Standardgeraet
    pub device_id: Option<String>,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
    pub sample_rate: Option<u32>,
    pub channel_count: Option<u16>,
    pub sample_size: Option<u16>,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            device_id: None,
            echo_cancellation: true,
            noise_suppression: false,
            auto_gain_control: false,
            sample_rate: None,
            channel_count: None,
            sample_size: None,
        }
    }
}

impl MediaConstraints {
    /// Vorgaben der Streaming-Variante (24 kHz, mono, 16 Bit)
    pub fn streaming() -> Self {
        Self {
            sample_rate: Some(STREAMING_SAMPLE_RATE),
            channel_count: Some(1),
            sample_size: Some(16),
            ..Self::default()
        }
    }

    /// Bindet die Aufnahme an ein bestimmtes Geraet
    pub fn with_device(mut self, device_id: impl Into<String>) -> Self {
        let id = device_id.into();
        self.device_id = if id.is_empty() { None } else { Some(id) };
        self
    }
}

/// Ein aufzaehlbarer Audio-Eingang
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureDevice {
    pub id: String,
    pub label: String,
}

impl CaptureDevice {
    /// Erstellt einen Eintrag; leere Bezeichnung wird zu "Device #n"
    /// (`index` beginnt bei 0, die Anzeige bei 1)
    pub fn new(id: impl Into<String>, label: Option<&str>, index: usize) -> Self {
        let label = match label {
            Some(l) if !l.trim().is_empty() => l.to_string(),
            _ => format!("Device #{}", index + 1),
        };
        Self {
            id: id.into(),
            label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_vorgaben() {
        let c = MediaConstraints::default();
        assert!(c.echo_cancellation);
        assert!(!c.noise_suppression);
        assert!(!c.auto_gain_control);
        assert!(c.device_id.is_none());
        assert!(c.sample_rate.is_none());
    }

    #[test]
    fn streaming_vorgaben() {
        let c = MediaConstraints::streaming();
        assert_eq!(c.sample_rate, Some(24_000));
        assert_eq!(c.channel_count, Some(1));
        assert_eq!(c.sample_size, Some(16));
        assert!(c.echo_cancellation);
    }

    #[test]
    fn leere_geraete_id_ist_standard() {
        assert!(MediaConstraints::default().with_device("").device_id.is_none());
        assert_eq!(
            MediaConstraints::default().with_device("mic-2").device_id.as_deref(),
            Some("mic-2")
        );
    }

    #[test]
    fn geraet_ohne_bezeichnung() {
        assert_eq!(CaptureDevice::new("a", None, 0).label, "Device #1");
        assert_eq!(CaptureDevice::new("b", Some(""), 2).label, "Device #3");
        assert_eq!(CaptureDevice::new("c", Some("USB Mic"), 0).label, "USB Mic");
    }

    #[test]
    fn vorgaben_aus_json_teilweise() {
        let json = r#"{"device_id": "x", "noise_suppression": true}"#;
        let c: MediaConstraints = serde_json::from_str(json).unwrap();
        assert!(c.noise_suppression);
        assert!(c.echo_cancellation);
    }
}

//! PCM-Frames
//!
//! Der Streaming-Server liefert rohe PCM16-Daten (Little Endian, mono).
//! Intern wird mit f32-Samples im Bereich -1.0..1.0 gearbeitet.

use std::time::Duration;

use crate::error::{AudioError, AudioResult};

/// Abtastrate der Streaming-Antworten
pub const STREAMING_SAMPLE_RATE: u32 = 24_000;

/// Ein Block Mono-Samples mit Abtastrate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl AudioFrame {
    /// Erstellt einen Frame; Abtastrate 0 ist ungueltig
    pub fn new(sample_rate: u32, samples: Vec<f32>) -> AudioResult<Self> {
        if sample_rate == 0 {
            return Err(AudioError::UngueltigeAbtastrate(sample_rate));
        }
        Ok(Self {
            sample_rate,
            samples,
        })
    }

    /// Wandelt PCM16 (LE) in f32 um: `s / 32768`
    ///
    /// Ein ueberzaehliges letztes Byte wird ignoriert.
    pub fn from_pcm16(bytes: &[u8], sample_rate: u32) -> AudioResult<Self> {
        let samples = bytes
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
            .collect();
        Self::new(sample_rate, samples)
    }

    /// Wandelt zurueck in PCM16 (LE), mit Begrenzung auf den i16-Bereich
    pub fn to_pcm16(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.samples.len() * 2);
        for s in &self.samples {
            let v = (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    /// Spieldauer des Frames
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_umrechnung() {
        // 0, 16384, -32768, 32767
        let bytes = [0x00, 0x00, 0x00, 0x40, 0x00, 0x80, 0xFF, 0x7F];
        let frame = AudioFrame::from_pcm16(&bytes, STREAMING_SAMPLE_RATE).unwrap();
        assert_eq!(frame.samples.len(), 4);
        assert_eq!(frame.samples[0], 0.0);
        assert_eq!(frame.samples[1], 0.5);
        assert_eq!(frame.samples[2], -1.0);
        assert!((frame.samples[3] - 32767.0 / 32768.0).abs() < f32::EPSILON);
    }

    #[test]
    fn ungerade_laenge_ignoriert_letztes_byte() {
        let frame = AudioFrame::from_pcm16(&[0x00, 0x40, 0x12], 24_000).unwrap();
        assert_eq!(frame.samples, vec![0.5]);
    }

    #[test]
    fn dauer_aus_abtastrate() {
        let frame = AudioFrame::new(24_000, vec![0.0; 12_000]).unwrap();
        assert_eq!(frame.duration(), Duration::from_millis(500));
    }

    #[test]
    fn abtastrate_null_abgelehnt() {
        assert!(matches!(
            AudioFrame::new(0, vec![]),
            Err(AudioError::UngueltigeAbtastrate(0))
        ));
    }

    #[test]
    fn zurueck_nach_pcm16_begrenzt() {
        let frame = AudioFrame::new(24_000, vec![0.5, 2.0, -2.0]).unwrap();
        let bytes = frame.to_pcm16();
        assert_eq!(&bytes[0..2], &16384i16.to_le_bytes());
        assert_eq!(&bytes[2..4], &i16::MAX.to_le_bytes());
        assert_eq!(&bytes[4..6], &i16::MIN.to_le_bytes());
    }
}

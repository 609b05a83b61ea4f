//! Fehlertypen fuer die Audio-Bausteine

use thiserror::Error;

/// Alle moeglichen Fehler der Audio-Schicht
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Audio-Geraet nicht gefunden: {0}")]
    GeraetNichtGefunden(String),

    #[error("Zugriff auf Mikrofon verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Wiedergabe-Fehler: {0}")]
    Wiedergabe(String),

    #[error("Aufnahme-Fehler: {0}")]
    Aufnahme(String),

    #[error("Ungueltige Abtastrate: {0}")]
    UngueltigeAbtastrate(u32),

    #[error("Unerwarteter Fehler: {0}")]
    Anyhow(#[from] anyhow::Error),
}

pub type AudioResult<T> = Result<T, AudioError>;

impl From<AudioError> for voicelink_core::VoicelinkError {
    fn from(e: AudioError) -> Self {
        match e {
            AudioError::GeraetNichtGefunden(m) | AudioError::ZugriffVerweigert(m) => {
                voicelink_core::VoicelinkError::Medien(m)
            }
            other => voicelink_core::VoicelinkError::Audio(other.to_string()),
        }
    }
}

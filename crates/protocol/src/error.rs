//! Fehlertypen fuer das Protokoll-Crate

use thiserror::Error;

/// Fehler beim Lesen oder Schreiben von Protokollnachrichten
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zeilenumbruch in Steuernachricht nicht erlaubt")]
    Zeilenumbruch,

    #[error("Ungueltiger Zeitstempel: {0}")]
    Zeitstempel(String),

    #[error("Leere Nachricht")]
    Leer,
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

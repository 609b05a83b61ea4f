//! Fehlertypen fuer Voicelink
//!
//! Zentraler Fehler-Enum fuer alles, was waehrend eines Verbindungsversuchs
//! schiefgehen kann. Kein Fehler ist prozessweit fatal: jeder beendet
//! hoechstens den aktuellen Versuch, die Wiederverbindung ist der einzige
//! Erholungspfad.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Globaler Result-Alias fuer Voicelink
pub type Result<T> = std::result::Result<T, VoicelinkError>;

/// Alle moeglichen Fehler im Voicelink-Client
#[derive(Debug, Error)]
pub enum VoicelinkError {
    // --- Verhandlung (Offer/Answer) ---
    #[error("Verhandlung fehlgeschlagen: {0}")]
    Verhandlung(String),

    // --- Medien ---
    #[error("Medienzugriff fehlgeschlagen: {0}")]
    Medien(String),

    // --- Verbindung & Netzwerk ---
    #[error("Verbindung fehlgeschlagen: {0}")]
    Verbindung(String),

    #[error("Verbindung getrennt: {0}")]
    Getrennt(String),

    #[error("Zeitlimit ueberschritten: {0}")]
    Zeitlimit(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    #[error("Kanal nicht offen: {0}")]
    KanalNichtOffen(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Audio ---
    #[error("Audiofehler: {0}")]
    Audio(String),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Grobe Einordnung eines Fehlers fuer die Bedienoberflaeche
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FehlerArt {
    /// Netzwerk-, Parse- oder API-Fehler beim Offer/Answer-Austausch
    Verhandlung,
    /// Geraet verweigert oder nicht verfuegbar
    Medien,
    /// Gegenstelle innerhalb der Frist nicht erreichbar
    Lebendigkeit,
    /// Eingehende Nachricht nicht verstanden
    Nachricht,
    /// Alles andere
    Sonstiges,
}

impl VoicelinkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Erstellt einen Verhandlungsfehler aus einer beliebigen Ursache
    pub fn verhandlung(ursache: impl std::fmt::Display) -> Self {
        Self::Verhandlung(ursache.to_string())
    }

    /// Erstellt einen Medienfehler aus einer beliebigen Ursache
    pub fn medien(ursache: impl std::fmt::Display) -> Self {
        Self::Medien(ursache.to_string())
    }

    /// Ordnet den Fehler einer `FehlerArt` zu
    pub fn art(&self) -> FehlerArt {
        match self {
            Self::Verhandlung(_) | Self::Verbindung(_) | Self::Getrennt(_) => {
                FehlerArt::Verhandlung
            }
            Self::Medien(_) | Self::Audio(_) => FehlerArt::Medien,
            Self::Zeitlimit(_) => FehlerArt::Lebendigkeit,
            Self::UngueltigeNachricht(_) => FehlerArt::Nachricht,
            _ => FehlerArt::Sonstiges,
        }
    }

    /// Gibt true zurueck wenn ein neuer Versuch beim naechsten Tick helfen koennte
    ///
    /// Medienfehler werden nicht isoliert wiederholt; der Supervisor startet
    /// trotzdem einen kompletten neuen Versuch, solange die Wiederverbindung
    /// aktiv ist.
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(
            self,
            Self::Zeitlimit(_) | Self::Verbindung(_) | Self::Getrennt(_) | Self::Verhandlung(_)
        )
    }
}

//! Voicelink Client – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet den Client.

use anyhow::Result;
use voicelink_client::{config::ClientConfig, logging::logging_initialisieren, Client};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("VOICELINK_CONFIG").unwrap_or_else(|_| "voicelink.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = ClientConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        modus = ?config.modus,
        "Voicelink Client wird initialisiert"
    );

    Client::neu(config).starten().await
}

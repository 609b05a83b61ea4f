//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable, die Vorrang vor der Datei hat:
//! - `VL_LOG_LEVEL`: Log-Level oder EnvFilter-Direktiven, Standard: info
//! - `VL_LOG_FORMAT`: Format (text/json), Standard: text

use tracing_subscriber::{fmt, EnvFilter};

const LEVEL_ENV: &str = "VL_LOG_LEVEL";
const FORMAT_ENV: &str = "VL_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Ein ungueltiges Format faellt auf `text` zurueck, ein ungueltiger
/// Filter auf `info`.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(LEVEL_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format_waehlen(format).as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}

/// Format aus der Umgebung, sonst aus der Konfiguration
fn format_waehlen(konfiguriert: &str) -> String {
    let format = std::env::var(FORMAT_ENV).unwrap_or_else(|_| konfiguriert.to_string());
    if log_format_gueltig(&format) {
        format
    } else {
        "text".to_string()
    }
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_werte() {
        assert!(log_level_gueltig("debug"));
        assert!(log_level_gueltig("error"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig("verbose"));
    }

    #[test]
    fn format_fallback() {
        std::env::remove_var(FORMAT_ENV);
        assert_eq!(format_waehlen("json"), "json");
        assert_eq!(format_waehlen("xml"), "text");
    }
}

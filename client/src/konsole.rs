//! Bedienung ueber stdin
//!
//! Eine Zeile pro Eingabe. Die Tasten der Bedienoberflaeche werden zu
//! Woertern:
//!
//! | Eingabe                          | Wirkung                          |
//! |----------------------------------|----------------------------------|
//! | `start` / `stop`                 | Sitzung bzw. Aufnahme an/aus     |
//! | `save_audio`, `time_test`, `f3`, `f4` | Kommando senden           |
//! | `devices`                        | Eingabegeraete auflisten         |
//! | `quit`                           | Client beenden                   |

use voicelink_protocol::control::{CMD_F3, CMD_F4, CMD_SAVE_AUDIO, CMD_TIME_TEST};

/// Eine gelesene Bedien-Eingabe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eingabe {
    Start,
    Stop,
    Kommando(&'static str),
    Geraete,
    Beenden,
    Unbekannt(String),
}

/// Liest eine Zeile; leere Zeilen ergeben `None`
pub fn lesen(zeile: &str) -> Option<Eingabe> {
    let wort = zeile.trim();
    if wort.is_empty() {
        return None;
    }
    let eingabe = match wort.to_ascii_lowercase().as_str() {
        "start" => Eingabe::Start,
        "stop" => Eingabe::Stop,
        "devices" | "geraete" => Eingabe::Geraete,
        "quit" | "exit" => Eingabe::Beenden,
        CMD_SAVE_AUDIO => Eingabe::Kommando(CMD_SAVE_AUDIO),
        CMD_TIME_TEST => Eingabe::Kommando(CMD_TIME_TEST),
        CMD_F3 => Eingabe::Kommando(CMD_F3),
        CMD_F4 => Eingabe::Kommando(CMD_F4),
        _ => Eingabe::Unbekannt(wort.to_string()),
    };
    Some(eingabe)
}

/// Kurzhilfe fuer unbekannte Eingaben
pub const HILFE: &str = "start | stop | save_audio | time_test | f3 | f4 | devices | quit";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bedienwoerter() {
        assert_eq!(lesen("start"), Some(Eingabe::Start));
        assert_eq!(lesen("  STOP \n"), Some(Eingabe::Stop));
        assert_eq!(lesen("devices"), Some(Eingabe::Geraete));
        assert_eq!(lesen("quit"), Some(Eingabe::Beenden));
    }

    #[test]
    fn kommandos() {
        assert_eq!(lesen("f3"), Some(Eingabe::Kommando("f3")));
        assert_eq!(lesen("F4"), Some(Eingabe::Kommando("f4")));
        assert_eq!(lesen("save_audio"), Some(Eingabe::Kommando("save_audio")));
        assert_eq!(lesen("time_test"), Some(Eingabe::Kommando("time_test")));
    }

    #[test]
    fn leer_und_unbekannt() {
        assert_eq!(lesen("   "), None);
        assert_eq!(lesen("f5"), Some(Eingabe::Unbekannt("f5".into())));
    }
}

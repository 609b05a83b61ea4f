//! Codec-Filter fuer SDP-Angebote
//!
//! Entfernt aus den Medien-Abschnitten einer Art (z.B. `audio`) alle
//! Attributzeilen (`rtpmap`, `fmtp`, `rtcp-fb`) deren Payload-Typ nicht zum
//! gewaehlten Codec gehoert.
//!
//! ## Ablauf
//! ```text
//! 1. Durchlauf: erlaubte Payload-Typen sammeln
//!      a=rtpmap:<pt> <codec>...      -> pt erlaubt
//!      a=fmtp:<pt> apt=<erlaubt>     -> pt erlaubt (Retransmission)
//! 2. Durchlauf: Attributzeilen mit fremdem pt im Ziel-Abschnitt verwerfen
//! ```
//!
//! Der erste Durchlauf ist einmalig vorwaerts: eine `apt`-Zeile vor der
//! `rtpmap`-Zeile ihres Codecs wird nicht nachtraeglich erlaubt.
//!
//! Die Funktion ist total. Zeilen werden mit ihrem eigenen Zeilenende
//! (LF oder CRLF) uebernommen; die Payload-Liste der `m=`-Zeile bleibt
//! unveraendert.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

/// `a=fmtp:<pt> apt=<pt>` am Zeilenende, mit oder ohne CR
fn rtx_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^a=fmtp:(\d+) apt=(\d+)\r?$").unwrap_or_else(|e| {
            unreachable!("statischer Ausdruck ist gueltig: {e}")
        })
    })
}

/// Attributzeilen die einem Payload-Typ zugeordnet sind
fn attribut_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^a=(fmtp|rtcp-fb|rtpmap):([0-9]+)").unwrap_or_else(|e| {
            unreachable!("statischer Ausdruck ist gueltig: {e}")
        })
    })
}

/// Verfolgt ob die aktuelle Zeile im Ziel-Abschnitt liegt
struct AbschnittsZeiger {
    praefix: String,
    im_ziel: bool,
}

impl AbschnittsZeiger {
    fn neu(art: &str) -> Self {
        Self {
            praefix: format!("m={art} "),
            im_ziel: false,
        }
    }

    /// Verarbeitet eine Zeile und meldet ob sie im Ziel-Abschnitt liegt
    fn weiter(&mut self, zeile: &str) -> bool {
        if zeile.starts_with(&self.praefix) {
            self.im_ziel = true;
        } else if zeile.starts_with("m=") {
            self.im_ziel = false;
        }
        self.im_ziel
    }
}

/// Payload-Typ aus einer Regex-Gruppe lesen
fn payload_typ(caps: &regex::Captures<'_>, gruppe: usize) -> Option<u32> {
    caps.get(gruppe).and_then(|m| m.as_str().parse().ok())
}

/// Filtert `sdp` so, dass in Abschnitten der Art `kind` nur noch
/// Attributzeilen des Codecs `codec` (und seiner Retransmission) bleiben.
///
/// Deterministisch und ohne Seiteneffekte. Bei kaputtem Eingabetext werden
/// Zeilen unveraendert durchgereicht.
pub fn filter_codec(kind: &str, codec: &str, sdp: &str) -> String {
    // Codec-Name ist Literal, keine Regex-Syntax
    let codec_regex = match Regex::new(&format!("^a=rtpmap:([0-9]+) {}", regex::escape(codec))) {
        Ok(re) => re,
        Err(e) => {
            tracing::warn!(codec, fehler = %e, "Codec-Muster nicht baubar, SDP unveraendert");
            return sdp.to_string();
        }
    };

    let zeilen: Vec<&str> = sdp.split_inclusive('\n').collect();

    // 1. Durchlauf: erlaubte Payload-Typen sammeln
    let mut erlaubt: HashSet<u32> = HashSet::new();
    let mut zeiger = AbschnittsZeiger::neu(kind);
    for zeile in &zeilen {
        let inhalt = zeile.strip_suffix('\n').unwrap_or(zeile);
        if !zeiger.weiter(inhalt) {
            continue;
        }

        if let Some(pt) = codec_regex
            .captures(inhalt)
            .and_then(|caps| payload_typ(&caps, 1))
        {
            erlaubt.insert(pt);
        }

        if let Some(caps) = rtx_regex().captures(inhalt) {
            if let (Some(pt), Some(apt)) = (payload_typ(&caps, 1), payload_typ(&caps, 2)) {
                if erlaubt.contains(&apt) {
                    erlaubt.insert(pt);
                }
            }
        }
    }

    tracing::trace!(kind, codec, erlaubt = ?erlaubt, "Erlaubte Payload-Typen");

    // 2. Durchlauf: fremde Attributzeilen im Ziel-Abschnitt verwerfen
    let mut ausgabe = String::with_capacity(sdp.len());
    let mut zeiger = AbschnittsZeiger::neu(kind);
    for zeile in &zeilen {
        let inhalt = zeile.strip_suffix('\n').unwrap_or(zeile);
        if zeiger.weiter(inhalt) {
            if let Some(caps) = attribut_regex().captures(inhalt) {
                let behalten = payload_typ(&caps, 2).is_some_and(|pt| erlaubt.contains(&pt));
                if !behalten {
                    continue;
                }
            }
        }
        ausgabe.push_str(zeile);
    }

    ausgabe
}

// ---------------------------------------------------------------------------
// Codec-Auswahl
// ---------------------------------------------------------------------------

/// Vom Bediener gewaehlter Codec
///
/// `"default"` (oder leer) bedeutet: Angebot unveraendert senden.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CodecSelection {
    #[default]
    Default,
    /// Literaler Codec-Name wie in der `rtpmap`-Zeile, z.B. `opus/48000/2`
    Named(String),
}

impl CodecSelection {
    /// Wendet die Auswahl auf ein SDP an, `None` wenn nichts zu tun ist
    pub fn apply(&self, kind: &str, sdp: &str) -> Option<String> {
        match self {
            Self::Default => None,
            Self::Named(codec) => Some(filter_codec(kind, codec, sdp)),
        }
    }

    /// Gibt true zurueck wenn nicht gefiltert wird
    pub fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

impl From<String> for CodecSelection {
    fn from(s: String) -> Self {
        let s = s.trim();
        if s.is_empty() || s == "default" {
            Self::Default
        } else {
            Self::Named(s.to_string())
        }
    }
}

impl From<&str> for CodecSelection {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<CodecSelection> for String {
    fn from(sel: CodecSelection) -> Self {
        match sel {
            CodecSelection::Default => "default".to_string(),
            CodecSelection::Named(name) => name,
        }
    }
}

impl std::fmt::Display for CodecSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Named(name) => f.write_str(name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Typisches Browser-Angebot mit Audio (Opus + RTX) und Video
    const ANGEBOT: &str = "v=0\r\n\
o=- 4611731400430051336 2 IN IP4 127.0.0.1\r\n\
s=-\r\n\
t=0 0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 63 9 0 8 96\r\n\
c=IN IP4 0.0.0.0\r\n\
a=mid:0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=rtcp-fb:111 transport-cc\r\n\
a=fmtp:111 minptime=10;useinbandfec=1\r\n\
a=rtpmap:63 red/48000/2\r\n\
a=fmtp:63 111/111\r\n\
a=rtpmap:9 G722/8000\r\n\
a=rtpmap:0 PCMU/8000\r\n\
a=rtpmap:8 PCMA/8000\r\n\
a=rtpmap:96 rtx/48000\r\n\
a=fmtp:96 apt=111\r\n\
m=video 9 UDP/TLS/RTP/SAVPF 100 101\r\n\
a=mid:1\r\n\
a=rtpmap:100 VP8/90000\r\n\
a=rtcp-fb:100 nack\r\n\
a=rtpmap:101 rtx/90000\r\n\
a=fmtp:101 apt=100\r\n";

    #[test]
    fn opus_behaelt_eigene_zeilen_und_rtx() {
        let gefiltert = filter_codec("audio", "opus/48000/2", ANGEBOT);

        assert!(gefiltert.contains("a=rtpmap:111 opus/48000/2\r\n"));
        assert!(gefiltert.contains("a=rtcp-fb:111 transport-cc\r\n"));
        assert!(gefiltert.contains("a=fmtp:111 minptime=10;useinbandfec=1\r\n"));
        // RTX verweist auf erlaubten Codec
        assert!(gefiltert.contains("a=rtpmap:96 rtx/48000\r\n"));
        assert!(gefiltert.contains("a=fmtp:96 apt=111\r\n"));

        for fremd in ["a=rtpmap:63", "a=fmtp:63", "a=rtpmap:9 ", "a=rtpmap:0 ", "a=rtpmap:8 "] {
            assert!(!gefiltert.contains(fremd), "{fremd} haette entfernt werden muessen");
        }
    }

    #[test]
    fn andere_abschnitte_bleiben_byte_gleich() {
        let gefiltert = filter_codec("audio", "opus/48000/2", ANGEBOT);
        let video_start = ANGEBOT.find("m=video").unwrap();
        let video_gefiltert = gefiltert.find("m=video").unwrap();
        assert_eq!(&gefiltert[video_gefiltert..], &ANGEBOT[video_start..]);

        // Sitzungs-Kopf ebenfalls
        let kopf_ende = ANGEBOT.find("m=audio").unwrap();
        assert_eq!(&gefiltert[..kopf_ende], &ANGEBOT[..kopf_ende]);
    }

    #[test]
    fn m_zeile_bleibt_unveraendert() {
        let gefiltert = filter_codec("audio", "PCMU/8000", ANGEBOT);
        assert!(gefiltert.contains("m=audio 9 UDP/TLS/RTP/SAVPF 111 63 9 0 8 96\r\n"));
        assert!(gefiltert.contains("a=rtpmap:0 PCMU/8000\r\n"));
        assert!(!gefiltert.contains("a=rtpmap:111"));
        // Nicht-Attributzeilen im Abschnitt bleiben
        assert!(gefiltert.contains("a=mid:0\r\n"));
        assert!(gefiltert.contains("c=IN IP4 0.0.0.0\r\n"));
    }

    #[test]
    fn filter_ist_idempotent() {
        let einmal = filter_codec("audio", "opus/48000/2", ANGEBOT);
        let zweimal = filter_codec("audio", "opus/48000/2", &einmal);
        assert_eq!(einmal, zweimal);

        let einmal = filter_codec("video", "VP8/90000", ANGEBOT);
        let zweimal = filter_codec("video", "VP8/90000", &einmal);
        assert_eq!(einmal, zweimal);
    }

    #[test]
    fn fehlende_art_laesst_dokument_unveraendert() {
        assert_eq!(filter_codec("application", "opus", ANGEBOT), ANGEBOT);
    }

    #[test]
    fn zwei_opus_payloads_bleiben_erhalten() {
        let sdp = "v=0\n\
m=audio 9 RTP/AVP 100 101\n\
a=rtpmap:100 opus/48000/2\n\
a=rtpmap:101 opus/48000/1\n";

        let gefiltert = filter_codec("audio", "opus", sdp);
        assert_eq!(gefiltert.matches("m=").count(), 1);
        assert_eq!(gefiltert.matches("a=rtpmap:").count(), 2);
        assert_eq!(gefiltert, sdp);
    }

    #[test]
    fn unbekannter_codec_entfernt_alle_audio_attribute() {
        let sdp = "v=0\n\
m=audio 9 RTP/AVP 100 101\n\
a=rtpmap:100 opus/48000/2\n\
a=fmtp:100 useinbandfec=1\n\
a=rtcp-fb:100 nack\n\
a=rtpmap:101 opus/48000/1\n";

        let gefiltert = filter_codec("audio", "vp8", sdp);
        assert_eq!(gefiltert, "v=0\nm=audio 9 RTP/AVP 100 101\n");
    }

    #[test]
    fn rtx_vor_codec_wird_nicht_nachtraeglich_erlaubt() {
        let sdp = "m=audio 9 RTP/AVP 111 96\n\
a=rtpmap:96 rtx/48000\n\
a=fmtp:96 apt=111\n\
a=rtpmap:111 opus/48000/2\n";

        let gefiltert = filter_codec("audio", "opus", sdp);
        assert!(gefiltert.contains("a=rtpmap:111 opus/48000/2\n"));
        assert!(!gefiltert.contains("a=fmtp:96 apt=111"));
        assert!(!gefiltert.contains("a=rtpmap:96"));
    }

    #[test]
    fn regex_sonderzeichen_im_codec_namen() {
        // "." darf nicht als Platzhalter wirken
        let sdp = "m=audio 9 RTP/AVP 1 2\n\
a=rtpmap:1 x.y/8000\n\
a=rtpmap:2 xzy/8000\n";

        let gefiltert = filter_codec("audio", "x.y", sdp);
        assert!(gefiltert.contains("a=rtpmap:1 x.y/8000\n"));
        assert!(!gefiltert.contains("a=rtpmap:2"));

        // Klammern und Plus fuehren nicht zu ungueltigem Muster
        let gefiltert = filter_codec("audio", "c++(", sdp);
        assert_eq!(gefiltert, "m=audio 9 RTP/AVP 1 2\n");
    }

    #[test]
    fn rtcp_fb_wildcard_bleibt() {
        let sdp = "m=audio 9 RTP/AVP 1\n\
a=rtcp-fb:* nack\n\
a=rtpmap:1 PCMU/8000\n";
        assert_eq!(filter_codec("audio", "opus", sdp), "m=audio 9 RTP/AVP 1\na=rtcp-fb:* nack\n");
    }

    #[test]
    fn kaputter_text_wird_durchgereicht() {
        let kaputt = "kein sdp\nnur text";
        assert_eq!(filter_codec("audio", "opus", kaputt), kaputt);
        assert_eq!(filter_codec("audio", "opus", ""), "");
    }

    #[test]
    fn mehrere_audio_abschnitte() {
        let sdp = "m=audio 9 RTP/AVP 1 2\n\
a=rtpmap:1 PCMU/8000\n\
a=rtpmap:2 opus/48000/2\n\
m=video 9 RTP/AVP 1\n\
a=rtpmap:1 VP8/90000\n\
m=audio 9 RTP/AVP 1 2\n\
a=rtpmap:1 PCMU/8000\n\
a=rtpmap:2 opus/48000/2\n";

        let gefiltert = filter_codec("audio", "opus", sdp);
        assert_eq!(gefiltert.matches("a=rtpmap:2 opus").count(), 2);
        assert_eq!(gefiltert.matches("a=rtpmap:1 PCMU").count(), 0);
        assert!(gefiltert.contains("a=rtpmap:1 VP8/90000\n"));
    }

    #[test]
    fn codec_auswahl_aus_string() {
        assert_eq!(CodecSelection::from("default"), CodecSelection::Default);
        assert_eq!(CodecSelection::from(""), CodecSelection::Default);
        assert_eq!(
            CodecSelection::from("opus/48000/2"),
            CodecSelection::Named("opus/48000/2".into())
        );
    }

    #[test]
    fn codec_auswahl_anwenden() {
        assert!(CodecSelection::Default.apply("audio", ANGEBOT).is_none());
        let gefiltert = CodecSelection::from("G722/8000")
            .apply("audio", ANGEBOT)
            .unwrap();
        assert!(gefiltert.contains("a=rtpmap:9 G722/8000"));
        assert!(!gefiltert.contains("a=rtpmap:111"));
    }

    #[test]
    fn codec_auswahl_serde() {
        let sel: CodecSelection = serde_json::from_str("\"PCMU/8000\"").unwrap();
        assert_eq!(sel, CodecSelection::Named("PCMU/8000".into()));
        let json = serde_json::to_string(&CodecSelection::Default).unwrap();
        assert_eq!(json, "\"default\"");
    }
}

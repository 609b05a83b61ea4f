//! Offer/Answer-Verhandlung
//!
//! Ablauf, strikt nacheinander:
//!
//! ```text
//! create_offer -> set_local_description -> warten auf ICE "complete"
//!   -> (optional) Codec-Filter auf die zu sendende Kopie
//!   -> POST /offer -> set_remote_description(answer)
//! ```
//!
//! Lokal bleibt das ungefilterte Angebot gesetzt; nur die gesendete Kopie
//! wird umgeschrieben. Jeder Fehler unterwegs ist ein einzelner
//! Verhandlungsfehler, es gibt keinen teilweisen Neuversuch.

use std::sync::Arc;

use tracing::{debug, info, instrument};
use voicelink_core::{EventBus, IceGatheringState, Result, SessionEvent, VoicelinkError};
use voicelink_protocol::{CodecSelection, SessionDescription};

use crate::capabilities::{PeerConnection, SignalingTransport};

/// Medienart, auf die die Codec-Auswahl angewendet wird
pub const AUDIO_KIND: &str = "audio";

/// Fuehrt die Verhandlung fuer einen Verbindungsversuch durch
#[derive(Clone)]
pub struct NegotiationEngine {
    signaling: Arc<dyn SignalingTransport>,
    events: EventBus,
}

impl NegotiationEngine {
    pub fn new(signaling: Arc<dyn SignalingTransport>, events: EventBus) -> Self {
        Self { signaling, events }
    }

    /// Verhandelt die Verbindung und gibt die angewendete Antwort zurueck
    #[instrument(skip_all, fields(codec = %codec))]
    pub async fn negotiate(
        &self,
        pc: &dyn PeerConnection,
        codec: &CodecSelection,
    ) -> Result<SessionDescription> {
        let offer = pc.create_offer().await.map_err(als_verhandlung)?;
        pc.set_local_description(offer)
            .await
            .map_err(als_verhandlung)?;

        wait_for_gathering_complete(pc).await?;

        // Erst nach dem Sammeln enthaelt die Beschreibung alle Kandidaten
        let lokal = pc
            .local_description()
            .await
            .ok_or_else(|| VoicelinkError::verhandlung("keine lokale Beschreibung"))?;

        let gesendet = match codec.apply(AUDIO_KIND, &lokal.sdp) {
            Some(gefiltert) => {
                debug!("Angebot auf Codec {} gefiltert", codec);
                lokal.with_sdp(gefiltert)
            }
            None => lokal,
        };

        self.events.senden(SessionEvent::AngebotGesendet {
            sdp: gesendet.sdp.clone(),
        });

        let antwort = self
            .signaling
            .exchange(&gesendet)
            .await
            .map_err(als_verhandlung)?;

        self.events.senden(SessionEvent::AntwortEmpfangen {
            sdp: antwort.sdp.clone(),
        });

        pc.set_remote_description(antwort.clone())
            .await
            .map_err(als_verhandlung)?;

        info!("Verhandlung abgeschlossen");
        Ok(antwort)
    }
}

/// Wartet bis die ICE-Sammlung abgeschlossen ist
///
/// Ist der Zustand bereits "complete", kehrt die Funktion sofort zurueck.
/// Der Empfaenger wird beim Verlassen verworfen.
pub async fn wait_for_gathering_complete(pc: &dyn PeerConnection) -> Result<()> {
    let mut rx = pc.states();
    rx.wait_for(|s| s.ice_gathering == IceGatheringState::Complete)
        .await
        .map_err(|_| VoicelinkError::verhandlung("Verbindung vor Ende der ICE-Sammlung geschlossen"))?;
    debug!("ICE-Sammlung abgeschlossen");
    Ok(())
}

fn als_verhandlung(e: VoicelinkError) -> VoicelinkError {
    match e {
        VoicelinkError::Verhandlung(_) => e,
        other => VoicelinkError::Verhandlung(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePeerConnection, FakeSignaling};
    use voicelink_protocol::SdpType;

    const ANGEBOT: &str = "v=0\r\n\
m=audio 9 UDP/TLS/RTP/SAVPF 111 0\r\n\
a=rtpmap:111 opus/48000/2\r\n\
a=rtpmap:0 PCMU/8000\r\n";

    #[tokio::test]
    async fn bereits_complete_wartet_nicht() {
        let pc = FakePeerConnection::new(ANGEBOT);
        pc.set_gathering(IceGatheringState::Complete);
        let sig = Arc::new(FakeSignaling::echo());
        let engine = NegotiationEngine::new(sig.clone(), EventBus::new());

        let antwort = engine
            .negotiate(pc.as_ref(), &CodecSelection::Default)
            .await
            .unwrap();

        assert_eq!(antwort.sdp_type, SdpType::Answer);
        assert_eq!(pc.remote_description().unwrap().sdp, ANGEBOT);
    }

    #[tokio::test]
    async fn wartet_auf_ice_sammlung() {
        let pc = FakePeerConnection::new(ANGEBOT);
        pc.set_gathering(IceGatheringState::Gathering);
        let sig = Arc::new(FakeSignaling::echo());
        let engine = NegotiationEngine::new(sig.clone(), EventBus::new());

        let pc2 = pc.clone();
        let task = tokio::spawn(async move {
            engine
                .negotiate(pc2.as_ref(), &CodecSelection::Default)
                .await
        });

        tokio::task::yield_now().await;
        assert_eq!(sig.angebote().len(), 0, "darf vor 'complete' nicht senden");

        pc.set_gathering(IceGatheringState::Complete);
        task.await.unwrap().unwrap();
        assert_eq!(sig.angebote().len(), 1);
    }

    #[tokio::test]
    async fn nur_gesendete_kopie_wird_gefiltert() {
        let pc = FakePeerConnection::new(ANGEBOT);
        pc.set_gathering(IceGatheringState::Complete);
        let sig = Arc::new(FakeSignaling::echo());
        let bus = EventBus::new();
        let mut rx = bus.abonnieren();
        let engine = NegotiationEngine::new(sig.clone(), bus);

        engine
            .negotiate(pc.as_ref(), &CodecSelection::from("opus/48000/2"))
            .await
            .unwrap();

        let gesendet = &sig.angebote()[0];
        assert!(gesendet.sdp.contains("a=rtpmap:111 opus/48000/2"));
        assert!(!gesendet.sdp.contains("PCMU"));
        // Lokal bleibt das Original gesetzt
        assert!(pc.local_sdp().unwrap().contains("PCMU"));

        match rx.recv().await.unwrap() {
            SessionEvent::AngebotGesendet { sdp } => assert_eq!(sdp, gesendet.sdp),
            other => panic!("Erwartet AngebotGesendet, erhalten: {other:?}"),
        }
    }

    #[tokio::test]
    async fn signalisierungsfehler_ist_verhandlungsfehler() {
        let pc = FakePeerConnection::new(ANGEBOT);
        pc.set_gathering(IceGatheringState::Complete);
        let sig = Arc::new(FakeSignaling::fehlerhaft("HTTP 500"));
        let engine = NegotiationEngine::new(sig, EventBus::new());

        let err = engine
            .negotiate(pc.as_ref(), &CodecSelection::Default)
            .await
            .unwrap_err();
        assert!(matches!(err, VoicelinkError::Verhandlung(_)));
        assert!(pc.remote_description().is_none());
    }

    #[tokio::test]
    async fn schliessen_waehrend_sammlung() {
        let pc = FakePeerConnection::new(ANGEBOT);
        pc.set_gathering(IceGatheringState::Gathering);
        let sig = Arc::new(FakeSignaling::echo());
        let engine = NegotiationEngine::new(sig, EventBus::new());

        let pc2 = pc.clone();
        let task = tokio::spawn(async move {
            engine
                .negotiate(pc2.as_ref(), &CodecSelection::Default)
                .await
        });
        tokio::task::yield_now().await;
        pc.zustaende_beenden();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, VoicelinkError::Verhandlung(_)));
    }
}

//! Peer-Verbindung ueber webrtc-rs
//!
//! `RtcPeerConnector` baut pro Verbindungsversuch eine frische
//! `RTCPeerConnection` mit Standard-Codecs und -Interceptoren. Die vier
//! Zustands-Callbacks schreiben in einen gemeinsamen `watch`-Kanal, so dass
//! die Sitzungslogik jederzeit den vollstaendigen Stand sieht.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use voicelink_core::{
    IceConnectionState, IceGatheringState, PeerConnectionState, PeerStates, Result,
    SignalingState, VoicelinkError,
};
use voicelink_protocol::{SdpType, SessionDescription};
use voicelink_session::{
    DataChannel, DataChannelOptions, LocalTrack, PeerConnection, PeerConnector, RemoteTrack,
};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::channel::RtcDataChannel;
use crate::config::RtcConfig;

/// Erzeugt Peer-Verbindungen mit gemeinsamer ICE-Konfiguration
pub struct RtcPeerConnector {
    api: API,
    config: RtcConfig,
}

impl RtcPeerConnector {
    pub fn new(config: RtcConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| VoicelinkError::intern(format!("Codecs registrieren: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| VoicelinkError::intern(format!("Interceptoren registrieren: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self { api, config })
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn create(&self) -> Result<Arc<dyn PeerConnection>> {
        let rtc_config = RTCConfiguration {
            ice_servers: self.config.ice_servers.iter().map(|s| s.to_rtc()).collect(),
            ..Default::default()
        };
        let pc = self
            .api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Peer-Verbindung anlegen: {e}")))?;
        info!(ice_server = self.config.ice_servers.len(), "Peer-Verbindung angelegt");
        Ok(RtcPeerConnection::new(Arc::new(pc)))
    }
}

type SpurSender = Arc<Mutex<Option<mpsc::UnboundedSender<RemoteTrack>>>>;

pub struct RtcPeerConnection {
    pc: Arc<RTCPeerConnection>,
    zustaende: Arc<watch::Sender<PeerStates>>,
    spuren_tx: SpurSender,
    spuren_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RemoteTrack>>,
    pumpen: Mutex<Vec<JoinHandle<()>>>,
}

impl RtcPeerConnection {
    fn new(pc: Arc<RTCPeerConnection>) -> Arc<Self> {
        let (zustaende, _) = watch::channel(PeerStates::default());
        let zustaende = Arc::new(zustaende);
        let (tx, rx) = mpsc::unbounded_channel();
        let spuren_tx: SpurSender = Arc::new(Mutex::new(Some(tx)));

        let z = zustaende.clone();
        pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
            z.send_modify(|stand| stand.connection = verbindung(s));
            Box::pin(async {})
        }));

        let z = zustaende.clone();
        pc.on_ice_connection_state_change(Box::new(move |s: RTCIceConnectionState| {
            z.send_modify(|stand| stand.ice_connection = ice_verbindung(s));
            Box::pin(async {})
        }));

        let z = zustaende.clone();
        pc.on_ice_gathering_state_change(Box::new(move |s: RTCIceGathererState| {
            z.send_modify(|stand| stand.ice_gathering = sammlung(s));
            Box::pin(async {})
        }));

        let z = zustaende.clone();
        pc.on_signaling_state_change(Box::new(move |s: RTCSignalingState| {
            z.send_modify(|stand| stand.signaling = signalisierung(s));
            Box::pin(async {})
        }));

        let tx = spuren_tx.clone();
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let spur = RemoteTrack {
                kind: track.kind().to_string(),
                id: track.id(),
            };
            if let Some(tx) = tx.lock().as_ref() {
                let _ = tx.send(spur);
            }
            // Wiedergabe ist Sache der Plattform, RTP wird nur abgenommen
            Box::pin(async move {
                while track.read_rtp().await.is_ok() {}
                debug!("Eingehende Spur beendet");
            })
        }));

        Arc::new(Self {
            pc,
            zustaende,
            spuren_tx,
            spuren_rx: tokio::sync::Mutex::new(rx),
            pumpen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl PeerConnection for RtcPeerConnection {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| VoicelinkError::verhandlung(format!("Angebot erstellen: {e}")))?;
        Ok(von_rtc(offer))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = zu_rtc(desc)?;
        self.pc
            .set_local_description(desc)
            .await
            .map_err(|e| VoicelinkError::verhandlung(format!("Lokale Beschreibung: {e}")))
    }

    async fn local_description(&self) -> Option<SessionDescription> {
        self.pc.local_description().await.map(von_rtc)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let desc = zu_rtc(desc)?;
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| VoicelinkError::verhandlung(format!("Entfernte Beschreibung: {e}")))
    }

    async fn add_track(&self, track: Arc<dyn LocalTrack>) -> Result<()> {
        let ausgang = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            track.id().to_string(),
            "voicelink".to_owned(),
        ));

        let sender = self
            .pc
            .add_track(ausgang.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| VoicelinkError::medien(format!("Spur hinzufuegen: {e}")))?;

        // RTCP abnehmen
        let rtcp = tokio::spawn(async move {
            let mut puffer = vec![0u8; 1500];
            while sender.read(&mut puffer).await.is_ok() {}
        });

        let pumpe = tokio::spawn(async move {
            while let Some(block) = track.next_sample().await {
                let sample = Sample {
                    data: block.data,
                    duration: block.duration,
                    ..Default::default()
                };
                if let Err(e) = ausgang.write_sample(&sample).await {
                    warn!("Sample schreiben: {}", e);
                    break;
                }
            }
            debug!("Spur-Pumpe beendet");
        });

        self.pumpen.lock().extend([rtcp, pumpe]);
        Ok(())
    }

    async fn create_data_channel(
        &self,
        options: &DataChannelOptions,
    ) -> Result<Arc<dyn DataChannel>> {
        let init = RTCDataChannelInit {
            ordered: Some(options.ordered),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(&options.label, Some(init))
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Datenkanal anlegen: {e}")))?;
        Ok(RtcDataChannel::new(dc))
    }

    fn states(&self) -> watch::Receiver<PeerStates> {
        self.zustaende.subscribe()
    }

    async fn next_remote_track(&self) -> Option<RemoteTrack> {
        self.spuren_rx.lock().await.recv().await
    }

    async fn stop_transceivers(&self) {
        for transceiver in self.pc.get_transceivers().await {
            if let Err(e) = transceiver.stop().await {
                debug!("Transceiver stoppen: {}", e);
            }
        }
    }

    async fn close(&self) -> Result<()> {
        for pumpe in self.pumpen.lock().drain(..) {
            pumpe.abort();
        }
        self.spuren_tx.lock().take();
        self.pc
            .close()
            .await
            .map_err(|e| VoicelinkError::Verbindung(format!("Schliessen: {e}")))
    }
}

fn zu_rtc(desc: SessionDescription) -> Result<RTCSessionDescription> {
    let ergebnis = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
    };
    ergebnis.map_err(|e| VoicelinkError::verhandlung(format!("SDP nicht lesbar: {e}")))
}

fn von_rtc(desc: RTCSessionDescription) -> SessionDescription {
    match desc.sdp_type {
        RTCSdpType::Answer | RTCSdpType::Pranswer => SessionDescription::answer(desc.sdp),
        _ => SessionDescription::offer(desc.sdp),
    }
}

fn verbindung(s: RTCPeerConnectionState) -> PeerConnectionState {
    match s {
        RTCPeerConnectionState::Connecting => PeerConnectionState::Connecting,
        RTCPeerConnectionState::Connected => PeerConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => PeerConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => PeerConnectionState::Failed,
        RTCPeerConnectionState::Closed => PeerConnectionState::Closed,
        _ => PeerConnectionState::New,
    }
}

fn ice_verbindung(s: RTCIceConnectionState) -> IceConnectionState {
    match s {
        RTCIceConnectionState::Checking => IceConnectionState::Checking,
        RTCIceConnectionState::Connected => IceConnectionState::Connected,
        RTCIceConnectionState::Completed => IceConnectionState::Completed,
        RTCIceConnectionState::Disconnected => IceConnectionState::Disconnected,
        RTCIceConnectionState::Failed => IceConnectionState::Failed,
        RTCIceConnectionState::Closed => IceConnectionState::Closed,
        _ => IceConnectionState::New,
    }
}

fn sammlung(s: RTCIceGathererState) -> IceGatheringState {
    match s {
        RTCIceGathererState::Gathering => IceGatheringState::Gathering,
        // Ein geschlossener Sammler liefert keine Kandidaten mehr
        RTCIceGathererState::Complete | RTCIceGathererState::Closed => IceGatheringState::Complete,
        _ => IceGatheringState::New,
    }
}

fn signalisierung(s: RTCSignalingState) -> SignalingState {
    match s {
        RTCSignalingState::HaveLocalOffer => SignalingState::HaveLocalOffer,
        RTCSignalingState::HaveRemoteOffer => SignalingState::HaveRemoteOffer,
        RTCSignalingState::HaveLocalPranswer => SignalingState::HaveLocalPranswer,
        RTCSignalingState::HaveRemotePranswer => SignalingState::HaveRemotePranswer,
        RTCSignalingState::Closed => SignalingState::Closed,
        _ => SignalingState::Stable,
    }
}

//! voicelink-client – Bibliotheks-Root
//!
//! Verdrahtet Konfiguration, Plattform-Faehigkeiten und Sitzung zum
//! Konsolen-Client. Bedient wird ueber stdin (siehe [`konsole`]).

pub mod config;
pub mod konsole;
pub mod logging;
pub mod platform;
pub mod protokoll;

use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use voicelink_audio::{CaptureDevice, PlaybackQueue};
use voicelink_core::EventBus;
use voicelink_rtc::{RtcPeerConnector, SilenceCapture};
use voicelink_session::{
    Faehigkeiten, HttpLivenessProbe, HttpSignaling, MediaCapture, Session, StreamingClient,
};

use config::{ClientConfig, Modus};
use konsole::Eingabe;
use platform::{NullSink, StilleRecorder};

/// Haelt den laufenden Client zusammen
pub struct Client {
    pub config: ClientConfig,
}

impl Client {
    pub fn neu(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Laeuft bis `quit`, Ende von stdin oder Ctrl-C
    pub async fn starten(self) -> Result<()> {
        let events = EventBus::new();
        let protokoll = protokoll::starten(events.abonnieren());

        let ergebnis = match self.config.modus {
            Modus::Rtc => self.rtc_betrieb(events.clone()).await,
            Modus::Streaming => self.streaming_betrieb(events.clone()).await,
        };

        // Letzte Ereignisse noch ausgeben lassen
        tokio::task::yield_now().await;
        protokoll.abort();
        ergebnis
    }

    async fn rtc_betrieb(&self, events: EventBus) -> Result<()> {
        let connector = RtcPeerConnector::new(self.config.ice.clone())?;
        let faehigkeiten = Faehigkeiten {
            connector: Arc::new(connector),
            capture: SilenceCapture::new(),
            signaling: Arc::new(HttpSignaling::new(&self.config.signaling)),
            probe: Arc::new(HttpLivenessProbe::new(self.config.probe_url())),
            playback: Some(PlaybackQueue::with_events(Arc::new(NullSink), events.clone())),
        };

        tracing::info!(
            signaling = %self.config.signaling.offer_url(),
            ice_server = self.config.ice.ice_servers.len(),
            "Peer-Betrieb"
        );
        let session = Session::create(faehigkeiten, self.config.sitzung.clone(), events);
        session.start().await?;

        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        while let Some(eingabe) = naechste_eingabe(&mut zeilen).await? {
            let ergebnis = match eingabe {
                Eingabe::Start => session.start().await,
                Eingabe::Stop => session.stop().await,
                Eingabe::Kommando(name) => session.send_command(name).await,
                Eingabe::Geraete => session.devices().await.map(geraete_zeigen),
                Eingabe::Beenden => break,
                Eingabe::Unbekannt(wort) => {
                    tracing::warn!("Unbekannte Eingabe '{}': {}", wort, konsole::HILFE);
                    Ok(())
                }
            };
            if let Err(e) = ergebnis {
                tracing::warn!("{}", e);
            }
        }

        session.dispose().await?;
        Ok(())
    }

    async fn streaming_betrieb(&self, events: EventBus) -> Result<()> {
        let streaming = &self.config.streaming;
        let capture: Arc<dyn MediaCapture> = SilenceCapture::new();
        let client = StreamingClient::connect(
            streaming.clone(),
            capture.clone(),
            StilleRecorder::new(streaming.abtastrate),
            Some(PlaybackQueue::with_events(Arc::new(NullSink), events.clone())),
            events,
        )
        .await?;

        let mut zeilen = BufReader::new(tokio::io::stdin()).lines();
        while let Some(eingabe) = naechste_eingabe(&mut zeilen).await? {
            let ergebnis = match eingabe {
                Eingabe::Start => client.start_recording().await,
                Eingabe::Stop => client.stop_recording().await,
                Eingabe::Kommando(name) => client.send_command(name),
                Eingabe::Geraete => capture.devices().await.map(geraete_zeigen),
                Eingabe::Beenden => break,
                Eingabe::Unbekannt(wort) => {
                    tracing::warn!("Unbekannte Eingabe '{}': {}", wort, konsole::HILFE);
                    Ok(())
                }
            };
            if let Err(e) = ergebnis {
                tracing::warn!("{}", e);
            }
            if !client.is_open() {
                break;
            }
        }

        client.close().await;
        Ok(())
    }
}

type Zeilen = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

/// Naechste Eingabe; `None` bei Ende von stdin oder Ctrl-C
async fn naechste_eingabe(zeilen: &mut Zeilen) -> Result<Option<Eingabe>> {
    loop {
        let zeile = tokio::select! {
            zeile = zeilen.next_line() => zeile?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutdown-Signal empfangen");
                None
            }
        };
        let Some(zeile) = zeile else {
            return Ok(None);
        };
        if let Some(eingabe) = konsole::lesen(&zeile) {
            return Ok(Some(eingabe));
        }
    }
}

fn geraete_zeigen(geraete: Vec<CaptureDevice>) {
    for g in geraete {
        tracing::info!(id = %g.id, "{}", g.label);
    }
}

//! HTTP-Signalisierung
//!
//! `POST <basis>/offer` mit `{"sdp": ..., "type": "offer"}` als JSON,
//! Antwort `{"sdp": ..., "type": "answer"}`. Keine Authentifizierung.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use voicelink_core::{Result, VoicelinkError};
use voicelink_protocol::{SdpType, SessionDescription};

use crate::capabilities::SignalingTransport;

/// Einstellungen des Signalisierungs-Endpunkts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Ursprung des Servers, z.B. `http://localhost:8080`
    pub basis_url: String,
    pub offer_pfad: String,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            basis_url: "http://localhost:8080".into(),
            offer_pfad: "/offer".into(),
        }
    }
}

impl SignalingConfig {
    /// Vollstaendige URL des Offer-Endpunkts
    pub fn offer_url(&self) -> String {
        format!(
            "{}/{}",
            self.basis_url.trim_end_matches('/'),
            self.offer_pfad.trim_start_matches('/')
        )
    }
}

/// Signalisierung ueber HTTP (reqwest)
#[derive(Debug, Clone)]
pub struct HttpSignaling {
    client: reqwest::Client,
    url: String,
}

impl HttpSignaling {
    pub fn new(config: &SignalingConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &SignalingConfig) -> Self {
        Self {
            client,
            url: config.offer_url(),
        }
    }
}

#[async_trait]
impl SignalingTransport for HttpSignaling {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription> {
        let response = self
            .client
            .post(&self.url)
            .json(offer)
            .send()
            .await
            .map_err(|e| VoicelinkError::Verhandlung(format!("Anfrage fehlgeschlagen: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoicelinkError::Verhandlung(format!(
                "Gegenstelle lehnt ab (HTTP {status}): {body}"
            )));
        }

        let antwort: SessionDescription = response
            .json()
            .await
            .map_err(|e| VoicelinkError::Verhandlung(format!("Antwort nicht lesbar: {e}")))?;

        if antwort.sdp_type != SdpType::Answer {
            return Err(VoicelinkError::Verhandlung(format!(
                "Erwartet answer, erhalten {}",
                antwort.sdp_type
            )));
        }

        debug!(bytes = antwort.sdp.len(), "Antwort empfangen");
        Ok(antwort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_url_zusammensetzen() {
        let c = SignalingConfig {
            basis_url: "http://host:8080/".into(),
            offer_pfad: "/offer".into(),
        };
        assert_eq!(c.offer_url(), "http://host:8080/offer");
        assert_eq!(SignalingConfig::default().offer_url(), "http://localhost:8080/offer");
    }

    #[tokio::test]
    async fn nicht_erreichbar_ist_verhandlungsfehler() {
        // Port 9 (discard) ist lokal praktisch nie offen
        let sig = HttpSignaling::new(&SignalingConfig {
            basis_url: "http://127.0.0.1:9".into(),
            offer_pfad: "/offer".into(),
        });
        let err = sig
            .exchange(&SessionDescription::offer("v=0\r\n"))
            .await
            .unwrap_err();
        assert!(matches!(err, VoicelinkError::Verhandlung(_)));
    }
}

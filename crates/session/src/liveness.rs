//! Erreichbarkeitspruefung per HTTP HEAD
//!
//! Vor jedem automatischen Verbindungsversuch wird der eigene Ursprung mit
//! kurzer Frist abgefragt. Jede 2xx-Antwort gilt als erreichbar; Fehler,
//! andere Statuscodes und Zeitueberschreitung als nicht erreichbar.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use voicelink_core::{Result, VoicelinkError};

use crate::capabilities::LivenessProbe;

/// HEAD-Anfrage gegen eine feste URL
#[derive(Debug, Clone)]
pub struct HttpLivenessProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpLivenessProbe {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Eine HEAD-Anfrage; nur 2xx ist `Ok`
    pub async fn pruefen(&self, timeout: Duration) -> Result<()> {
        // reqwest bricht die Anfrage nach Ablauf selbst ab
        match self.client.head(&self.url).timeout(timeout).send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(VoicelinkError::Verbindung(format!(
                "{} antwortet mit {}",
                self.url,
                response.status()
            ))),
            Err(e) if e.is_timeout() => Err(VoicelinkError::Zeitlimit(format!(
                "{} nach {} ms",
                self.url,
                timeout.as_millis()
            ))),
            Err(e) => Err(VoicelinkError::Verbindung(e.to_string())),
        }
    }
}

#[async_trait]
impl LivenessProbe for HttpLivenessProbe {
    async fn is_up(&self, timeout: Duration) -> bool {
        match self.pruefen(timeout).await {
            Ok(()) => true,
            Err(e) => {
                debug!(url = %self.url, art = ?e.art(), "Erreichbarkeitspruefung: {}", e);
                false
            }
        }
    }
}

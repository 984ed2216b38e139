//! Best-effort message bridge to the device.
//!
//! A send either succeeds or reports a [`DeliveryError`]; nothing here
//! retries. A lost message is a normal outcome.

use async_trait::async_trait;
use reqwest::Client;
use std::{fmt::Debug, time::Duration};
use tokio::{
    io::{AsyncWriteExt, Stdout},
    sync::Mutex,
};

use crate::{Config, error::DeliveryError, payload::DevicePayload};

const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

#[async_trait]
pub trait DeliveryChannel: Send + Sync + Debug {
    async fn send(&self, payload: &DevicePayload) -> Result<(), DeliveryError>;
}

/// Posts each payload as a flat JSON object to a device relay endpoint.
#[derive(Debug, Clone)]
pub struct HttpChannel {
    endpoint: String,
    http: Client,
}

impl HttpChannel {
    pub fn new(endpoint: &str) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(RELAY_TIMEOUT)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint: endpoint.to_string(),
            http,
        })
    }
}

#[async_trait]
impl DeliveryChannel for HttpChannel {
    async fn send(&self, payload: &DevicePayload) -> Result<(), DeliveryError> {
        let res = self
            .http
            .post(&self.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}

/// Writes each payload as one JSON line on stdout, for a relay process that
/// reads our output.
#[derive(Debug)]
pub struct StdoutChannel {
    out: Mutex<Stdout>,
}

impl StdoutChannel {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for StdoutChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryChannel for StdoutChannel {
    async fn send(&self, payload: &DevicePayload) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(payload).map_err(|e| DeliveryError::Encode(e.to_string()))?;
        line.push(b'\n');

        let mut out = self.out.lock().await;
        out.write_all(&line)
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| DeliveryError::Transport(e.to_string()))
    }
}

/// Construct the device channel described by config: the HTTP relay when an
/// endpoint is set, stdout otherwise.
pub fn channel_from_config(config: &Config) -> anyhow::Result<Box<dyn DeliveryChannel>> {
    let boxed: Box<dyn DeliveryChannel> = match config.device_endpoint() {
        Some(endpoint) => Box::new(HttpChannel::new(endpoint)?),
        None => Box::new(StdoutChannel::new()),
    };

    Ok(boxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{condition::ConditionCategory, config::DeviceConfig};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn http_channel_posts_flat_json() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/message"))
            .and(body_json(serde_json::json!({
                "WeatherTemperature": 21,
                "WeatherCondition": "CLOUDY"
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let channel = HttpChannel::new(&format!("{}/message", mock_server.uri())).unwrap();
        let payload = DevicePayload::weather(21, ConditionCategory::Cloudy);

        assert_eq!(channel.send(&payload).await, Ok(()));
    }

    #[tokio::test]
    async fn http_channel_reports_rejection() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let channel = HttpChannel::new(&mock_server.uri()).unwrap();
        let payload = DevicePayload::weather(0, ConditionCategory::Clear);

        assert_eq!(
            channel.send(&payload).await,
            Err(DeliveryError::Rejected { status: 503 })
        );
    }

    #[test]
    fn channel_from_config_picks_relay_when_configured() {
        let mut cfg = Config::default();
        assert!(channel_from_config(&cfg).is_ok());

        cfg.device = DeviceConfig {
            endpoint: Some("http://127.0.0.1:9/message".to_string()),
        };
        assert!(channel_from_config(&cfg).is_ok());
    }
}

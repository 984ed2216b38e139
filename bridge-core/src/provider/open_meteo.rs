use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::{
    condition::classify,
    error::FetchError,
    model::{Coordinates, WeatherReading},
};

use super::WeatherFetcher;

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Bound on a single weather request.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    base_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(OPEN_METEO_URL, FETCH_TIMEOUT)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: base_url.to_string(),
            http,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OmCurrentWeather {
    temperature: f64,
    weathercode: i64,
}

/// Turn a response body into a reading.
///
/// Bodies that are not JSON are `Parse` errors; JSON lacking a usable
/// `current_weather` object is `InvalidData`.
fn parse_current(body: &str) -> Result<WeatherReading, FetchError> {
    let value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let current = value
        .get("current_weather")
        .filter(|c| c.is_object())
        .ok_or_else(|| FetchError::InvalidData("missing current_weather".to_string()))?;

    let parsed = OmCurrentWeather::deserialize(current)
        .map_err(|e| FetchError::InvalidData(format!("current_weather: {e}")))?;

    Ok(WeatherReading::new(parsed.temperature, classify(parsed.weathercode)))
}

#[async_trait]
impl WeatherFetcher for OpenMeteoProvider {
    async fn fetch_current(&self, coords: &Coordinates) -> Result<WeatherReading, FetchError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("current_weather", "true".to_string()),
                ("temperature_unit", "celsius".to_string()),
            ])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = res.status();
        if !status.is_success() {
            return Err(FetchError::Transport {
                status: status.as_u16(),
            });
        }

        let body = res.text().await.map_err(FetchError::from_reqwest)?;
        let reading = parse_current(&body)?;

        tracing::debug!(
            "Open-Meteo reports {}°C, {} at {}",
            reading.temperature_celsius,
            reading.condition,
            coords
        );
        Ok(reading)
    }
}

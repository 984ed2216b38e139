use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::{error::LocationError, model::Coordinates};

use super::PositionSource;

const IP_API_URL: &str = "http://ip-api.com/json/";

/// Approximate position from the public address of this machine.
#[derive(Debug, Clone)]
pub struct IpApiPosition {
    base_url: String,
    http: Client,
}

impl IpApiPosition {
    pub fn new() -> Self {
        Self::with_base_url(IP_API_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            http: Client::new(),
        }
    }
}

impl Default for IpApiPosition {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[async_trait]
impl PositionSource for IpApiPosition {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        let res = self
            .http
            .get(&self.base_url)
            .query(&[("fields", "status,message,lat,lon")])
            .send()
            .await
            .map_err(|e| LocationError::NoFix(format!("IP lookup request failed: {e}")))?;

        let status = res.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(LocationError::PermissionDenied);
        }
        if !status.is_success() {
            return Err(LocationError::NoFix(format!(
                "IP lookup failed with status {status}"
            )));
        }

        let parsed: IpApiResponse = res
            .json()
            .await
            .map_err(|e| LocationError::NoFix(format!("Unreadable IP lookup response: {e}")))?;

        if parsed.status != "success" {
            return Err(LocationError::NoFix(
                parsed.message.unwrap_or_else(|| "IP lookup unsuccessful".to_string()),
            ));
        }

        match (parsed.lat, parsed.lon) {
            (Some(latitude), Some(longitude)) => Ok(Coordinates { latitude, longitude }),
            _ => Err(LocationError::NoFix(
                "IP lookup returned no coordinates".to_string(),
            )),
        }
    }
}

//! Error taxonomy of the fetch and delivery pipeline.
//!
//! None of these ever reach the device: the orchestrator turns location and
//! fetch failures into fallback payloads and only logs delivery failures.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location request timed out")]
    Timeout,

    #[error("No location fix: {0}")]
    NoFix(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Weather request timed out")]
    Timeout,

    #[error("Weather request failed with status {status}")]
    Transport { status: u16 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed weather response: {0}")]
    Parse(String),

    #[error("Invalid weather data: {0}")]
    InvalidData(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return FetchError::Timeout;
        }

        match err.status() {
            Some(status) => FetchError::Transport {
                status: status.as_u16(),
            },
            None => FetchError::Network(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    #[error("Device relay rejected message with status {status}")]
    Rejected { status: u16 },

    #[error("Device channel unavailable: {0}")]
    Transport(String),

    #[error("Failed to encode payload: {0}")]
    Encode(String),
}

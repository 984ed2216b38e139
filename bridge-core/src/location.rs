use crate::{
    Config,
    error::LocationError,
    location::{fixed::FixedPosition, ip_api::IpApiPosition},
    model::Coordinates,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{convert::TryFrom, fmt::Debug, time::Duration};
use tokio::time::Instant;

pub mod fixed;
pub mod ip_api;

/// Longest we wait for a fix before giving up.
pub const LOCATION_TIMEOUT: Duration = Duration::from_secs(15);

/// A previous fix younger than this is reused instead of asking again.
pub const LOCATION_MAX_AGE: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationSourceId {
    Fixed,
    Ip,
}

impl LocationSourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationSourceId::Fixed => "fixed",
            LocationSourceId::Ip => "ip",
        }
    }

    pub const fn all() -> &'static [LocationSourceId] {
        &[LocationSourceId::Fixed, LocationSourceId::Ip]
    }
}

impl std::fmt::Display for LocationSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for LocationSourceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "fixed" => Ok(LocationSourceId::Fixed),
            "ip" => Ok(LocationSourceId::Ip),
            _ => Err(anyhow::anyhow!(
                "Unknown location source '{value}'. Supported sources: fixed, ip."
            )),
        }
    }
}

/// Something that can produce a single position fix.
#[async_trait]
pub trait PositionSource: Send + Sync + Debug {
    async fn current_position(&self) -> Result<Coordinates, LocationError>;
}

/// Single-shot, time-bounded location query over a [`PositionSource`].
///
/// Overlapping calls are not de-duplicated; each one that misses the
/// remembered fix goes to the source.
#[derive(Debug)]
pub struct LocationProvider {
    source: Box<dyn PositionSource>,
    timeout: Duration,
    max_age: Duration,
    last_fix: Mutex<Option<(Coordinates, Instant)>>,
}

impl LocationProvider {
    pub fn new(source: Box<dyn PositionSource>) -> Self {
        Self::with_limits(source, LOCATION_TIMEOUT, LOCATION_MAX_AGE)
    }

    pub fn with_limits(source: Box<dyn PositionSource>, timeout: Duration, max_age: Duration) -> Self {
        Self {
            source,
            timeout,
            max_age,
            last_fix: Mutex::new(None),
        }
    }

    pub async fn get_location(&self) -> Result<Coordinates, LocationError> {
        if let Some(coords) = self.recent_fix() {
            tracing::debug!("Reusing recent location fix: {}", coords);
            return Ok(coords);
        }

        let coords = tokio::time::timeout(self.timeout, self.source.current_position())
            .await
            .map_err(|_| LocationError::Timeout)??;

        *self.last_fix.lock() = Some((coords, Instant::now()));
        Ok(coords)
    }

    fn recent_fix(&self) -> Option<Coordinates> {
        let guard = self.last_fix.lock();
        let (coords, taken_at) = guard.as_ref()?;
        (taken_at.elapsed() <= self.max_age).then_some(*coords)
    }
}

/// Construct a position source from config and explicit LocationSourceId.
pub fn position_source_from_config(
    id: LocationSourceId,
    config: &Config,
) -> anyhow::Result<Box<dyn PositionSource>> {
    let boxed: Box<dyn PositionSource> = match id {
        LocationSourceId::Fixed => {
            let coords = config.fixed_coordinates().ok_or_else(|| {
                anyhow::anyhow!(
                    "No coordinates configured for the fixed location source.\n\
                     Hint: run `weather-bridge configure` and enter latitude and longitude."
                )
            })?;
            Box::new(FixedPosition::new(coords))
        }
        LocationSourceId::Ip => Box::new(IpApiPosition::new()),
    };

    Ok(boxed)
}

/// Construct the configured position source, falling back to IP lookup.
pub fn location_source_from_config(config: &Config) -> anyhow::Result<Box<dyn PositionSource>> {
    let id = config.location_source_id()?;
    position_source_from_config(id, config)
}

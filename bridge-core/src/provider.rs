use crate::{Config, error::FetchError, model::Coordinates, model::WeatherReading};
use async_trait::async_trait;
use std::fmt::Debug;

pub mod open_meteo;

pub use open_meteo::OpenMeteoProvider;

/// Source of current conditions for a position.
///
/// Implementations always return unrounded Celsius; presentation units are
/// applied later.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch_current(&self, coords: &Coordinates) -> Result<WeatherReading, FetchError>;
}

/// Construct the weather fetcher described by config.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherFetcher>> {
    let provider = OpenMeteoProvider::with_base_url(&config.weather_base_url(), config.weather_timeout())?;
    Ok(Box::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn fetcher_from_default_config() {
        let cfg = Config::default();
        assert!(fetcher_from_config(&cfg).is_ok());
    }
}

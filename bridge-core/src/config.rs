use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    location::LocationSourceId,
    model::Coordinates,
    provider::open_meteo::{FETCH_TIMEOUT, OPEN_METEO_URL},
    units::TemperatureUnit,
};

const DEFAULT_REFRESH_MINS: u64 = 30;

/// Where positions come from.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct LocationConfig {
    /// "fixed" or "ip"; absent means "ip".
    pub source: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct WeatherApiConfig {
    pub base_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct DeviceConfig {
    /// HTTP relay that forwards messages to the device. Without one,
    /// messages go to stdout.
    pub endpoint: Option<String>,
}

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// use_fahrenheit = true
///
/// [location]
/// source = "fixed"
/// latitude = 52.52
/// longitude = 13.41
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Last saved display preference; absent means Celsius.
    pub use_fahrenheit: Option<bool>,

    pub refresh_interval_mins: Option<u64>,

    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub weather: WeatherApiConfig,

    #[serde(default)]
    pub device: DeviceConfig,
}

impl Config {
    pub fn temperature_unit(&self) -> TemperatureUnit {
        TemperatureUnit::from_fahrenheit_flag(self.use_fahrenheit.unwrap_or(false))
    }

    pub fn set_temperature_unit(&mut self, unit: TemperatureUnit) {
        self.use_fahrenheit = Some(unit == TemperatureUnit::Fahrenheit);
    }

    pub fn refresh_interval(&self) -> Duration {
        let mins = self.refresh_interval_mins.unwrap_or(DEFAULT_REFRESH_MINS).max(1);
        Duration::from_secs(mins * 60)
    }

    /// Return the location source as a strongly-typed LocationSourceId.
    pub fn location_source_id(&self) -> Result<LocationSourceId> {
        match self.location.source.as_deref() {
            Some(s) => LocationSourceId::try_from(s),
            None => Ok(LocationSourceId::Ip),
        }
    }

    pub fn fixed_coordinates(&self) -> Option<Coordinates> {
        Some(Coordinates {
            latitude: self.location.latitude?,
            longitude: self.location.longitude?,
        })
    }

    /// Pin the location to fixed coordinates.
    pub fn set_fixed_location(&mut self, coords: Coordinates) {
        self.location = LocationConfig {
            source: Some(LocationSourceId::Fixed.to_string()),
            latitude: Some(coords.latitude),
            longitude: Some(coords.longitude),
        };
    }

    pub fn set_location_source(&mut self, id: LocationSourceId) {
        self.location.source = Some(id.to_string());
    }

    pub fn weather_base_url(&self) -> String {
        self.weather
            .base_url
            .clone()
            .unwrap_or_else(|| OPEN_METEO_URL.to_string())
    }

    pub fn weather_timeout(&self) -> Duration {
        self.weather
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(FETCH_TIMEOUT)
    }

    pub fn device_endpoint(&self) -> Option<&str> {
        self.device.endpoint.as_deref().filter(|e| !e.trim().is_empty())
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-bridge", "weather-bridge")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

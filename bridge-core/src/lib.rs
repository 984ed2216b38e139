//! Core library for the `weather-bridge` companion.
//!
//! This crate defines:
//! - Condition classification and temperature presentation
//! - Location lookup and the Open-Meteo weather fetcher
//! - The single-slot reading cache and the device delivery channel
//! - The orchestrator tying them into a fetch → cache → deliver cycle
//! - Configuration & persisted preferences
//!
//! It is used by the `weather-bridge` binary, but the orchestrator can be
//! embedded anywhere a Tokio runtime is available.

pub mod cache;
pub mod channel;
pub mod condition;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod orchestrator;
pub mod payload;
pub mod provider;
pub mod units;

pub use cache::WeatherCache;
pub use channel::{DeliveryChannel, HttpChannel, StdoutChannel};
pub use condition::{ConditionCategory, classify};
pub use config::{Config, DeviceConfig, LocationConfig, WeatherApiConfig};
pub use error::{DeliveryError, FetchError, LocationError};
pub use location::{LocationProvider, LocationSourceId, PositionSource};
pub use model::{Coordinates, DeviceCondition, Fallback, WeatherReading};
pub use orchestrator::{ConfigReaction, CycleOutcome, OrchestratorOptions, Trigger, UpdateOrchestrator};
pub use payload::{DevicePayload, PayloadValue, Preferences};
pub use provider::{OpenMeteoProvider, WeatherFetcher};
pub use units::{TemperatureUnit, to_display_celsius, to_fahrenheit};

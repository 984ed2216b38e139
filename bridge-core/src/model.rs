use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::condition::ConditionCategory;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A single fetched observation, in unrounded Celsius.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature_celsius: f64,
    pub condition: ConditionCategory,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherReading {
    pub fn new(temperature_celsius: f64, condition: ConditionCategory) -> Self {
        Self {
            temperature_celsius,
            condition,
            fetched_at: Utc::now(),
        }
    }
}

/// The value sent under the condition key: a real category or one of the
/// fallback sentinels the device knows how to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCondition {
    Observed(ConditionCategory),
    Fallback(Fallback),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    /// Location was obtained but the weather fetch failed.
    Error,
    /// No location fix.
    NoGps,
}

impl DeviceCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCondition::Observed(category) => category.as_str(),
            DeviceCondition::Fallback(Fallback::Error) => "ERROR",
            DeviceCondition::Fallback(Fallback::NoGps) => "NO_GPS",
        }
    }
}

impl From<ConditionCategory> for DeviceCondition {
    fn from(value: ConditionCategory) -> Self {
        DeviceCondition::Observed(value)
    }
}

impl From<Fallback> for DeviceCondition {
    fn from(value: Fallback) -> Self {
        DeviceCondition::Fallback(value)
    }
}

impl std::fmt::Display for DeviceCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{model::DeviceCondition, units::TemperatureUnit};

pub const TEMPERATURE_KEY: &str = "WeatherTemperature";
pub const CONDITION_KEY: &str = "WeatherCondition";

/// Settings key holding the Fahrenheit preference.
pub const FAHRENHEIT_KEY: &str = "UseFahrenheit";

/// A primitive the device message channel can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PayloadValue {
    /// Narrow a settings value to a primitive. Arrays, objects and null have
    /// no device representation. Whole numbers written as `3.0` become `Int`.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(PayloadValue::Bool(*b)),
            Value::String(s) => Some(PayloadValue::Text(s.clone())),
            Value::Number(n) => n.as_i64().map(PayloadValue::Int).or_else(|| {
                n.as_f64().map(|f| {
                    if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                        PayloadValue::Int(f as i64)
                    } else {
                        PayloadValue::Float(f)
                    }
                })
            }),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }
}

/// Flat key/value message; the unit of transmission to the device.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePayload(BTreeMap<String, PayloadValue>);

impl DevicePayload {
    /// The weather message. Both keys are always present.
    pub fn weather(temperature: i32, condition: impl Into<DeviceCondition>) -> Self {
        let condition = condition.into();
        let mut entries = BTreeMap::new();
        entries.insert(TEMPERATURE_KEY.to_string(), PayloadValue::Int(temperature.into()));
        entries.insert(
            CONDITION_KEY.to_string(),
            PayloadValue::Text(condition.as_str().to_string()),
        );
        Self(entries)
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PayloadValue)> {
        self.0.iter()
    }

    pub fn is_weather(&self) -> bool {
        self.0.contains_key(TEMPERATURE_KEY) && self.0.contains_key(CONDITION_KEY)
    }

    pub fn temperature(&self) -> Option<i64> {
        match self.0.get(TEMPERATURE_KEY) {
            Some(PayloadValue::Int(t)) => Some(*t),
            _ => None,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self.0.get(CONDITION_KEY) {
            Some(PayloadValue::Text(c)) => Some(c.as_str()),
            _ => None,
        }
    }
}

/// Settings delivered by the configuration collaborator.
///
/// Only the Fahrenheit flag is interpreted; everything else is forwarded to
/// the device untouched.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Preferences {
    pub use_fahrenheit: Option<bool>,
    pass_through: DevicePayload,
}

impl Preferences {
    pub fn from_settings(settings: &serde_json::Map<String, Value>) -> Self {
        let use_fahrenheit = settings.get(FAHRENHEIT_KEY).and_then(|v| match v {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        });

        let mut entries = BTreeMap::new();
        for (key, value) in settings {
            match PayloadValue::from_json(value) {
                Some(primitive) => {
                    entries.insert(key.clone(), primitive);
                }
                None => {
                    tracing::warn!("Dropping setting '{}': not a primitive value", key);
                }
            }
        }

        Self {
            use_fahrenheit,
            pass_through: DevicePayload(entries),
        }
    }

    /// Parse one settings object, e.g. a line of JSON from the settings page.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        let settings: serde_json::Map<String, Value> = serde_json::from_str(raw)?;
        Ok(Self::from_settings(&settings))
    }

    /// The unit these preferences ask for, if they say anything about it.
    pub fn unit(&self) -> Option<TemperatureUnit> {
        self.use_fahrenheit.map(TemperatureUnit::from_fahrenheit_flag)
    }

    pub fn payload(&self) -> &DevicePayload {
        &self.pass_through
    }
}

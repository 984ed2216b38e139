//! Temperature presentation.
//!
//! Readings are kept in unrounded Celsius; rounding happens only here, once,
//! on the way to the device.

use serde::{Deserialize, Serialize};

/// Unit the device should display temperatures in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn from_fahrenheit_flag(use_fahrenheit: bool) -> Self {
        if use_fahrenheit {
            TemperatureUnit::Fahrenheit
        } else {
            TemperatureUnit::Celsius
        }
    }

    /// Convert a raw Celsius reading into the integer shown on the device.
    pub fn present(&self, celsius: f64) -> i32 {
        match self {
            TemperatureUnit::Celsius => to_display_celsius(celsius),
            TemperatureUnit::Fahrenheit => to_fahrenheit(celsius),
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "C",
            TemperatureUnit::Fahrenheit => "F",
        }
    }
}

/// `round(celsius * 9 / 5 + 32)`, halves rounded away from zero.
pub fn to_fahrenheit(celsius: f64) -> i32 {
    (celsius * 9.0 / 5.0 + 32.0).round() as i32
}

pub fn to_display_celsius(celsius: f64) -> i32 {
    celsius.round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fahrenheit_fixed_points() {
        assert_eq!(to_fahrenheit(0.0), 32);
        assert_eq!(to_fahrenheit(100.0), 212);
        assert_eq!(to_fahrenheit(-40.0), -40);
    }

    #[test]
    fn fahrenheit_is_computed_from_the_unrounded_value() {
        // 21.4 * 1.8 + 32 = 70.52; rounding Celsius first would give 70.
        assert_eq!(to_fahrenheit(21.4), 71);
        assert_eq!(to_fahrenheit(to_display_celsius(21.4) as f64), 70);
    }

    #[test]
    fn display_celsius_rounds() {
        assert_eq!(to_display_celsius(21.4), 21);
        assert_eq!(to_display_celsius(21.5), 22);
        assert_eq!(to_display_celsius(-3.6), -4);
        assert_eq!(to_display_celsius(0.2), 0);
    }

    #[test]
    fn present_dispatches_on_unit() {
        assert_eq!(TemperatureUnit::Celsius.present(21.4), 21);
        assert_eq!(TemperatureUnit::Fahrenheit.present(21.4), 71);
        assert_eq!(TemperatureUnit::from_fahrenheit_flag(true), TemperatureUnit::Fahrenheit);
        assert_eq!(TemperatureUnit::default(), TemperatureUnit::Celsius);
    }
}

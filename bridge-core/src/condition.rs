use serde::{Deserialize, Serialize};

/// Coarse weather state derived from an Open-Meteo (WMO) weather code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConditionCategory {
    Clear,
    Cloudy,
    Fog,
    Rain,
    Snow,
    Shower,
    Storm,
    Unknown,
}

impl ConditionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionCategory::Clear => "CLEAR",
            ConditionCategory::Cloudy => "CLOUDY",
            ConditionCategory::Fog => "FOG",
            ConditionCategory::Rain => "RAIN",
            ConditionCategory::Snow => "SNOW",
            ConditionCategory::Shower => "SHOWER",
            ConditionCategory::Storm => "STORM",
            ConditionCategory::Unknown => "UNKNOWN",
        }
    }

    pub const fn all() -> &'static [ConditionCategory] {
        &[
            ConditionCategory::Clear,
            ConditionCategory::Cloudy,
            ConditionCategory::Fog,
            ConditionCategory::Rain,
            ConditionCategory::Snow,
            ConditionCategory::Shower,
            ConditionCategory::Storm,
            ConditionCategory::Unknown,
        ]
    }
}

impl std::fmt::Display for ConditionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a numeric weather code onto a [`ConditionCategory`].
///
/// Total: codes outside every known range resolve to `Unknown`.
/// See: https://open-meteo.com/en/docs#weathervariables
pub fn classify(code: i64) -> ConditionCategory {
    match code {
        0 => ConditionCategory::Clear,
        1..=3 => ConditionCategory::Cloudy,
        45..=48 => ConditionCategory::Fog,
        51..=67 => ConditionCategory::Rain,
        71..=77 => ConditionCategory::Snow,
        80..=82 => ConditionCategory::Shower,
        95..=99 => ConditionCategory::Storm,
        _ => ConditionCategory::Unknown,
    }
}

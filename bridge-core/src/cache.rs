use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::WeatherReading;

/// Single-slot store for the most recent successful reading.
///
/// Cloning yields another handle to the same slot. Writes are last-write-wins
/// and there is no expiry; callers decide what counts as stale.
#[derive(Debug, Clone, Default)]
pub struct WeatherCache {
    slot: Arc<RwLock<Option<WeatherReading>>>,
}

impl WeatherCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was stored.
    pub fn store(&self, reading: WeatherReading) {
        *self.slot.write() = Some(reading);
    }

    pub fn retrieve(&self) -> Option<WeatherReading> {
        self.slot.read().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

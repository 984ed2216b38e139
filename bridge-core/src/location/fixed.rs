use async_trait::async_trait;

use crate::{error::LocationError, model::Coordinates};

use super::PositionSource;

/// Coordinates entered by the user; never fails.
#[derive(Debug, Clone)]
pub struct FixedPosition {
    coords: Coordinates,
}

impl FixedPosition {
    pub fn new(coords: Coordinates) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl PositionSource for FixedPosition {
    async fn current_position(&self) -> Result<Coordinates, LocationError> {
        Ok(self.coords)
    }
}

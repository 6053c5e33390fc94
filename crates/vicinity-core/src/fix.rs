use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo::Coordinate;
use crate::validation::Validator;

/// A position sample exactly as the location provider delivered it.
///
/// Coordinates may be missing; such a sample is malformed and never reaches
/// the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFix {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub accuracy_meters: f64,
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            accuracy_meters,
            timestamp,
        }
    }
}

/// A validated device position with its accuracy estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy_meters: f64,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters,
            timestamp,
        }
    }

    /// Build a fix at `position`.
    pub fn at(position: Coordinate, accuracy_meters: f64, timestamp: DateTime<Utc>) -> Self {
        Self::new(position.latitude, position.longitude, accuracy_meters, timestamp)
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

impl TryFrom<RawFix> for PositionFix {
    type Error = ValidationError;

    fn try_from(raw: RawFix) -> Result<Self, Self::Error> {
        let latitude = raw
            .latitude
            .ok_or(ValidationError::MissingCoordinate("latitude"))?;
        let longitude = raw
            .longitude
            .ok_or(ValidationError::MissingCoordinate("longitude"))?;

        Validator::validate_latitude(latitude)?;
        Validator::validate_longitude(longitude)?;
        Validator::validate_accuracy(raw.accuracy_meters)?;

        Ok(PositionFix::new(
            latitude,
            longitude,
            raw.accuracy_meters,
            raw.timestamp,
        ))
    }
}

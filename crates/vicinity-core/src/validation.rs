use crate::entry::GeofenceEntry;
use crate::error::ValidationError;

const MAX_TITLE_LEN: usize = 256;

/// Validator for geofence geometry and position samples.
pub struct Validator;

impl Validator {
    /// Validate latitude value.
    pub fn validate_latitude(lat: f64) -> Result<(), ValidationError> {
        // NaN fails the range check
        if !(-90.0..=90.0).contains(&lat) {
            return Err(ValidationError::InvalidLatitude(lat));
        }
        Ok(())
    }

    /// Validate longitude value.
    pub fn validate_longitude(lon: f64) -> Result<(), ValidationError> {
        if !(-180.0..=180.0).contains(&lon) {
            return Err(ValidationError::InvalidLongitude(lon));
        }
        Ok(())
    }

    /// Radius must be finite and strictly positive.
    pub fn validate_radius(radius_meters: f64) -> Result<(), ValidationError> {
        if !radius_meters.is_finite() || radius_meters <= 0.0 {
            return Err(ValidationError::InvalidRadius(radius_meters));
        }
        Ok(())
    }

    /// Accuracy must be finite and non-negative.
    pub fn validate_accuracy(accuracy_meters: f64) -> Result<(), ValidationError> {
        if !accuracy_meters.is_finite() || accuracy_meters < 0.0 {
            return Err(ValidationError::InvalidAccuracy(accuracy_meters));
        }
        Ok(())
    }

    pub fn validate_title(title: &str) -> Result<(), ValidationError> {
        if title.len() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong(title.len()));
        }
        Ok(())
    }

    /// Validate an entry before it is admitted to the registry.
    pub fn validate_entry(entry: &GeofenceEntry) -> Result<(), ValidationError> {
        if entry.id.as_str().trim().is_empty() {
            return Err(ValidationError::EmptyId);
        }
        Self::validate_title(&entry.title)?;
        Self::validate_latitude(entry.center.latitude)?;
        Self::validate_longitude(entry.center.longitude)?;
        Self::validate_radius(entry.radius_meters)?;
        Ok(())
    }
}

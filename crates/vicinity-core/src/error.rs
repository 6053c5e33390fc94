use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid latitude {0}: must be between -90 and 90")]
    InvalidLatitude(f64),

    #[error("Invalid longitude {0}: must be between -180 and 180")]
    InvalidLongitude(f64),

    #[error("Invalid radius {0}: must be a positive number of meters")]
    InvalidRadius(f64),

    #[error("Invalid accuracy {0}: must be a non-negative number of meters")]
    InvalidAccuracy(f64),

    #[error("Missing coordinate: {0}")]
    MissingCoordinate(&'static str),

    #[error("Entry id cannot be empty")]
    EmptyId,

    #[error("Title too long: {0} characters (max 256)")]
    TitleTooLong(usize),
}

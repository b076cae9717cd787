//! Error type used by the crate.

use thiserror::Error;

/// Error returned when a value cannot represent a valid geographic coordinate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoordinateError {
    /// One of the coordinates is `NaN` or infinite.
    #[error("coordinate is not a finite number")]
    NotFinite,
    /// Latitude outside of `[-90, 90]`.
    #[error("latitude {0} is out of range")]
    LatitudeOutOfRange(f64),
    /// Longitude outside of `[-180, 180]`.
    #[error("longitude {0} is out of range")]
    LongitudeOutOfRange(f64),
    /// The coordinate array does not have exactly two elements.
    #[error("expected a [longitude, latitude] pair, got {0} values")]
    WrongArity(usize),
}

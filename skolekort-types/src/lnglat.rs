use approx::{AbsDiffEq, RelativeEq};
use serde::{Deserialize, Serialize};

use crate::error::CoordinateError;

/// Geographic coordinate in degrees, longitude first.
///
/// The field order follows the GeoJSON convention, so the value serializes to and from a
/// `[lng, lat]` array.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "[f64; 2]", try_from = "[f64; 2]")]
pub struct LngLat {
    lng: f64,
    lat: f64,
}

impl LngLat {
    /// Creates a coordinate without validation.
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Creates a coordinate, checking that both values are finite and in range.
    pub fn try_new(lng: f64, lat: f64) -> Result<Self, CoordinateError> {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(CoordinateError::NotFinite);
        }
        if !(-90.0..=90.0).contains(&lat) {
            return Err(CoordinateError::LatitudeOutOfRange(lat));
        }
        if !(-180.0..=180.0).contains(&lng) {
            return Err(CoordinateError::LongitudeOutOfRange(lng));
        }

        Ok(Self { lng, lat })
    }

    /// Builds a coordinate from a `[lng, lat]` slice as found in GeoJSON positions.
    pub fn try_from_slice(values: &[f64]) -> Result<Self, CoordinateError> {
        match values {
            [lng, lat] => Self::try_new(*lng, *lat),
            other => Err(CoordinateError::WrongArity(other.len())),
        }
    }

    /// Longitude in degrees.
    pub fn lng(&self) -> f64 {
        self.lng
    }

    /// Latitude in degrees.
    pub fn lat(&self) -> f64 {
        self.lat
    }

    /// `[lng, lat]` array.
    pub fn to_array(&self) -> [f64; 2] {
        [self.lng, self.lat]
    }
}

impl From<LngLat> for [f64; 2] {
    fn from(value: LngLat) -> Self {
        value.to_array()
    }
}

impl TryFrom<[f64; 2]> for LngLat {
    type Error = CoordinateError;

    fn try_from(value: [f64; 2]) -> Result<Self, Self::Error> {
        Self::try_new(value[0], value[1])
    }
}

impl AbsDiffEq for LngLat {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.lng.abs_diff_eq(&other.lng, epsilon) && self.lat.abs_diff_eq(&other.lat, epsilon)
    }
}

impl RelativeEq for LngLat {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        self.lng.relative_eq(&other.lng, epsilon, max_relative)
            && self.lat.relative_eq(&other.lat, epsilon, max_relative)
    }
}

/// Creates a new [`LngLat`] from longitude and latitude values (in degrees).
///
/// ```
/// use skolekort_types::lnglat;
///
/// let point = lnglat!(10.21, 56.15);
/// assert_eq!(point.lng(), 10.21);
/// ```
#[macro_export]
macro_rules! lnglat {
    ($lng:expr, $lat:expr) => {
        $crate::LngLat::new($lng, $lat)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_coordinates() {
        assert_eq!(
            LngLat::try_new(f64::NAN, 1.0),
            Err(CoordinateError::NotFinite)
        );
        assert_eq!(
            LngLat::try_new(10.0, 91.0),
            Err(CoordinateError::LatitudeOutOfRange(91.0))
        );
        assert_eq!(
            LngLat::try_new(-181.0, 0.0),
            Err(CoordinateError::LongitudeOutOfRange(-181.0))
        );
        assert_eq!(
            LngLat::try_from_slice(&[1.0, 2.0, 3.0]),
            Err(CoordinateError::WrongArity(3))
        );
    }

    #[test]
    fn serializes_as_position_array() {
        let point = lnglat!(10.21, 56.15);
        assert_eq!(serde_json::to_string(&point).unwrap(), "[10.21,56.15]");

        let parsed: LngLat = serde_json::from_str("[12.5683, 55.6761]").unwrap();
        assert_eq!(parsed, lnglat!(12.5683, 55.6761));

        assert!(serde_json::from_str::<LngLat>("[0.0, 100.0]").is_err());
    }
}

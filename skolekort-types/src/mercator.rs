//! Spherical web mercator in normalized units.
//!
//! Normalized coordinates cover the whole world with `x` and `y` in `[0, 1]`, `y` growing to the
//! south. At zoom `z` the world is [`TILE_SIZE`]` * 2^z` pixels wide.

use std::f64::consts::PI;

use crate::LngLat;

/// Size of one map tile in pixels, as used by vector-tile engines.
pub const TILE_SIZE: f64 = 512.0;

/// Converts longitude in degrees into normalized mercator `x`.
pub fn lng_to_x(lng: f64) -> f64 {
    lng / 360.0 + 0.5
}

/// Converts latitude in degrees into normalized mercator `y`, clamped to `[0, 1]`.
pub fn lat_to_y(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let y = 0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI;
    y.clamp(0.0, 1.0)
}

/// Inverse of [`lng_to_x`].
pub fn x_to_lng(x: f64) -> f64 {
    (x - 0.5) * 360.0
}

/// Inverse of [`lat_to_y`].
pub fn y_to_lat(y: f64) -> f64 {
    let y2 = (180.0 - y * 360.0) * PI / 180.0;
    360.0 * y2.exp().atan() / PI - 90.0
}

/// Projects a coordinate into normalized mercator units.
pub fn project(point: LngLat) -> (f64, f64) {
    (lng_to_x(point.lng()), lat_to_y(point.lat()))
}

/// Converts normalized mercator units back into a coordinate.
pub fn unproject(x: f64, y: f64) -> LngLat {
    LngLat::new(x_to_lng(x), y_to_lat(y))
}

/// Width of the whole world in pixels at the given zoom level.
pub fn world_size(zoom: f64) -> f64 {
    TILE_SIZE * 2f64.powf(zoom)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::lnglat;

    #[test]
    fn origin_is_world_center() {
        assert_abs_diff_eq!(lng_to_x(0.0), 0.5);
        assert_abs_diff_eq!(lat_to_y(0.0), 0.5);
    }

    #[test]
    fn projection_round_trips() {
        let aarhus = lnglat!(10.21, 56.15);
        let (x, y) = project(aarhus);
        assert_abs_diff_eq!(unproject(x, y), aarhus, epsilon = 1e-9);
    }

    #[test]
    fn poles_are_clamped() {
        assert_abs_diff_eq!(lat_to_y(90.0), 0.0);
        assert_abs_diff_eq!(lat_to_y(-90.0), 1.0);
    }
}

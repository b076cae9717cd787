use serde::{Deserialize, Serialize};

use crate::error::CoordinateError;
use crate::mercator;
use crate::{LngLat, ScreenPoint, Size};

/// Lowest zoom level a map engine accepts.
pub const MIN_ZOOM: f64 = 0.0;
/// Highest zoom level a map engine accepts.
pub const MAX_ZOOM: f64 = 22.0;

/// Visible region of the map: center coordinate and zoom level.
///
/// Serializes as `{"longitude": .., "latitude": .., "zoom": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(into = "ViewState", try_from = "ViewState")]
pub struct Viewport {
    center: LngLat,
    zoom: f64,
}

#[derive(Serialize, Deserialize)]
struct ViewState {
    longitude: f64,
    latitude: f64,
    zoom: f64,
}

impl From<Viewport> for ViewState {
    fn from(value: Viewport) -> Self {
        Self {
            longitude: value.center.lng(),
            latitude: value.center.lat(),
            zoom: value.zoom,
        }
    }
}

impl TryFrom<ViewState> for Viewport {
    type Error = CoordinateError;

    fn try_from(value: ViewState) -> Result<Self, Self::Error> {
        Ok(Viewport::new(
            LngLat::try_new(value.longitude, value.latitude)?,
            value.zoom,
        ))
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: LngLat::default(),
            zoom: MIN_ZOOM,
        }
    }
}

impl Viewport {
    /// Creates a new viewport. Zoom is clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn new(center: LngLat, zoom: f64) -> Self {
        Self {
            center,
            zoom: clamp_zoom(zoom),
        }
    }

    /// Center of the viewport.
    pub fn center(&self) -> LngLat {
        self.center
    }

    /// Zoom level.
    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Returns a copy of the viewport with a new center.
    pub fn with_center(&self, center: LngLat) -> Self {
        Self { center, ..*self }
    }

    /// Returns a copy of the viewport with a new (clamped) zoom.
    pub fn with_zoom(&self, zoom: f64) -> Self {
        Self {
            zoom: clamp_zoom(zoom),
            ..*self
        }
    }

    /// Converts a coordinate to a pixel position on a canvas of the given size.
    pub fn project(&self, point: LngLat, canvas: Size) -> ScreenPoint {
        let world = mercator::world_size(self.zoom);
        let (cx, cy) = mercator::project(self.center);
        let (x, y) = mercator::project(point);

        ScreenPoint::new(
            (x - cx) * world + canvas.half_width(),
            (y - cy) * world + canvas.half_height(),
        )
    }

    /// Converts a pixel position on a canvas of the given size to a coordinate.
    pub fn unproject(&self, point: ScreenPoint, canvas: Size) -> LngLat {
        let world = mercator::world_size(self.zoom);
        let (cx, cy) = mercator::project(self.center);

        mercator::unproject(
            cx + (point.x - canvas.half_width()) / world,
            cy + (point.y - canvas.half_height()) / world,
        )
    }
}

fn clamp_zoom(zoom: f64) -> f64 {
    if zoom.is_nan() {
        return MIN_ZOOM;
    }
    zoom.clamp(MIN_ZOOM, MAX_ZOOM)
}

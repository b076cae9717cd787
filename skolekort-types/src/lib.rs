//! Value types shared by the `skolekort` crates: geographic coordinates, map viewports, screen
//! positions and the web mercator math the map engine works in.
//!
//! ```
//! use skolekort_types::{lnglat, Viewport};
//!
//! let aarhus = lnglat!(10.21, 56.15);
//! let view = Viewport::new(aarhus, 14.0);
//! assert_eq!(view.center().lat(), 56.15);
//! ```

pub mod error;
mod lnglat;
pub mod mercator;
mod screen;
mod viewport;

pub use lnglat::LngLat;
pub use screen::{ScreenPoint, Size};
pub use viewport::{Viewport, MAX_ZOOM, MIN_ZOOM};

//! Skolekort is the core of a map front-end showing Danish schools.
//!
//! It does not render maps itself. A map engine (Mapbox GL JS in the browser, the in-memory
//! [`HeadlessEngine`](engine::HeadlessEngine) in tests and native tools) sits behind the
//! [`MapEngine`](engine::MapEngine) trait, and this crate manages everything around it:
//!
//! * [`MapProvider`] mounts one [`MapSession`](session::MapSession) into a container and tears
//!   it down again, releasing every layer, source, image, marker and popup it registered.
//! * [`DatasetOverlay`](dataset::DatasetOverlay) adds the clustered school dataset, zooms into
//!   clusters and shows a category-colored popup for a clicked school.
//! * [`SearchBoxAdapter`](search::SearchBoxAdapter) turns a geocoded address into a camera
//!   flight.
//! * [`StyleSwitcher`](style::StyleSwitcher), [`ZoomControls`](control::ZoomControls),
//!   [`MarkerOverlay`](overlay::MarkerOverlay) and [`PopupOverlay`](overlay::PopupOverlay)
//!   cover the rest of the page.
//!
//! Engines report user input as [`MapEvent`](control::MapEvent)s. Events are queued by the
//! session and handed to subscribers when the host calls [`MapSession::pump`], usually through
//! a [`Messenger`].
//!
//! ```ignore
//! use skolekort::engine::HeadlessEngine;
//! use skolekort::{lnglat, SessionBuilder, Viewport};
//!
//! let provider = SessionBuilder::new("map-container")
//!     .with_viewport(Viewport::new(lnglat!(10.21, 56.15), 12.0))
//!     .build(HeadlessEngine::new())?;
//! provider.session().pump();
//! assert!(provider.context().ready);
//! ```
//!
//! [`MapSession::pump`]: session::MapSession::pump

pub(crate) mod async_runtime;
pub mod category;
mod color;
pub mod config;
pub mod control;
pub mod dataset;
pub mod decoded_image;
pub mod engine;
pub mod error;
mod messenger;
pub mod overlay;
pub mod platform;
pub mod search;
pub mod session;
pub mod style;

pub use color::Color;
pub use config::{AppConfig, ConfigError};
pub use error::MapError;
pub use messenger::{ManualPump, Messenger};
pub use session::{MapContext, MapProvider, SessionBuilder, SessionHandle};

// Reexport skolekort_types
pub use skolekort_types;
pub use skolekort_types::{lnglat, LngLat, ScreenPoint, Size, Viewport};

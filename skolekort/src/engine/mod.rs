//! The seam between the session and the map engine that renders the map.
//!
//! A [`MapEngine`] owns tiles, styles, sources, layers and DOM overlays. The session only talks
//! to it through this trait: the browser build binds Mapbox GL JS, native builds and tests use
//! the in-memory [`HeadlessEngine`].

use std::any::Any;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use maybe_sync::{MaybeSend, MaybeSync};
use serde::Serialize;
use serde_json::Value;
use skolekort_types::{LngLat, ScreenPoint, Size, Viewport};

use crate::control::MapEvent;
use crate::decoded_image::DecodedImage;
use crate::error::MapError;
use crate::overlay::{OverlayContent, PopupAnchor};

mod cluster;
mod headless;
mod layer;

pub use cluster::{ClusterIndex, ClusterNode, ClusterOptions, NodeKind};
pub use headless::{CameraMove, CameraMoveKind, HeadlessEngine, HeadlessMarker, HeadlessPopup};
#[cfg(test)]
pub(crate) use headless::parse_feature_collection;
pub use layer::{
    property_to_string, CirclePaint, GeoJsonData, LayerFilter, LayerKind, LayerSpec, PaintValue,
    SourceSpec, SymbolLayout,
};

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        /// Future returned by asynchronous engine queries.
        pub type EngineFuture<T> = Pin<Box<dyn Future<Output = T> + 'static>>;
    } else {
        /// Future returned by asynchronous engine queries.
        pub type EngineFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;
    }
}

/// Receives events produced by an engine.
pub trait EventSink: MaybeSend + MaybeSync {
    /// Queues the event for dispatching.
    fn push(&self, event: MapEvent);
}

/// Id of a marker attached to an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct MarkerId(pub u64);

/// Id of a popup attached to an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PopupId(pub u64);

impl Display for MarkerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "marker#{}", self.0)
    }
}

impl Display for PopupId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "popup#{}", self.0)
    }
}

/// Camera change request. Fields that are `None` keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CameraOptions {
    /// New center of the viewport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub center: Option<LngLat>,
    /// New zoom level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
    /// The move is part of the essential UI and must not be skipped for reduced motion.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub essential: bool,
    /// Animation duration.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "as_millis")]
    pub duration: Option<Duration>,
}

fn as_millis<S: serde::Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(duration) => s.serialize_f64(duration.as_secs_f64() * 1000.0),
        None => s.serialize_none(),
    }
}

impl CameraOptions {
    /// Empty camera request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the center.
    pub fn center(mut self, center: LngLat) -> Self {
        self.center = Some(center);
        self
    }

    /// Sets the zoom level.
    pub fn zoom(mut self, zoom: f64) -> Self {
        self.zoom = Some(zoom);
        self
    }

    /// Marks the move as essential.
    pub fn essential(mut self, essential: bool) -> Self {
        self.essential = essential;
        self
    }

    /// Sets the animation duration.
    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Viewport after applying the request to `current`.
    pub fn apply(&self, current: &Viewport) -> Viewport {
        let mut view = *current;
        if let Some(center) = self.center {
            view = view.with_center(center);
        }
        if let Some(zoom) = self.zoom {
            view = view.with_zoom(zoom);
        }
        view
    }
}

/// Where the marker element sits relative to its coordinate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerAnchor {
    /// Element center is on the coordinate.
    #[default]
    Center,
    /// Element top edge is on the coordinate.
    Top,
    /// Element bottom edge is on the coordinate.
    Bottom,
    /// Element left edge is on the coordinate.
    Left,
    /// Element right edge is on the coordinate.
    Right,
}

/// Presentation options of a marker.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarkerOptions {
    /// Anchor of the element.
    pub anchor: MarkerAnchor,
    /// Pixel offset `[x, y]` from the anchor.
    pub offset: [f64; 2],
    /// Extra class names of the element.
    #[serde(rename = "className", skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
}

/// Marker to attach to the map.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSpec {
    /// Coordinate the marker is pinned to.
    pub position: LngLat,
    /// Content of the marker element.
    pub content: OverlayContent,
    /// Presentation options.
    pub options: MarkerOptions,
}

/// Presentation options of a popup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PopupOptions {
    /// Show the close button.
    pub close_button: bool,
    /// Close the popup when the map is clicked.
    pub close_on_click: bool,
    /// Class names of the popup container.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    /// CSS max-width of the popup.
    pub max_width: String,
}

impl Default for PopupOptions {
    fn default() -> Self {
        Self {
            close_button: true,
            close_on_click: true,
            class_name: None,
            max_width: "240px".into(),
        }
    }
}

/// Popup to attach to the map.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSpec {
    /// What the popup is anchored to.
    pub anchor: PopupAnchor,
    /// Content of the popup.
    pub content: OverlayContent,
    /// Presentation options.
    pub options: PopupOptions,
}

/// A feature as it is rendered by a layer.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    /// Id of the layer that rendered the feature.
    pub layer: String,
    /// Id of the source the feature comes from.
    pub source: String,
    /// Point geometry of the feature.
    pub position: LngLat,
    /// Property bag. Clusters carry `cluster`, `cluster_id`, `point_count` and
    /// `point_count_abbreviated`.
    pub properties: serde_json::Map<String, Value>,
}

impl RenderedFeature {
    /// True if the feature is an aggregated cluster.
    pub fn is_cluster(&self) -> bool {
        self.properties.contains_key("point_count")
    }

    /// Id of the cluster in the clustering index of the source.
    pub fn cluster_id(&self) -> Option<u64> {
        let value = self.properties.get("cluster_id")?;
        value
            .as_u64()
            .or_else(|| value.as_f64().filter(|v| *v >= 0.0).map(|v| v as u64))
    }

    /// Number of points in the cluster.
    pub fn point_count(&self) -> Option<u64> {
        self.properties.get("point_count")?.as_u64()
    }
}

/// Map engine a session is bound to.
///
/// Engines store their state in whatever form they need. Methods that add things report
/// duplicates and dangling references as errors; removing something that does not exist is the
/// caller's responsibility to avoid (the session checks before removing).
pub trait MapEngine: MaybeSend + MaybeSync {
    /// Sets the sink that receives engine events. Events produced before a sink is set are
    /// delivered to it once it is set.
    fn set_event_sink(&mut self, sink: Arc<dyn EventSink>);

    /// Current viewport.
    fn viewport(&self) -> Viewport;
    /// Size of the map canvas.
    fn canvas_size(&self) -> Size;
    /// Changes the viewport without animation.
    fn jump_to(&mut self, camera: &CameraOptions);
    /// Changes the viewport with an easing animation.
    fn ease_to(&mut self, camera: &CameraOptions);
    /// Changes the viewport with a flight animation.
    fn fly_to(&mut self, camera: &CameraOptions);

    /// Replaces the map style. Custom sources, layers and images are dropped by the engine and
    /// [`MapEvent::StyleLoaded`] is emitted when the new style is ready.
    fn set_style(&mut self, style_url: &str);

    /// Checks if an image with the given name is registered.
    fn has_image(&self, name: &str) -> bool;
    /// Registers an image for use by symbol layers.
    fn add_image(&mut self, name: &str, image: &DecodedImage) -> Result<(), MapError>;
    /// Removes a registered image.
    fn remove_image(&mut self, name: &str);

    /// Checks if a source is registered.
    fn has_source(&self, id: &str) -> bool;
    /// Registers a data source.
    fn add_source(&mut self, id: &str, source: &SourceSpec) -> Result<(), MapError>;
    /// Removes a source. Fails if a layer still uses it.
    fn remove_source(&mut self, id: &str) -> Result<(), MapError>;

    /// Checks if a layer is registered.
    fn has_layer(&self, id: &str) -> bool;
    /// Adds a rendering layer on top of the existing ones.
    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), MapError>;
    /// Removes a layer.
    fn remove_layer(&mut self, id: &str) -> Result<(), MapError>;

    /// Features rendered at the given canvas point by the given layers (all layers if empty),
    /// topmost first.
    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature>;
    /// Zoom level at which the cluster splits into its children.
    fn cluster_expansion_zoom(&self, source: &str, cluster_id: u64)
        -> EngineFuture<Result<f64, MapError>>;

    /// Attaches a marker.
    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<MarkerId, MapError>;
    /// Detaches a marker and the popup bound to it.
    fn remove_marker(&mut self, id: MarkerId);
    /// Popup currently bound to the marker's popup slot.
    fn marker_popup(&self, marker: MarkerId) -> Option<PopupId>;

    /// Attaches and opens a popup. A marker anchor binds the popup to the marker's slot.
    fn add_popup(&mut self, popup: &PopupSpec) -> Result<PopupId, MapError>;
    /// Detaches a popup and clears the marker slot it occupies. Emits
    /// [`MapEvent::PopupClosed`] if the popup was open.
    fn remove_popup(&mut self, id: PopupId);

    /// Sets the CSS cursor of the map canvas.
    fn set_cursor(&mut self, cursor: &str);

    /// Releases everything the engine holds. The engine is not used after this call.
    fn destroy(&mut self);

    /// Sessions store engines as trait objects. This method can be used to convert the trait
    /// object into the concrete type.
    fn as_any(&self) -> &dyn Any;
    /// Sessions store engines as trait objects. This method can be used to convert the trait
    /// object into the concrete type.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

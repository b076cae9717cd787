//! Events produced by the map engine and the handlers that react to them.
//!
//! Engine callbacks never call handlers directly. They push a [`MapEvent`] into the session queue
//! and the session dispatches queued events to every subscribed [`SessionEventHandler`] when it is
//! pumped. Handlers are free to issue commands to the session, including ones that produce new
//! events: those are queued and dispatched in the same pump.

use maybe_sync::{MaybeSend, MaybeSync};
use skolekort_types::{LngLat, ScreenPoint};

use crate::engine::{MarkerId, PopupId, RenderedFeature};
use crate::session::SessionHandle;

mod zoom;

pub use zoom::{ZoomControls, ZoomControlsConfiguration};

/// Event handler subscribed to a map session.
pub trait SessionEventHandler: MaybeSend + MaybeSync {
    /// Handle the event.
    fn handle(&self, event: &MapEvent, session: &SessionHandle) -> EventPropagation;
}

impl<T> SessionEventHandler for T
where
    T: for<'a> Fn(&'a MapEvent, &'a SessionHandle) -> EventPropagation + MaybeSend + MaybeSync,
{
    fn handle(&self, event: &MapEvent, session: &SessionHandle) -> EventPropagation {
        self(event, session)
    }
}

/// Value returned by a [`SessionEventHandler`] to indicate the status of the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventPropagation {
    /// Event should be propagated to the next handler.
    Propagate,
    /// Event should not be propagated to the next handler.
    Stop,
}

/// Id of a subscribed handler. Unsubscribing with it removes exactly the handler it was issued
/// for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Event produced by a map engine.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The engine finished its initial load. The session is ready after this event.
    Load,
    /// A new style finished loading. Custom sources, layers and images are gone at this point.
    StyleLoaded,
    /// A feature of a layer was clicked.
    LayerClick {
        /// Id of the clicked layer.
        layer: String,
        /// Click position on the canvas.
        point: ScreenPoint,
        /// Click position on the map.
        lnglat: LngLat,
        /// Features of the layer under the pointer, topmost first.
        features: Vec<RenderedFeature>,
    },
    /// Pointer moved over a feature of the layer.
    LayerPointerEnter {
        /// Layer id.
        layer: String,
    },
    /// Pointer left the features of the layer.
    LayerPointerLeave {
        /// Layer id.
        layer: String,
    },
    /// Pointer moved over a marker element.
    MarkerPointerEnter(MarkerId),
    /// Pointer left a marker element.
    MarkerPointerLeave(MarkerId),
    /// A marker element was clicked.
    MarkerClick(MarkerId),
    /// A popup was closed, by the user or by removing it.
    PopupClosed(PopupId),
    /// The engine reported an error.
    Error(String),
}

impl MapEvent {
    /// Layer the event refers to, if any.
    pub fn layer(&self) -> Option<&str> {
        match self {
            Self::LayerClick { layer, .. }
            | Self::LayerPointerEnter { layer }
            | Self::LayerPointerLeave { layer } => Some(layer),
            _ => None,
        }
    }
}

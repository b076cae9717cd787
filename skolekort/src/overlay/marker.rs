use std::sync::{Arc, Weak};

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::RwLock;
use serde::Serialize;
use skolekort_types::LngLat;

use super::{Emitter, OverlayContent};
use crate::control::{EventPropagation, ListenerId, MapEvent};
use crate::engine::{MarkerId, MarkerOptions, MarkerSpec};
use crate::error::MapError;
use crate::session::SessionHandle;

const MARKER_ELEMENT_STYLE: &str =
    "display: flex; align-items: center; justify-content: center; cursor: pointer";

/// Position of a marker as it is reported to event handlers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    /// Longitude in degrees.
    pub longitude: f64,
    /// Latitude in degrees.
    pub latitude: f64,
}

impl From<LngLat> for Position {
    fn from(value: LngLat) -> Self {
        Self {
            longitude: value.lng(),
            latitude: value.lat(),
        }
    }
}

/// Pointer entered or left a marker.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerHoverEvent<T> {
    /// True when the pointer entered the marker.
    pub is_hovered: bool,
    /// Marker position.
    pub position: Position,
    /// Engine marker.
    pub marker: MarkerId,
    /// Payload of the marker.
    pub data: T,
}

/// A marker was clicked.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerClickEvent<T> {
    /// Marker position.
    pub position: Position,
    /// Engine marker.
    pub marker: MarkerId,
    /// Payload of the marker.
    pub data: T,
}

struct Attached {
    id: MarkerId,
    position: LngLat,
    content: OverlayContent,
}

struct MarkerState<T> {
    attached: RwLock<Attached>,
    data: RwLock<T>,
    on_hover: Emitter<MarkerHoverEvent<T>>,
    on_click: Emitter<MarkerClickEvent<T>>,
}

/// Marker pinned to a coordinate and carrying a data payload.
///
/// Pointer events of the marker element are forwarded to the [`on_hover`](Self::on_hover) and
/// [`on_click`](Self::on_click) emitters together with the payload.
pub struct MarkerOverlay<T> {
    session: SessionHandle,
    options: MarkerOptions,
    state: Arc<MarkerState<T>>,
    listener: ListenerId,
}

impl<T> MarkerOverlay<T>
where
    T: Clone + MaybeSend + MaybeSync + 'static,
{
    /// Attaches a marker with default options.
    pub fn new(
        session: &SessionHandle,
        position: LngLat,
        content: OverlayContent,
        data: T,
    ) -> Result<Self, MapError> {
        Self::with_options(session, position, content, data, MarkerOptions::default())
    }

    /// Attaches a marker.
    pub fn with_options(
        session: &SessionHandle,
        position: LngLat,
        content: OverlayContent,
        data: T,
        options: MarkerOptions,
    ) -> Result<Self, MapError> {
        let id = session.add_marker(&marker_spec(position, &content, &options))?;
        let state = Arc::new(MarkerState {
            attached: RwLock::new(Attached {
                id,
                position,
                content,
            }),
            data: RwLock::new(data),
            on_hover: Emitter::default(),
            on_click: Emitter::default(),
        });

        let weak = Arc::downgrade(&state);
        let listener = session.subscribe(move |event: &MapEvent, _: &SessionHandle| {
            forward_event(&weak, event);
            EventPropagation::Propagate
        });

        Ok(Self {
            session: session.clone(),
            options,
            state,
            listener,
        })
    }

    /// Engine marker currently backing the overlay.
    pub fn id(&self) -> MarkerId {
        self.state.attached.read().id
    }

    /// Marker position.
    pub fn position(&self) -> LngLat {
        self.state.attached.read().position
    }

    /// Payload of the marker.
    pub fn data(&self) -> T {
        self.state.data.read().clone()
    }

    /// Replaces the payload reported with events.
    pub fn set_data(&self, data: T) {
        *self.state.data.write() = data;
    }

    /// Pointer enter and leave events.
    pub fn on_hover(&self) -> &Emitter<MarkerHoverEvent<T>> {
        &self.state.on_hover
    }

    /// Click events.
    pub fn on_click(&self) -> &Emitter<MarkerClickEvent<T>> {
        &self.state.on_click
    }

    /// Moves the marker or changes its content. The engine marker is re-created only if
    /// something changed. Returns true if it was re-created.
    pub fn update(&self, position: LngLat, content: OverlayContent) -> Result<bool, MapError> {
        let mut attached = self.state.attached.write();
        if attached.position == position && attached.content == content {
            return Ok(false);
        }

        self.session.remove_marker(attached.id);
        let id = self
            .session
            .add_marker(&marker_spec(position, &content, &self.options))?;
        *attached = Attached {
            id,
            position,
            content,
        };
        Ok(true)
    }
}

impl<T> Drop for MarkerOverlay<T> {
    fn drop(&mut self) {
        self.session.unsubscribe(self.listener);
        self.session.remove_marker(self.state.attached.read().id);
    }
}

fn marker_spec(position: LngLat, content: &OverlayContent, options: &MarkerOptions) -> MarkerSpec {
    MarkerSpec {
        position,
        content: content.wrapped(MARKER_ELEMENT_STYLE),
        options: options.clone(),
    }
}

fn forward_event<T: Clone>(state: &Weak<MarkerState<T>>, event: &MapEvent) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let (id, position) = {
        let attached = state.attached.read();
        (attached.id, Position::from(attached.position))
    };

    match event {
        MapEvent::MarkerPointerEnter(marker) | MapEvent::MarkerPointerLeave(marker)
            if *marker == id =>
        {
            state.on_hover.emit(&MarkerHoverEvent {
                is_hovered: matches!(event, MapEvent::MarkerPointerEnter(_)),
                position,
                marker: id,
                data: state.data.read().clone(),
            });
        }
        MapEvent::MarkerClick(marker) if *marker == id => {
            state.on_click.emit(&MarkerClickEvent {
                position,
                marker: id,
                data: state.data.read().clone(),
            });
        }
        _ => {}
    }
}

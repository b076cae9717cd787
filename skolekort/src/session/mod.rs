//! Map session: one engine instance bound to one container.
//!
//! A [`MapSession`] is created by a [`MapProvider`] and shared with everything that works with the
//! map as a [`SessionHandle`]. All commands go through the session, which records every image,
//! source, layer, marker and popup it adds, so that destroying the session releases them in a
//! fixed order no matter who added them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use skolekort_types::{ScreenPoint, Size, Viewport};

use crate::control::{EventPropagation, ListenerId, MapEvent, SessionEventHandler};
use crate::decoded_image::DecodedImage;
use crate::engine::{
    CameraOptions, EngineFuture, EventSink, LayerSpec, MapEngine, MarkerId, MarkerSpec, PopupId,
    PopupSpec, RenderedFeature, SourceSpec,
};
use crate::error::MapError;
use crate::messenger::Messenger;

mod builder;
mod provider;

pub use builder::SessionBuilder;
pub use provider::{is_container_claimed, MapContext, MapProvider};

/// Shared reference to a map session.
pub type SessionHandle = Arc<MapSession>;

#[derive(Debug, Default)]
struct ResourceLedger {
    images: Vec<String>,
    sources: Vec<String>,
    layers: Vec<String>,
    markers: Vec<MarkerId>,
    popups: Vec<PopupId>,
}

impl ResourceLedger {
    fn forget_style_resources(&mut self) {
        self.images.clear();
        self.sources.clear();
        self.layers.clear();
    }
}

struct EventQueue {
    events: Mutex<VecDeque<MapEvent>>,
    pump_requested: AtomicBool,
    session: Weak<MapSession>,
    messenger: Option<Arc<dyn Messenger>>,
}

impl EventSink for EventQueue {
    fn push(&self, event: MapEvent) {
        self.events.lock().push_back(event);
        if let Some(messenger) = &self.messenger {
            if !self.pump_requested.swap(true, Ordering::AcqRel) {
                messenger.request_pump(self.session.clone());
            }
        }
    }
}

type Listener = (ListenerId, Arc<dyn SessionEventHandler>);

/// Map session wrapping one engine instance.
pub struct MapSession {
    container: String,
    engine: RwLock<Box<dyn MapEngine>>,
    queue: Arc<EventQueue>,
    listeners: RwLock<Vec<Listener>>,
    next_listener: AtomicU64,
    ledger: Mutex<ResourceLedger>,
    ready: AtomicBool,
    alive: AtomicBool,
    pumping: AtomicBool,
}

impl std::fmt::Debug for MapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapSession")
            .field("container", &self.container)
            .field("ready", &self.is_ready())
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}

impl MapSession {
    pub(crate) fn new(
        container: impl Into<String>,
        engine: Box<dyn MapEngine>,
        messenger: Option<Arc<dyn Messenger>>,
    ) -> SessionHandle {
        let container = container.into();
        let session = Arc::new_cyclic(|weak| MapSession {
            container,
            engine: RwLock::new(engine),
            queue: Arc::new(EventQueue {
                events: Mutex::new(VecDeque::new()),
                pump_requested: AtomicBool::new(false),
                session: weak.clone(),
                messenger,
            }),
            listeners: RwLock::new(Vec::new()),
            next_listener: AtomicU64::new(0),
            ledger: Mutex::new(ResourceLedger::default()),
            ready: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            pumping: AtomicBool::new(false),
        });

        let sink: Arc<dyn EventSink> = session.queue.clone();
        session.engine.write().set_event_sink(sink);
        session
    }

    /// Id of the container the session is bound to.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// The engine finished its initial load and the session has not been destroyed.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire) && self.is_alive()
    }

    /// The session has not been destroyed.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Current viewport.
    pub fn viewport(&self) -> Viewport {
        self.engine.read().viewport()
    }

    /// Size of the map canvas.
    pub fn canvas_size(&self) -> Size {
        self.engine.read().canvas_size()
    }

    /// Moves the camera without animation.
    pub fn jump_to(&self, camera: &CameraOptions) {
        if self.skip("jump_to") {
            return;
        }
        self.engine.write().jump_to(camera);
    }

    /// Moves the camera with an easing animation.
    pub fn ease_to(&self, camera: &CameraOptions) {
        if self.skip("ease_to") {
            return;
        }
        self.engine.write().ease_to(camera);
    }

    /// Moves the camera with a flight animation.
    pub fn fly_to(&self, camera: &CameraOptions) {
        if self.skip("fly_to") {
            return;
        }
        self.engine.write().fly_to(camera);
    }

    /// Replaces the map style. The viewport and DOM overlays are kept. Custom images, sources and
    /// layers are dropped by the engine and [`MapEvent::StyleLoaded`] follows.
    pub fn set_style(&self, style_url: &str) {
        if self.skip("set_style") {
            return;
        }
        log::info!("Switching style of `{}` to {style_url}", self.container);
        self.engine.write().set_style(style_url);
    }

    /// Checks if an image with the given name is registered.
    pub fn has_image(&self, name: &str) -> bool {
        self.is_alive() && self.engine.read().has_image(name)
    }

    /// Registers an image for symbol layers.
    pub fn add_image(&self, name: &str, image: &DecodedImage) -> Result<(), MapError> {
        self.ensure_alive()?;
        self.engine.write().add_image(name, image)?;
        self.ledger.lock().images.push(name.to_string());
        Ok(())
    }

    /// Removes a registered image. Missing images are ignored.
    pub fn remove_image(&self, name: &str) {
        if self.skip("remove_image") {
            return;
        }
        let mut engine = self.engine.write();
        if engine.has_image(name) {
            engine.remove_image(name);
        }
        self.ledger.lock().images.retain(|n| n != name);
    }

    /// Checks if a source is registered.
    pub fn has_source(&self, id: &str) -> bool {
        self.is_alive() && self.engine.read().has_source(id)
    }

    /// Registers a data source.
    pub fn add_source(&self, id: &str, source: &SourceSpec) -> Result<(), MapError> {
        self.ensure_alive()?;
        self.engine.write().add_source(id, source)?;
        self.ledger.lock().sources.push(id.to_string());
        Ok(())
    }

    /// Removes a data source.
    pub fn remove_source(&self, id: &str) -> Result<(), MapError> {
        self.ensure_alive()?;
        self.engine.write().remove_source(id)?;
        self.ledger.lock().sources.retain(|s| s != id);
        Ok(())
    }

    /// Checks if a layer is registered.
    pub fn has_layer(&self, id: &str) -> bool {
        self.is_alive() && self.engine.read().has_layer(id)
    }

    /// Adds a rendering layer on top of the others.
    pub fn add_layer(&self, layer: &LayerSpec) -> Result<(), MapError> {
        self.ensure_alive()?;
        self.engine.write().add_layer(layer)?;
        self.ledger.lock().layers.push(layer.id.clone());
        Ok(())
    }

    /// Removes a rendering layer.
    pub fn remove_layer(&self, id: &str) -> Result<(), MapError> {
        self.ensure_alive()?;
        self.engine.write().remove_layer(id)?;
        self.ledger.lock().layers.retain(|l| l != id);
        Ok(())
    }

    /// Features rendered at the canvas point by the given layers (all layers if empty).
    pub fn query_rendered_features(
        &self,
        point: ScreenPoint,
        layers: &[&str],
    ) -> Vec<RenderedFeature> {
        if !self.is_alive() {
            return vec![];
        }
        self.engine.read().query_rendered_features(point, layers)
    }

    /// Zoom level at which the cluster splits into its children.
    pub fn cluster_expansion_zoom(
        &self,
        source: &str,
        cluster_id: u64,
    ) -> EngineFuture<Result<f64, MapError>> {
        if !self.is_alive() {
            return Box::pin(futures::future::ready(Err(MapError::SessionDestroyed)));
        }
        self.engine.read().cluster_expansion_zoom(source, cluster_id)
    }

    /// Attaches a marker.
    pub fn add_marker(&self, marker: &MarkerSpec) -> Result<MarkerId, MapError> {
        self.ensure_alive()?;
        let id = self.engine.write().add_marker(marker)?;
        self.ledger.lock().markers.push(id);
        Ok(id)
    }

    /// Detaches a marker and any popup bound to it.
    pub fn remove_marker(&self, id: MarkerId) {
        if self.skip("remove_marker") {
            return;
        }
        self.engine.write().remove_marker(id);
        self.ledger.lock().markers.retain(|m| *m != id);
    }

    /// Popup bound to the marker.
    pub fn marker_popup(&self, marker: MarkerId) -> Option<PopupId> {
        if !self.is_alive() {
            return None;
        }
        self.engine.read().marker_popup(marker)
    }

    /// Attaches and opens a popup.
    pub fn add_popup(&self, popup: &PopupSpec) -> Result<PopupId, MapError> {
        self.ensure_alive()?;
        let id = self.engine.write().add_popup(popup)?;
        self.ledger.lock().popups.push(id);
        Ok(id)
    }

    /// Closes and detaches a popup.
    pub fn remove_popup(&self, id: PopupId) {
        if self.skip("remove_popup") {
            return;
        }
        self.engine.write().remove_popup(id);
        self.ledger.lock().popups.retain(|p| *p != id);
    }

    /// Sets the CSS cursor of the map canvas.
    pub fn set_cursor(&self, cursor: &str) {
        if self.skip("set_cursor") {
            return;
        }
        self.engine.write().set_cursor(cursor);
    }

    /// Subscribes a handler to the session events.
    pub fn subscribe(&self, handler: impl SessionEventHandler + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(handler)));
        id
    }

    /// Removes the handler with the given id. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let len = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != len
    }

    /// Number of subscribed handlers.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Dispatches queued engine events to the handlers.
    ///
    /// Events queued by the handlers are dispatched in the same call. Calling `pump` from a
    /// handler returns immediately.
    pub fn pump(self: &Arc<Self>) {
        if self.pumping.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.pump_requested.store(false, Ordering::Release);

        loop {
            let next = self.queue.events.lock().pop_front();
            let Some(event) = next else {
                break;
            };
            self.dispatch(&event);
        }

        self.pumping.store(false, Ordering::Release);
    }

    /// Calls `f` with the engine if it is of type `E`.
    pub fn with_engine<E: MapEngine + 'static, R>(&self, f: impl FnOnce(&mut E) -> R) -> Option<R> {
        let mut engine = self.engine.write();
        engine.as_any_mut().downcast_mut::<E>().map(f)
    }

    /// Releases everything added through the session and destroys the engine.
    ///
    /// Popups are removed first, then markers, layers in reverse order of adding, sources and
    /// images. Repeated calls do nothing.
    pub fn destroy(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }
        self.ready.store(false, Ordering::Release);

        let ledger = std::mem::take(&mut *self.ledger.lock());
        {
            let mut engine = self.engine.write();
            for popup in ledger.popups {
                engine.remove_popup(popup);
            }
            for marker in ledger.markers {
                engine.remove_marker(marker);
            }
            for layer in ledger.layers.iter().rev() {
                if engine.has_layer(layer) {
                    if let Err(err) = engine.remove_layer(layer) {
                        log::warn!("Failed to remove layer `{layer}`: {err}");
                    }
                }
            }
            for source in ledger.sources {
                if engine.has_source(&source) {
                    if let Err(err) = engine.remove_source(&source) {
                        log::warn!("Failed to remove source `{source}`: {err}");
                    }
                }
            }
            for image in ledger.images {
                if engine.has_image(&image) {
                    engine.remove_image(&image);
                }
            }
            engine.destroy();
        }

        self.listeners.write().clear();
        self.queue.events.lock().clear();
        log::info!("Map session for `{}` destroyed", self.container);
    }

    fn dispatch(self: &Arc<Self>, event: &MapEvent) {
        match event {
            MapEvent::Load => {
                if !self.ready.swap(true, Ordering::AcqRel) {
                    log::info!("Map session for `{}` is ready", self.container);
                }
            }
            MapEvent::StyleLoaded => self.ledger.lock().forget_style_resources(),
            MapEvent::PopupClosed(id) => self.ledger.lock().popups.retain(|p| p != id),
            MapEvent::Error(message) => log::error!("Map error: {message}"),
            _ => {}
        }

        if !self.is_alive() {
            return;
        }

        let listeners: Vec<Listener> = self.listeners.read().clone();
        for (id, handler) in listeners {
            // The handler could be removed by one dispatched before it.
            if !self.listeners.read().iter().any(|(l, _)| *l == id) {
                continue;
            }
            if handler.handle(event, self) == EventPropagation::Stop {
                break;
            }
        }
    }

    fn ensure_alive(&self) -> Result<(), MapError> {
        if self.is_alive() {
            Ok(())
        } else {
            Err(MapError::SessionDestroyed)
        }
    }

    fn skip(&self, command: &str) -> bool {
        if self.is_alive() {
            return false;
        }
        log::debug!("Map session for `{}` is destroyed, {command} skipped", self.container);
        true
    }
}

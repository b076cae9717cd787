//! [`MapEngine`] backed by a Mapbox GL JS map.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use ahash::AHashMap;
use futures::channel::oneshot;
use js_sys::{Array, Object, Reflect, Uint8Array};
use log::{debug, warn};
use serde::Serialize;
use serde_json::{json, Value};
use skolekort::control::MapEvent;
use skolekort::decoded_image::DecodedImage;
use skolekort::engine::{
    CameraOptions, EngineFuture, EventSink, LayerSpec, MapEngine, MarkerId, MarkerSpec, PopupId,
    PopupSpec, RenderedFeature, SourceSpec,
};
use skolekort::overlay::PopupAnchor;
use skolekort::MapError;
use skolekort_types::{LngLat, ScreenPoint, Size, Viewport};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::HtmlElement;

use crate::ffi;

type Listener = Closure<dyn FnMut(JsValue)>;

const LAYER_EVENTS: [&str; 3] = ["click", "mouseenter", "mouseleave"];
const MARKER_EVENTS: [&str; 3] = ["mouseenter", "mouseleave", "click"];

#[derive(Default)]
struct EventSlot {
    sink: Option<Arc<dyn EventSink>>,
    pending: Vec<MapEvent>,
}

type SharedSlot = Rc<RefCell<EventSlot>>;

fn emit(slot: &SharedSlot, event: MapEvent) {
    let sink = slot.borrow().sink.clone();
    match sink {
        Some(sink) => sink.push(event),
        None => slot.borrow_mut().pending.push(event),
    }
}

struct MarkerEntry {
    marker: ffi::Marker,
    element: HtmlElement,
    position: LngLat,
    listeners: Vec<(&'static str, Listener)>,
    popup: Option<PopupId>,
}

struct PopupEntry {
    popup: ffi::Popup,
    marker: Option<MarkerId>,
    on_close: Listener,
}

/// Mapbox GL JS map mounted into a DOM element.
///
/// Layer, marker and popup listeners are owned by the engine and detached together with the
/// things they listen to.
pub struct MapboxEngine {
    map: ffi::Map,
    events: SharedSlot,
    map_listeners: Vec<(&'static str, Listener)>,
    layer_listeners: AHashMap<String, Vec<(&'static str, Listener)>>,
    markers: AHashMap<MarkerId, MarkerEntry>,
    popups: AHashMap<PopupId, PopupEntry>,
    next_id: u64,
    destroyed: bool,
}

impl MapboxEngine {
    /// Creates a map in the element with the given id.
    pub fn new(container: &str, viewport: &Viewport, style_url: &str) -> Result<Self, MapError> {
        let options = to_js(&json!({
            "container": container,
            "center": viewport.center(),
            "zoom": viewport.zoom(),
            "style": style_url,
        }))?;

        let mut engine = Self {
            map: ffi::Map::new(&options),
            events: SharedSlot::default(),
            map_listeners: Vec::new(),
            layer_listeners: AHashMap::new(),
            markers: AHashMap::new(),
            popups: AHashMap::new(),
            next_id: 1,
            destroyed: false,
        };

        engine.listen_map("load", |_| Some(MapEvent::Load));
        engine.listen_map("style.load", |_| Some(MapEvent::StyleLoaded));
        engine.listen_map("error", |event| Some(MapEvent::Error(error_message(&event))));

        Ok(engine)
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn listen_map(
        &mut self,
        event: &'static str,
        convert: impl Fn(JsValue) -> Option<MapEvent> + 'static,
    ) {
        let slot = self.events.clone();
        let listener = Listener::new(move |value: JsValue| {
            if let Some(event) = convert(value) {
                emit(&slot, event);
            }
        });
        self.map.on(event, listener.as_ref().unchecked_ref());
        self.map_listeners.push((event, listener));
    }

    fn listen_layer(&mut self, layer_id: &str) {
        self.unlisten_layer(layer_id);

        let mut listeners = Vec::with_capacity(LAYER_EVENTS.len());
        for event in LAYER_EVENTS {
            let slot = self.events.clone();
            let layer = layer_id.to_string();
            let listener = Listener::new(move |value: JsValue| {
                let event = match event {
                    "click" => layer_click(&layer, &value),
                    "mouseenter" => Some(MapEvent::LayerPointerEnter {
                        layer: layer.clone(),
                    }),
                    _ => Some(MapEvent::LayerPointerLeave {
                        layer: layer.clone(),
                    }),
                };
                if let Some(event) = event {
                    emit(&slot, event);
                }
            });
            self.map
                .on_layer(event, layer_id, listener.as_ref().unchecked_ref());
            listeners.push((event, listener));
        }

        self.layer_listeners.insert(layer_id.to_string(), listeners);
    }

    fn unlisten_layer(&mut self, layer_id: &str) {
        if let Some(listeners) = self.layer_listeners.remove(layer_id) {
            for (event, listener) in listeners {
                self.map
                    .off_layer(event, layer_id, listener.as_ref().unchecked_ref());
            }
        }
    }

    fn unlisten_all_layers(&mut self) {
        let layers: Vec<String> = self.layer_listeners.keys().cloned().collect();
        for layer in layers {
            self.unlisten_layer(&layer);
        }
    }

    fn popup_is_open(&self, id: PopupId) -> bool {
        self.popups.get(&id).is_some_and(|entry| entry.popup.is_open())
    }

    /// Forgets popups the user has closed.
    fn prune_closed_popups(&mut self) {
        let closed: Vec<PopupId> = self
            .popups
            .iter()
            .filter(|(_, entry)| !entry.popup.is_open())
            .map(|(id, _)| *id)
            .collect();
        for id in closed {
            self.forget_popup(id);
        }
    }

    fn forget_popup(&mut self, id: PopupId) -> Option<PopupEntry> {
        let entry = self.popups.remove(&id)?;
        if let Some(marker) = entry.marker.and_then(|m| self.markers.get_mut(&m)) {
            if marker.popup == Some(id) {
                marker.popup = None;
            }
        }
        entry
            .popup
            .off("close", entry.on_close.as_ref().unchecked_ref());
        Some(entry)
    }

    fn move_camera(&self, camera: &CameraOptions, apply: impl FnOnce(&ffi::Map, &JsValue)) {
        match to_js(camera) {
            Ok(options) => apply(&self.map, &options),
            Err(err) => warn!("Invalid camera options {camera:?}: {err}"),
        }
    }
}

impl MapEngine for MapboxEngine {
    fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        let pending = {
            let mut slot = self.events.borrow_mut();
            slot.sink = Some(sink.clone());
            std::mem::take(&mut slot.pending)
        };
        for event in pending {
            sink.push(event);
        }
    }

    fn viewport(&self) -> Viewport {
        let center = self.map.get_center();
        Viewport::new(LngLat::new(center.lng(), center.lat()), self.map.get_zoom())
    }

    fn canvas_size(&self) -> Size {
        let canvas = self.map.get_canvas();
        Size::new(canvas.client_width() as f64, canvas.client_height() as f64)
    }

    fn jump_to(&mut self, camera: &CameraOptions) {
        self.move_camera(camera, |map, options| map.jump_to(options));
    }

    fn ease_to(&mut self, camera: &CameraOptions) {
        self.move_camera(camera, |map, options| map.ease_to(options));
    }

    fn fly_to(&mut self, camera: &CameraOptions) {
        self.move_camera(camera, |map, options| map.fly_to(options));
    }

    fn set_style(&mut self, style_url: &str) {
        // Custom layers are dropped with the old style.
        self.unlisten_all_layers();
        self.map.set_style(style_url);
    }

    fn has_image(&self, name: &str) -> bool {
        self.map.has_image(name)
    }

    fn add_image(&mut self, name: &str, image: &DecodedImage) -> Result<(), MapError> {
        if self.map.has_image(name) {
            return Err(MapError::DuplicateImage(name.to_string()));
        }

        let value: JsValue = match (image.element(), image.rgba_bytes()) {
            (Some(element), _) => element.clone().into(),
            (None, Some(bytes)) => {
                let (width, height) = image.dimensions();
                let object = Object::new();
                Reflect::set(&object, &"width".into(), &width.into())?;
                Reflect::set(&object, &"height".into(), &height.into())?;
                Reflect::set(&object, &"data".into(), &Uint8Array::from(bytes).into())?;
                object.into()
            }
            (None, None) => return Err(MapError::Decoding(format!("image {name} has no pixels"))),
        };

        Ok(self.map.add_image(name, &value)?)
    }

    fn remove_image(&mut self, name: &str) {
        self.map.remove_image(name);
    }

    fn has_source(&self, id: &str) -> bool {
        !self.map.get_source(id).is_undefined()
    }

    fn add_source(&mut self, id: &str, source: &SourceSpec) -> Result<(), MapError> {
        if self.has_source(id) {
            return Err(MapError::DuplicateSource(id.to_string()));
        }
        Ok(self.map.add_source(id, &to_js(&source.to_mapbox_json())?)?)
    }

    fn remove_source(&mut self, id: &str) -> Result<(), MapError> {
        if !self.has_source(id) {
            return Err(MapError::UnknownSource(id.to_string()));
        }
        Ok(self.map.remove_source(id)?)
    }

    fn has_layer(&self, id: &str) -> bool {
        !self.map.get_layer(id).is_undefined()
    }

    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), MapError> {
        if self.has_layer(&layer.id) {
            return Err(MapError::DuplicateLayer(layer.id.clone()));
        }
        if !self.has_source(&layer.source) {
            return Err(MapError::UnknownSource(layer.source.clone()));
        }

        self.map.add_layer(&to_js(&layer.to_mapbox_json())?)?;
        self.listen_layer(&layer.id);
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        if !self.has_layer(id) {
            return Err(MapError::UnknownLayer(id.to_string()));
        }
        self.unlisten_layer(id);
        Ok(self.map.remove_layer(id)?)
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        let existing: Vec<&str> = layers
            .iter()
            .copied()
            .filter(|id| self.has_layer(id))
            .collect();
        if !layers.is_empty() && existing.is_empty() {
            return vec![];
        }

        let options = if existing.is_empty() {
            Ok(JsValue::UNDEFINED)
        } else {
            to_js(&json!({ "layers": existing }))
        };
        let (point, options) = match (to_js(&[point.x, point.y]), options) {
            (Ok(point), Ok(options)) => (point, options),
            (Err(err), _) | (_, Err(err)) => {
                warn!("Failed to query rendered features: {err}");
                return vec![];
            }
        };

        self.map
            .query_rendered_features(&point, &options)
            .iter()
            .filter_map(|feature| parse_feature(&feature, None))
            .collect()
    }

    fn cluster_expansion_zoom(
        &self,
        source: &str,
        cluster_id: u64,
    ) -> EngineFuture<Result<f64, MapError>> {
        let js_source = self.map.get_source(source);
        if js_source.is_undefined() {
            let err = MapError::UnknownSource(source.to_string());
            return Box::pin(futures::future::ready(Err(err)));
        }
        let js_source: ffi::GeoJsonSource = js_source.unchecked_into();

        let (sender, receiver) = oneshot::channel();
        let callback = Closure::once_into_js(move |err: JsValue, zoom: JsValue| {
            let result = if err.is_null() || err.is_undefined() {
                zoom.as_f64().ok_or(MapError::UnknownCluster(cluster_id))
            } else {
                debug!("Cluster expansion zoom failed: {err:?}");
                Err(MapError::UnknownCluster(cluster_id))
            };
            if sender.send(result).is_err() {
                debug!("Cluster expansion zoom of {cluster_id} is no longer awaited");
            }
        });
        js_source.get_cluster_expansion_zoom(cluster_id as f64, &callback);

        Box::pin(async move {
            receiver
                .await
                .unwrap_or(Err(MapError::UnknownCluster(cluster_id)))
        })
    }

    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<MarkerId, MapError> {
        if self.destroyed {
            return Err(MapError::SessionDestroyed);
        }

        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or_else(|| MapError::Wasm(Some("Document is not available".into())))?;
        let element: HtmlElement = document.create_element("div")?.unchecked_into();
        element.set_inner_html(marker.content.as_html());
        if let Some(class_name) = &marker.options.class_name {
            element.set_class_name(class_name);
        }

        let options = to_js(&marker.options)?;
        Reflect::set(&options, &"element".into(), &element)?;
        let js_marker = ffi::Marker::new(&options);
        js_marker.set_lng_lat(&to_js(&marker.position)?);
        js_marker.add_to(&self.map);

        let id = MarkerId(self.next_id());
        let mut listeners = Vec::with_capacity(MARKER_EVENTS.len());
        for event in MARKER_EVENTS {
            let slot = self.events.clone();
            let listener = Listener::new(move |_: JsValue| {
                let event = match event {
                    "mouseenter" => MapEvent::MarkerPointerEnter(id),
                    "mouseleave" => MapEvent::MarkerPointerLeave(id),
                    _ => MapEvent::MarkerClick(id),
                };
                emit(&slot, event);
            });
            element.add_event_listener_with_callback(event, listener.as_ref().unchecked_ref())?;
            listeners.push((event, listener));
        }

        self.markers.insert(
            id,
            MarkerEntry {
                marker: js_marker,
                element,
                position: marker.position,
                listeners,
                popup: None,
            },
        );
        Ok(id)
    }

    fn remove_marker(&mut self, id: MarkerId) {
        let popup = self.markers.get(&id).and_then(|entry| entry.popup);
        if let Some(popup) = popup {
            self.remove_popup(popup);
        }

        let Some(entry) = self.markers.remove(&id) else {
            return;
        };
        for (event, listener) in &entry.listeners {
            if let Err(err) = entry
                .element
                .remove_event_listener_with_callback(event, listener.as_ref().unchecked_ref())
            {
                debug!("Failed to detach {event} listener of {id}: {err:?}");
            }
        }
        entry.marker.remove();
    }

    fn marker_popup(&self, marker: MarkerId) -> Option<PopupId> {
        self.markers
            .get(&marker)?
            .popup
            .filter(|popup| self.popup_is_open(*popup))
    }

    fn add_popup(&mut self, popup: &PopupSpec) -> Result<PopupId, MapError> {
        if self.destroyed {
            return Err(MapError::SessionDestroyed);
        }
        self.prune_closed_popups();

        let (position, marker) = match popup.anchor {
            PopupAnchor::Coordinate(position) => (position, None),
            PopupAnchor::Marker(marker) => {
                let entry = self
                    .markers
                    .get(&marker)
                    .ok_or(MapError::UnknownMarker(marker))?;
                (entry.position, Some(marker))
            }
        };
        if let Some(previous) = marker.and_then(|m| self.markers.get(&m)?.popup) {
            self.remove_popup(previous);
        }

        let js_popup = ffi::Popup::new(&to_js(&popup.options)?);
        let id = PopupId(self.next_id());
        let slot = self.events.clone();
        let on_close = Listener::new(move |_: JsValue| emit(&slot, MapEvent::PopupClosed(id)));
        js_popup.on("close", on_close.as_ref().unchecked_ref());
        js_popup.set_lng_lat(&to_js(&position)?);
        js_popup.set_html(popup.content.as_html());
        js_popup.add_to(&self.map);

        self.popups.insert(
            id,
            PopupEntry {
                popup: js_popup,
                marker,
                on_close,
            },
        );
        if let Some(entry) = marker.and_then(|m| self.markers.get_mut(&m)) {
            entry.popup = Some(id);
        }
        Ok(id)
    }

    fn remove_popup(&mut self, id: PopupId) {
        let Some(entry) = self.popups.get(&id) else {
            return;
        };
        // Fires `close` while the listener is still attached.
        entry.popup.remove();
        self.forget_popup(id);
    }

    fn set_cursor(&mut self, cursor: &str) {
        if let Err(err) = self.map.get_canvas().style().set_property("cursor", cursor) {
            debug!("Failed to set cursor: {err:?}");
        }
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }

        let popups: Vec<PopupId> = self.popups.keys().copied().collect();
        for popup in popups {
            self.remove_popup(popup);
        }
        let markers: Vec<MarkerId> = self.markers.keys().copied().collect();
        for marker in markers {
            self.remove_marker(marker);
        }
        self.unlisten_all_layers();
        for (event, listener) in self.map_listeners.drain(..) {
            self.map.off(event, listener.as_ref().unchecked_ref());
        }

        self.map.remove();
        *self.events.borrow_mut() = EventSlot::default();
        self.destroyed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, MapError> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|err| MapError::from(JsValue::from(err)))
}

fn error_message(event: &JsValue) -> String {
    Reflect::get(event, &"error".into())
        .ok()
        .and_then(|error| Reflect::get(&error, &"message".into()).ok())
        .and_then(|message| message.as_string())
        .unwrap_or_else(|| "Unknown map error".to_string())
}

fn layer_click(layer: &str, event: &JsValue) -> Option<MapEvent> {
    let point = Reflect::get(event, &"point".into()).ok()?;
    let x = Reflect::get(&point, &"x".into()).ok()?.as_f64()?;
    let y = Reflect::get(&point, &"y".into()).ok()?.as_f64()?;
    let lnglat = Reflect::get(event, &"lngLat".into()).ok()?;
    let lng = Reflect::get(&lnglat, &"lng".into()).ok()?.as_f64()?;
    let lat = Reflect::get(&lnglat, &"lat".into()).ok()?.as_f64()?;

    let features = Reflect::get(event, &"features".into())
        .ok()
        .filter(Array::is_array)
        .map(|features| {
            Array::from(&features)
                .iter()
                .filter_map(|feature| parse_feature(&feature, Some(layer)))
                .collect()
        })
        .unwrap_or_default();

    Some(MapEvent::LayerClick {
        layer: layer.to_string(),
        point: ScreenPoint::new(x, y),
        lnglat: LngLat::new(lng, lat),
        features,
    })
}

/// Converts a Mapbox feature with point geometry. Other geometries are skipped.
fn parse_feature(feature: &JsValue, layer: Option<&str>) -> Option<RenderedFeature> {
    let text = js_sys::JSON::stringify(feature).ok()?.as_string()?;
    let feature: Value = serde_json::from_str(&text).ok()?;

    let coordinates = feature["geometry"]["coordinates"].as_array()?;
    let [lng, lat] = coordinates.as_slice() else {
        return None;
    };
    let position = LngLat::try_new(lng.as_f64()?, lat.as_f64()?).ok()?;

    let layer = feature["layer"]["id"]
        .as_str()
        .or(layer)?
        .to_string();
    let source = feature["source"].as_str().unwrap_or_default().to_string();
    let properties = feature["properties"]
        .as_object()
        .cloned()
        .unwrap_or_default();

    Some(RenderedFeature {
        layer,
        source,
        position,
        properties,
    })
}

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use geojson::{FeatureCollection, GeoJson};
use serde_json::{Map, Value};
use skolekort_types::{lnglat, LngLat, ScreenPoint, Size, Viewport};

use super::{
    CameraOptions, ClusterIndex, ClusterOptions, EngineFuture, EventSink, GeoJsonData, LayerKind,
    LayerSpec, MapEngine, MarkerId, MarkerSpec, PopupId, PopupOptions, PopupSpec, RenderedFeature,
    SourceSpec,
};
use crate::control::MapEvent;
use crate::decoded_image::DecodedImage;
use crate::error::MapError;
use crate::overlay::{OverlayContent, PopupAnchor};

const DEFAULT_CANVAS: Size = Size::new(1024.0, 768.0);
const DEFAULT_HIT_RADIUS: f64 = 8.0;

/// Kind of a recorded camera change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMoveKind {
    /// [`MapEngine::jump_to`]
    Jump,
    /// [`MapEngine::ease_to`]
    Ease,
    /// [`MapEngine::fly_to`]
    Fly,
}

/// Camera change recorded by [`HeadlessEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct CameraMove {
    /// How the camera was moved.
    pub kind: CameraMoveKind,
    /// The request.
    pub camera: CameraOptions,
    /// Viewport after the move.
    pub viewport: Viewport,
}

/// Marker attached to a [`HeadlessEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessMarker {
    /// The marker as it was added.
    pub spec: MarkerSpec,
    /// Popup bound to the marker.
    pub popup: Option<PopupId>,
}

/// Popup attached to a [`HeadlessEngine`].
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessPopup {
    /// What the popup is anchored to.
    pub anchor: PopupAnchor,
    /// Resolved position of the popup.
    pub position: LngLat,
    /// Content.
    pub content: OverlayContent,
    /// Presentation options.
    pub options: PopupOptions,
}

struct HeadlessSource {
    id: String,
    spec: SourceSpec,
    points: Vec<(LngLat, Map<String, Value>)>,
    clusters: Option<ClusterIndex>,
}

/// Map engine that keeps everything in memory and renders nothing.
///
/// Camera animations complete instantly. Remote source data is resolved from the documents
/// registered with [`HeadlessEngine::with_remote_data`]; unknown URLs produce empty sources.
/// User input is simulated with [`click`](HeadlessEngine::click),
/// [`hover`](HeadlessEngine::hover) and the marker and popup helpers.
pub struct HeadlessEngine {
    viewport: Viewport,
    canvas: Size,
    style_url: Option<String>,
    sink: Option<Arc<dyn EventSink>>,
    pending: Vec<MapEvent>,
    remote_data: AHashMap<String, FeatureCollection>,
    images: BTreeMap<String, (u32, u32)>,
    sources: Vec<HeadlessSource>,
    layers: Vec<LayerSpec>,
    markers: BTreeMap<MarkerId, HeadlessMarker>,
    popups: BTreeMap<PopupId, HeadlessPopup>,
    hovered_layers: AHashSet<String>,
    cursor: String,
    camera_moves: Vec<CameraMove>,
    next_id: u64,
    destroyed: bool,
}

impl Default for HeadlessEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessEngine {
    /// Creates an engine that reports [`MapEvent::Load`] as soon as an event sink is set.
    pub fn new() -> Self {
        let mut engine = Self::deferred();
        engine.pending.push(MapEvent::Load);
        engine
    }

    /// Creates an engine that does not load until [`HeadlessEngine::finish_loading`] is called.
    pub fn deferred() -> Self {
        Self {
            viewport: Viewport::new(lnglat!(0.0, 0.0), 0.0),
            canvas: DEFAULT_CANVAS,
            style_url: None,
            sink: None,
            pending: Vec::new(),
            remote_data: AHashMap::new(),
            images: BTreeMap::new(),
            sources: Vec::new(),
            layers: Vec::new(),
            markers: BTreeMap::new(),
            popups: BTreeMap::new(),
            hovered_layers: AHashSet::new(),
            cursor: String::new(),
            camera_moves: Vec::new(),
            next_id: 1,
            destroyed: false,
        }
    }

    /// Sets the canvas size.
    pub fn with_canvas_size(mut self, size: Size) -> Self {
        self.canvas = size;
        self
    }

    /// Registers a document served at the given URL for sources that reference it.
    pub fn with_remote_data(mut self, url: impl Into<String>, data: FeatureCollection) -> Self {
        self.remote_data.insert(url.into(), data);
        self
    }

    /// Emits [`MapEvent::Load`].
    pub fn finish_loading(&mut self) {
        self.emit(MapEvent::Load);
    }

    /// Emits an engine error.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.emit(MapEvent::Error(message.into()));
    }

    /// Current style URL.
    pub fn style_url(&self) -> Option<&str> {
        self.style_url.as_deref()
    }

    /// Ids of the layers, bottom to top.
    pub fn layer_ids(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.id.as_str()).collect()
    }

    /// Layer with the given id.
    pub fn layer(&self, id: &str) -> Option<&LayerSpec> {
        self.layers.iter().find(|l| l.id == id)
    }

    /// Ids of the sources in insertion order.
    pub fn source_ids(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.id.as_str()).collect()
    }

    /// Source with the given id, as it was added.
    pub fn source(&self, id: &str) -> Option<&SourceSpec> {
        self.find_source(id).map(|s| &s.spec)
    }

    /// Names of the registered images.
    pub fn image_names(&self) -> Vec<&str> {
        self.images.keys().map(|k| k.as_str()).collect()
    }

    /// Current canvas cursor.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Attached markers.
    pub fn markers(&self) -> impl Iterator<Item = (MarkerId, &HeadlessMarker)> {
        self.markers.iter().map(|(id, m)| (*id, m))
    }

    /// Marker with the given id.
    pub fn marker(&self, id: MarkerId) -> Option<&HeadlessMarker> {
        self.markers.get(&id)
    }

    /// Open popups.
    pub fn popups(&self) -> impl Iterator<Item = (PopupId, &HeadlessPopup)> {
        self.popups.iter().map(|(id, p)| (*id, p))
    }

    /// Popup with the given id.
    pub fn popup(&self, id: PopupId) -> Option<&HeadlessPopup> {
        self.popups.get(&id)
    }

    /// Every camera change since the engine was created.
    pub fn camera_moves(&self) -> &[CameraMove] {
        &self.camera_moves
    }

    /// Checks if [`MapEngine::destroy`] was called.
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Text of the labels a symbol layer renders at the current zoom.
    pub fn rendered_labels(&self, layer_id: &str) -> Vec<String> {
        let Some(layer) = self.layer(layer_id) else {
            return vec![];
        };
        let LayerKind::Symbol(layout) = &layer.kind else {
            return vec![];
        };
        let Some(template) = &layout.text_field else {
            return vec![];
        };

        self.visible_features(layer)
            .filter_map(|(_, props)| {
                let vars: HashMap<String, String> = props
                    .iter()
                    .map(|(k, v)| (k.clone(), super::property_to_string(v)))
                    .collect();
                match strfmt::strfmt(template, &vars) {
                    Ok(label) => Some(label),
                    Err(err) => {
                        log::debug!("Label `{template}` is not rendered: {err}");
                        None
                    }
                }
            })
            .collect()
    }

    /// Screen position of a coordinate.
    pub fn project(&self, position: LngLat) -> ScreenPoint {
        self.viewport.project(position, self.canvas)
    }

    /// Simulates a click at the canvas point.
    ///
    /// Popups that close on click are closed first, then every layer with features under the
    /// pointer reports [`MapEvent::LayerClick`], topmost layer first.
    pub fn click(&mut self, point: ScreenPoint) {
        let closing: Vec<_> = self
            .popups
            .iter()
            .filter(|(_, p)| p.options.close_on_click)
            .map(|(id, _)| *id)
            .collect();
        for id in closing {
            self.remove_popup(id);
        }

        let lnglat = self.viewport.unproject(point, self.canvas);
        let mut hits: Vec<(String, Vec<RenderedFeature>)> = Vec::new();
        for feature in self.query_rendered_features(point, &[]) {
            match hits.iter_mut().find(|(layer, _)| *layer == feature.layer) {
                Some((_, features)) => features.push(feature),
                None => hits.push((feature.layer.clone(), vec![feature])),
            }
        }

        for (layer, features) in hits {
            self.emit(MapEvent::LayerClick {
                layer,
                point,
                lnglat,
                features,
            });
        }
    }

    /// Simulates a click at the screen position of the coordinate.
    pub fn click_at(&mut self, position: LngLat) {
        let point = self.project(position);
        self.click(point);
    }

    /// Simulates moving the pointer to the canvas point.
    pub fn hover(&mut self, point: ScreenPoint) {
        let under_pointer: AHashSet<String> = self
            .query_rendered_features(point, &[])
            .into_iter()
            .map(|f| f.layer)
            .collect();

        let mut left: Vec<_> = self
            .hovered_layers
            .difference(&under_pointer)
            .cloned()
            .collect();
        left.sort();
        let mut entered: Vec<_> = under_pointer
            .difference(&self.hovered_layers)
            .cloned()
            .collect();
        entered.sort();

        self.hovered_layers = under_pointer;
        for layer in left {
            self.emit(MapEvent::LayerPointerLeave { layer });
        }
        for layer in entered {
            self.emit(MapEvent::LayerPointerEnter { layer });
        }
    }

    /// Simulates moving the pointer to the screen position of the coordinate.
    pub fn hover_at(&mut self, position: LngLat) {
        let point = self.project(position);
        self.hover(point);
    }

    /// Simulates the pointer entering a marker element.
    pub fn pointer_enter_marker(&mut self, id: MarkerId) {
        if self.markers.contains_key(&id) {
            self.emit(MapEvent::MarkerPointerEnter(id));
        }
    }

    /// Simulates the pointer leaving a marker element.
    pub fn pointer_leave_marker(&mut self, id: MarkerId) {
        if self.markers.contains_key(&id) {
            self.emit(MapEvent::MarkerPointerLeave(id));
        }
    }

    /// Simulates a click on a marker element.
    pub fn click_marker(&mut self, id: MarkerId) {
        if self.markers.contains_key(&id) {
            self.emit(MapEvent::MarkerClick(id));
        }
    }

    /// Simulates the user pressing the close button of a popup.
    pub fn close_popup(&mut self, id: PopupId) {
        self.remove_popup(id);
    }

    fn emit(&mut self, event: MapEvent) {
        if self.destroyed {
            return;
        }
        match &self.sink {
            Some(sink) => sink.push(event),
            None => self.pending.push(event),
        }
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn find_source(&self, id: &str) -> Option<&HeadlessSource> {
        self.sources.iter().find(|s| s.id == id)
    }

    fn visible_features<'a>(
        &'a self,
        layer: &'a LayerSpec,
    ) -> Box<dyn Iterator<Item = (LngLat, Map<String, Value>)> + 'a> {
        let Some(source) = self.find_source(&layer.source) else {
            return Box::new(std::iter::empty());
        };

        let features: Box<dyn Iterator<Item = (LngLat, Map<String, Value>)> + 'a> =
            match &source.clusters {
                Some(index) => Box::new(
                    index
                        .nodes(self.viewport.zoom())
                        .iter()
                        .map(|node| (node.position(), index.node_properties(node))),
                ),
                None => Box::new(source.points.iter().cloned()),
            };

        Box::new(features.filter(|(_, props)| layer.filter.matches(props)))
    }

    fn hit_radius(&self, layer: &LayerSpec, properties: &Map<String, Value>) -> f64 {
        match &layer.kind {
            LayerKind::Circle(paint) => {
                paint.radius.evaluate(properties) + paint.stroke_width.unwrap_or(0.0)
            }
            LayerKind::Symbol(layout) => {
                let icon = layout.icon_image.as_ref().and_then(|name| {
                    let (width, height) = self.images.get(name)?;
                    let scale = layout.icon_size.unwrap_or(1.0);
                    Some(f64::from((*width).max(*height)) * scale / 2.0)
                });
                let text = layout.text_size.map(|size| size / 2.0);
                match (icon, text) {
                    (Some(icon), Some(text)) => icon.max(text),
                    (Some(radius), None) | (None, Some(radius)) => radius,
                    (None, None) => DEFAULT_HIT_RADIUS,
                }
            }
        }
    }

    fn load_points(&self, data: &GeoJsonData) -> Vec<(LngLat, Map<String, Value>)> {
        let collection = match data {
            GeoJsonData::Inline(collection) => collection,
            GeoJsonData::Url(url) => match self.remote_data.get(url) {
                Some(collection) => collection,
                None => {
                    log::warn!("No data registered for `{url}`, source will be empty");
                    return vec![];
                }
            },
        };

        collection
            .features
            .iter()
            .filter_map(|feature| {
                let geometry = feature.geometry.as_ref()?;
                let geojson::Value::Point(coordinates) = &geometry.value else {
                    log::debug!("Skipping non-point feature");
                    return None;
                };
                let position = LngLat::try_from_slice(coordinates).ok()?;
                Some((position, feature.properties.clone().unwrap_or_default()))
            })
            .collect()
    }

    fn record_move(&mut self, kind: CameraMoveKind, camera: &CameraOptions) {
        if self.destroyed {
            return;
        }
        self.viewport = camera.apply(&self.viewport);
        self.camera_moves.push(CameraMove {
            kind,
            camera: camera.clone(),
            viewport: self.viewport,
        });
    }
}

/// Parses a GeoJSON document into a feature collection.
pub(crate) fn parse_feature_collection(text: &str) -> Result<FeatureCollection, MapError> {
    match text.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => Ok(collection),
        Ok(_) => Err(MapError::Decoding(
            "expected a GeoJSON feature collection".into(),
        )),
        Err(err) => Err(MapError::Decoding(err.to_string())),
    }
}

impl MapEngine for HeadlessEngine {
    fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        for event in self.pending.drain(..) {
            sink.push(event);
        }
        self.sink = Some(sink);
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn canvas_size(&self) -> Size {
        self.canvas
    }

    fn jump_to(&mut self, camera: &CameraOptions) {
        self.record_move(CameraMoveKind::Jump, camera);
    }

    fn ease_to(&mut self, camera: &CameraOptions) {
        self.record_move(CameraMoveKind::Ease, camera);
    }

    fn fly_to(&mut self, camera: &CameraOptions) {
        self.record_move(CameraMoveKind::Fly, camera);
    }

    fn set_style(&mut self, style_url: &str) {
        self.layers.clear();
        self.sources.clear();
        self.images.clear();
        self.hovered_layers.clear();
        self.style_url = Some(style_url.to_string());
        self.emit(MapEvent::StyleLoaded);
    }

    fn has_image(&self, name: &str) -> bool {
        self.images.contains_key(name)
    }

    fn add_image(&mut self, name: &str, image: &DecodedImage) -> Result<(), MapError> {
        if self.images.contains_key(name) {
            return Err(MapError::DuplicateImage(name.to_string()));
        }
        self.images.insert(name.to_string(), image.dimensions());
        Ok(())
    }

    fn remove_image(&mut self, name: &str) {
        self.images.remove(name);
    }

    fn has_source(&self, id: &str) -> bool {
        self.find_source(id).is_some()
    }

    fn add_source(&mut self, id: &str, source: &SourceSpec) -> Result<(), MapError> {
        if self.has_source(id) {
            return Err(MapError::DuplicateSource(id.to_string()));
        }

        let points = self.load_points(&source.data);
        let clusters = source.cluster.then(|| {
            ClusterIndex::new(
                points.clone(),
                ClusterOptions {
                    max_zoom: source.cluster_max_zoom,
                    radius: source.cluster_radius,
                    ..Default::default()
                },
            )
        });

        self.sources.push(HeadlessSource {
            id: id.to_string(),
            spec: source.clone(),
            points,
            clusters,
        });
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), MapError> {
        if let Some(layer) = self.layers.iter().find(|l| l.source == id) {
            return Err(MapError::SourceInUse(id.to_string(), layer.id.clone()));
        }
        let len = self.sources.len();
        self.sources.retain(|s| s.id != id);
        if self.sources.len() == len {
            return Err(MapError::UnknownSource(id.to_string()));
        }
        Ok(())
    }

    fn has_layer(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    fn add_layer(&mut self, layer: &LayerSpec) -> Result<(), MapError> {
        if self.has_layer(&layer.id) {
            return Err(MapError::DuplicateLayer(layer.id.clone()));
        }
        if !self.has_source(&layer.source) {
            return Err(MapError::UnknownSource(layer.source.clone()));
        }
        self.layers.push(layer.clone());
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), MapError> {
        let len = self.layers.len();
        self.layers.retain(|l| l.id != id);
        if self.layers.len() == len {
            return Err(MapError::UnknownLayer(id.to_string()));
        }
        self.hovered_layers.remove(id);
        Ok(())
    }

    fn query_rendered_features(&self, point: ScreenPoint, layers: &[&str]) -> Vec<RenderedFeature> {
        let mut result = Vec::new();
        for layer in self.layers.iter().rev() {
            if !layers.is_empty() && !layers.contains(&layer.id.as_str()) {
                continue;
            }

            for (position, properties) in self.visible_features(layer) {
                let screen = self.project(position);
                if screen.distance(&point) > self.hit_radius(layer, &properties) {
                    continue;
                }
                result.push(RenderedFeature {
                    layer: layer.id.clone(),
                    source: layer.source.clone(),
                    position,
                    properties,
                });
            }
        }

        result
    }

    fn cluster_expansion_zoom(
        &self,
        source: &str,
        cluster_id: u64,
    ) -> EngineFuture<Result<f64, MapError>> {
        let result = match self.find_source(source) {
            None => Err(MapError::UnknownSource(source.to_string())),
            Some(HeadlessSource {
                clusters: Some(index),
                ..
            }) => index.expansion_zoom(cluster_id),
            Some(_) => Err(MapError::UnknownCluster(cluster_id)),
        };
        Box::pin(futures::future::ready(result))
    }

    fn add_marker(&mut self, marker: &MarkerSpec) -> Result<MarkerId, MapError> {
        if self.destroyed {
            return Err(MapError::SessionDestroyed);
        }
        let id = MarkerId(self.next_id());
        self.markers.insert(
            id,
            HeadlessMarker {
                spec: marker.clone(),
                popup: None,
            },
        );
        Ok(id)
    }

    fn remove_marker(&mut self, id: MarkerId) {
        if let Some(marker) = self.markers.remove(&id) {
            if let Some(popup) = marker.popup {
                self.remove_popup(popup);
            }
        }
    }

    fn marker_popup(&self, marker: MarkerId) -> Option<PopupId> {
        self.markers.get(&marker)?.popup
    }

    fn add_popup(&mut self, popup: &PopupSpec) -> Result<PopupId, MapError> {
        if self.destroyed {
            return Err(MapError::SessionDestroyed);
        }

        let position = match popup.anchor {
            PopupAnchor::Coordinate(position) => position,
            PopupAnchor::Marker(marker_id) => {
                let marker = self
                    .markers
                    .get(&marker_id)
                    .ok_or(MapError::UnknownMarker(marker_id))?;
                let (position, previous) = (marker.spec.position, marker.popup);
                if let Some(previous) = previous {
                    self.remove_popup(previous);
                }
                position
            }
        };

        let id = PopupId(self.next_id());
        if let PopupAnchor::Marker(marker_id) = popup.anchor {
            if let Some(marker) = self.markers.get_mut(&marker_id) {
                marker.popup = Some(id);
            }
        }

        self.popups.insert(
            id,
            HeadlessPopup {
                anchor: popup.anchor,
                position,
                content: popup.content.clone(),
                options: popup.options.clone(),
            },
        );
        Ok(id)
    }

    fn remove_popup(&mut self, id: PopupId) {
        let Some(popup) = self.popups.remove(&id) else {
            return;
        };
        if let PopupAnchor::Marker(marker_id) = popup.anchor {
            if let Some(marker) = self.markers.get_mut(&marker_id) {
                if marker.popup == Some(id) {
                    marker.popup = None;
                }
            }
        }
        self.emit(MapEvent::PopupClosed(id));
    }

    fn set_cursor(&mut self, cursor: &str) {
        self.cursor = cursor.to_string();
    }

    fn destroy(&mut self) {
        self.popups.clear();
        self.markers.clear();
        self.layers.clear();
        self.sources.clear();
        self.images.clear();
        self.pending.clear();
        self.sink = None;
        self.destroyed = true;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::color::Color;
    use crate::engine::{CirclePaint, LayerFilter, MarkerOptions, PaintValue, SymbolLayout};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<MapEvent>>);

    impl EventSink for Recorder {
        fn push(&self, event: MapEvent) {
            self.0.lock().push(event);
        }
    }

    fn collection() -> FeatureCollection {
        parse_feature_collection(
            &json!({
                "type": "FeatureCollection",
                "features": [
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.20, 56.15]},
                     "properties": {"INST_NAVN": "A"}},
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.21, 56.15]},
                     "properties": {"INST_NAVN": "B"}},
                    {"type": "Feature", "geometry": {"type": "Point", "coordinates": [12.57, 55.68]},
                     "properties": {"INST_NAVN": "C"}},
                    {"type": "Feature", "geometry": {"type": "LineString", "coordinates": [[0, 0], [1, 1]]},
                     "properties": {}}
                ]
            })
            .to_string(),
        )
        .expect("valid collection")
    }

    fn engine_with_layers() -> (HeadlessEngine, Arc<Recorder>) {
        let mut engine = HeadlessEngine::new().with_remote_data("/data.geojson", collection());
        let recorder = Arc::new(Recorder::default());
        engine.set_event_sink(recorder.clone());
        engine
            .add_source(
                "src",
                &SourceSpec::geojson(GeoJsonData::Url("/data.geojson".into())).clustered(14, 50.0),
            )
            .expect("source");
        engine
            .add_layer(
                &LayerSpec::circle(
                    "clusters",
                    "src",
                    CirclePaint::new(PaintValue::Constant(Color::WHITE), PaintValue::Constant(15.0)),
                )
                .with_filter(LayerFilter::Clusters),
            )
            .expect("layer");
        engine
            .add_layer(
                &LayerSpec::symbol(
                    "cluster-count",
                    "src",
                    SymbolLayout::text("{point_count_abbreviated}", &["Arial"], 12.0),
                )
                .with_filter(LayerFilter::Clusters),
            )
            .expect("layer");
        engine
            .add_layer(
                &LayerSpec::circle(
                    "points",
                    "src",
                    CirclePaint::new(PaintValue::Constant(Color::BLACK), PaintValue::Constant(12.0)),
                )
                .with_filter(LayerFilter::Unclustered),
            )
            .expect("layer");
        (engine, recorder)
    }

    #[test]
    fn load_is_delivered_when_sink_is_set() {
        let mut engine = HeadlessEngine::new();
        let recorder = Arc::new(Recorder::default());
        engine.set_event_sink(recorder.clone());
        assert_eq!(*recorder.0.lock(), vec![MapEvent::Load]);
    }

    #[test]
    fn clusters_and_labels() {
        let (mut engine, _) = engine_with_layers();
        engine.jump_to(&CameraOptions::new().center(lnglat!(10.2, 56.15)).zoom(8.0));
        assert_eq!(engine.rendered_labels("cluster-count"), vec!["2".to_string()]);

        engine.jump_to(&CameraOptions::new().zoom(16.0));
        assert!(engine.rendered_labels("cluster-count").is_empty());
    }

    #[test]
    fn click_reports_topmost_first() {
        let (mut engine, recorder) = engine_with_layers();
        engine.jump_to(&CameraOptions::new().center(lnglat!(10.205, 56.15)).zoom(8.0));
        recorder.0.lock().clear();

        let center = engine.canvas_size().center();
        engine.click(center);
        let events = recorder.0.lock().clone();
        let layers: Vec<_> = events.iter().filter_map(|e| e.layer()).collect();
        assert_eq!(layers, vec!["cluster-count", "clusters"]);
        assert_matches!(&events[1], MapEvent::LayerClick { features, .. } if features[0].is_cluster());
    }

    #[test]
    fn hover_enter_and_leave() {
        let (mut engine, recorder) = engine_with_layers();
        engine.jump_to(&CameraOptions::new().center(lnglat!(12.57, 55.68)).zoom(10.0));
        recorder.0.lock().clear();

        engine.hover(engine.canvas_size().center());
        engine.hover(ScreenPoint::new(0.0, 0.0));
        assert_eq!(
            *recorder.0.lock(),
            vec![
                MapEvent::LayerPointerEnter {
                    layer: "points".into()
                },
                MapEvent::LayerPointerLeave {
                    layer: "points".into()
                },
            ]
        );
    }

    #[test]
    fn source_in_use_cannot_be_removed() {
        let (mut engine, _) = engine_with_layers();
        assert_matches!(engine.remove_source("src"), Err(MapError::SourceInUse(..)));
        for id in ["points", "cluster-count", "clusters"] {
            engine.remove_layer(id).expect("layer exists");
        }
        engine.remove_source("src").expect("source is free");
        assert_matches!(engine.remove_source("src"), Err(MapError::UnknownSource(_)));
    }

    #[test]
    fn style_change_drops_custom_resources() {
        let (mut engine, recorder) = engine_with_layers();
        recorder.0.lock().clear();
        engine.set_style("mapbox://styles/mapbox/dark-v11");
        assert!(engine.layer_ids().is_empty());
        assert!(engine.source_ids().is_empty());
        assert_eq!(*recorder.0.lock(), vec![MapEvent::StyleLoaded]);
    }

    #[test]
    fn marker_slot_holds_one_popup() {
        let (mut engine, recorder) = engine_with_layers();
        let marker = engine
            .add_marker(&MarkerSpec {
                position: lnglat!(10.0, 56.0),
                content: OverlayContent::text("x"),
                options: MarkerOptions::default(),
            })
            .expect("marker");
        let popup = |engine: &mut HeadlessEngine| {
            engine
                .add_popup(&PopupSpec {
                    anchor: PopupAnchor::Marker(marker),
                    content: OverlayContent::text("p"),
                    options: PopupOptions::default(),
                })
                .expect("popup")
        };

        let first = popup(&mut engine);
        let second = popup(&mut engine);
        assert_eq!(engine.popups().count(), 1);
        assert_eq!(engine.marker_popup(marker), Some(second));
        assert!(recorder.0.lock().contains(&MapEvent::PopupClosed(first)));

        engine.remove_marker(marker);
        assert_eq!(engine.popups().count(), 0);
    }

    #[test]
    fn expansion_zoom_of_unknown_source() {
        let (engine, _) = engine_with_layers();
        let result = tokio_test::block_on(engine.cluster_expansion_zoom("nope", 1));
        assert_matches!(result, Err(MapError::UnknownSource(_)));
    }
}

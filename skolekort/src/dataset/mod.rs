//! Clustered school dataset drawn on top of the base map.
//!
//! [`DatasetOverlay`] registers a clustered GeoJSON source and four layers once the session is
//! ready and the point icon is loaded, reacts to clicks and hovers on them, and removes them
//! again when it is torn down or dropped. A style switch drops custom layers in the engine, so
//! the overlay registers its layers anew after every [`MapEvent::StyleLoaded`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use skolekort_types::ScreenPoint;

use crate::async_runtime::run_or_spawn;
use crate::control::{EventPropagation, ListenerId, MapEvent};
use crate::decoded_image::DecodedImage;
use crate::engine::{CameraOptions, GeoJsonData, RenderedFeature};
use crate::error::MapError;
use crate::overlay::{PopupAnchor, PopupOverlay, PopupOverlayOptions};
use crate::platform::PlatformService;
use crate::session::SessionHandle;

mod layers;
mod properties;

pub use layers::{
    dataset_layers, dataset_source, CLUSTERS_LAYER, CLUSTER_COUNT_LAYER, LAYER_IDS,
    POINT_BACKGROUND_LAYER, POINT_LAYER,
};
pub use properties::SchoolProperties;

const DETAIL_POPUP_CLASS: &str = "location-popup";
const DETAIL_POPUP_MAX_WIDTH: &str = "800px";

/// Where the dataset and its icon come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatasetConfig {
    /// Id of the GeoJSON source.
    pub source_id: String,
    /// Dataset URL or inline data.
    pub data: GeoJsonData,
    /// URL of the point icon.
    pub icon_url: String,
    /// Name the icon is registered under.
    pub icon_name: String,
    /// Highest zoom at which points are clustered.
    pub cluster_max_zoom: u8,
    /// Cluster radius in pixels.
    pub cluster_radius: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            source_id: "my-geojson-dataset".into(),
            data: GeoJsonData::Url("/SkolrFinal.geojson".into()),
            icon_url: "/skole-icon.png".into(),
            icon_name: "skole-icon".into(),
            cluster_max_zoom: 14,
            cluster_radius: 50.0,
        }
    }
}

/// Registration state of a [`DatasetOverlay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    /// The session is not ready yet.
    Unregistered,
    /// Waiting for the icon to load. Stays here if loading fails.
    AwaitingIcon,
    /// Source and layers are on the map.
    LayersRegistered,
    /// Source and layers were removed. Terminal.
    TornDown,
}

struct DatasetInner {
    session: SessionHandle,
    config: DatasetConfig,
    platform: Arc<dyn PlatformService>,
    state: Mutex<DatasetState>,
    // Bumped on every registration attempt and on teardown. Icon loads of older attempts are
    // discarded.
    generation: AtomicU64,
    detail_popup: Mutex<Option<PopupOverlay>>,
}

/// Clustered school dataset layer set.
pub struct DatasetOverlay {
    inner: Arc<DatasetInner>,
    listener: ListenerId,
}

impl DatasetOverlay {
    /// Mounts the overlay. Registration starts right away if the session is ready, otherwise on
    /// [`MapEvent::Load`].
    pub fn mount(
        session: &SessionHandle,
        config: DatasetConfig,
        platform: Arc<dyn PlatformService>,
    ) -> Self {
        let inner = Arc::new(DatasetInner {
            session: session.clone(),
            config,
            platform,
            state: Mutex::new(DatasetState::Unregistered),
            generation: AtomicU64::new(0),
            detail_popup: Mutex::new(None),
        });

        let weak = Arc::downgrade(&inner);
        let listener = session.subscribe(move |event: &MapEvent, _: &SessionHandle| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_event(event);
            }
            EventPropagation::Propagate
        });

        if session.is_ready() {
            inner.begin_registration();
        }

        Self { inner, listener }
    }

    /// Current registration state.
    pub fn state(&self) -> DatasetState {
        *self.inner.state.lock()
    }

    /// Configuration of the overlay.
    pub fn config(&self) -> &DatasetConfig {
        &self.inner.config
    }

    /// Starts a new registration attempt if the previous one failed to load the icon.
    pub fn retry(&self) {
        if self.state() == DatasetState::AwaitingIcon && self.inner.session.is_ready() {
            self.inner.begin_registration();
        }
    }

    /// Removes the layers and the source. Missing items are skipped.
    pub fn teardown(&self) {
        self.inner.teardown();
    }
}

impl Drop for DatasetOverlay {
    fn drop(&mut self) {
        self.inner.session.unsubscribe(self.listener);
        self.inner.teardown();
    }
}

impl DatasetInner {
    fn handle_event(self: &Arc<Self>, event: &MapEvent) {
        let state = *self.state.lock();
        match event {
            MapEvent::Load if state == DatasetState::Unregistered => self.begin_registration(),
            MapEvent::StyleLoaded if state != DatasetState::TornDown => {
                if self.session.is_ready() {
                    log::info!("Style changed, registering dataset layers again");
                    self.begin_registration();
                }
            }
            MapEvent::LayerClick {
                layer,
                point,
                features,
                ..
            } if state == DatasetState::LayersRegistered => {
                if layer == CLUSTERS_LAYER {
                    self.zoom_into_cluster(*point, features);
                } else if layer == POINT_LAYER {
                    self.show_details(features);
                }
            }
            MapEvent::LayerPointerEnter { layer } if is_interactive(layer) => {
                self.session.set_cursor("pointer");
            }
            MapEvent::LayerPointerLeave { layer } if is_interactive(layer) => {
                self.session.set_cursor("");
            }
            _ => {}
        }
    }

    fn begin_registration(self: &Arc<Self>) {
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        *self.state.lock() = DatasetState::AwaitingIcon;

        if self.session.has_image(&self.config.icon_name) {
            self.register_layers(generation);
            return;
        }

        let weak = Arc::downgrade(self);
        let platform = self.platform.clone();
        let url = self.config.icon_url.clone();
        run_or_spawn(async move {
            let result = platform.load_image_url(&url).await;
            if let Some(inner) = weak.upgrade() {
                inner.icon_loaded(generation, result);
            }
        });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation
            && *self.state.lock() == DatasetState::AwaitingIcon
            && self.session.is_alive()
    }

    fn icon_loaded(&self, generation: u64, result: Result<DecodedImage, MapError>) {
        if !self.is_current(generation) {
            log::debug!("Discarding icon load of an outdated registration attempt");
            return;
        }

        let image = match result {
            Ok(image) => image,
            Err(err) => {
                log::error!("Error loading icon {}: {err}", self.config.icon_url);
                return;
            }
        };

        if !self.session.has_image(&self.config.icon_name) {
            if let Err(err) = self.session.add_image(&self.config.icon_name, &image) {
                log::error!("Failed to register icon {}: {err}", self.config.icon_name);
                return;
            }
        }

        self.register_layers(generation);
    }

    fn register_layers(&self, generation: u64) {
        if !self.is_current(generation) {
            return;
        }

        let source_id = &self.config.source_id;
        if !self.session.has_source(source_id) {
            if let Err(err) = self.session.add_source(source_id, &dataset_source(&self.config)) {
                log::error!("Failed to add dataset source: {err}");
                return;
            }
        }

        for layer in dataset_layers(&self.config) {
            if self.session.has_layer(&layer.id) {
                continue;
            }
            if let Err(err) = self.session.add_layer(&layer) {
                log::error!("Failed to add dataset layer {}: {err}", layer.id);
                return;
            }
        }

        *self.state.lock() = DatasetState::LayersRegistered;
        log::info!("Dataset layers registered");
    }

    fn zoom_into_cluster(&self, point: ScreenPoint, features: &[RenderedFeature]) {
        let queried = self.session.query_rendered_features(point, &[CLUSTERS_LAYER]);
        let Some(cluster) = queried
            .iter()
            .chain(features)
            .find(|f| f.is_cluster())
            .cloned()
        else {
            return;
        };
        let Some(cluster_id) = cluster.cluster_id() else {
            log::warn!("Cluster feature without cluster id");
            return;
        };

        let expansion = self
            .session
            .cluster_expansion_zoom(&self.config.source_id, cluster_id);
        let session = Arc::downgrade(&self.session);
        run_or_spawn(async move {
            let zoom = match expansion.await {
                Ok(zoom) => zoom,
                Err(err) => {
                    log::warn!("Failed to get cluster expansion zoom: {err}");
                    return;
                }
            };
            if let Some(session) = Weak::upgrade(&session) {
                let zoom = zoom.max(session.viewport().zoom());
                session.ease_to(&CameraOptions::new().center(cluster.position).zoom(zoom));
            }
        });
    }

    fn show_details(&self, features: &[RenderedFeature]) {
        let Some(feature) = features.first() else {
            return;
        };
        let school = SchoolProperties::from_properties(&feature.properties);
        let mut options = PopupOverlayOptions::default()
            .with_class_name(DETAIL_POPUP_CLASS)
            .with_max_width(DETAIL_POPUP_MAX_WIDTH);
        if let Some(code) = &school.category_code {
            options = options.with_category(code.clone());
        }

        match PopupOverlay::open(
            &self.session,
            PopupAnchor::Coordinate(feature.position),
            school.popup_content(),
            options,
        ) {
            Ok(popup) => {
                let previous = self.detail_popup.lock().replace(popup);
                drop(previous);
            }
            Err(err) => log::error!("Failed to open school popup: {err}"),
        }
    }

    fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        {
            let mut state = self.state.lock();
            if *state == DatasetState::TornDown {
                return;
            }
            *state = DatasetState::TornDown;
        }

        let popup = self.detail_popup.lock().take();
        drop(popup);

        if !self.session.is_alive() {
            return;
        }

        for layer in LAYER_IDS.iter().rev() {
            if self.session.has_layer(layer) {
                if let Err(err) = self.session.remove_layer(layer) {
                    log::warn!("Failed to remove layer {layer}: {err}");
                }
            }
        }
        if self.session.has_source(&self.config.source_id) {
            if let Err(err) = self.session.remove_source(&self.config.source_id) {
                log::warn!("Failed to remove dataset source: {err}");
            }
        }
        self.session.set_cursor("");
        log::info!("Dataset layers removed");
    }
}

fn is_interactive(layer: &str) -> bool {
    layer == CLUSTERS_LAYER || layer == POINT_LAYER
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use geojson::FeatureCollection;
    use skolekort_types::{lnglat, LngLat, Viewport};

    use super::*;
    use crate::engine::{parse_feature_collection, CameraMoveKind, HeadlessEngine};
    use crate::platform::InMemoryPlatformService;
    use crate::session::MapProvider;

    const ICON_URL: &str = "/skole-icon.png";
    const DATA_URL: &str = "/SkolrFinal.geojson";
    const CLUSTERED: LngLat = lnglat!(10.2, 56.15);
    const LONELY: LngLat = lnglat!(10.25, 56.15);

    fn schools() -> FeatureCollection {
        parse_feature_collection(
            r#"{
                "type": "FeatureCollection",
                "features": [
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [10.2, 56.15]},
                        "properties": {"INST_NAVN": "Aarhus Skole", "INST_TYPE_NR": "1012"}
                    },
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [10.2002, 56.1501]},
                        "properties": {"INST_NAVN": "Midtbyens Skole", "INST_TYPE_NR": "1015"}
                    },
                    {
                        "type": "Feature",
                        "geometry": {"type": "Point", "coordinates": [10.25, 56.15]},
                        "properties": {"INST_NAVN": "Lonely Skole", "INST_TYPE_NR": 9999}
                    }
                ]
            }"#,
        )
        .expect("fixture")
    }

    fn icon() -> DecodedImage {
        DecodedImage::from_raw(vec![255; 32 * 32 * 4], (32, 32)).expect("icon")
    }

    fn with_icon() -> Arc<InMemoryPlatformService> {
        Arc::new(InMemoryPlatformService::new().with_image(ICON_URL, icon()))
    }

    fn provider(name: &str) -> MapProvider {
        let headless = HeadlessEngine::new().with_remote_data(DATA_URL, schools());
        let provider =
            MapProvider::mount(name, Viewport::new(lnglat!(10.22, 56.15), 12.0), headless)
                .expect("mount");
        provider.session().pump();
        provider
    }

    fn engine<R>(session: &SessionHandle, f: impl FnOnce(&mut HeadlessEngine) -> R) -> R {
        session.with_engine(f).expect("headless engine")
    }

    fn layer_ids(session: &SessionHandle) -> Vec<String> {
        engine(session, |e| e.layer_ids().into_iter().map(String::from).collect())
    }

    #[test]
    fn registers_after_session_load() {
        let headless = HeadlessEngine::deferred().with_remote_data(DATA_URL, schools());
        let provider = MapProvider::mount(
            "dataset-load",
            Viewport::new(lnglat!(10.22, 56.15), 12.0),
            headless,
        )
        .expect("mount");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());
        assert_eq!(overlay.state(), DatasetState::Unregistered);

        engine(&session, |e| e.finish_loading());
        session.pump();

        assert_eq!(overlay.state(), DatasetState::LayersRegistered);
        assert_eq!(layer_ids(&session), LAYER_IDS);
        assert_eq!(engine(&session, |e| e.source_ids().len()), 1);
        assert!(session.has_image("skole-icon"));
    }

    #[test]
    fn icon_failure_waits_for_retry() {
        let provider = provider("dataset-icon-failure");
        let session = provider.session().clone();
        let platform = Arc::new(InMemoryPlatformService::new());
        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), platform.clone());

        assert_eq!(overlay.state(), DatasetState::AwaitingIcon);
        assert!(layer_ids(&session).is_empty());
        assert!(!session.has_source("my-geojson-dataset"));

        platform.insert_image(ICON_URL, icon());
        overlay.retry();
        assert_eq!(overlay.state(), DatasetState::LayersRegistered);
        assert_eq!(layer_ids(&session).len(), 4);
    }

    #[test]
    fn outdated_icon_load_is_discarded() {
        let provider = provider("dataset-outdated-icon");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(
            &session,
            DatasetConfig::default(),
            Arc::new(InMemoryPlatformService::new()),
        );
        let outdated = overlay.inner.generation.load(Ordering::Acquire);
        overlay.retry();

        overlay.inner.icon_loaded(outdated, Ok(icon()));
        assert_eq!(overlay.state(), DatasetState::AwaitingIcon);
        assert!(!session.has_image("skole-icon"));

        overlay.teardown();
        let current = overlay.inner.generation.load(Ordering::Acquire);
        overlay.inner.icon_loaded(current, Ok(icon()));
        assert_eq!(overlay.state(), DatasetState::TornDown);
        assert!(layer_ids(&session).is_empty());
    }

    #[test]
    fn teardown_and_remount() {
        let provider = provider("dataset-teardown");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());
        assert_eq!(overlay.state(), DatasetState::LayersRegistered);

        overlay.teardown();
        assert_eq!(overlay.state(), DatasetState::TornDown);
        assert!(layer_ids(&session).is_empty());
        assert!(!session.has_source("my-geojson-dataset"));

        overlay.teardown();
        overlay.retry();
        assert_eq!(overlay.state(), DatasetState::TornDown);
        drop(overlay);

        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());
        assert_eq!(overlay.state(), DatasetState::LayersRegistered);
        assert_eq!(layer_ids(&session), LAYER_IDS);
    }

    #[test]
    fn drop_removes_layers() {
        let provider = provider("dataset-drop");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());
        let listeners = session.listener_count();

        drop(overlay);
        assert!(layer_ids(&session).is_empty());
        assert_eq!(session.listener_count(), listeners - 1);
    }

    #[test]
    fn style_change_registers_again() {
        let provider = provider("dataset-style");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());

        session.set_style("mapbox://styles/mapbox/dark-v11");
        assert!(layer_ids(&session).is_empty());

        session.pump();
        assert_eq!(overlay.state(), DatasetState::LayersRegistered);
        assert_eq!(layer_ids(&session), LAYER_IDS);
        assert!(session.has_image("skole-icon"));
    }

    #[test]
    fn hover_sets_pointer_cursor() {
        let provider = provider("dataset-hover");
        let session = provider.session().clone();
        let _overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());

        engine(&session, |e| e.hover_at(LONELY));
        session.pump();
        assert_eq!(engine(&session, |e| e.cursor().to_string()), "pointer");

        engine(&session, |e| e.hover_at(lnglat!(10.22, 56.17)));
        session.pump();
        assert_eq!(engine(&session, |e| e.cursor().to_string()), "");
    }

    #[test]
    fn point_click_replaces_detail_popup() {
        let provider = provider("dataset-point-click");
        let session = provider.session().clone();
        let _overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());

        for _ in 0..2 {
            engine(&session, |e| e.click_at(LONELY));
            session.pump();
        }

        let popups: Vec<_> = engine(&session, |e| e.popups().map(|(_, p)| p.clone()).collect());
        assert_eq!(popups.len(), 1);
        let popup = &popups[0];
        assert_eq!(popup.position, LONELY);
        assert_eq!(
            popup.options.class_name.as_deref(),
            Some("mapboxgl-custom-popup location-popup")
        );
        assert_eq!(popup.options.max_width, "800px");
        assert!(popup.content.as_html().contains("background-color: #ffffff"));
        assert!(popup.content.as_html().contains("Lonely Skole"));
    }

    #[test]
    fn cluster_click_zooms_in() {
        let provider = provider("dataset-cluster-click");
        let session = provider.session().clone();
        let _overlay = DatasetOverlay::mount(&session, DatasetConfig::default(), with_icon());

        engine(&session, |e| e.click_at(CLUSTERED));
        session.pump();

        let last = engine(&session, |e| e.camera_moves().last().cloned()).expect("camera moved");
        assert_eq!(last.kind, CameraMoveKind::Ease);
        assert!(last.viewport.zoom() >= 12.0);
        assert_abs_diff_eq!(last.viewport.center().lng(), 10.2001, epsilon = 1e-3);
        assert_abs_diff_eq!(last.viewport.center().lat(), 56.15, epsilon = 1e-3);
        assert_eq!(engine(&session, |e| e.popups().count()), 0);
    }

    #[test]
    fn clicks_before_registration_are_ignored() {
        let provider = provider("dataset-unregistered-click");
        let session = provider.session().clone();
        let overlay = DatasetOverlay::mount(
            &session,
            DatasetConfig::default(),
            Arc::new(InMemoryPlatformService::new()),
        );

        engine(&session, |e| e.click_at(LONELY));
        session.pump();
        assert_eq!(overlay.state(), DatasetState::AwaitingIcon);
        assert_eq!(engine(&session, |e| e.camera_moves().len()), 0);
        assert_eq!(engine(&session, |e| e.popups().count()), 0);
    }
}

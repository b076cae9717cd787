//! Address search: a [`Geocoder`] seam, the Mapbox Search Box client and the adapter that moves
//! the map to the selected location.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, error, info};
use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::CameraOptions;
use crate::error::MapError;
use crate::overlay::{PopupAnchor, PopupOverlay, PopupOverlayOptions};
use crate::session::SessionHandle;

mod client;
mod result;

pub use client::{SearchBoxClient, SEARCH_BOX_URL};
pub use result::{LocationFeature, LocationProperties, Suggestion};

/// Zoom level the map flies to after a location is selected.
pub const DEFAULT_SEARCH_ZOOM: f64 = 14.0;

/// Errors of the address search.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The map session has not finished loading or was destroyed.
    #[error("map instance is not ready")]
    SessionNotReady,
    /// The query contains no text.
    #[error("search query is empty")]
    EmptyQuery,
    /// The geocoder found nothing for the query.
    #[error("no results for {0:?}")]
    NoResults(String),
    /// The retrieve result is empty.
    #[error("invalid search result")]
    InvalidResult,
    /// The retrieve result has no `features[0].geometry.coordinates`.
    #[error("search result has no geometry coordinates")]
    MissingGeometry,
    /// The coordinates are not a pair of valid numbers.
    #[error("invalid coordinates in search result: {0}")]
    InvalidCoordinates(String),
    /// The geocoder response cannot be parsed.
    #[error("invalid geocoder response: {0}")]
    InvalidResponse(String),
    /// The geocoder url is malformed.
    #[error("invalid geocoder url: {0}")]
    Url(#[from] url::ParseError),
    /// The request failed.
    #[error("geocoder request failed: {0}")]
    Request(#[from] MapError),
}

/// Options passed to the geocoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SearchOptions {
    /// ISO 3166 country code results are limited to.
    pub country: String,
    /// Feature types to search for.
    pub types: BTreeSet<String>,
    /// Language of the results.
    pub language: Option<String>,
    /// Maximum number of suggestions.
    pub limit: Option<u8>,
    /// Zoom level of the map after a location is selected.
    pub zoom: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            country: "DK".into(),
            types: BTreeSet::from(["address".to_string()]),
            language: None,
            limit: None,
            zoom: DEFAULT_SEARCH_ZOOM,
        }
    }
}

impl SearchOptions {
    /// Sets the country.
    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = country.into();
        self
    }

    /// Sets the feature types.
    pub fn with_types<S: Into<String>>(mut self, types: impl IntoIterator<Item = S>) -> Self {
        self.types = types.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the language.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Sets the suggestion limit.
    pub fn with_limit(mut self, limit: u8) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the zoom level used after selection.
    pub fn with_zoom(mut self, zoom: f64) -> Self {
        self.zoom = zoom;
        self
    }
}

/// Forward geocoding service.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait Geocoder: MaybeSend + MaybeSync {
    /// Suggestions for a partial query.
    async fn suggest(
        &self,
        query: &str,
        options: &SearchOptions,
        session_token: &str,
    ) -> Result<Vec<Suggestion>, SearchError>;

    /// Full feature collection for a suggestion.
    async fn retrieve(
        &self,
        suggestion: &Suggestion,
        options: &SearchOptions,
        session_token: &str,
    ) -> Result<Value, SearchError>;
}

#[derive(Default)]
struct Selection {
    feature: Option<LocationFeature>,
    serial: u64,
}

/// Connects a geocoder with a map session.
///
/// A selected location moves the camera to it and is kept as the current selection, which can
/// be shown in a popup with [`show_selection`](Self::show_selection). Invalid results are
/// logged and returned as errors without touching the viewport.
pub struct SearchBoxAdapter {
    session: SessionHandle,
    geocoder: Arc<dyn Geocoder>,
    options: SearchOptions,
    session_token: String,
    selection: Arc<Mutex<Selection>>,
    popup: Mutex<Option<PopupOverlay>>,
}

impl SearchBoxAdapter {
    /// Creates an adapter with its own geocoder session token.
    pub fn new(
        session: SessionHandle,
        geocoder: Arc<dyn Geocoder>,
        options: SearchOptions,
    ) -> Self {
        Self {
            session,
            geocoder,
            options,
            session_token: Uuid::new_v4().to_string(),
            selection: Arc::default(),
            popup: Mutex::new(None),
        }
    }

    /// Options passed to the geocoder.
    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Token grouping the suggest and retrieve requests of this adapter.
    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Suggestions for the query. Blank queries return nothing without asking the geocoder.
    pub async fn suggest(&self, query: &str) -> Result<Vec<Suggestion>, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(vec![]);
        }

        self.geocoder
            .suggest(query, &self.options, &self.session_token)
            .await
            .inspect_err(|err| self.report_error(err))
    }

    /// Retrieves the suggestion and selects it.
    pub async fn retrieve(&self, suggestion: &Suggestion) -> Result<LocationFeature, SearchError> {
        let result = self
            .geocoder
            .retrieve(suggestion, &self.options, &self.session_token)
            .await
            .inspect_err(|err| self.report_error(err))?;
        self.handle_retrieve(&result)
    }

    /// Selects the first suggestion for the query.
    pub async fn search(&self, query: &str) -> Result<LocationFeature, SearchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let suggestions = self.suggest(query).await?;
        let Some(first) = suggestions.first() else {
            info!("No search results for {query:?}");
            return Err(SearchError::NoResults(query.to_string()));
        };
        self.retrieve(first).await
    }

    /// Validates a retrieve result, flies to it and makes it the current selection.
    pub fn handle_retrieve(&self, result: &Value) -> Result<LocationFeature, SearchError> {
        if !self.session.is_ready() {
            debug!("Map instance is not ready, search result ignored");
            return Err(SearchError::SessionNotReady);
        }

        let feature = LocationFeature::from_retrieve(result)
            .inspect_err(|err| error!("Invalid search result: {err}"))?;

        self.session.fly_to(
            &CameraOptions::new()
                .center(feature.coordinates)
                .zoom(self.options.zoom)
                .essential(true),
        );
        info!("Selected location {}", feature.title());

        {
            let mut selection = self.selection.lock();
            selection.serial += 1;
            selection.feature = Some(feature.clone());
        }
        let stale = self.popup.lock().take();
        drop(stale);

        Ok(feature)
    }

    /// Current selection.
    pub fn selected(&self) -> Option<LocationFeature> {
        self.selection.lock().feature.clone()
    }

    /// Opens a popup for the current selection. Returns `false` if nothing is selected.
    ///
    /// Closing the popup clears the selection.
    pub fn show_selection(&self) -> Result<bool, MapError> {
        let (feature, serial) = {
            let selection = self.selection.lock();
            match &selection.feature {
                Some(feature) => (feature.clone(), selection.serial),
                None => return Ok(false),
            }
        };

        let previous = self.popup.lock().take();
        drop(previous);

        let popup = PopupOverlay::open(
            &self.session,
            PopupAnchor::Coordinate(feature.coordinates),
            feature.popup_content(),
            PopupOverlayOptions::default().with_class_name("location-popup"),
        )?;

        let selection = Arc::downgrade(&self.selection);
        popup.set_on_close(move || {
            let Some(selection) = selection.upgrade() else {
                return;
            };
            let mut selection = selection.lock();
            if selection.serial == serial {
                selection.feature = None;
            }
        });

        *self.popup.lock() = Some(popup);
        Ok(true)
    }

    /// Clears the selection and closes its popup.
    pub fn clear_selection(&self) {
        {
            let mut selection = self.selection.lock();
            selection.serial += 1;
            selection.feature = None;
        }
        let popup = self.popup.lock().take();
        drop(popup);
    }

    /// Logs a geocoder error.
    pub fn report_error(&self, err: &SearchError) {
        error!("SearchBox Error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use serde_json::json;
    use skolekort_types::{lnglat, Viewport};

    use super::*;
    use crate::engine::{CameraMoveKind, HeadlessEngine};
    use crate::session::MapProvider;

    #[derive(Default)]
    struct FakeGeocoder {
        result: Value,
        suggest_calls: AtomicUsize,
        retrieve_calls: AtomicUsize,
    }

    impl FakeGeocoder {
        fn returning(result: Value) -> Arc<Self> {
            Arc::new(Self {
                result,
                ..Default::default()
            })
        }
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn suggest(
            &self,
            query: &str,
            _options: &SearchOptions,
            _session_token: &str,
        ) -> Result<Vec<Suggestion>, SearchError> {
            self.suggest_calls.fetch_add(1, Ordering::Relaxed);
            if query == "nowhere" {
                return Ok(vec![]);
            }
            Ok(vec![Suggestion {
                mapbox_id: "aarhus".into(),
                name: query.into(),
                feature_type: Some("address".into()),
                full_address: None,
                place_formatted: None,
            }])
        }

        async fn retrieve(
            &self,
            _suggestion: &Suggestion,
            _options: &SearchOptions,
            _session_token: &str,
        ) -> Result<Value, SearchError> {
            self.retrieve_calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.result.clone())
        }
    }

    fn aarhus() -> Value {
        json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.21, 56.15]},
                "properties": {"name": "Hovedgade 1", "full_address": "Hovedgade 1, 8000 Aarhus"}
            }]
        })
    }

    fn provider(name: &str, engine: HeadlessEngine) -> MapProvider {
        let provider = MapProvider::mount(name, Viewport::new(lnglat!(12.5, 55.7), 8.0), engine)
            .expect("mount");
        provider.session().pump();
        provider
    }

    fn camera_moves(session: &SessionHandle) -> usize {
        session
            .with_engine(|engine: &mut HeadlessEngine| engine.camera_moves().len())
            .unwrap_or_default()
    }

    #[test]
    fn blank_query_does_not_reach_geocoder() {
        let provider = provider("search-blank", HeadlessEngine::new());
        let geocoder = FakeGeocoder::returning(aarhus());
        let adapter = SearchBoxAdapter::new(
            provider.session().clone(),
            geocoder.clone(),
            SearchOptions::default(),
        );

        assert!(tokio_test::block_on(adapter.suggest("   ")).expect("ok").is_empty());
        assert_matches!(
            tokio_test::block_on(adapter.search("\t")),
            Err(SearchError::EmptyQuery)
        );
        assert_eq!(geocoder.suggest_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn search_flies_to_location() {
        let provider = provider("search-fly", HeadlessEngine::new());
        let session = provider.session().clone();
        let adapter = SearchBoxAdapter::new(
            session.clone(),
            FakeGeocoder::returning(aarhus()),
            SearchOptions::default(),
        );

        let feature =
            tokio_test::block_on(adapter.search("Hovedgade 1, 8000 Aarhus")).expect("selected");
        assert_eq!(feature.title(), "Hovedgade 1");

        let last = session
            .with_engine(|engine: &mut HeadlessEngine| engine.camera_moves().last().cloned())
            .flatten()
            .expect("camera moved");
        assert_eq!(last.kind, CameraMoveKind::Fly);
        assert!(last.camera.essential);
        assert_abs_diff_eq!(last.viewport.center().lng(), 10.21);
        assert_abs_diff_eq!(last.viewport.center().lat(), 56.15);
        assert_abs_diff_eq!(last.viewport.zoom(), 14.0);
        assert_eq!(adapter.selected(), Some(feature));
    }

    #[test]
    fn no_suggestions() {
        let provider = provider("search-nothing", HeadlessEngine::new());
        let geocoder = FakeGeocoder::returning(aarhus());
        let adapter = SearchBoxAdapter::new(
            provider.session().clone(),
            geocoder.clone(),
            SearchOptions::default(),
        );

        assert_matches!(
            tokio_test::block_on(adapter.search("nowhere")),
            Err(SearchError::NoResults(_))
        );
        assert_eq!(geocoder.retrieve_calls.load(Ordering::Relaxed), 0);
        assert_eq!(camera_moves(provider.session()), 0);
    }

    #[test]
    fn invalid_result_keeps_viewport() {
        let provider = provider("search-invalid", HeadlessEngine::new());
        let session = provider.session().clone();
        let before = session.viewport();
        let adapter = SearchBoxAdapter::new(
            session.clone(),
            FakeGeocoder::returning(json!({"features": [{"properties": {}}]})),
            SearchOptions::default(),
        );

        assert_matches!(
            tokio_test::block_on(adapter.search("Hovedgade")),
            Err(SearchError::MissingGeometry)
        );
        assert_eq!(camera_moves(&session), 0);
        assert_eq!(session.viewport(), before);
        assert_eq!(adapter.selected(), None);
    }

    #[test]
    fn not_ready_session_ignores_result() {
        let provider = MapProvider::mount(
            "search-not-ready",
            Viewport::new(lnglat!(12.5, 55.7), 8.0),
            HeadlessEngine::deferred(),
        )
        .expect("mount");
        let adapter = SearchBoxAdapter::new(
            provider.session().clone(),
            FakeGeocoder::returning(aarhus()),
            SearchOptions::default(),
        );

        assert_matches!(adapter.handle_retrieve(&aarhus()), Err(SearchError::SessionNotReady));
        assert_eq!(camera_moves(provider.session()), 0);
    }

    #[test]
    fn custom_zoom() {
        let provider = provider("search-zoom", HeadlessEngine::new());
        let adapter = SearchBoxAdapter::new(
            provider.session().clone(),
            FakeGeocoder::returning(aarhus()),
            SearchOptions::default().with_zoom(16.0),
        );

        adapter.handle_retrieve(&aarhus()).expect("selected");
        assert_abs_diff_eq!(provider.session().viewport().zoom(), 16.0);
    }

    #[test]
    fn closing_selection_popup_clears_selection() {
        let provider = provider("search-popup", HeadlessEngine::new());
        let session = provider.session().clone();
        let adapter = SearchBoxAdapter::new(
            session.clone(),
            FakeGeocoder::returning(aarhus()),
            SearchOptions::default(),
        );

        assert!(!adapter.show_selection().expect("no selection"));
        adapter.handle_retrieve(&aarhus()).expect("selected");
        assert!(adapter.show_selection().expect("shown"));

        let popups: Vec<_> = session
            .with_engine(|engine: &mut HeadlessEngine| {
                engine.popups().map(|(id, popup)| (id, popup.position)).collect()
            })
            .unwrap_or_default();
        assert_eq!(popups.len(), 1);
        assert_eq!(popups[0].1, lnglat!(10.21, 56.15));

        session.with_engine(|engine: &mut HeadlessEngine| engine.close_popup(popups[0].0));
        session.pump();
        assert_eq!(adapter.selected(), None);
    }

    #[test]
    fn new_selection_closes_stale_popup() {
        let provider = provider("search-stale", HeadlessEngine::new());
        let session = provider.session().clone();
        let adapter = SearchBoxAdapter::new(
            session.clone(),
            FakeGeocoder::returning(aarhus()),
            SearchOptions::default(),
        );

        adapter.handle_retrieve(&aarhus()).expect("selected");
        adapter.show_selection().expect("shown");
        adapter.handle_retrieve(&aarhus()).expect("selected again");

        let open = session
            .with_engine(|engine: &mut HeadlessEngine| engine.popups().count())
            .unwrap_or_default();
        assert_eq!(open, 0);
        assert!(adapter.selected().is_some());

        adapter.show_selection().expect("shown");
        adapter.clear_selection();
        assert_eq!(adapter.selected(), None);
        let open = session
            .with_engine(|engine: &mut HeadlessEngine| engine.popups().count())
            .unwrap_or_default();
        assert_eq!(open, 0);
    }
}

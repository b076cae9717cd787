//! End-to-end scenarios of the map page running on the headless engine.

use std::sync::Arc;

use approx::assert_abs_diff_eq;
use assert_matches::assert_matches;
use geojson::{FeatureCollection, GeoJson};
use serde_json::json;
use skolekort::dataset::{DatasetConfig, DatasetOverlay, DatasetState, LAYER_IDS};
use skolekort::decoded_image::DecodedImage;
use skolekort::engine::{CameraMoveKind, HeadlessEngine};
use skolekort::overlay::{
    MarkerOverlay, OverlayContent, PopupAnchor, PopupOverlay, PopupOverlayOptions,
};
use skolekort::platform::InMemoryPlatformService;
use skolekort::search::{SearchBoxAdapter, SearchBoxClient, SearchError, SearchOptions};
use skolekort::style::{MapStyle, StyleSwitcher};
use skolekort::{lnglat, LngLat, MapError, MapProvider, SessionHandle, Viewport};

const ICON_URL: &str = "/skole-icon.png";
const DATA_URL: &str = "/SkolrFinal.geojson";

const FOLKESKOLE: LngLat = lnglat!(10.25, 56.15);
const UNKNOWN_CATEGORY: LngLat = lnglat!(10.19, 56.13);
const CLUSTER_A: LngLat = lnglat!(10.2, 56.16);
const CLUSTER_B: LngLat = lnglat!(10.2003, 56.1601);

fn school(position: LngLat, name: &str, category: &str) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": position.to_array()},
        "properties": {
            "INST_NAVN": name,
            "INST_ADR": "Skolevej 1",
            "POSTNR": 8000,
            "POSTDISTRIKT": "Aarhus C",
            "WEB_ADR": "www.example.dk",
            "INST_TYPE_NR": category
        }
    })
}

fn schools() -> FeatureCollection {
    let collection = json!({
        "type": "FeatureCollection",
        "features": [
            school(FOLKESKOLE, "Aarhus Folkeskole", "1012"),
            school(UNKNOWN_CATEGORY, "Ukendt Skole", "9999"),
            school(CLUSTER_A, "Vestre Skole", "1013"),
            school(CLUSTER_B, "Østre Skole", "1014"),
        ]
    });
    match collection.to_string().parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => collection,
        other => panic!("not a feature collection: {other:?}"),
    }
}

fn platform() -> Arc<InMemoryPlatformService> {
    let icon = DecodedImage::from_raw(vec![255; 16 * 16 * 4], (16, 16)).expect("icon");
    Arc::new(InMemoryPlatformService::new().with_image(ICON_URL, icon))
}

fn mount(container: &str) -> MapProvider {
    let engine = HeadlessEngine::new().with_remote_data(DATA_URL, schools());
    let provider =
        MapProvider::mount(container, Viewport::new(lnglat!(10.22, 56.15), 12.0), engine)
            .expect("mount");
    provider.session().pump();
    assert!(provider.context().ready);
    provider
}

fn with_headless<R>(session: &SessionHandle, f: impl FnOnce(&mut HeadlessEngine) -> R) -> R {
    session.with_engine(f).expect("headless engine")
}

fn popup_html(session: &SessionHandle) -> Vec<String> {
    with_headless(session, |engine| {
        engine
            .popups()
            .map(|(_, popup)| popup.content.as_html().to_string())
            .collect()
    })
}

#[test]
fn address_search_flies_to_aarhus() {
    let provider = mount("scenario-search");
    let session = provider.session().clone();
    let platform = Arc::new(InMemoryPlatformService::new());
    let client = SearchBoxClient::new(platform.clone(), "pk.test").expect("client");

    let query = "Hovedgade 1, 8000 Aarhus";
    let options = SearchOptions::default();
    let suggestion = json!({
        "suggestions": [{"mapbox_id": "dXJuOm1ieGFkcjo", "name": "Hovedgade 1"}]
    });
    let retrieved = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "geometry": {"type": "Point", "coordinates": [10.21, 56.15]},
            "properties": {"name": "Hovedgade 1", "full_address": query}
        }]
    });

    let adapter = SearchBoxAdapter::new(session.clone(), Arc::new(client), options.clone());
    let probe = SearchBoxClient::new(platform.clone(), "pk.test").expect("client");
    let suggest_url = probe
        .suggest_url(query, &options, adapter.session_token())
        .expect("url");
    let retrieve_url = probe
        .retrieve_url(
            &serde_json::from_value(suggestion["suggestions"][0].clone()).expect("suggestion"),
            adapter.session_token(),
        )
        .expect("url");
    platform.insert_bytes(suggest_url.as_str(), suggestion.to_string());
    platform.insert_bytes(retrieve_url.as_str(), retrieved.to_string());

    let feature = tokio_test::block_on(adapter.search(query)).expect("location");
    assert_eq!(feature.coordinates, lnglat!(10.21, 56.15));

    let view = session.viewport();
    assert_abs_diff_eq!(view.center().lng(), 10.21);
    assert_abs_diff_eq!(view.center().lat(), 56.15);
    assert_abs_diff_eq!(view.zoom(), 14.0);
    let last = with_headless(&session, |engine| engine.camera_moves().last().cloned())
        .expect("camera moved");
    assert_eq!(last.kind, CameraMoveKind::Fly);

    assert!(adapter.show_selection().expect("popup"));
    assert!(popup_html(&session)[0].contains("Hovedgade 1"));
}

#[test]
fn malformed_search_results_never_move_viewport() {
    let provider = mount("scenario-malformed-search");
    let session = provider.session().clone();
    let platform = Arc::new(InMemoryPlatformService::new());
    let client = SearchBoxClient::new(platform, "pk.test").expect("client");
    let adapter =
        SearchBoxAdapter::new(session.clone(), Arc::new(client), SearchOptions::default());
    let before = session.viewport();

    let results = [
        json!({}),
        json!({"features": []}),
        json!({"features": [{"type": "Feature", "properties": {"name": "x"}}]}),
        json!({"features": [{"geometry": {"type": "Point"}}]}),
        json!({"features": [{"geometry": {"coordinates": [10.21]}}]}),
        json!({"features": [{"geometry": {"coordinates": ["10.21", "56.15"]}}]}),
    ];
    for result in results {
        assert!(adapter.handle_retrieve(&result).is_err(), "{result}");
    }

    assert_matches!(
        tokio_test::block_on(adapter.search("Hovedgade 1")),
        Err(SearchError::Request(MapError::IO))
    );
    assert_eq!(session.viewport(), before);
    assert!(with_headless(&session, |engine| engine.camera_moves().is_empty()));
    assert_eq!(adapter.selected(), None);
}

#[test]
fn school_popups_use_category_colors() {
    let provider = mount("scenario-category-colors");
    let session = provider.session().clone();
    let _dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());

    with_headless(&session, |engine| engine.click_at(FOLKESKOLE));
    session.pump();
    let html = popup_html(&session);
    assert_eq!(html.len(), 1);
    assert!(html[0].contains("background-color: #537A5A"));
    assert!(html[0].contains("Aarhus Folkeskole"));
    assert!(html[0].contains("Skolevej 1, 8000 Aarhus C"));
    assert!(html[0].contains("href=\"http://www.example.dk\""));

    with_headless(&session, |engine| engine.click_at(UNKNOWN_CATEGORY));
    session.pump();
    let html = popup_html(&session);
    assert_eq!(html.len(), 1);
    assert!(html[0].contains("background-color: #ffffff"));
    assert!(html[0].contains("Ukendt Skole"));
}

#[test]
fn cluster_click_zooms_into_cluster() {
    let provider = mount("scenario-cluster-click");
    let session = provider.session().clone();
    let _dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());
    let zoom_before = session.viewport().zoom();

    with_headless(&session, |engine| engine.click_at(CLUSTER_A));
    session.pump();

    let view = session.viewport();
    assert!(view.zoom() >= zoom_before);
    assert_abs_diff_eq!(view.center().lng(), 10.20015, epsilon = 1e-3);
    assert_abs_diff_eq!(view.center().lat(), 56.16005, epsilon = 1e-3);
    let last = with_headless(&session, |engine| engine.camera_moves().last().cloned())
        .expect("camera moved");
    assert_eq!(last.kind, CameraMoveKind::Ease);
}

#[test]
fn unmount_releases_everything_and_remount_works() {
    let provider = mount("scenario-remount");
    let session = provider.session().clone();
    let dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());
    let marker = MarkerOverlay::new(&session, FOLKESKOLE, OverlayContent::text("A"), ())
        .expect("marker");
    let _popup = PopupOverlay::open(
        &session,
        PopupAnchor::Marker(marker.id()),
        OverlayContent::text("Hej"),
        PopupOverlayOptions::default(),
    )
    .expect("popup");
    assert_eq!(dataset.state(), DatasetState::LayersRegistered);

    assert_matches!(
        MapProvider::mount("scenario-remount", Viewport::default(), HeadlessEngine::new()),
        Err(MapError::ContainerBusy(_))
    );

    provider.unmount();
    assert!(!session.is_alive());
    with_headless(&session, |engine| {
        assert!(engine.is_destroyed());
        assert!(engine.layer_ids().is_empty());
        assert!(engine.source_ids().is_empty());
        assert!(engine.image_names().is_empty());
        assert_eq!(engine.markers().count(), 0);
        assert_eq!(engine.popups().count(), 0);
    });
    drop(dataset);
    drop(marker);

    let provider = mount("scenario-remount");
    let session = provider.session().clone();
    let dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());
    assert_eq!(dataset.state(), DatasetState::LayersRegistered);

    dataset.teardown();
    assert!(with_headless(&session, |engine| engine.layer_ids().is_empty()));
    drop(dataset);

    let dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());
    assert_eq!(dataset.state(), DatasetState::LayersRegistered);
    assert_eq!(with_headless(&session, |engine| engine.layer_ids().len()), LAYER_IDS.len());
}

#[test]
fn one_popup_per_marker() {
    let provider = mount("scenario-marker-popup");
    let session = provider.session().clone();
    let marker = MarkerOverlay::new(&session, FOLKESKOLE, OverlayContent::text("1"), 1u32)
        .expect("marker");

    let mut popups = Vec::new();
    for text in ["first", "second", "third"] {
        let popup = PopupOverlay::open(
            &session,
            PopupAnchor::Marker(marker.id()),
            OverlayContent::text(text),
            PopupOverlayOptions::default().with_category("1012"),
        )
        .expect("popup");
        popups.push(popup);
        session.pump();

        let html = popup_html(&session);
        assert_eq!(html.len(), 1);
        assert!(html[0].contains(text));
    }

    assert_eq!(session.marker_popup(marker.id()), Some(popups[2].id()));
    assert!(!popups[0].is_open());
    assert!(popups[2].is_open());
}

#[test]
fn style_switch_keeps_dataset_and_viewport() {
    let provider = mount("scenario-style-switch");
    let session = provider.session().clone();
    let dataset = DatasetOverlay::mount(&session, DatasetConfig::default(), platform());
    let switcher = StyleSwitcher::new(session.clone(), MapStyle::Streets);
    let before = session.viewport();

    for style in [MapStyle::Satellite, MapStyle::Dark, MapStyle::Streets] {
        assert!(switcher.select(style));
        session.pump();

        assert_eq!(dataset.state(), DatasetState::LayersRegistered);
        assert_eq!(with_headless(&session, |engine| engine.layer_ids().len()), LAYER_IDS.len());
        assert_eq!(
            with_headless(&session, |engine| engine.style_url().map(String::from)),
            Some(style.url().to_string())
        );
    }
    assert_eq!(session.viewport(), before);
}

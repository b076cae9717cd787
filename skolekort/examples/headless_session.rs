//! Runs the school map on the headless engine and prints what a user would see.
//!
//! Optionally takes a path to a `.geojson` file with the school dataset. Without it a few schools
//! in Aarhus are used.
//!
//! ```shell
//! cargo run --example headless_session -- ./SkolrFinal.geojson
//! ```

use std::sync::Arc;

use anyhow::{anyhow, Result};
use geojson::{FeatureCollection, GeoJson};
use skolekort::dataset::{DatasetOverlay, CLUSTER_COUNT_LAYER};
use skolekort::decoded_image::DecodedImage;
use skolekort::engine::{GeoJsonData, HeadlessEngine};
use skolekort::platform::InMemoryPlatformService;
use skolekort::style::{MapStyle, StyleSwitcher};
use skolekort::{lnglat, AppConfig, LngLat, SessionBuilder, SessionHandle, Viewport};

const SAMPLE: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.2039, 56.1629]},
         "properties": {"INST_NAVN": "Katedralskolen", "INST_ADR": "Skolegyde 1", "POSTNR": "8000",
                        "POSTDISTRIKT": "Aarhus C", "WEB_ADR": "www.katedralskolen.dk", "INST_TYPE_NR": "1012"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.2051, 56.1633]},
         "properties": {"INST_NAVN": "Aarhus Friskole", "INST_TYPE_NR": "1013"}},
        {"type": "Feature", "geometry": {"type": "Point", "coordinates": [10.1811, 56.1502]},
         "properties": {"INST_NAVN": "Skjoldhøjskolen", "INST_TYPE_NR": "1015"}}
    ]
}"#;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let json = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => SAMPLE.to_string(),
    };
    let collection = FeatureCollection::try_from(json.parse::<GeoJson>()?)?;

    let config = AppConfig::default();
    let GeoJsonData::Url(data_url) = config.dataset.data.clone() else {
        return Err(anyhow!("expected a dataset url"));
    };

    let icon = DecodedImage::from_raw(vec![255; 32 * 32 * 4], (32, 32))
        .ok_or_else(|| anyhow!("invalid icon buffer"))?;
    let platform = Arc::new(
        InMemoryPlatformService::new().with_image(config.dataset.icon_url.clone(), icon),
    );

    let provider = SessionBuilder::new(config.container.clone())
        .with_viewport(Viewport::new(lnglat!(10.2, 56.155), 12.0))
        .with_style(config.style.url())
        .build(HeadlessEngine::new().with_remote_data(data_url, collection))?;
    let session = provider.session().clone();
    session.pump();

    let dataset = DatasetOverlay::mount(&session, config.dataset.clone(), platform);
    println!("Dataset: {:?}", dataset.state());
    print_clusters(&session);

    click(&session, lnglat!(10.2045, 56.1631));
    println!("After cluster click: {:?}", session.viewport());

    click(&session, lnglat!(10.2039, 56.1629));
    session.with_engine(|engine: &mut HeadlessEngine| {
        for (id, popup) in engine.popups() {
            println!("{id} at {:?}: {}", popup.position, popup.content.as_html());
        }
    });

    let switcher = StyleSwitcher::new(session.clone(), config.style);
    switcher.select(MapStyle::Satellite);
    session.pump();
    println!("Style {}: dataset {:?}", switcher.current(), dataset.state());

    drop(dataset);
    provider.unmount();

    Ok(())
}

fn click(session: &SessionHandle, position: LngLat) {
    session.with_engine(|engine: &mut HeadlessEngine| engine.click_at(position));
    session.pump();
}

fn print_clusters(session: &SessionHandle) {
    let labels = session
        .with_engine(|engine: &mut HeadlessEngine| engine.rendered_labels(CLUSTER_COUNT_LAYER))
        .unwrap_or_default();
    println!("Cluster labels: {labels:?}");
}

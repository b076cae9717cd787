use super::DatasetConfig;
use crate::category::category_paint;
use crate::color::Color;
use crate::engine::{CirclePaint, LayerFilter, LayerSpec, PaintValue, SourceSpec, SymbolLayout};

/// Circles of aggregated clusters.
pub const CLUSTERS_LAYER: &str = "clusters";
/// Point count labels of clusters.
pub const CLUSTER_COUNT_LAYER: &str = "cluster-count";
/// Category colored circles under individual schools.
pub const POINT_BACKGROUND_LAYER: &str = "unclustered-point-background";
/// School icons.
pub const POINT_LAYER: &str = "unclustered-point";

/// Dataset layers in the order they are added. Teardown removes them in reverse.
pub const LAYER_IDS: [&str; 4] = [
    CLUSTERS_LAYER,
    CLUSTER_COUNT_LAYER,
    POINT_BACKGROUND_LAYER,
    POINT_LAYER,
];

const CLUSTER_SMALL: Color = Color::from_hex("#51bbd6");
const CLUSTER_MEDIUM: Color = Color::from_hex("#f1f075");
const CLUSTER_LARGE: Color = Color::from_hex("#f28cb1");
const POINT_STROKE: Color = Color::from_hex("#666666");

const MEDIUM_THRESHOLD: u64 = 100;
const LARGE_THRESHOLD: u64 = 750;

const LABEL_FONT: [&str; 2] = ["DIN Offc Pro Medium", "Arial Unicode MS Bold"];

/// Clustered GeoJSON source of the dataset.
pub fn dataset_source(config: &DatasetConfig) -> SourceSpec {
    SourceSpec::geojson(config.data.clone())
        .clustered(config.cluster_max_zoom, config.cluster_radius)
}

/// The four dataset layers, in the order they are added.
pub fn dataset_layers(config: &DatasetConfig) -> Vec<LayerSpec> {
    let source = config.source_id.as_str();

    let clusters = LayerSpec::circle(
        CLUSTERS_LAYER,
        source,
        CirclePaint::new(
            PaintValue::StepByPointCount {
                base: CLUSTER_SMALL,
                stops: vec![
                    (MEDIUM_THRESHOLD, CLUSTER_MEDIUM),
                    (LARGE_THRESHOLD, CLUSTER_LARGE),
                ],
            },
            PaintValue::StepByPointCount {
                base: 15.0,
                stops: vec![(MEDIUM_THRESHOLD, 20.0), (LARGE_THRESHOLD, 25.0)],
            },
        ),
    )
    .with_filter(LayerFilter::Clusters);

    let cluster_count = LayerSpec::symbol(
        CLUSTER_COUNT_LAYER,
        source,
        SymbolLayout::text("{point_count_abbreviated}", &LABEL_FONT, 12.0),
    )
    .with_filter(LayerFilter::Clusters);

    let background = LayerSpec::circle(
        POINT_BACKGROUND_LAYER,
        source,
        CirclePaint::new(category_paint("INST_TYPE_NR"), PaintValue::Constant(12.0))
            .with_opacity(0.8)
            .with_stroke(POINT_STROKE, 1.0, 1.0),
    )
    .with_filter(LayerFilter::Unclustered);

    let icons = LayerSpec::symbol(
        POINT_LAYER,
        source,
        SymbolLayout::icon(config.icon_name.clone(), 0.7),
    )
    .with_filter(LayerFilter::Unclustered);

    vec![clusters, cluster_count, background, icons]
}

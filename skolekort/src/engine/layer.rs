use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::color::Color;

/// Which features of a clustered source a layer renders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerFilter {
    /// Every feature.
    #[default]
    All,
    /// Aggregated clusters only.
    Clusters,
    /// Individual points only.
    Unclustered,
}

impl LayerFilter {
    /// Checks if a feature with the given properties passes the filter.
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        let is_cluster = properties.contains_key("point_count");
        match self {
            Self::All => true,
            Self::Clusters => is_cluster,
            Self::Unclustered => !is_cluster,
        }
    }

    /// Style-spec filter expression.
    pub fn to_expression(&self) -> Option<Value> {
        match self {
            Self::All => None,
            Self::Clusters => Some(json!(["has", "point_count"])),
            Self::Unclustered => Some(json!(["!", ["has", "point_count"]])),
        }
    }
}

/// Value of a paint or layout property.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintValue<T> {
    /// Same value for every feature.
    Constant(T),
    /// Value stepped by the `point_count` of a cluster. `base` applies below the first stop, each
    /// stop applies from its threshold upward.
    StepByPointCount {
        /// Value below the first threshold.
        base: T,
        /// `(threshold, value)` pairs in ascending threshold order.
        stops: Vec<(u64, T)>,
    },
    /// Value selected by the string form of a feature property.
    MatchProperty {
        /// Property name.
        property: String,
        /// `(property value, value)` pairs.
        cases: Vec<(String, T)>,
        /// Value for features that match no case.
        fallback: T,
    },
}

impl<T: Clone> PaintValue<T> {
    /// Resolves the value for a feature.
    pub fn evaluate(&self, properties: &Map<String, Value>) -> T {
        match self {
            Self::Constant(v) => v.clone(),
            Self::StepByPointCount { base, stops } => {
                let count = properties
                    .get("point_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(0);
                stops
                    .iter()
                    .take_while(|(threshold, _)| count >= *threshold)
                    .last()
                    .map(|(_, v)| v)
                    .unwrap_or(base)
                    .clone()
            }
            Self::MatchProperty {
                property,
                cases,
                fallback,
            } => {
                let key = properties.get(property).map(property_to_string);
                key.and_then(|key| cases.iter().find(|(case, _)| *case == key))
                    .map(|(_, v)| v)
                    .unwrap_or(fallback)
                    .clone()
            }
        }
    }
}

impl<T: Clone + Into<Value>> PaintValue<T> {
    /// Style-spec expression of the value.
    pub fn to_expression(&self) -> Value {
        match self {
            Self::Constant(v) => v.clone().into(),
            Self::StepByPointCount { base, stops } => {
                let mut expr = vec![
                    json!("step"),
                    json!(["get", "point_count"]),
                    base.clone().into(),
                ];
                for (threshold, v) in stops {
                    expr.push(json!(threshold));
                    expr.push(v.clone().into());
                }
                Value::Array(expr)
            }
            Self::MatchProperty {
                property,
                cases,
                fallback,
            } => {
                let mut expr = vec![json!("match"), json!(["to-string", ["get", property]])];
                for (case, v) in cases {
                    expr.push(json!(case));
                    expr.push(v.clone().into());
                }
                expr.push(fallback.clone().into());
                Value::Array(expr)
            }
        }
    }
}

/// String form of a property value, the way the `to-string` expression produces it.
///
/// Integral numbers have no fractional part, so `1012` and `1012.0` both give `"1012"`.
pub fn property_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Paint of a circle layer.
#[derive(Debug, Clone, PartialEq)]
pub struct CirclePaint {
    /// Fill color.
    pub color: PaintValue<Color>,
    /// Radius in pixels.
    pub radius: PaintValue<f64>,
    /// Fill opacity.
    pub opacity: Option<f64>,
    /// Stroke color.
    pub stroke_color: Option<Color>,
    /// Stroke width in pixels.
    pub stroke_width: Option<f64>,
    /// Stroke opacity.
    pub stroke_opacity: Option<f64>,
}

impl CirclePaint {
    /// Circle with the given fill and radius and no stroke.
    pub fn new(color: PaintValue<Color>, radius: PaintValue<f64>) -> Self {
        Self {
            color,
            radius,
            opacity: None,
            stroke_color: None,
            stroke_width: None,
            stroke_opacity: None,
        }
    }

    /// Sets fill opacity.
    pub fn with_opacity(mut self, opacity: f64) -> Self {
        self.opacity = Some(opacity);
        self
    }

    /// Sets the stroke.
    pub fn with_stroke(mut self, color: Color, width: f64, opacity: f64) -> Self {
        self.stroke_color = Some(color);
        self.stroke_width = Some(width);
        self.stroke_opacity = Some(opacity);
        self
    }

    fn to_json(&self) -> Value {
        let mut paint = Map::new();
        paint.insert("circle-color".into(), self.color.to_expression());
        paint.insert("circle-radius".into(), self.radius.to_expression());
        if let Some(opacity) = self.opacity {
            paint.insert("circle-opacity".into(), opacity.into());
        }
        if let Some(color) = self.stroke_color {
            paint.insert("circle-stroke-color".into(), color.into());
        }
        if let Some(width) = self.stroke_width {
            paint.insert("circle-stroke-width".into(), width.into());
        }
        if let Some(opacity) = self.stroke_opacity {
            paint.insert("circle-stroke-opacity".into(), opacity.into());
        }
        Value::Object(paint)
    }
}

/// Layout of a symbol layer. A symbol renders a text label, an icon, or both.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SymbolLayout {
    /// Label template. `{name}` placeholders are replaced with feature properties.
    pub text_field: Option<String>,
    /// Font stack of the label.
    pub text_font: Vec<String>,
    /// Label size in pixels.
    pub text_size: Option<f64>,
    /// Name of a registered image.
    pub icon_image: Option<String>,
    /// Icon scale.
    pub icon_size: Option<f64>,
}

impl SymbolLayout {
    /// Text label layout.
    pub fn text(field: impl Into<String>, font: &[&str], size: f64) -> Self {
        Self {
            text_field: Some(field.into()),
            text_font: font.iter().map(|f| f.to_string()).collect(),
            text_size: Some(size),
            ..Default::default()
        }
    }

    /// Icon layout.
    pub fn icon(image: impl Into<String>, size: f64) -> Self {
        Self {
            icon_image: Some(image.into()),
            icon_size: Some(size),
            ..Default::default()
        }
    }

    fn to_json(&self) -> Value {
        let mut layout = Map::new();
        if let Some(field) = &self.text_field {
            layout.insert("text-field".into(), field.clone().into());
        }
        if !self.text_font.is_empty() {
            layout.insert("text-font".into(), json!(self.text_font));
        }
        if let Some(size) = self.text_size {
            layout.insert("text-size".into(), size.into());
        }
        if let Some(image) = &self.icon_image {
            layout.insert("icon-image".into(), image.clone().into());
        }
        if let Some(size) = self.icon_size {
            layout.insert("icon-size".into(), size.into());
        }
        Value::Object(layout)
    }
}

/// How a layer draws its features.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerKind {
    /// Filled circles.
    Circle(CirclePaint),
    /// Labels and icons.
    Symbol(SymbolLayout),
}

/// Rendering layer over a source.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Layer id, unique per map.
    pub id: String,
    /// Id of the source the layer renders.
    pub source: String,
    /// Features of the source the layer renders.
    pub filter: LayerFilter,
    /// Paint or layout.
    pub kind: LayerKind,
}

impl LayerSpec {
    /// Circle layer.
    pub fn circle(id: impl Into<String>, source: impl Into<String>, paint: CirclePaint) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            filter: LayerFilter::All,
            kind: LayerKind::Circle(paint),
        }
    }

    /// Symbol layer.
    pub fn symbol(id: impl Into<String>, source: impl Into<String>, layout: SymbolLayout) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            filter: LayerFilter::All,
            kind: LayerKind::Symbol(layout),
        }
    }

    /// Sets the feature filter.
    pub fn with_filter(mut self, filter: LayerFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Mapbox style-spec representation of the layer, as accepted by `map.addLayer()`.
    pub fn to_mapbox_json(&self) -> Value {
        let mut layer = Map::new();
        layer.insert("id".into(), self.id.clone().into());
        layer.insert("source".into(), self.source.clone().into());
        if let Some(filter) = self.filter.to_expression() {
            layer.insert("filter".into(), filter);
        }
        match &self.kind {
            LayerKind::Circle(paint) => {
                layer.insert("type".into(), "circle".into());
                layer.insert("paint".into(), paint.to_json());
            }
            LayerKind::Symbol(layout) => {
                layer.insert("type".into(), "symbol".into());
                layer.insert("layout".into(), layout.to_json());
            }
        }
        Value::Object(layer)
    }
}

/// Data of a GeoJSON source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeoJsonData {
    /// URL the engine fetches the data from.
    Url(String),
    /// Data held in memory.
    Inline(FeatureCollection),
}

/// GeoJSON data source, optionally clustered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// Source data.
    pub data: GeoJsonData,
    /// Aggregate nearby points into clusters.
    #[serde(default)]
    pub cluster: bool,
    /// Maximum zoom level at which points are clustered.
    #[serde(default = "default_cluster_max_zoom")]
    pub cluster_max_zoom: u8,
    /// Cluster radius in pixels.
    #[serde(default = "default_cluster_radius")]
    pub cluster_radius: f64,
}

fn default_cluster_max_zoom() -> u8 {
    14
}

fn default_cluster_radius() -> f64 {
    50.0
}

impl SourceSpec {
    /// Non-clustered source.
    pub fn geojson(data: GeoJsonData) -> Self {
        Self {
            data,
            cluster: false,
            cluster_max_zoom: default_cluster_max_zoom(),
            cluster_radius: default_cluster_radius(),
        }
    }

    /// Enables clustering with the given parameters.
    pub fn clustered(mut self, max_zoom: u8, radius: f64) -> Self {
        self.cluster = true;
        self.cluster_max_zoom = max_zoom;
        self.cluster_radius = radius;
        self
    }

    /// Mapbox style-spec representation of the source, as accepted by `map.addSource()`.
    pub fn to_mapbox_json(&self) -> Value {
        let mut source = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        source.insert("type".into(), "geojson".into());
        Value::Object(source)
    }
}

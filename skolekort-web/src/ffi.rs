//! Bindings to the parts of Mapbox GL JS the engine uses. The library is expected as the
//! global `mapboxgl`.

use js_sys::{Array, Function, Reflect};
use wasm_bindgen::prelude::*;
use web_sys::HtmlCanvasElement;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = mapboxgl)]
    pub type Map;

    #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
    pub fn new(options: &JsValue) -> Map;

    #[wasm_bindgen(method, js_name = getCenter)]
    pub fn get_center(this: &Map) -> JsLngLat;
    #[wasm_bindgen(method, js_name = getZoom)]
    pub fn get_zoom(this: &Map) -> f64;
    #[wasm_bindgen(method, js_name = getCanvas)]
    pub fn get_canvas(this: &Map) -> HtmlCanvasElement;

    #[wasm_bindgen(method, js_name = jumpTo)]
    pub fn jump_to(this: &Map, options: &JsValue);
    #[wasm_bindgen(method, js_name = easeTo)]
    pub fn ease_to(this: &Map, options: &JsValue);
    #[wasm_bindgen(method, js_name = flyTo)]
    pub fn fly_to(this: &Map, options: &JsValue);

    #[wasm_bindgen(method, js_name = setStyle)]
    pub fn set_style(this: &Map, style: &str);

    #[wasm_bindgen(method, js_name = hasImage)]
    pub fn has_image(this: &Map, name: &str) -> bool;
    #[wasm_bindgen(method, catch, js_name = addImage)]
    pub fn add_image(this: &Map, name: &str, image: &JsValue) -> Result<(), JsValue>;
    #[wasm_bindgen(method, js_name = removeImage)]
    pub fn remove_image(this: &Map, name: &str);

    #[wasm_bindgen(method, js_name = getSource)]
    pub fn get_source(this: &Map, id: &str) -> JsValue;
    #[wasm_bindgen(method, catch, js_name = addSource)]
    pub fn add_source(this: &Map, id: &str, source: &JsValue) -> Result<(), JsValue>;
    #[wasm_bindgen(method, catch, js_name = removeSource)]
    pub fn remove_source(this: &Map, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = getLayer)]
    pub fn get_layer(this: &Map, id: &str) -> JsValue;
    #[wasm_bindgen(method, catch, js_name = addLayer)]
    pub fn add_layer(this: &Map, layer: &JsValue) -> Result<(), JsValue>;
    #[wasm_bindgen(method, catch, js_name = removeLayer)]
    pub fn remove_layer(this: &Map, id: &str) -> Result<(), JsValue>;

    #[wasm_bindgen(method, js_name = queryRenderedFeatures)]
    pub fn query_rendered_features(this: &Map, point: &JsValue, options: &JsValue) -> Array;

    #[wasm_bindgen(method, js_name = on)]
    pub fn on(this: &Map, event: &str, listener: &Function);
    #[wasm_bindgen(method, js_name = off)]
    pub fn off(this: &Map, event: &str, listener: &Function);
    #[wasm_bindgen(method, js_name = on)]
    pub fn on_layer(this: &Map, event: &str, layer: &str, listener: &Function);
    #[wasm_bindgen(method, js_name = off)]
    pub fn off_layer(this: &Map, event: &str, layer: &str, listener: &Function);

    #[wasm_bindgen(method)]
    pub fn remove(this: &Map);

    pub type JsLngLat;

    #[wasm_bindgen(method, getter)]
    pub fn lng(this: &JsLngLat) -> f64;
    #[wasm_bindgen(method, getter)]
    pub fn lat(this: &JsLngLat) -> f64;

    pub type GeoJsonSource;

    #[wasm_bindgen(method, js_name = getClusterExpansionZoom)]
    pub fn get_cluster_expansion_zoom(this: &GeoJsonSource, cluster_id: f64, callback: &JsValue);

    #[wasm_bindgen(js_namespace = mapboxgl)]
    pub type Marker;

    #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
    pub fn new(options: &JsValue) -> Marker;

    #[wasm_bindgen(method, js_name = setLngLat)]
    pub fn set_lng_lat(this: &Marker, position: &JsValue) -> Marker;
    #[wasm_bindgen(method, js_name = addTo)]
    pub fn add_to(this: &Marker, map: &Map) -> Marker;
    #[wasm_bindgen(method)]
    pub fn remove(this: &Marker);

    #[wasm_bindgen(js_namespace = mapboxgl)]
    pub type Popup;

    #[wasm_bindgen(constructor, js_namespace = mapboxgl)]
    pub fn new(options: &JsValue) -> Popup;

    #[wasm_bindgen(method, js_name = setLngLat)]
    pub fn set_lng_lat(this: &Popup, position: &JsValue) -> Popup;
    #[wasm_bindgen(method, js_name = setHTML)]
    pub fn set_html(this: &Popup, html: &str) -> Popup;
    #[wasm_bindgen(method, js_name = addTo)]
    pub fn add_to(this: &Popup, map: &Map) -> Popup;
    #[wasm_bindgen(method, js_name = isOpen)]
    pub fn is_open(this: &Popup) -> bool;
    #[wasm_bindgen(method, js_name = on)]
    pub fn on(this: &Popup, event: &str, listener: &Function);
    #[wasm_bindgen(method, js_name = off)]
    pub fn off(this: &Popup, event: &str, listener: &Function);
    #[wasm_bindgen(method)]
    pub fn remove(this: &Popup);
}

/// Sets `mapboxgl.accessToken`.
pub fn set_access_token(token: &str) -> Result<(), JsValue> {
    let namespace = Reflect::get(&js_sys::global(), &JsValue::from_str("mapboxgl"))?;
    if namespace.is_undefined() {
        return Err(JsValue::from_str("mapboxgl is not loaded"));
    }
    Reflect::set(&namespace, &JsValue::from_str("accessToken"), &JsValue::from_str(token))?;
    Ok(())
}

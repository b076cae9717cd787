use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use skolekort_types::LngLat;

use super::SearchError;
use crate::overlay::{escape_html, OverlayContent};

/// Properties of a geocoded location.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationProperties {
    /// Short name, e.g. the street address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Id of the location in the geocoder.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapbox_id: Option<String>,
    /// Kind of the location (`address`, `poi`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    /// Complete address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
    /// Address without the name part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_formatted: Option<String>,
    /// Everything else the geocoder returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LocationProperties {
    /// Postal code from the geocoder context.
    pub fn postcode(&self) -> Option<&str> {
        self.extra
            .get("context")?
            .get("postcode")?
            .get("name")?
            .as_str()
    }
}

/// Location selected in the search box.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationFeature {
    /// Point of the location.
    pub coordinates: LngLat,
    /// Location properties.
    pub properties: LocationProperties,
}

impl LocationFeature {
    /// Validates a retrieve response and extracts its first feature.
    ///
    /// The response must be a non-empty object whose `features[0].geometry.coordinates` is an
    /// array of exactly two finite numbers in the coordinate range.
    pub fn from_retrieve(result: &Value) -> Result<Self, SearchError> {
        let object = result
            .as_object()
            .filter(|o| !o.is_empty())
            .ok_or(SearchError::InvalidResult)?;

        let feature = object
            .get("features")
            .and_then(Value::as_array)
            .and_then(|features| features.first())
            .ok_or(SearchError::MissingGeometry)?;
        let coordinates = feature
            .get("geometry")
            .and_then(|geometry| geometry.get("coordinates"))
            .filter(|c| !c.is_null())
            .ok_or(SearchError::MissingGeometry)?;

        let coordinates = parse_coordinates(coordinates)?;
        let properties = match feature.get("properties") {
            Some(props @ Value::Object(_)) => serde_json::from_value(props.clone())
                .map_err(|err| SearchError::InvalidResponse(err.to_string()))?,
            _ => LocationProperties::default(),
        };

        Ok(Self {
            coordinates,
            properties,
        })
    }

    /// Title for the location.
    pub fn title(&self) -> &str {
        self.properties
            .name
            .as_deref()
            .or(self.properties.full_address.as_deref())
            .unwrap_or("Unknown Location")
    }

    /// Content of the popup showing the location.
    pub fn popup_content(&self) -> OverlayContent {
        let mut html = format!(
            "<div class=\"location-popup\"><h3>{}</h3>",
            escape_html(self.title())
        );
        let address = self
            .properties
            .full_address
            .as_deref()
            .or(self.properties.place_formatted.as_deref());
        if let Some(address) = address {
            html.push_str(&format!("<p>{}</p>", escape_html(address)));
        }
        html.push_str(&format!(
            "<p class=\"location-popup__coordinates\">{:.4}, {:.4}</p></div>",
            self.coordinates.lat(),
            self.coordinates.lng()
        ));
        OverlayContent::html(html)
    }
}

fn parse_coordinates(value: &Value) -> Result<LngLat, SearchError> {
    let invalid = || SearchError::InvalidCoordinates(value.to_string());
    let values = value.as_array().filter(|a| a.len() == 2).ok_or_else(invalid)?;
    let numbers: Vec<f64> = values
        .iter()
        .map(|v| v.as_f64().filter(|n| n.is_finite()))
        .collect::<Option<_>>()
        .ok_or_else(invalid)?;
    LngLat::try_from_slice(&numbers).map_err(|_| invalid())
}

/// Suggestion returned by the geocoder for a partial query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Id used to retrieve the full location.
    pub mapbox_id: String,
    /// Short name.
    #[serde(default)]
    pub name: String,
    /// Kind of the suggested location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_type: Option<String>,
    /// Complete address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_address: Option<String>,
    /// Address without the name part.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub place_formatted: Option<String>,
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    #[test]
    fn extracts_first_feature() {
        let result = json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [10.21, 56.15]},
                "properties": {
                    "name": "Hovedgade 1",
                    "full_address": "Hovedgade 1, 8000 Aarhus",
                    "mapbox_id": "abc",
                    "context": {"postcode": {"name": "8000"}}
                }
            }]
        });
        let feature = LocationFeature::from_retrieve(&result).expect("valid");
        assert_abs_diff_eq!(feature.coordinates.lng(), 10.21);
        assert_abs_diff_eq!(feature.coordinates.lat(), 56.15);
        assert_eq!(feature.properties.mapbox_id.as_deref(), Some("abc"));
        assert_eq!(feature.properties.postcode(), Some("8000"));
        assert_eq!(feature.title(), "Hovedgade 1");
    }

    #[test]
    fn rejects_empty_results() {
        assert_matches!(
            LocationFeature::from_retrieve(&json!(null)),
            Err(SearchError::InvalidResult)
        );
        assert_matches!(
            LocationFeature::from_retrieve(&json!({})),
            Err(SearchError::InvalidResult)
        );
        assert_matches!(
            LocationFeature::from_retrieve(&json!([1])),
            Err(SearchError::InvalidResult)
        );
    }

    #[test]
    fn rejects_missing_geometry() {
        for result in [
            json!({"features": []}),
            json!({"features": "x"}),
            json!({"features": [{"properties": {}}]}),
            json!({"features": [{"geometry": {}}]}),
            json!({"features": [{"geometry": {"coordinates": null}}]}),
            json!({"type": "FeatureCollection"}),
        ] {
            assert_matches!(
                LocationFeature::from_retrieve(&result),
                Err(SearchError::MissingGeometry),
                "{result}"
            );
        }
    }

    #[test]
    fn rejects_bad_coordinates() {
        for coordinates in [
            json!([10.21]),
            json!([10.21, 56.15, 3.0]),
            json!(["10.21", 56.15]),
            json!({"lng": 10.21}),
            json!([10.21, 95.0]),
        ] {
            let result = json!({"features": [{"geometry": {"coordinates": coordinates}}]});
            assert_matches!(
                LocationFeature::from_retrieve(&result),
                Err(SearchError::InvalidCoordinates(_))
            );
        }
    }
}

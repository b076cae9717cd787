use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::category::{category_color, SchoolCategory};
use crate::engine::property_to_string;
use crate::overlay::{escape_html, OverlayContent};

const UNKNOWN_NAME: &str = "Unknown Location";

/// Typed view of the property bag of a school feature.
///
/// Every field accepts strings and numbers. Empty values are treated as missing.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SchoolProperties {
    /// Institution name.
    #[serde(rename = "INST_NAVN", default, deserialize_with = "lenient")]
    pub name: Option<String>,
    /// Street address.
    #[serde(rename = "INST_ADR", default, deserialize_with = "lenient")]
    pub address: Option<String>,
    /// Postal code.
    #[serde(rename = "POSTNR", default, deserialize_with = "lenient")]
    pub postal_code: Option<String>,
    /// Postal district.
    #[serde(rename = "POSTDISTRIKT", default, deserialize_with = "lenient")]
    pub district: Option<String>,
    /// Website as written in the dataset, possibly without a scheme.
    #[serde(rename = "WEB_ADR", default, deserialize_with = "lenient")]
    pub website: Option<String>,
    /// Institution category code.
    #[serde(rename = "INST_TYPE_NR", default, deserialize_with = "lenient")]
    pub category_code: Option<String>,
}

fn lenient<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| v.is_string() || v.is_number() || v.is_boolean())
        .map(|v| property_to_string(&v).trim().to_string())
        .filter(|s| !s.is_empty()))
}

impl SchoolProperties {
    /// Reads the properties of a rendered feature.
    pub fn from_properties(properties: &Map<String, Value>) -> Self {
        match serde_json::from_value(Value::Object(properties.clone())) {
            Ok(props) => props,
            Err(err) => {
                log::warn!("Malformed school properties: {err}");
                Self::default()
            }
        }
    }

    /// Name to show, with a placeholder for unnamed institutions.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(UNKNOWN_NAME)
    }

    /// `address, postal code district` line.
    pub fn address_line(&self) -> String {
        format!(
            "{}, {} {}",
            self.address.as_deref().unwrap_or_default(),
            self.postal_code.as_deref().unwrap_or_default(),
            self.district.as_deref().unwrap_or_default(),
        )
    }

    /// Website URL with a scheme. Addresses without `http://` or `https://` get `http://`.
    pub fn website_url(&self) -> Option<String> {
        let website = self.website.as_deref()?;
        if website.starts_with("http://") || website.starts_with("https://") {
            Some(website.to_string())
        } else {
            Some(format!("http://{website}"))
        }
    }

    /// Category of the institution.
    pub fn category(&self) -> Option<SchoolCategory> {
        SchoolCategory::from_code(self.category_code.as_deref()?)
    }

    /// HTML card shown in the detail popup.
    pub fn popup_content(&self) -> OverlayContent {
        let color = category_color(self.category_code.as_deref());
        let mut html = String::from("<div class=\"school-popup\">");
        html.push_str(&format!(
            "<span class=\"school-popup__icon\" style=\"background-color: {color}\"></span>"
        ));
        html.push_str(&format!("<h3>{}</h3>", escape_html(self.display_name())));
        html.push_str(&format!("<p>{}</p>", escape_html(&self.address_line())));
        if let Some(category) = self.category() {
            html.push_str(&format!(
                "<p class=\"school-popup__category\">{}</p>",
                escape_html(category.label())
            ));
        }
        if let Some(url) = self.website_url() {
            html.push_str(&format!(
                "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">Hjemmeside</a>",
                escape_html(&url)
            ));
        }
        html.push_str("</div>");
        OverlayContent::html(html)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn props(value: Value) -> SchoolProperties {
        match value {
            Value::Object(map) => SchoolProperties::from_properties(&map),
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn reads_numbers_as_strings() {
        let school = props(json!({
            "INST_NAVN": "Aarhus Skole",
            "INST_ADR": "Hovedgade 1",
            "POSTNR": 8000,
            "POSTDISTRIKT": "Aarhus C",
            "INST_TYPE_NR": 1012,
        }));
        assert_eq!(school.postal_code.as_deref(), Some("8000"));
        assert_eq!(school.category(), Some(SchoolCategory::Folkeskole));
        assert_eq!(school.address_line(), "Hovedgade 1, 8000 Aarhus C");
    }

    #[test]
    fn missing_values() {
        let school = props(json!({"INST_NAVN": "", "WEB_ADR": null, "POSTNR": [1]}));
        assert_eq!(school.display_name(), "Unknown Location");
        assert_eq!(school.website_url(), None);
        assert_eq!(school.postal_code, None);
        assert_eq!(school.address_line(), ",  ");
    }

    #[test]
    fn website_gets_scheme() {
        let school = props(json!({"WEB_ADR": "www.skole.dk"}));
        assert_eq!(school.website_url().as_deref(), Some("http://www.skole.dk"));
        let school = props(json!({"WEB_ADR": "https://skole.dk"}));
        assert_eq!(school.website_url().as_deref(), Some("https://skole.dk"));
    }

    #[test]
    fn content_is_escaped() {
        let school = props(json!({
            "INST_NAVN": "<script>",
            "WEB_ADR": "skole.dk",
            "INST_TYPE_NR": "1011",
        }));
        let html = school.popup_content();
        assert!(html.as_html().contains("&lt;script&gt;"));
        assert!(html.as_html().contains("href=\"http://skole.dk\""));
        assert!(html.as_html().contains(">Hjemmeside</a>"));
        assert!(html.as_html().contains("background-color: #BB6BD9"));
    }
}

//! Institution categories of the school dataset and their colors.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::color::Color;
use crate::engine::PaintValue;

/// Color of institutions without a known category.
pub const FALLBACK_COLOR: &str = "#ffffff";

/// Institution category, identified by its `INST_TYPE_NR` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchoolCategory {
    /// `1011`
    Efterskole,
    /// `1012`
    Folkeskole,
    /// `1013`
    FriOgPrivatskole,
    /// `1014`
    KommunalUngdomsskole,
    /// `1015`
    Specialskole,
    /// `1019`
    SaerligtTilbud,
    /// `3001`
    Behandlingsskole,
    /// `3002`
    Specialundervisning,
}

impl SchoolCategory {
    /// Every known category.
    pub const ALL: [SchoolCategory; 8] = [
        Self::Folkeskole,
        Self::Specialskole,
        Self::KommunalUngdomsskole,
        Self::FriOgPrivatskole,
        Self::Behandlingsskole,
        Self::Efterskole,
        Self::SaerligtTilbud,
        Self::Specialundervisning,
    ];

    /// Category with the given `INST_TYPE_NR` code.
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.code() == code.trim())
    }

    /// `INST_TYPE_NR` code of the category.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Efterskole => "1011",
            Self::Folkeskole => "1012",
            Self::FriOgPrivatskole => "1013",
            Self::KommunalUngdomsskole => "1014",
            Self::Specialskole => "1015",
            Self::SaerligtTilbud => "1019",
            Self::Behandlingsskole => "3001",
            Self::Specialundervisning => "3002",
        }
    }

    /// Danish name of the category.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Efterskole => "Efterskoler",
            Self::Folkeskole => "Folkeskoler",
            Self::FriOgPrivatskole => "Friskoler og private skoler",
            Self::KommunalUngdomsskole => "Kommunale ungdomsskoler",
            Self::Specialskole => "Specialskoler",
            Self::SaerligtTilbud => "Særlige tilbud",
            Self::Behandlingsskole => "Behandlingsskoler",
            Self::Specialundervisning => "Specialundervisning",
        }
    }

    /// CSS color of the category.
    pub fn color_hex(&self) -> &'static str {
        match self {
            Self::Folkeskole => "#537A5A",
            Self::Specialskole => "#9AE19D",
            Self::KommunalUngdomsskole => "#ED6B86",
            Self::FriOgPrivatskole | Self::SaerligtTilbud => "#F2C94C",
            Self::Behandlingsskole | Self::Specialundervisning => "#F2994A",
            Self::Efterskole => "#BB6BD9",
        }
    }

    /// Color of the category.
    pub fn color(&self) -> Color {
        Color::try_from_hex(self.color_hex()).unwrap_or(Color::WHITE)
    }
}

impl Display for SchoolCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SchoolCategory {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s).ok_or(())
    }
}

/// CSS color for an `INST_TYPE_NR` code. Unknown and missing codes are white.
pub fn category_color(code: Option<&str>) -> &'static str {
    code.and_then(SchoolCategory::from_code)
        .map(|c| c.color_hex())
        .unwrap_or(FALLBACK_COLOR)
}

/// Paint value coloring features by the category code in the given property.
pub fn category_paint(property: &str) -> PaintValue<Color> {
    PaintValue::MatchProperty {
        property: property.to_string(),
        cases: SchoolCategory::ALL
            .iter()
            .map(|c| (c.code().to_string(), c.color()))
            .collect(),
        fallback: Color::WHITE,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};

    use super::*;

    #[test]
    fn exact_palette() {
        let expected = [
            ("1012", "#537A5A"),
            ("1015", "#9AE19D"),
            ("1014", "#ED6B86"),
            ("1013", "#F2C94C"),
            ("3001", "#F2994A"),
            ("1011", "#BB6BD9"),
            ("1019", "#F2C94C"),
            ("3002", "#F2994A"),
        ];
        for (code, color) in expected {
            assert_eq!(category_color(Some(code)), color, "code {code}");
        }
    }

    #[test]
    fn unknown_codes_are_white() {
        assert_eq!(category_color(Some("9999")), "#ffffff");
        assert_eq!(category_color(Some("")), "#ffffff");
        assert_eq!(category_color(None), "#ffffff");
    }

    #[test]
    fn paint_matches_numeric_codes() {
        let paint = category_paint("INST_TYPE_NR");
        let props = |value: Value| -> Map<String, Value> {
            let mut map = Map::new();
            map.insert("INST_TYPE_NR".into(), value);
            map
        };
        assert_eq!(
            paint.evaluate(&props(json!(1011))),
            Color::try_from_hex("#BB6BD9").expect("valid")
        );
        assert_eq!(paint.evaluate(&props(json!("7"))), Color::WHITE);
    }

    #[test]
    fn labels() {
        assert_eq!("1012".parse::<SchoolCategory>(), Ok(SchoolCategory::Folkeskole));
        assert_eq!(SchoolCategory::Efterskole.to_string(), "Efterskoler");
    }
}

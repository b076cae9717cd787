//! Visual styles of the map and the switcher applying them to a session.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use log::{debug, info};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionHandle;

/// Style name not in [`MapStyle::ALL`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown map style: {0}")]
pub struct UnknownStyle(pub String);

/// Styles offered by the style switcher.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapStyle {
    /// General purpose street map.
    #[default]
    Streets,
    /// Terrain and trails.
    Outdoors,
    /// Light background map.
    Light,
    /// Dark background map.
    Dark,
    /// Satellite imagery.
    Satellite,
    /// Satellite imagery with streets and labels.
    SatelliteStreets,
}

impl MapStyle {
    /// Every style in the order they are presented.
    pub const ALL: [MapStyle; 6] = [
        Self::Streets,
        Self::Outdoors,
        Self::Light,
        Self::Dark,
        Self::Satellite,
        Self::SatelliteStreets,
    ];

    /// Short name used in configuration.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Streets => "streets",
            Self::Outdoors => "outdoors",
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Satellite => "satellite",
            Self::SatelliteStreets => "satellite-streets",
        }
    }

    /// Style url understood by the engine.
    pub fn url(&self) -> &'static str {
        match self {
            Self::Streets => "mapbox://styles/mapbox/streets-v12",
            Self::Outdoors => "mapbox://styles/mapbox/outdoors-v12",
            Self::Light => "mapbox://styles/mapbox/light-v11",
            Self::Dark => "mapbox://styles/mapbox/dark-v11",
            Self::Satellite => "mapbox://styles/mapbox/satellite-v9",
            Self::SatelliteStreets => "mapbox://styles/mapbox/satellite-streets-v12",
        }
    }

    /// Label shown in the switcher.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Streets => "Streets",
            Self::Outdoors => "Outdoors",
            Self::Light => "Light",
            Self::Dark => "Dark",
            Self::Satellite => "Satellite",
            Self::SatelliteStreets => "Satellite Streets",
        }
    }
}

impl Display for MapStyle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for MapStyle {
    type Err = UnknownStyle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|style| style.name().eq_ignore_ascii_case(s) || style.url() == s)
            .ok_or_else(|| UnknownStyle(s.to_string()))
    }
}

/// Applies one of the [`MapStyle`]s to a session.
///
/// Changing the style keeps the viewport and DOM overlays. The engine drops custom layers, which
/// the dataset overlay registers again once the new style is loaded.
pub struct StyleSwitcher {
    session: SessionHandle,
    current: Mutex<MapStyle>,
}

impl StyleSwitcher {
    /// Creates a switcher for a session that was built with `initial` style.
    pub fn new(session: SessionHandle, initial: MapStyle) -> Self {
        Self {
            session,
            current: Mutex::new(initial),
        }
    }

    /// Styles to choose from.
    pub fn styles(&self) -> &'static [MapStyle] {
        &MapStyle::ALL
    }

    /// Currently applied style.
    pub fn current(&self) -> MapStyle {
        *self.current.lock()
    }

    /// Applies the style. Returns `false` if it was already active or the session is gone.
    pub fn select(&self, style: MapStyle) -> bool {
        if !self.session.is_alive() {
            debug!("Map session is destroyed, style {} not applied", style.name());
            return false;
        }

        {
            let mut current = self.current.lock();
            if *current == style {
                return false;
            }
            *current = style;
        }

        info!("Switching map style to {}", style.name());
        self.session.set_style(style.url());
        true
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use skolekort_types::{lnglat, Viewport};

    use super::*;
    use crate::engine::HeadlessEngine;
    use crate::session::MapProvider;

    #[test]
    fn parses_names_and_urls() {
        assert_eq!("streets".parse::<MapStyle>(), Ok(MapStyle::Streets));
        assert_eq!(
            " Satellite-Streets ".parse::<MapStyle>(),
            Ok(MapStyle::SatelliteStreets)
        );
        assert_eq!(
            "mapbox://styles/mapbox/dark-v11".parse::<MapStyle>(),
            Ok(MapStyle::Dark)
        );
        assert_matches!(
            "terrain".parse::<MapStyle>(),
            Err(UnknownStyle(name)) if name == "terrain"
        );
    }

    #[test]
    fn names_round_trip_through_serde() {
        for style in MapStyle::ALL {
            let json = serde_json::to_value(style).expect("serialize");
            assert_eq!(json, style.name());
        }
    }

    #[test]
    fn select_keeps_viewport() {
        let provider = MapProvider::mount(
            "style-switcher",
            Viewport::new(lnglat!(10.2, 56.15), 11.0),
            HeadlessEngine::new(),
        )
        .expect("mount");
        let session = provider.session().clone();
        session.pump();
        let before = session.viewport();

        let switcher = StyleSwitcher::new(session.clone(), MapStyle::Streets);
        assert!(!switcher.select(MapStyle::Streets));
        assert!(switcher.select(MapStyle::Dark));
        assert_eq!(switcher.current(), MapStyle::Dark);
        assert_eq!(session.viewport(), before);

        let style = session
            .with_engine(|engine: &mut HeadlessEngine| engine.style_url().map(str::to_string))
            .flatten();
        assert_eq!(style.as_deref(), Some(MapStyle::Dark.url()));
    }

    #[test]
    fn destroyed_session_is_skipped() {
        let provider = MapProvider::mount(
            "style-switcher-destroyed",
            Viewport::new(lnglat!(10.2, 56.15), 11.0),
            HeadlessEngine::new(),
        )
        .expect("mount");
        let session = provider.session().clone();
        provider.unmount();

        let switcher = StyleSwitcher::new(session, MapStyle::Streets);
        assert!(!switcher.select(MapStyle::Light));
        assert_eq!(switcher.current(), MapStyle::Streets);
    }
}

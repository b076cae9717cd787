//! Application configuration.

use log::debug;
use serde::{Deserialize, Serialize};
use skolekort_types::{lnglat, Viewport};
use thiserror::Error;

use crate::dataset::DatasetConfig;
use crate::search::SearchOptions;
use crate::style::MapStyle;

/// Environment variable holding the Mapbox access token.
pub const ACCESS_TOKEN_ENV: &str = "MAPBOX_TOKEN";

/// Token baked in at build time, used when the environment does not provide one.
const BUILD_ACCESS_TOKEN: Option<&str> = option_env!("MAPBOX_TOKEN");

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No access token in the configuration or the environment.
    #[error("Mapbox access token is not set, provide it in the {ACCESS_TOKEN_ENV} variable")]
    MissingAccessToken,
    /// The configuration cannot be parsed.
    #[error("invalid configuration: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Everything needed to compose the map page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    /// Mapbox access token used by the engine and the geocoder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Id of the element the map is mounted into.
    pub container: String,
    /// Viewport the map starts with.
    pub initial_view: Viewport,
    /// Style the map starts with.
    pub style: MapStyle,
    /// School dataset.
    pub dataset: DatasetConfig,
    /// Address search.
    pub search: SearchOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            access_token: None,
            container: "map-container".into(),
            initial_view: Viewport::new(lnglat!(78.9629, 20.5937), 3.5),
            style: MapStyle::default(),
            dataset: DatasetConfig::default(),
            search: SearchOptions::default(),
        }
    }
}

impl AppConfig {
    /// Parses a JSON configuration. Missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Default configuration with the access token taken from the environment.
    pub fn from_env() -> Self {
        Self::default().with_env_token()
    }

    /// Fills a missing access token from [`ACCESS_TOKEN_ENV`] at runtime, falling back to the
    /// value it had at build time.
    pub fn with_env_token(mut self) -> Self {
        if self.configured_token().is_none() {
            self.access_token = runtime_token().or_else(|| BUILD_ACCESS_TOKEN.map(str::to_string));
            if self.access_token.is_some() {
                debug!("Using access token from {ACCESS_TOKEN_ENV}");
            }
        }
        self
    }

    /// Sets the access token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// The access token. Blank tokens count as missing.
    pub fn access_token(&self) -> Result<&str, ConfigError> {
        self.configured_token().ok_or(ConfigError::MissingAccessToken)
    }

    fn configured_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn runtime_token() -> Option<String> {
    std::env::var(ACCESS_TOKEN_ENV).ok()
}

#[cfg(target_arch = "wasm32")]
fn runtime_token() -> Option<String> {
    None
}

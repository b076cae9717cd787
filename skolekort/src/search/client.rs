use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{Geocoder, SearchError, SearchOptions, Suggestion};
use crate::platform::PlatformService;

/// Base url of the Mapbox Search Box API.
pub const SEARCH_BOX_URL: &str = "https://api.mapbox.com/search/searchbox/v1/";

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    suggestions: Vec<Suggestion>,
}

/// [`Geocoder`] backed by the Mapbox Search Box REST API.
///
/// Requests go through a [`PlatformService`], so the same client works with `reqwest` on native
/// targets and `fetch` in the browser.
pub struct SearchBoxClient {
    platform: Arc<dyn PlatformService>,
    access_token: String,
    base_url: Url,
}

impl SearchBoxClient {
    /// Creates a client for the public Search Box endpoint.
    pub fn new(
        platform: Arc<dyn PlatformService>,
        access_token: impl Into<String>,
    ) -> Result<Self, SearchError> {
        Self::with_base_url(platform, access_token, SEARCH_BOX_URL)
    }

    /// Creates a client for a custom endpoint, e.g. a proxy.
    pub fn with_base_url(
        platform: Arc<dyn PlatformService>,
        access_token: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, SearchError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            platform,
            access_token: access_token.into(),
            base_url,
        })
    }

    /// Url of a suggest request.
    pub fn suggest_url(
        &self,
        query: &str,
        options: &SearchOptions,
        session_token: &str,
    ) -> Result<Url, SearchError> {
        let mut url = self.base_url.join("suggest")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("q", query)
                .append_pair("access_token", &self.access_token)
                .append_pair("session_token", session_token);
            if !options.country.is_empty() {
                pairs.append_pair("country", &options.country);
            }
            if !options.types.is_empty() {
                let types: Vec<&str> = options.types.iter().map(String::as_str).collect();
                pairs.append_pair("types", &types.join(","));
            }
            if let Some(language) = &options.language {
                pairs.append_pair("language", language);
            }
            if let Some(limit) = options.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }

        Ok(url)
    }

    /// Url of a retrieve request.
    pub fn retrieve_url(
        &self,
        suggestion: &Suggestion,
        session_token: &str,
    ) -> Result<Url, SearchError> {
        let mut url = self.base_url.join("retrieve/")?;
        url.path_segments_mut()
            .map_err(|_| SearchError::InvalidResponse("base url cannot have a path".into()))?
            .pop_if_empty()
            .push(&suggestion.mapbox_id);
        url.query_pairs_mut()
            .append_pair("access_token", &self.access_token)
            .append_pair("session_token", session_token);

        Ok(url)
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, url: &Url) -> Result<T, SearchError> {
        debug!("Geocoder request to {}{}", url.origin().ascii_serialization(), url.path());
        let bytes = self.platform.load_bytes_from_url(url.as_str()).await?;
        serde_json::from_slice(&bytes).map_err(|err| SearchError::InvalidResponse(err.to_string()))
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl Geocoder for SearchBoxClient {
    async fn suggest(
        &self,
        query: &str,
        options: &SearchOptions,
        session_token: &str,
    ) -> Result<Vec<Suggestion>, SearchError> {
        let url = self.suggest_url(query, options, session_token)?;
        let response: SuggestResponse = self.get_json(&url).await?;
        Ok(response.suggestions)
    }

    async fn retrieve(
        &self,
        suggestion: &Suggestion,
        _options: &SearchOptions,
        session_token: &str,
    ) -> Result<Value, SearchError> {
        let url = self.retrieve_url(suggestion, session_token)?;
        self.get_json(&url).await
    }
}

use std::rc::Rc;
use std::str::FromStr;
use std::sync::Arc;

use js_sys::Promise;
use log::info;
use serde::Serialize;
use skolekort::control::ZoomControls;
use skolekort::dataset::DatasetOverlay;
use skolekort::platform::default_service;
use skolekort::search::{SearchBoxAdapter, SearchBoxClient, Suggestion};
use skolekort::session::is_container_claimed;
use skolekort::style::{MapStyle, StyleSwitcher};
use skolekort::{AppConfig, MapError, MapProvider, SessionBuilder};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::engine::MapboxEngine;
use crate::ffi;
use crate::messenger::WebMessenger;

#[derive(Serialize)]
struct StyleEntry {
    name: &'static str,
    label: &'static str,
}

// Dropped in declaration order, the provider goes last.
struct AppParts {
    search: Rc<SearchBoxAdapter>,
    styles: StyleSwitcher,
    zoom: ZoomControls,
    dataset: DatasetOverlay,
    provider: MapProvider,
}

/// The school map page: a Mapbox map with the school dataset, address search, style switcher
/// and zoom controls.
#[wasm_bindgen]
pub struct SchoolMapApp {
    parts: Option<AppParts>,
}

#[wasm_bindgen]
impl SchoolMapApp {
    /// Mounts the map into the configured container.
    ///
    /// `config` is an `AppConfig` object in camelCase. Missing fields take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<SchoolMapApp, JsError> {
        let config: AppConfig = if config.is_undefined() || config.is_null() {
            AppConfig::default()
        } else {
            serde_wasm_bindgen::from_value(config)?
        };
        let config = config.with_env_token();
        let token = config.access_token()?.to_string();

        if is_container_claimed(&config.container) {
            return Err(MapError::ContainerBusy(config.container).into());
        }
        ffi::set_access_token(&token).map_err(MapError::from)?;

        let engine = MapboxEngine::new(&config.container, &config.initial_view, config.style.url())?;
        let provider = SessionBuilder::new(config.container.clone())
            .with_viewport(config.initial_view)
            .with_messenger(WebMessenger)
            .build(engine)?;
        let session = provider.session().clone();

        let platform = default_service()?;
        let dataset = DatasetOverlay::mount(&session, config.dataset.clone(), platform.clone());
        let geocoder = SearchBoxClient::new(platform, token)?;
        let search = SearchBoxAdapter::new(session.clone(), Arc::new(geocoder), config.search);
        let styles = StyleSwitcher::new(session.clone(), config.style);
        let zoom = ZoomControls::new(session);

        info!("School map mounted into `{}`", config.container);
        Ok(Self {
            parts: Some(AppParts {
                search: Rc::new(search),
                styles,
                zoom,
                dataset,
                provider,
            }),
        })
    }

    /// Checks if the map finished loading.
    #[wasm_bindgen(js_name = isReady)]
    pub fn is_ready(&self) -> bool {
        self.parts
            .as_ref()
            .is_some_and(|parts| parts.provider.context().ready_session().is_some())
    }

    /// Suggestions for an address query. Resolves to an array of suggestions.
    pub fn suggest(&self, query: String) -> Result<Promise, JsError> {
        let search = self.parts()?.search.clone();
        Ok(future_to_promise(async move {
            let suggestions = search.suggest(&query).await.map_err(to_js_error)?;
            to_js(&suggestions)
        }))
    }

    /// Moves the map to the location of a suggestion returned by [`suggest`](Self::suggest).
    #[wasm_bindgen(js_name = selectSuggestion)]
    pub fn select_suggestion(&self, suggestion: JsValue) -> Result<Promise, JsError> {
        let search = self.parts()?.search.clone();
        let suggestion: Suggestion = serde_wasm_bindgen::from_value(suggestion)?;
        Ok(future_to_promise(async move {
            let location = search.retrieve(&suggestion).await.map_err(to_js_error)?;
            to_js(&location)
        }))
    }

    /// Searches the address and moves the map to the first result.
    pub fn search(&self, query: String) -> Result<Promise, JsError> {
        let search = self.parts()?.search.clone();
        Ok(future_to_promise(async move {
            let location = search.search(&query).await.map_err(to_js_error)?;
            to_js(&location)
        }))
    }

    /// Opens a popup at the selected location. Returns `false` if nothing is selected.
    #[wasm_bindgen(js_name = showSelection)]
    pub fn show_selection(&self) -> Result<bool, JsError> {
        Ok(self.parts()?.search.show_selection()?)
    }

    /// Forgets the selected location and closes its popup.
    #[wasm_bindgen(js_name = clearSelection)]
    pub fn clear_selection(&self) -> Result<(), JsError> {
        self.parts()?.search.clear_selection();
        Ok(())
    }

    /// Styles to choose from, as `{ name, label }` objects.
    pub fn styles(&self) -> Result<JsValue, JsError> {
        let entries: Vec<StyleEntry> = self
            .parts()?
            .styles
            .styles()
            .iter()
            .map(|style| StyleEntry {
                name: style.name(),
                label: style.label(),
            })
            .collect();
        to_js(&entries).map_err(|_| MapError::Generic("failed to list styles".into()).into())
    }

    /// Name of the applied style.
    #[wasm_bindgen(js_name = currentStyle)]
    pub fn current_style(&self) -> Result<String, JsError> {
        Ok(self.parts()?.styles.current().name().to_string())
    }

    /// Applies a style by its name or URL. Returns `false` if it is already applied.
    #[wasm_bindgen(js_name = selectStyle)]
    pub fn select_style(&self, style: &str) -> Result<bool, JsError> {
        let style = MapStyle::from_str(style)?;
        Ok(self.parts()?.styles.select(style))
    }

    /// Zooms in by one step.
    #[wasm_bindgen(js_name = zoomIn)]
    pub fn zoom_in(&self) -> Result<(), JsError> {
        self.parts()?.zoom.zoom_in();
        Ok(())
    }

    /// Zooms out by one step.
    #[wasm_bindgen(js_name = zoomOut)]
    pub fn zoom_out(&self) -> Result<(), JsError> {
        self.parts()?.zoom.zoom_out();
        Ok(())
    }

    /// Retries registering the school dataset after a failed icon load.
    #[wasm_bindgen(js_name = retryDataset)]
    pub fn retry_dataset(&self) -> Result<(), JsError> {
        self.parts()?.dataset.retry();
        Ok(())
    }

    /// Removes the map and everything attached to it. The container can be mounted again.
    pub fn destroy(&mut self) {
        if self.parts.take().is_some() {
            info!("School map unmounted");
        }
    }
}

impl SchoolMapApp {
    fn parts(&self) -> Result<&AppParts, JsError> {
        self.parts
            .as_ref()
            .ok_or_else(|| MapError::SessionDestroyed.into())
    }
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(JsValue::from)
}

fn to_js_error(err: impl std::error::Error) -> JsValue {
    JsError::new(&err.to_string()).into()
}

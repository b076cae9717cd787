use std::sync::Arc;

use skolekort_types::Viewport;

use super::provider::ContainerClaim;
use super::{MapProvider, MapSession};
use crate::engine::{CameraOptions, MapEngine};
use crate::error::MapError;
use crate::messenger::Messenger;

/// Convenience type to mount a [`MapProvider`].
///
/// ```ignore
/// use skolekort::engine::HeadlessEngine;
/// use skolekort::session::SessionBuilder;
/// use skolekort::style::MapStyle;
/// use skolekort_types::{lnglat, Viewport};
///
/// let provider = SessionBuilder::new("map-container")
///     .with_viewport(Viewport::new(lnglat!(10.2, 56.15), 12.0))
///     .with_style(MapStyle::Streets.url())
///     .build(HeadlessEngine::new())?;
/// ```
pub struct SessionBuilder {
    container: String,
    viewport: Option<Viewport>,
    style: Option<String>,
    messenger: Option<Arc<dyn Messenger>>,
}

impl SessionBuilder {
    /// Starts building a session for the container with the given id.
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            viewport: None,
            style: None,
            messenger: None,
        }
    }

    /// Sets the initial viewport. Defaults to whatever the engine starts with.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = Some(viewport);
        self
    }

    /// Sets the initial style URL.
    pub fn with_style(mut self, style_url: impl Into<String>) -> Self {
        self.style = Some(style_url.into());
        self
    }

    /// Sets a [messenger](Messenger) that schedules event pumps of the session.
    ///
    /// Without a messenger the host must call [`MapSession::pump`] itself.
    pub fn with_messenger(mut self, messenger: impl Messenger + 'static) -> Self {
        self.messenger = Some(Arc::new(messenger));
        self
    }

    /// Mounts the session with the given engine.
    pub fn build(self, engine: impl MapEngine + 'static) -> Result<MapProvider, MapError> {
        self.build_boxed(Box::new(engine))
    }

    /// Mounts the session with an engine trait object.
    pub fn build_boxed(self, mut engine: Box<dyn MapEngine>) -> Result<MapProvider, MapError> {
        let claim = ContainerClaim::acquire(&self.container)?;

        if let Some(viewport) = self.viewport {
            engine.jump_to(
                &CameraOptions::new()
                    .center(viewport.center())
                    .zoom(viewport.zoom()),
            );
        }
        if let Some(style) = &self.style {
            engine.set_style(style);
        }

        log::info!("Mounting map session into `{}`", self.container);
        let session = MapSession::new(self.container, engine, self.messenger);
        Ok(MapProvider::new(session, claim))
    }
}

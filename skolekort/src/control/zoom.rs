use std::time::Duration;

use skolekort_types::{MAX_ZOOM, MIN_ZOOM};

use crate::engine::CameraOptions;
use crate::session::SessionHandle;

const DEFAULT_ZOOM_DURATION: Duration = Duration::from_millis(300);

/// Configuration of [`ZoomControls`].
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct ZoomControlsConfiguration {
    step: f64,
    duration: Duration,
    min_zoom: f64,
    max_zoom: f64,
}

impl Default for ZoomControlsConfiguration {
    fn default() -> Self {
        Self {
            step: 1.0,
            duration: DEFAULT_ZOOM_DURATION,
            min_zoom: MIN_ZOOM,
            max_zoom: MAX_ZOOM,
        }
    }
}

impl ZoomControlsConfiguration {
    /// Zoom levels added or removed by one button press.
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Sets zoom levels added or removed by one button press.
    pub fn with_step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    /// Duration of the zoom animation.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Sets duration of the zoom animation.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Sets the zoom range the controls keep the map in.
    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }
}

/// Zoom in and zoom out buttons.
pub struct ZoomControls {
    session: SessionHandle,
    config: ZoomControlsConfiguration,
}

impl ZoomControls {
    /// Creates controls with default configuration.
    pub fn new(session: SessionHandle) -> Self {
        Self::with_config(session, ZoomControlsConfiguration::default())
    }

    /// Creates controls with the given configuration.
    pub fn with_config(session: SessionHandle, config: ZoomControlsConfiguration) -> Self {
        Self { session, config }
    }

    /// Zooms the map in by one step.
    pub fn zoom_in(&self) {
        self.zoom_by(self.config.step);
    }

    /// Zooms the map out by one step.
    pub fn zoom_out(&self) {
        self.zoom_by(-self.config.step);
    }

    fn zoom_by(&self, delta: f64) {
        if !self.session.is_ready() {
            log::debug!("Map is not ready, zoom request skipped");
            return;
        }

        let current = self.session.viewport().zoom();
        let target = (current + delta).clamp(self.config.min_zoom, self.config.max_zoom);
        self.session.ease_to(
            &CameraOptions::new()
                .zoom(target)
                .duration(self.config.duration),
        );
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use skolekort_types::{lnglat, Viewport};

    use super::*;
    use crate::engine::HeadlessEngine;
    use crate::session::MapProvider;

    #[test]
    fn zooms_by_step_within_range() {
        let provider = MapProvider::mount(
            "zoom-controls",
            Viewport::new(lnglat!(10.0, 56.0), 21.5),
            HeadlessEngine::new(),
        )
        .expect("mount");
        let session = provider.session().clone();
        session.pump();

        let controls = ZoomControls::new(session.clone());
        controls.zoom_in();
        assert_abs_diff_eq!(session.viewport().zoom(), 22.0);
        controls.zoom_out();
        controls.zoom_out();
        assert_abs_diff_eq!(session.viewport().zoom(), 20.0);
    }

    #[test]
    fn skipped_before_load() {
        let provider = MapProvider::mount(
            "zoom-controls-not-ready",
            Viewport::new(lnglat!(10.0, 56.0), 5.0),
            HeadlessEngine::new(),
        )
        .expect("mount");
        let session = provider.session().clone();

        ZoomControls::new(session.clone()).zoom_in();
        assert_abs_diff_eq!(session.viewport().zoom(), 5.0);
    }
}

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use maybe_sync::MaybeSend;
use parking_lot::Mutex;
use skolekort_types::LngLat;

use super::OverlayContent;
use crate::category::category_color;
use crate::control::{EventPropagation, ListenerId, MapEvent};
use crate::engine::{MarkerId, PopupId, PopupOptions, PopupSpec};
use crate::error::MapError;
use crate::session::SessionHandle;

const POPUP_CLASS: &str = "mapboxgl-custom-popup";

/// What a popup is attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PopupAnchor {
    /// The popup occupies the popup slot of a marker.
    Marker(MarkerId),
    /// The popup stands at a coordinate.
    Coordinate(LngLat),
}

impl PopupAnchor {
    /// Resolves an anchor from optional parts. The marker wins if both are given.
    pub fn from_parts(marker: Option<MarkerId>, coordinate: Option<LngLat>) -> Option<Self> {
        match (marker, coordinate) {
            (Some(marker), _) => Some(Self::Marker(marker)),
            (None, Some(coordinate)) => Some(Self::Coordinate(coordinate)),
            (None, None) => None,
        }
    }
}

/// Options of a [`PopupOverlay`].
#[derive(Debug, Clone, PartialEq)]
pub struct PopupOverlayOptions {
    /// Extra class names of the popup container.
    pub class_name: Option<String>,
    /// `INST_TYPE_NR` code that selects the background color.
    pub category: Option<String>,
    /// Show the close button.
    pub close_button: bool,
    /// Close the popup when the map is clicked.
    pub close_on_click: bool,
    /// CSS max-width of the popup.
    pub max_width: String,
}

impl Default for PopupOverlayOptions {
    fn default() -> Self {
        Self {
            class_name: None,
            category: None,
            close_button: true,
            close_on_click: true,
            max_width: "none".into(),
        }
    }
}

impl PopupOverlayOptions {
    /// Sets extra class names.
    pub fn with_class_name(mut self, class_name: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self
    }

    /// Sets the category code.
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets CSS max-width.
    pub fn with_max_width(mut self, max_width: impl Into<String>) -> Self {
        self.max_width = max_width.into();
        self
    }

    fn engine_options(&self) -> PopupOptions {
        let class_name = match &self.class_name {
            Some(extra) if !extra.trim().is_empty() => format!("{POPUP_CLASS} {}", extra.trim()),
            _ => POPUP_CLASS.to_string(),
        };
        PopupOptions {
            close_button: self.close_button,
            close_on_click: self.close_on_click,
            class_name: Some(class_name),
            max_width: self.max_width.clone(),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "wasm32")] {
        type CloseCallback = Box<dyn FnOnce()>;
    } else {
        type CloseCallback = Box<dyn FnOnce() + Send>;
    }
}

struct PopupState {
    id: PopupId,
    open: AtomicBool,
    on_close: Mutex<Option<CloseCallback>>,
}

/// Popup showing content on a category-colored card.
///
/// The popup stays attached while the value is alive. When the user closes it, the
/// [`on_close`](Self::set_on_close) callback is called once. Dropping the value removes the popup
/// without calling the callback.
pub struct PopupOverlay {
    session: SessionHandle,
    anchor: PopupAnchor,
    state: Arc<PopupState>,
    listener: ListenerId,
}

impl PopupOverlay {
    /// Opens a popup.
    ///
    /// A marker anchored popup replaces the popup currently bound to the marker.
    pub fn open(
        session: &SessionHandle,
        anchor: PopupAnchor,
        content: OverlayContent,
        options: PopupOverlayOptions,
    ) -> Result<Self, MapError> {
        if let PopupAnchor::Marker(marker) = anchor {
            if let Some(current) = session.marker_popup(marker) {
                session.remove_popup(current);
            }
        }

        let background = category_color(options.category.as_deref());
        let content = content.wrapped(&format!(
            "background-color: {background}; padding: 10px; border-radius: 8px"
        ));

        let id = session.add_popup(&PopupSpec {
            anchor,
            content,
            options: options.engine_options(),
        })?;

        let state = Arc::new(PopupState {
            id,
            open: AtomicBool::new(true),
            on_close: Mutex::new(None),
        });

        let weak = Arc::downgrade(&state);
        let listener = session.subscribe(move |event: &MapEvent, _: &SessionHandle| {
            let Some(state) = weak.upgrade() else {
                return EventPropagation::Propagate;
            };
            if *event == MapEvent::PopupClosed(state.id) && state.open.swap(false, Ordering::AcqRel)
            {
                if let Some(callback) = state.on_close.lock().take() {
                    callback();
                }
            }
            EventPropagation::Propagate
        });

        Ok(Self {
            session: session.clone(),
            anchor,
            state,
            listener,
        })
    }

    /// Sets the callback called when the user closes the popup.
    pub fn set_on_close(&self, callback: impl FnOnce() + MaybeSend + 'static) {
        *self.state.on_close.lock() = Some(Box::new(callback));
    }

    /// Sets the callback called when the user closes the popup.
    pub fn with_on_close(self, callback: impl FnOnce() + MaybeSend + 'static) -> Self {
        self.set_on_close(callback);
        self
    }

    /// Engine popup.
    pub fn id(&self) -> PopupId {
        self.state.id
    }

    /// What the popup is attached to.
    pub fn anchor(&self) -> PopupAnchor {
        self.anchor
    }

    /// The popup has not been closed.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }
}

impl Drop for PopupOverlay {
    fn drop(&mut self) {
        self.session.unsubscribe(self.listener);
        if self.state.open.swap(false, Ordering::AcqRel) {
            self.session.remove_popup(self.state.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use skolekort_types::{lnglat, Viewport};

    use super::*;
    use crate::engine::{HeadlessEngine, HeadlessPopup};
    use crate::overlay::MarkerOverlay;
    use crate::session::MapProvider;

    fn provider(name: &str) -> MapProvider {
        let provider = MapProvider::mount(
            name,
            Viewport::new(lnglat!(10.2, 56.15), 12.0),
            HeadlessEngine::new(),
        )
        .expect("mount");
        provider.session().pump();
        provider
    }

    fn engine_popup(session: &SessionHandle, id: PopupId) -> Option<HeadlessPopup> {
        session
            .with_engine(|engine: &mut HeadlessEngine| engine.popup(id).cloned())
            .flatten()
    }

    #[test]
    fn anchor_precedence() {
        let point = lnglat!(10.0, 56.0);
        assert_eq!(
            PopupAnchor::from_parts(Some(MarkerId(3)), Some(point)),
            Some(PopupAnchor::Marker(MarkerId(3)))
        );
        assert_eq!(
            PopupAnchor::from_parts(None, Some(point)),
            Some(PopupAnchor::Coordinate(point))
        );
        assert_eq!(PopupAnchor::from_parts(None, None), None);
    }

    #[test]
    fn card_uses_category_color() {
        let provider = provider("popup-card");
        let session = provider.session();

        let folkeskole = PopupOverlay::open(
            session,
            PopupAnchor::Coordinate(lnglat!(10.2, 56.15)),
            "A".into(),
            PopupOverlayOptions::default()
                .with_category("1012")
                .with_class_name("location-popup"),
        )
        .expect("popup");
        let unknown = PopupOverlay::open(
            session,
            PopupAnchor::Coordinate(lnglat!(10.2, 56.15)),
            "B".into(),
            PopupOverlayOptions::default().with_category("9999"),
        )
        .expect("popup");

        let card = engine_popup(session, folkeskole.id()).expect("open");
        assert!(card
            .content
            .as_html()
            .starts_with("<div style=\"background-color: #537A5A; padding: 10px; border-radius: 8px\">"));
        assert_eq!(
            card.options.class_name.as_deref(),
            Some("mapboxgl-custom-popup location-popup")
        );
        assert_eq!(card.options.max_width, "none");

        let card = engine_popup(session, unknown.id()).expect("open");
        assert!(card.content.as_html().contains("background-color: #ffffff"));
        assert_eq!(card.options.class_name.as_deref(), Some("mapboxgl-custom-popup"));
    }

    #[test]
    fn one_popup_per_marker() {
        let provider = provider("popup-marker-slot");
        let session = provider.session();
        let marker = MarkerOverlay::new(session, lnglat!(10.2, 56.15), "m".into(), ())
            .expect("marker");

        let first = PopupOverlay::open(
            session,
            PopupAnchor::Marker(marker.id()),
            "1".into(),
            PopupOverlayOptions::default(),
        )
        .expect("popup");
        let second = PopupOverlay::open(
            session,
            PopupAnchor::Marker(marker.id()),
            "2".into(),
            PopupOverlayOptions::default(),
        )
        .expect("popup");
        session.pump();

        let open = session
            .with_engine(|engine: &mut HeadlessEngine| engine.popups().count())
            .unwrap_or_default();
        assert_eq!(open, 1);
        assert_eq!(session.marker_popup(marker.id()), Some(second.id()));
        assert!(!first.is_open());
        assert!(second.is_open());
    }

    #[test]
    fn user_close_calls_back_once() {
        let provider = provider("popup-close");
        let session = provider.session();
        let closed = Arc::new(AtomicUsize::new(0));

        let counter = closed.clone();
        let popup = PopupOverlay::open(
            session,
            PopupAnchor::Coordinate(lnglat!(10.2, 56.15)),
            "x".into(),
            PopupOverlayOptions::default(),
        )
        .expect("popup")
        .with_on_close(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let id = popup.id();
        session.with_engine(|engine: &mut HeadlessEngine| {
            engine.close_popup(id);
            engine.close_popup(id);
        });
        session.pump();
        assert_eq!(closed.load(Ordering::Relaxed), 1);
        assert!(!popup.is_open());

        drop(popup);
        assert_eq!(closed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn drop_removes_without_callback() {
        let provider = provider("popup-drop");
        let session = provider.session();
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        let listeners = session.listener_count();

        let popup = PopupOverlay::open(
            session,
            PopupAnchor::Coordinate(lnglat!(10.2, 56.15)),
            "x".into(),
            PopupOverlayOptions::default(),
        )
        .expect("popup")
        .with_on_close(move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        let id = popup.id();

        drop(popup);
        session.pump();
        assert!(engine_popup(session, id).is_none());
        assert_eq!(closed.load(Ordering::Relaxed), 0);
        assert_eq!(session.listener_count(), listeners);
    }
}

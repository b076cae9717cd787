//! DOM overlays attached to a map session: markers and popups.
//!
//! An overlay lives as long as the Rust value that owns it. Dropping the value detaches the
//! overlay from the map and removes every event subscription it made.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use maybe_sync::{MaybeSend, MaybeSync};
use parking_lot::RwLock;

mod marker;
mod popup;

pub use marker::{MarkerClickEvent, MarkerHoverEvent, MarkerOverlay, Position};
pub use popup::{PopupAnchor, PopupOverlay, PopupOverlayOptions};

/// Rendered content of an overlay: a fragment of HTML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct OverlayContent(String);

impl OverlayContent {
    /// Content from trusted HTML markup.
    pub fn html(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    /// Content showing the given text. Markup characters are escaped.
    pub fn text(text: &str) -> Self {
        Self(escape_html(text))
    }

    /// The HTML markup.
    pub fn as_html(&self) -> &str {
        &self.0
    }

    /// Checks if there is nothing to show.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Wraps the content into a `div` with the given inline style.
    pub fn wrapped(&self, style: &str) -> Self {
        let mut markup = String::with_capacity(self.0.len() + style.len() + 24);
        let _ = write!(markup, "<div style=\"{}\">{}</div>", escape_html(style), self.0);
        Self(markup)
    }
}

impl From<String> for OverlayContent {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OverlayContent {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Escapes characters that have a meaning in HTML text and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Id of a handler subscribed to an [`Emitter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handler of overlay events.
pub trait EventHandler<E>: Fn(&E) + MaybeSend + MaybeSync {}

impl<E, T: Fn(&E)> EventHandler<E> for T where T: MaybeSend + MaybeSync {}

type Handler<E> = Box<dyn EventHandler<E>>;

/// List of typed event handlers.
pub struct Emitter<E> {
    handlers: RwLock<Vec<(HandlerId, Handler<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<E> Emitter<E> {
    /// Adds a handler.
    pub fn subscribe(&self, handler: impl EventHandler<E> + 'static) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Box::new(handler)));
        id
    }

    /// Removes the handler. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: HandlerId) -> bool {
        let mut handlers = self.handlers.write();
        let len = handlers.len();
        handlers.retain(|(handler_id, _)| *handler_id != id);
        handlers.len() != len
    }

    /// Number of subscribed handlers.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Checks if there are no handlers.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls every handler with the event.
    ///
    /// Handlers must not subscribe to or unsubscribe from the emitter they are called by.
    pub fn emit(&self, event: &E) {
        for (_, handler) in self.handlers.read().iter() {
            handler(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html("<b>Skole & \"Co\"</b>"),
            "&lt;b&gt;Skole &amp; &quot;Co&quot;&lt;/b&gt;"
        );
        assert_eq!(OverlayContent::text("a<b").as_html(), "a&lt;b");
    }

    #[test]
    fn wraps_content() {
        let content = OverlayContent::html("<p>x</p>").wrapped("padding: 10px");
        assert_eq!(
            content.as_html(),
            "<div style=\"padding: 10px\"><p>x</p></div>"
        );
    }

    #[test]
    fn emitter_unsubscribes_exact_handler() {
        let emitter = Emitter::<u32>::default();
        let sum = Arc::new(AtomicU64::new(0));

        let first = {
            let sum = sum.clone();
            emitter.subscribe(move |v| {
                sum.fetch_add(*v as u64, Ordering::Relaxed);
            })
        };
        let _second = {
            let sum = sum.clone();
            emitter.subscribe(move |v| {
                sum.fetch_add(*v as u64 * 10, Ordering::Relaxed);
            })
        };

        emitter.emit(&1);
        assert_eq!(sum.load(Ordering::Relaxed), 11);

        assert!(emitter.unsubscribe(first));
        assert!(!emitter.unsubscribe(first));
        emitter.emit(&1);
        assert_eq!(sum.load(Ordering::Relaxed), 21);
        assert_eq!(emitter.len(), 1);
    }
}

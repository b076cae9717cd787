//! Error types used by the crate.

use thiserror::Error;

#[cfg(all(not(target_arch = "wasm32"), feature = "image"))]
use image::ImageError;

use crate::engine::{MarkerId, PopupId};

/// Error type of map session and engine operations.
#[derive(Debug, Error)]
pub enum MapError {
    /// I/O error (network or file)
    #[error("failed to load data")]
    IO,
    /// Error decoding data.
    #[error("failed to decode data: {0}")]
    Decoding(String),
    /// Error interacting with WASM runtime.
    #[error("wasm error: {0:?}")]
    Wasm(Option<String>),
    /// Another live session is already bound to the container.
    #[error("container `{0}` already has a live map session")]
    ContainerBusy(String),
    /// The session was destroyed before the operation.
    #[error("map session has been destroyed")]
    SessionDestroyed,
    /// An image with the same name is already registered.
    #[error("image `{0}` already exists")]
    DuplicateImage(String),
    /// A source with the same id is already registered.
    #[error("source `{0}` already exists")]
    DuplicateSource(String),
    /// Source is not registered.
    #[error("source `{0}` not found")]
    UnknownSource(String),
    /// Source cannot be removed while a layer still renders it.
    #[error("source `{0}` is used by layer `{1}`")]
    SourceInUse(String, String),
    /// A layer with the same id is already registered.
    #[error("layer `{0}` already exists")]
    DuplicateLayer(String),
    /// Layer is not registered.
    #[error("layer `{0}` not found")]
    UnknownLayer(String),
    /// Cluster id is not known to the clustering index of the source.
    #[error("cluster {0} not found")]
    UnknownCluster(u64),
    /// Marker is not attached to the map.
    #[error("marker {0} not found")]
    UnknownMarker(MarkerId),
    /// Popup is not attached to the map.
    #[error("popup {0} not found")]
    UnknownPopup(PopupId),
    /// Image decoding error.
    #[cfg(all(not(target_arch = "wasm32"), feature = "image"))]
    #[error("image decode error: {0:?}")]
    ImageDecode(#[from] ImageError),
    /// Malformed JSON payload.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    /// Generic error - details are inside.
    #[error("{0}")]
    Generic(String),
    /// Error reading/writing data to the FS.
    #[error("failed to read file")]
    FsIo(#[from] std::io::Error),
}

#[cfg(not(target_arch = "wasm32"))]
impl From<reqwest::Error> for MapError {
    fn from(_value: reqwest::Error) -> Self {
        Self::IO
    }
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for MapError {
    fn from(value: wasm_bindgen::JsValue) -> Self {
        MapError::Wasm(Some(format!("{value:?}")))
    }
}

#[cfg(target_arch = "wasm32")]
impl From<js_sys::Object> for MapError {
    fn from(value: js_sys::Object) -> Self {
        MapError::Wasm(Some(format!("Failed to cast {value:?} into target type")))
    }
}

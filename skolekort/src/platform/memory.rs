use ahash::AHashMap;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::decoded_image::DecodedImage;
use crate::error::MapError;
use crate::platform::PlatformService;

/// Platform service serving assets registered in memory.
///
/// Loads complete without waiting, so overlays using the service register their resources in
/// the same event pump that started the load. Unknown URLs fail with [`MapError::IO`].
#[derive(Default)]
pub struct InMemoryPlatformService {
    images: RwLock<AHashMap<String, DecodedImage>>,
    bytes: RwLock<AHashMap<String, Bytes>>,
}

impl InMemoryPlatformService {
    /// Creates an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves the image at the URL.
    pub fn with_image(self, url: impl Into<String>, image: DecodedImage) -> Self {
        self.insert_image(url, image);
        self
    }

    /// Serves the bytes at the URL.
    pub fn with_bytes(self, url: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        self.insert_bytes(url, bytes);
        self
    }

    /// Serves the bytes at the URL, replacing the previous ones.
    pub fn insert_bytes(&self, url: impl Into<String>, bytes: impl Into<Bytes>) {
        self.bytes.write().insert(url.into(), bytes.into());
    }

    /// Serves the image at the URL, replacing the previous one.
    pub fn insert_image(&self, url: impl Into<String>, image: DecodedImage) {
        self.images.write().insert(url.into(), image);
    }

    /// Stops serving anything at the URL.
    pub fn remove(&self, url: &str) {
        self.images.write().remove(url);
        self.bytes.write().remove(url);
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl PlatformService for InMemoryPlatformService {
    async fn load_image_url(&self, url: &str) -> Result<DecodedImage, MapError> {
        if let Some(image) = self.images.read().get(url) {
            return Ok(image.clone());
        }

        #[cfg(all(not(target_arch = "wasm32"), feature = "image"))]
        if let Some(bytes) = self.bytes.read().get(url) {
            return DecodedImage::decode(bytes);
        }

        log::debug!("No image registered for {url}");
        Err(MapError::IO)
    }

    async fn load_bytes_from_url(&self, url: &str) -> Result<Bytes, MapError> {
        self.bytes.read().get(url).cloned().ok_or(MapError::IO)
    }
}

//! Provides platform specific logic and [`PlatformService`] to access it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use maybe_sync::{MaybeSend, MaybeSync};

use crate::decoded_image::DecodedImage;
use crate::error::MapError;

/// Service providing asset loading in a platform independent way.
///
/// Overlays receive the service as a trait object, so tests and hosts can substitute their own
/// loaders.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait PlatformService: MaybeSend + MaybeSync {
    /// Loads and decodes an image from the given url.
    async fn load_image_url(&self, url: &str) -> Result<DecodedImage, MapError>;
    /// Loads a byte array from the given url.
    async fn load_bytes_from_url(&self, url: &str) -> Result<Bytes, MapError>;
}

mod memory;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;

#[cfg(target_arch = "wasm32")]
pub mod web;

pub use memory::InMemoryPlatformService;

/// Default implementation of the [`PlatformService`] for the current platform.
#[cfg(not(target_arch = "wasm32"))]
pub type PlatformServiceImpl = native::NativePlatformService;

/// Default implementation of the [`PlatformService`] for the current platform.
#[cfg(target_arch = "wasm32")]
pub type PlatformServiceImpl = web::WebPlatformService;

/// Creates the default platform service as a shared trait object.
pub fn default_service() -> Result<Arc<dyn PlatformService>, MapError> {
    Ok(Arc::new(PlatformServiceImpl::new()?))
}

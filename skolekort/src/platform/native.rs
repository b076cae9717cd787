use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};

use crate::decoded_image::DecodedImage;
use crate::error::MapError;
use crate::platform::PlatformService;

/// Platform service for native targets.
///
/// `http://` and `https://` urls are downloaded with `reqwest`, anything else is read from the
/// file system, so the web asset paths (`/skole-icon.png`) can point to a local directory.
#[derive(Debug, Clone)]
pub struct NativePlatformService {
    http_client: reqwest::Client,
}

#[async_trait]
impl PlatformService for NativePlatformService {
    async fn load_image_url(&self, url: &str) -> Result<DecodedImage, MapError> {
        let bytes = self.load_bytes_from_url(url).await?;
        decode(&bytes)
    }

    async fn load_bytes_from_url(&self, url: &str) -> Result<Bytes, MapError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            self.load_from_web(url).await
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            debug!("Reading {path} from the file system");
            Ok(tokio::fs::read(Path::new(path)).await?.into())
        }
    }
}

impl NativePlatformService {
    /// Creates a new service with its own http client.
    pub fn new() -> Result<Self, MapError> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("skolekort/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { http_client })
    }

    async fn load_from_web(&self, url: &str) -> Result<Bytes, MapError> {
        let response = self.http_client.get(url).send().await?;
        if !response.status().is_success() {
            info!(
                "Failed to load {url}: {}, {:?}",
                response.status(),
                response.text().await
            );
            return Err(MapError::IO);
        }

        Ok(response.bytes().await?)
    }
}

#[cfg(feature = "image")]
fn decode(bytes: &[u8]) -> Result<DecodedImage, MapError> {
    DecodedImage::decode(bytes)
}

#[cfg(not(feature = "image"))]
fn decode(_bytes: &[u8]) -> Result<DecodedImage, MapError> {
    Err(MapError::Generic(
        "image decoding requires the `image` feature".into(),
    ))
}

//! Images loaded into memory before they are registered with a map engine.

#[cfg(all(not(target_arch = "wasm32"), feature = "image"))]
use crate::error::MapError;

/// An image that has been loaded and decoded.
#[derive(Debug, Clone)]
pub struct DecodedImage(pub(crate) DecodedImageType);

#[derive(Debug, Clone)]
pub(crate) enum DecodedImageType {
    Bitmap {
        bytes: Vec<u8>,
        dimensions: (u32, u32),
    },
    #[cfg(target_arch = "wasm32")]
    JsImage(web_sys::HtmlImageElement),
}

impl DecodedImage {
    /// Decode an image from a byte slice.
    ///
    /// Attempts to guess the format of the image from the data. Non-RGBA images
    /// will be converted to RGBA.
    #[cfg(all(not(target_arch = "wasm32"), feature = "image"))]
    pub fn decode(bytes: &[u8]) -> Result<Self, MapError> {
        use image::GenericImageView;
        let decoded = image::load_from_memory(bytes)?;
        let dimensions = decoded.dimensions();
        let bytes = decoded.to_rgba8();

        Ok(Self(DecodedImageType::Bitmap {
            bytes: bytes.into_vec(),
            dimensions,
        }))
    }

    /// Creates an image from raw RGBA pixels.
    ///
    /// Returns `None` if the buffer length does not match the dimensions.
    pub fn from_raw(bytes: Vec<u8>, dimensions: (u32, u32)) -> Option<Self> {
        if bytes.len() != dimensions.0 as usize * dimensions.1 as usize * 4 {
            return None;
        }

        Some(Self(DecodedImageType::Bitmap { bytes, dimensions }))
    }

    /// Wraps an image element loaded by the browser.
    #[cfg(target_arch = "wasm32")]
    pub fn from_element(image: web_sys::HtmlImageElement) -> Self {
        Self(DecodedImageType::JsImage(image))
    }

    /// Width and height of the image in pixels.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.0 {
            DecodedImageType::Bitmap { dimensions, .. } => *dimensions,
            #[cfg(target_arch = "wasm32")]
            DecodedImageType::JsImage(image) => (image.natural_width(), image.natural_height()),
        }
    }

    /// RGBA pixels, if the image was decoded in memory.
    pub fn rgba_bytes(&self) -> Option<&[u8]> {
        match &self.0 {
            DecodedImageType::Bitmap { bytes, .. } => Some(bytes),
            #[cfg(target_arch = "wasm32")]
            DecodedImageType::JsImage(_) => None,
        }
    }

    /// Image element, if the image was loaded by the browser.
    #[cfg(target_arch = "wasm32")]
    pub fn element(&self) -> Option<&web_sys::HtmlImageElement> {
        match &self.0 {
            DecodedImageType::JsImage(image) => Some(image),
            DecodedImageType::Bitmap { .. } => None,
        }
    }
}

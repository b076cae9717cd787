//! Platform specific stuff for WASM32 (web) targets.

use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use js_sys::Uint8Array;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlImageElement, Request, RequestInit, RequestMode, Response};

use crate::decoded_image::DecodedImage;
use crate::error::MapError;
use crate::platform::PlatformService;

/// Platform service for Web target.
#[derive(Debug, Default)]
pub struct WebPlatformService {}

impl WebPlatformService {
    /// Creates a new service.
    pub fn new() -> Result<Self, MapError> {
        Ok(Self {})
    }
}

#[async_trait(?Send)]
impl PlatformService for WebPlatformService {
    async fn load_image_url(&self, url: &str) -> Result<DecodedImage, MapError> {
        let image = ImageFuture::new(url)?.await?;
        Ok(DecodedImage::from_element(image))
    }

    async fn load_bytes_from_url(&self, url: &str) -> Result<bytes::Bytes, MapError> {
        let opts = RequestInit::new();
        opts.set_method("GET");
        opts.set_mode(RequestMode::Cors);

        let request = Request::new_with_str_and_init(url, &opts)?;

        let window = web_sys::window()
            .ok_or_else(|| MapError::Wasm(Some("Global object is not available".into())))?;
        let resp_value = JsFuture::from(window.fetch_with_request(&request)).await?;
        let resp: Response = resp_value.dyn_into()?;
        if !resp.ok() {
            log::info!("Failed to load {url}: {}", resp.status());
            return Err(MapError::IO);
        }

        let bytes_val = JsFuture::from(resp.array_buffer()?).await?;
        let array = Uint8Array::new(&bytes_val);
        Ok(array.to_vec().into())
    }
}

/// Future for getting image with browser API
pub struct ImageFuture {
    image: Option<HtmlImageElement>,
    load_failed: Rc<Cell<bool>>,
}

impl ImageFuture {
    /// Create a new instance.
    pub fn new(path: &str) -> Result<Self, MapError> {
        let image = HtmlImageElement::new()?;
        image.set_cross_origin(Some("anonymous"));
        image.set_src(path);
        Ok(ImageFuture {
            image: Some(image),
            load_failed: Rc::new(Cell::new(false)),
        })
    }
}

impl Future for ImageFuture {
    type Output = Result<HtmlImageElement, MapError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.image.take() {
            Some(image) if image.complete() => {
                if self.load_failed.get() || image.natural_width() == 0 {
                    Poll::Ready(Err(MapError::IO))
                } else {
                    Poll::Ready(Ok(image))
                }
            }
            Some(image) => {
                let waker = cx.waker().clone();
                let on_load_closure = Closure::wrap(Box::new(move || {
                    waker.wake_by_ref();
                }) as Box<dyn FnMut()>);
                image.set_onload(Some(on_load_closure.as_ref().unchecked_ref()));
                on_load_closure.forget();

                let waker = cx.waker().clone();
                let failed_flag = self.load_failed.clone();
                let on_error_closure = Closure::wrap(Box::new(move || {
                    failed_flag.set(true);
                    waker.wake_by_ref();
                }) as Box<dyn FnMut()>);
                image.set_onerror(Some(on_error_closure.as_ref().unchecked_ref()));
                on_error_closure.forget();

                self.image = Some(image);
                Poll::Pending
            }
            None => Poll::Ready(Err(MapError::IO)),
        }
    }
}

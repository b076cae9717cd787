//! Browser front-end of the school map.
//!
//! The crate binds Mapbox GL JS as a [`MapEngine`](skolekort::engine::MapEngine) and composes
//! the page: map provider, school dataset, address search, style switcher and zoom controls.
//! Everything here only exists on `wasm32` targets. The page script creates a
//! [`SchoolMapApp`] with its configuration object:
//!
//! ```js
//! import init, { SchoolMapApp } from "./pkg/skolekort_web.js";
//!
//! await init();
//! const app = new SchoolMapApp({ accessToken: "pk...", container: "map-container" });
//! await app.search("Hovedgade 1, 8000 Aarhus");
//! ```

#[cfg(target_arch = "wasm32")]
mod app;
#[cfg(target_arch = "wasm32")]
mod engine;
#[cfg(target_arch = "wasm32")]
mod ffi;
#[cfg(target_arch = "wasm32")]
mod messenger;

#[cfg(target_arch = "wasm32")]
pub use app::SchoolMapApp;
#[cfg(target_arch = "wasm32")]
pub use engine::MapboxEngine;
#[cfg(target_arch = "wasm32")]
pub use messenger::WebMessenger;

#[cfg(target_arch = "wasm32")]
/// Installs the panic hook and the console logger when the module is loaded.
#[wasm_bindgen::prelude::wasm_bindgen(start)]
pub fn start() {
    console_error_panic_hook::set_once();
    if console_log::init_with_level(log::Level::Info).is_err() {
        log::debug!("Logger is already initialized");
    }
}

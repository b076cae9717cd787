use std::sync::Weak;

use skolekort::session::MapSession;
use skolekort::Messenger;

/// Pumps sessions from the browser microtask queue.
///
/// Mapbox calls event handlers while the engine may be in the middle of a command, so the pump
/// is never run in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebMessenger;

impl Messenger for WebMessenger {
    fn request_pump(&self, session: Weak<MapSession>) {
        wasm_bindgen_futures::spawn_local(async move {
            if let Some(session) = session.upgrade() {
                session.pump();
            }
        });
    }
}

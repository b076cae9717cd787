use std::sync::Weak;

use maybe_sync::{MaybeSend, MaybeSync};

use crate::session::MapSession;

/// Lets the host know that a session has queued events and should be pumped.
///
/// Engines deliver events from their own callbacks. The session only queues them, and the
/// messenger is responsible for calling [`MapSession::pump`] later, outside of the callback.
pub trait Messenger: MaybeSend + MaybeSync {
    /// Requests a [`MapSession::pump`] call for the given session.
    fn request_pump(&self, session: Weak<MapSession>);
}

/// Messenger that never schedules anything. The host pumps the session itself.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualPump;

impl Messenger for ManualPump {
    fn request_pump(&self, _session: Weak<MapSession>) {}
}

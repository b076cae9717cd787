use std::sync::LazyLock;

use ahash::AHashSet;
use parking_lot::Mutex;
use skolekort_types::Viewport;

use super::{SessionBuilder, SessionHandle};
use crate::engine::MapEngine;
use crate::error::MapError;

static CONTAINERS: LazyLock<Mutex<AHashSet<String>>> =
    LazyLock::new(|| Mutex::new(AHashSet::new()));

/// Exclusive right to mount a session into a container. Released on drop.
#[derive(Debug)]
pub(crate) struct ContainerClaim(String);

impl ContainerClaim {
    pub(crate) fn acquire(container: &str) -> Result<Self, MapError> {
        if !CONTAINERS.lock().insert(container.to_string()) {
            return Err(MapError::ContainerBusy(container.to_string()));
        }
        Ok(Self(container.to_string()))
    }
}

impl Drop for ContainerClaim {
    fn drop(&mut self) {
        CONTAINERS.lock().remove(&self.0);
    }
}

/// Checks if a live session is mounted into the container.
pub fn is_container_claimed(container: &str) -> bool {
    CONTAINERS.lock().contains(container)
}

/// What the components under a provider see of the map.
#[derive(Debug, Clone, Default)]
pub struct MapContext {
    /// The session, if one is mounted.
    pub session: Option<SessionHandle>,
    /// The session finished loading.
    pub ready: bool,
}

impl MapContext {
    /// The session if it is mounted and ready.
    pub fn ready_session(&self) -> Option<&SessionHandle> {
        self.session.as_ref().filter(|_| self.ready)
    }
}

/// Owner of the map session mounted into a container.
///
/// At most one provider can be mounted into a container at a time. Dropping the provider (or
/// calling [`MapProvider::unmount`]) destroys the session and releases the container.
#[derive(Debug)]
pub struct MapProvider {
    session: SessionHandle,
    // Dropped after the session is destroyed.
    _claim: ContainerClaim,
}

impl MapProvider {
    /// Mounts a session with the given engine into the container.
    ///
    /// Use [`SessionBuilder`] for more options.
    pub fn mount(
        container: &str,
        initial_view: Viewport,
        engine: impl MapEngine + 'static,
    ) -> Result<Self, MapError> {
        SessionBuilder::new(container)
            .with_viewport(initial_view)
            .build(engine)
    }

    pub(crate) fn new(session: SessionHandle, claim: ContainerClaim) -> Self {
        Self {
            session,
            _claim: claim,
        }
    }

    /// The mounted session.
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Current context of the provider.
    pub fn context(&self) -> MapContext {
        MapContext {
            session: Some(self.session.clone()),
            ready: self.session.is_ready(),
        }
    }

    /// Destroys the session and releases the container.
    pub fn unmount(self) {}
}

impl Drop for MapProvider {
    fn drop(&mut self) {
        self.session.destroy();
    }
}

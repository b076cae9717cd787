use std::future::Future;

use futures::FutureExt;
#[cfg(not(target_arch = "wasm32"))]
use maybe_sync::MaybeSend;

#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<T>(future: T)
where
    T: Future + MaybeSend + 'static,
    T::Output: MaybeSend + 'static,
{
    tokio::spawn(future);
}

#[cfg(target_arch = "wasm32")]
pub fn spawn<T>(future: T)
where
    T: Future + 'static,
    T::Output: 'static,
{
    wasm_bindgen_futures::spawn_local(async {
        future.await;
    });
}

/// Polls the future once and applies it in place if it is already complete, otherwise hands it
/// over to the runtime.
#[cfg(not(target_arch = "wasm32"))]
pub fn run_or_spawn<T>(future: T)
where
    T: Future<Output = ()> + MaybeSend + 'static,
{
    let mut future = Box::pin(future);
    if (&mut future).now_or_never().is_none() {
        spawn(future);
    }
}

/// Polls the future once and applies it in place if it is already complete, otherwise hands it
/// over to the runtime.
#[cfg(target_arch = "wasm32")]
pub fn run_or_spawn<T>(future: T)
where
    T: Future<Output = ()> + 'static,
{
    let mut future = Box::pin(future);
    if (&mut future).now_or_never().is_none() {
        spawn(future);
    }
}

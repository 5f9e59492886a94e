//! Shutdown signal observed by service loops.
//!
//! A [`Signal`] and any number of [`Shutdown`] clones are created together by [`signal`]. Loops
//! `select!` on `&mut Shutdown` next to their timers and channels and exit once it resolves.

use futures_util::{
    future::{FusedFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// Resolves once the paired [`Signal`] fired or was dropped.
///
/// Clones observe the same signal. A resolved `Shutdown` keeps resolving immediately, so a loop
/// may poll it again after it broke out of a `select!`.
#[derive(Debug, Clone)]
pub struct Shutdown(Shared<oneshot::Receiver<()>>);

impl Shutdown {
    /// Returns `true` if the signal has already fired or was dropped.
    ///
    /// Does not register a waker.
    pub fn is_fired(&self) -> bool {
        if self.0.is_terminated() {
            return true
        }
        let waker = futures_util::task::noop_waker();
        let mut cx = Context::from_waker(&waker);
        self.0.clone().poll_unpin(&mut cx).is_ready()
    }
}

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.0.is_terminated() {
            return Poll::Ready(())
        }
        // `Err` means the signal was dropped, which stops the loops as well
        this.0.poll_unpin(cx).map(|_| ())
    }
}

/// Stops every [`Shutdown`] created with it, either through [`Signal::fire`] or on drop.
#[derive(Debug)]
pub struct Signal(Mutex<Option<oneshot::Sender<()>>>);

impl Signal {
    /// Fires the signal.
    ///
    /// Returns `false` if it had already been fired.
    pub fn fire(&self) -> bool {
        match self.0.lock().take() {
            Some(sender) => {
                let _ = sender.send(());
                true
            }
            None => false,
        }
    }

    /// Returns `true` once [`Signal::fire`] was called.
    pub fn is_fired(&self) -> bool {
        self.0.lock().is_none()
    }
}

/// Creates a [`Signal`] and the [`Shutdown`] it controls.
pub fn signal() -> (Signal, Shutdown) {
    let (sender, receiver) = oneshot::channel();
    (Signal(Mutex::new(Some(sender))), Shutdown(receiver.shared()))
}

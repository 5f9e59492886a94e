//! In-process index publication.

use crate::IndexSource;
use futures::Stream;
use parking_lot::RwLock;
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tokio::sync::broadcast::{self, Sender};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{trace, warn};

const DEFAULT_SIZE_BROADCAST_CHANNEL: usize = 64;

/// A stream of published index snapshots.
///
/// A listener that falls behind skips the snapshots it missed and continues with the next one;
/// every item is a complete snapshot, so only the latest one matters.
#[derive(Debug)]
pub struct EventStream<T> {
    inner: BroadcastStream<T>,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    /// Wraps a broadcast receiver.
    pub fn new(receiver: broadcast::Receiver<T>) -> Self {
        Self { inner: BroadcastStream::new(receiver) }
    }
}

impl<T: Clone + Send + 'static> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match futures::ready!(Pin::new(&mut self.inner).poll_next(cx)) {
                Some(Ok(item)) => return Poll::Ready(Some(item)),
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(target: "index", skipped, "index listener lagged");
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

/// Holds the latest snapshot of an index and notifies listeners of every new one.
#[derive(Debug)]
pub struct IndexPublisher<T> {
    current: RwLock<Arc<T>>,
    sender: Sender<Arc<T>>,
}

impl<T: Default + Send + Sync + 'static> Default for IndexPublisher<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Send + Sync + 'static> IndexPublisher<T> {
    /// Creates a publisher holding `initial`.
    pub fn new(initial: T) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_SIZE_BROADCAST_CHANNEL);
        Self { current: RwLock::new(Arc::new(initial)), sender }
    }

    /// Replaces the current snapshot and notifies all listeners.
    pub fn publish(&self, index: T) {
        let index = Arc::new(index);
        *self.current.write() = index.clone();
        if self.sender.send(index).is_err() {
            trace!(target: "index", "no listeners for index update");
        }
    }

    /// Returns the number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<T: Send + Sync + 'static> IndexSource<T> for IndexPublisher<T> {
    fn get(&self) -> Arc<T> {
        self.current.read().clone()
    }

    fn listen(&self) -> EventStream<Arc<T>> {
        EventStream::new(self.sender.subscribe())
    }
}

//! Fan-out of change notifications to connected event streams.
//!
//! Each subscriber owns a bounded queue. Publishing never blocks and never
//! fails: a subscriber whose queue is closed or full is dropped from the set
//! and the rest still receive the frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::Stream;
use taskview_core::{ChangeNotification, EventFrame};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Frames a subscriber may have queued before it is considered stuck.
pub const SUBSCRIBER_QUEUE: usize = 64;

pub type SubscriberId = u64;

struct Inner {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<EventFrame>>>,
    next_id: AtomicU64,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<EventFrame>>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared set of live subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<Inner>,
    capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::with_capacity(SUBSCRIBER_QUEUE)
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber. Its first frame is `connected`.
    pub fn subscribe(&self) -> Subscriber {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.capacity);

        // Fresh channel with capacity >= 1, so this cannot fail
        let _ = tx.try_send(EventFrame::Connected);

        let count = {
            let mut subscribers = self.inner.lock();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        info!("Event stream {} connected ({} open)", id, count);

        Subscriber {
            id,
            rx,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        remove(&self.inner, id);
    }

    /// Deliver a notification to every live subscriber.
    pub fn publish(&self, notification: ChangeNotification) {
        let frame = EventFrame::from(notification);
        let mut subscribers = self.inner.lock();
        let before = subscribers.len();

        subscribers.retain(|id, tx| match tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Event stream {} is not keeping up, disconnecting", id);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event stream {} closed", id);
                false
            }
        });

        debug!(
            "Published {} change to {} stream(s) ({} dropped)",
            notification.channel.name(),
            subscribers.len(),
            before - subscribers.len()
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Drop every subscriber so their streams end. Used on shutdown.
    pub fn close_all(&self) {
        let mut subscribers = self.inner.lock();
        if !subscribers.is_empty() {
            info!("Closing {} event stream(s)", subscribers.len());
        }
        subscribers.clear();
    }
}

fn remove(inner: &Inner, id: SubscriberId) {
    let mut subscribers = inner.lock();
    if subscribers.remove(&id).is_some() {
        info!("Event stream {} disconnected ({} open)", id, subscribers.len());
    }
}

/// One open event stream. Dropping it unsubscribes.
pub struct Subscriber {
    id: SubscriberId,
    rx: mpsc::Receiver<EventFrame>,
    broadcaster: Weak<Inner>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next frame, or `None` once the subscriber has been removed.
    pub async fn recv(&mut self) -> Option<EventFrame> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> impl Stream<Item = EventFrame> + Send + 'static {
        futures::stream::unfold(self, |mut subscriber| async move {
            let frame = subscriber.recv().await?;
            Some((frame, subscriber))
        })
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            remove(&inner, self.id);
        }
    }
}

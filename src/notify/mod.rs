//! Notification bridge from worker threads into the async runtime.
//!
//! Task code and the execution layer run on plain threads and emit short text
//! notifications through a cloneable [`Notifier`]. Delivery to the outside
//! world (a chat bot, a webhook, a log) is async and happens on one consumer
//! task owned by the tokio runtime, fed through a bounded mpsc queue.
//!
//! Until a [`NotificationSink`] is attached, messages are kept in a bounded
//! pending buffer and flushed in emission order on attach. Once attached,
//! `notify` only does a `try_send`; it never waits for delivery. If the
//! consumer task is gone, because the runtime shut down, messages are logged
//! and dropped.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::lock;

/// Default size of the queue between notifiers and the consumer task.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default number of messages kept while no sink is attached.
pub const DEFAULT_PENDING_CAPACITY: usize = 100;

/// Errors a sink reports for a single delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport is not reachable right now.
    #[error("transport unavailable: {0}")]
    Unavailable(String),

    /// The transport rejected the message.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Errors attaching a sink.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `attach` was called outside a tokio runtime.
    #[error("no tokio runtime is available to host the notification consumer")]
    NoRuntime,

    /// A sink is already attached; `detach` it first.
    #[error("a notification sink is already attached")]
    AlreadyAttached,
}

/// What `notify` did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Kept in the pending buffer until a sink attaches.
    Buffered,
    /// Handed to the consumer queue.
    Queued,
    /// Logged and discarded.
    Dropped,
}

/// Async consumer of notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message.
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError>;
}

/// Sink that writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        info!(target: "cadence::notifications", "{text}");
        Ok(())
    }
}

/// Cloneable, thread-safe handle for emitting notifications.
#[derive(Debug, Clone)]
pub struct Notifier {
    shared: Arc<Mutex<Shared>>,
}

#[derive(Debug)]
struct Shared {
    state: BridgeState,
    pending: VecDeque<String>,
    pending_capacity: usize,
    queue_capacity: usize,
}

#[derive(Debug)]
enum BridgeState {
    Detached,
    Attached(mpsc::Sender<String>),
}

impl Notifier {
    /// Create a detached notifier with default capacities.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY, DEFAULT_PENDING_CAPACITY)
    }

    /// Create a detached notifier with explicit queue and pending capacities.
    pub fn with_capacity(queue_capacity: usize, pending_capacity: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: BridgeState::Detached,
                pending: VecDeque::new(),
                pending_capacity: pending_capacity.max(1),
                queue_capacity: queue_capacity.max(1),
            })),
        }
    }

    /// Emit a message. Never blocks on delivery and never panics.
    pub fn notify(&self, message: impl Into<String>) -> Dispatch {
        let message = message.into();
        let mut shared = lock(&self.shared);

        let sender = match &shared.state {
            BridgeState::Detached => None,
            BridgeState::Attached(tx) => Some(tx.clone()),
        };

        let Some(tx) = sender else {
            info!(notification = %message, "no notification transport, buffering");
            shared.pending.push_back(message);
            while shared.pending.len() > shared.pending_capacity {
                if let Some(oldest) = shared.pending.pop_front() {
                    warn!(notification = %oldest, "pending notification buffer full, dropped oldest");
                }
            }
            return Dispatch::Buffered;
        };
        drop(shared);

        match tx.try_send(message) {
            Ok(()) => Dispatch::Queued,
            Err(TrySendError::Closed(message)) => {
                warn!(notification = %message, "notification consumer is gone, dropping");
                Dispatch::Dropped
            }
            Err(TrySendError::Full(message)) => {
                warn!(notification = %message, "notification queue full, dropping");
                Dispatch::Dropped
            }
        }
    }

    /// Attach a sink and spawn its consumer task on the current runtime.
    ///
    /// Pending messages are queued, in emission order, before any message
    /// emitted after this call. Only one consumer runs at a time: to replace a
    /// sink, [`detach`](Self::detach) first and await the returned handle so
    /// the old consumer drains before the new one starts.
    pub fn attach(
        &self,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<JoinHandle<()>, BridgeError> {
        let runtime = Handle::try_current().map_err(|_| BridgeError::NoRuntime)?;

        let rx = {
            let mut shared = lock(&self.shared);
            if matches!(shared.state, BridgeState::Attached(_)) {
                return Err(BridgeError::AlreadyAttached);
            }
            let capacity = shared.queue_capacity.max(shared.pending.len());
            let (tx, rx) = mpsc::channel(capacity);
            let flushed = shared.pending.len();
            for message in shared.pending.drain(..) {
                // Capacity covers the whole backlog.
                let _ = tx.try_send(message);
            }
            shared.state = BridgeState::Attached(tx);
            if flushed > 0 {
                debug!(count = flushed, "flushed pending notifications");
            }
            rx
        };

        Ok(runtime.spawn(consume(rx, sink)))
    }

    /// Detach the current sink; later messages are buffered again.
    pub fn detach(&self) {
        lock(&self.shared).state = BridgeState::Detached;
    }

    /// Whether a sink is attached.
    pub fn is_attached(&self) -> bool {
        matches!(lock(&self.shared).state, BridgeState::Attached(_))
    }

    /// Messages waiting for a sink, oldest first.
    pub fn pending(&self) -> Vec<String> {
        lock(&self.shared).pending.iter().cloned().collect()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

async fn consume(mut rx: mpsc::Receiver<String>, sink: Arc<dyn NotificationSink>) {
    while let Some(text) = rx.recv().await {
        match sink.deliver(&text).await {
            Ok(()) => debug!(notification = %text, "notification delivered"),
            Err(e) => warn!(notification = %text, error = %e, "notification delivery failed"),
        }
    }
    debug!("notification consumer stopped");
}

//! Common test utilities shared across integration tests.

use async_trait::async_trait;
use cadence::notify::DeliveryError;
use cadence::{NotificationSink, Task, from_fn};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sink that keeps every delivered message in order.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Number of delivered messages containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.contains(needle))
            .count()
    }

    /// Wait until a message containing `needle` has been delivered.
    pub async fn wait_for(&self, needle: &str, timeout: Duration) {
        wait_until(timeout, || self.count_containing(needle) > 0).await;
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.messages.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Poll `condition` every 10ms until it holds.
///
/// # Panics
///
/// Panics if the timeout is reached first.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) {
    let start = tokio::time::Instant::now();
    while !condition() {
        if start.elapsed() > timeout {
            panic!("condition not met within {:?}", timeout);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Task that waits on its stop signal for up to `duration`.
pub fn cooperative_task(duration: Duration) -> Arc<dyn Task> {
    from_fn(move |ctx| {
        if ctx.stop_signal().wait_timeout(duration) {
            return Err(cadence::TaskError::Stopped);
        }
        Ok(json!("done"))
    })
}

/// Task that sleeps for `duration` regardless of stop requests.
pub fn stubborn_task(duration: Duration) -> Arc<dyn Task> {
    from_fn(move |_| {
        std::thread::sleep(duration);
        Ok(json!("finally"))
    })
}

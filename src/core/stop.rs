//! Cooperative cancellation flag shared between the scheduler and task code.
//!
//! A [`StopSignal`] starts unset, can be set exactly once and is never reset.
//! Task functions poll it at safe points or sleep on it with
//! [`StopSignal::wait_timeout`], which returns early once a stop is requested.
//! Setting the flag never terminates a thread; it only asks the task to return.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::lock;

/// One-way stop flag, cheap to clone and safe to share across threads.
#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    label: String,
    stopped: Mutex<bool>,
    changed: Condvar,
}

impl StopSignal {
    /// Create an unset signal labelled with the execution it belongs to.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                label: label.into(),
                stopped: Mutex::new(false),
                changed: Condvar::new(),
            }),
        }
    }

    /// Name of the execution this signal was created for.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Request a stop.
    ///
    /// Returns `true` if this call set the flag, `false` if it was already set.
    pub fn request_stop(&self) -> bool {
        let mut stopped = lock(&self.inner.stopped);
        if *stopped {
            return false;
        }
        *stopped = true;
        self.inner.changed.notify_all();
        true
    }

    /// Whether a stop has been requested.
    pub fn is_stopped(&self) -> bool {
        *lock(&self.inner.stopped)
    }

    /// Block the current thread for up to `timeout`, waking early on a stop.
    ///
    /// A timeout too large to express as an instant waits until the stop.
    ///
    /// Returns whether a stop has been requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut stopped = lock(&self.inner.stopped);
        while !*stopped {
            stopped = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match self.inner.changed.wait_timeout(stopped, remaining) {
                        Ok((guard, _)) => guard,
                        Err(poisoned) => poisoned.into_inner().0,
                    }
                }
                None => match self.inner.changed.wait(stopped) {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                },
            };
        }
        *stopped
    }
}

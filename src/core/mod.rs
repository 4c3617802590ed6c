//! Core building blocks: identifiers, triggers, jobs, tasks and stop signals.

pub mod job;
pub mod stop;
pub mod task;
pub mod trigger;
pub mod types;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the guard if a panicking thread poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

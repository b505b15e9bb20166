//! Tubesync synchronization core
//!
//! Keeps a local view of the backend in step with server truth:
//! - `transport`: push channel with pull fallback feeding the job registry
//! - `registry`: job snapshots and per-kind selection
//! - `recent`: locally persisted recent downloads reconciled with saved videos
//! - `monitor`: bounded polling of server-side saves
//! - `gate`: single-flight exclusion of competing notes tasks
//! - `inference`: on-device inference provider chain with chunking and merge
//!
//! Everything is owned by one [`SessionContext`], which also owns and tears
//! down every background task.

pub mod config;
pub mod events;
pub mod gate;
pub mod inference;
pub mod monitor;
pub mod prefs;
pub mod progress;
pub mod recent;
pub mod registry;
pub mod repository;
pub mod service;
pub mod session;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::SyncConfig;
pub use events::{EventBus, SyncEvent};
pub use session::{SessionContext, SyncError};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a mutex, recovering the data if a panicking holder poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

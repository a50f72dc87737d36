// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wake handles and the channel id -> wake handle registry.
//!
//! A `WakeHandle` is the two-tier notification primitive consumers park
//! on: an atomic flag for the lock-free fast path and a condvar for idle
//! waits. Dispatchers call `NotifierRegistry::notify` after every
//! successful dispatch; an external coroutine scheduler (out of scope
//! here) resumes the parked consumer.

use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::base::channel_id::ChannelId;

/// Two-tier wake primitive: atomic flag fast path, condvar for sleeping.
#[derive(Debug)]
pub struct WakeHandle {
    data_ready: AtomicBool,
    sleeping: Mutex<bool>,
    condvar: Condvar,
}

impl WakeHandle {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            data_ready: AtomicBool::new(false),
            sleeping: Mutex::new(false),
            condvar: Condvar::new(),
        }
    }

    /// Signal that data is available. Atomic store on the hot path; the
    /// condvar is only touched when a consumer might be sleeping.
    #[inline]
    pub fn notify(&self) {
        self.data_ready.store(true, Ordering::Release);
        // Racy read is safe: worst case is one extra signal.
        if *self.sleeping.lock() {
            self.condvar.notify_one();
        }
    }

    /// Consume the ready flag without blocking.
    #[inline]
    pub fn check_and_clear(&self) -> bool {
        self.data_ready.swap(false, Ordering::Acquire)
    }

    /// Block until notified or the timeout elapses. Returns `true` when a
    /// notification was observed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.data_ready.swap(false, Ordering::Acquire) {
            return true;
        }

        let mut sleeping = self.sleeping.lock();
        if self.data_ready.swap(false, Ordering::Acquire) {
            return true;
        }

        *sleeping = true;
        let result = self.condvar.wait_for(&mut sleeping, timeout);
        *sleeping = false;

        if self.data_ready.swap(false, Ordering::Acquire) {
            !result.timed_out()
        } else {
            false
        }
    }

    #[inline]
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl Default for WakeHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps channel id -> consumer wake handles.
///
/// Registration and deregistration are rare; notification is frequent and
/// only takes the read side of the lock.
pub struct NotifierRegistry {
    handles: RwLock<HashMap<ChannelId, Vec<Arc<WakeHandle>>>>,
}

impl NotifierRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, channel_id: ChannelId, handle: Arc<WakeHandle>) {
        let mut map = self.handles.write();
        let entries = map.entry(channel_id).or_default();
        if entries.iter().any(|h| Arc::ptr_eq(h, &handle)) {
            return;
        }
        entries.push(handle);
    }

    pub fn deregister(&self, channel_id: ChannelId, handle: &Arc<WakeHandle>) {
        let mut map = self.handles.write();
        if let Some(entries) = map.get_mut(&channel_id) {
            entries.retain(|h| !Arc::ptr_eq(h, handle));
            if entries.is_empty() {
                map.remove(&channel_id);
            }
        }
    }

    /// Wake every consumer parked on `channel_id`. No-op for channels
    /// without registered handles.
    pub fn notify(&self, channel_id: ChannelId) {
        let map = self.handles.read();
        if let Some(entries) = map.get(&channel_id) {
            for handle in entries {
                handle.notify();
            }
        }
    }

    #[must_use]
    pub fn handle_count(&self, channel_id: ChannelId) -> usize {
        self.handles.read().get(&channel_id).map_or(0, Vec::len)
    }
}

impl Default for NotifierRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Thin shell binding a cache buffer to its channel id, with an optional
//! insert hook used by the fusion engine.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::base::channel_id::ChannelId;
use crate::base::identity::Identity;
use crate::data::cache_buffer::CacheBuffer;

/// Callback invoked after every successful insert with the assigned
/// sequence and the inserted value.
pub type InsertHook<T> = Arc<dyn Fn(u64, &T) + Send + Sync>;

/// One channel's buffer as seen by dispatchers and visitors.
pub struct ChannelBuffer<T> {
    channel_id: ChannelId,
    id: Identity,
    cache: Arc<CacheBuffer<T>>,
    hook: RwLock<Option<InsertHook<T>>>,
}

impl<T: Clone> ChannelBuffer<T> {
    #[must_use]
    pub fn new(channel_id: ChannelId, cache: Arc<CacheBuffer<T>>) -> Self {
        Self {
            channel_id,
            id: Identity::new(),
            cache,
            hook: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Identity of this buffer instance; dispatch registration and
    /// deregistration key on it.
    #[must_use]
    pub fn id(&self) -> &Identity {
        &self.id
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheBuffer<T>> {
        &self.cache
    }

    /// Install the fusion hook. At most one hook is active; installing a
    /// new one replaces the previous.
    pub fn set_insert_hook(&self, hook: InsertHook<T>) {
        *self.hook.write() = Some(hook);
    }

    pub fn clear_insert_hook(&self) {
        *self.hook.write() = None;
    }

    /// Insert into the cache, then run the hook outside the cache lock.
    pub fn insert(&self, value: T) -> u64 {
        let seq = self.cache.insert(value.clone());
        let hook = self.hook.read().clone();
        if let Some(hook) = hook {
            hook(seq, &value);
        }
        seq
    }

    #[must_use]
    pub fn fetch_latest(&self) -> Option<(u64, T)> {
        self.cache.fetch_latest()
    }

    #[must_use]
    pub fn fetch(&self, seq: u64) -> Option<T> {
        self.cache.fetch(seq)
    }

    #[must_use]
    pub fn fetch_at_or_after(&self, seq: &mut u64) -> Option<T> {
        self.cache.fetch_at_or_after(seq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn make_buffer() -> ChannelBuffer<u32> {
        let cache = Arc::new(CacheBuffer::new(8).expect("capacity > 0"));
        ChannelBuffer::new(42, cache)
    }

    #[test]
    fn test_insert_forwards_to_cache() {
        let buf = make_buffer();
        assert_eq!(buf.insert(7), 1);
        assert_eq!(buf.fetch_latest(), Some((1, 7)));
        assert_eq!(buf.fetch(1), Some(7));
    }

    #[test]
    fn test_hook_runs_after_insert() {
        let buf = make_buffer();
        let seen = Arc::new(AtomicU64::new(0));
        let seen_hook = Arc::clone(&seen);
        buf.set_insert_hook(Arc::new(move |seq, value| {
            seen_hook.store(seq * 1000 + u64::from(*value), Ordering::SeqCst);
        }));

        buf.insert(5);
        assert_eq!(seen.load(Ordering::SeqCst), 1005);

        buf.clear_insert_hook();
        buf.insert(9);
        assert_eq!(seen.load(Ordering::SeqCst), 1005);
    }

    #[test]
    fn test_identities_distinguish_instances() {
        let a = make_buffer();
        let b = make_buffer();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.channel_id(), b.channel_id());
    }
}

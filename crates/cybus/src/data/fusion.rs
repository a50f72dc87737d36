// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! All-latest fusion keyed by a primary channel.
//!
//! Installed as the primary channel buffer's insert hook. Every primary
//! insert with sequence S snapshots the most recent value of each
//! secondary buffer; if all secondaries have produced at least once, a
//! tuple `(primary, latest secondaries...)` is emitted into the fusion
//! buffer under sequence S. Fusion never waits: a primary arrival before
//! every secondary has produced emits nothing.
//!
//! Secondary drops simply mean the previous secondary value is reused in
//! later tuples; that is the documented semantics, not an error.

use std::sync::Arc;

use crate::data::cache_buffer::CacheBuffer;
use crate::data::channel_buffer::ChannelBuffer;
use crate::error::Result;

/// An N-message record keyed by the primary channel's sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedTuple<T> {
    msgs: Vec<T>,
}

impl<T> FusedTuple<T> {
    #[must_use]
    pub fn new(msgs: Vec<T>) -> Self {
        Self { msgs }
    }

    /// The primary channel's message (input index 0).
    #[must_use]
    pub fn primary(&self) -> &T {
        &self.msgs[0]
    }

    /// Message of input `index` (0 = primary).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.msgs.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.msgs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.msgs.is_empty()
    }

    #[must_use]
    pub fn into_messages(self) -> Vec<T> {
        self.msgs
    }
}

/// Fusion engine: primary hook + internal fusion buffer.
pub struct AllLatest<T: Clone> {
    fusion_buffer: Arc<CacheBuffer<FusedTuple<T>>>,
}

impl<T: Clone + Send + Sync + 'static> AllLatest<T> {
    /// Wire the engine onto `primary`, fusing against `secondaries`.
    ///
    /// The fusion buffer is sized to the primary buffer's depth, so a
    /// consumer slower than the producer observes skipped tuples rather
    /// than unbounded growth.
    ///
    /// # Errors
    ///
    /// Propagates fusion buffer construction failure.
    pub fn new(
        primary: &Arc<ChannelBuffer<T>>,
        secondaries: Vec<Arc<ChannelBuffer<T>>>,
    ) -> Result<Self> {
        let fusion_buffer = Arc::new(CacheBuffer::new(primary.cache().capacity())?);

        let hook_buffer = Arc::clone(&fusion_buffer);
        let hook_secondaries = secondaries;
        primary.set_insert_hook(Arc::new(move |seq, value: &T| {
            let mut msgs = Vec::with_capacity(1 + hook_secondaries.len());
            msgs.push(value.clone());
            for secondary in &hook_secondaries {
                match secondary.fetch_latest() {
                    Some((_, latest)) => msgs.push(latest),
                    // Not every input has produced yet: emit nothing.
                    None => return,
                }
            }
            if !hook_buffer.insert_at(seq, FusedTuple::new(msgs)) {
                log::debug!("[AllLatest] dropped out-of-order fusion insert seq={}", seq);
            }
        }));

        Ok(Self { fusion_buffer })
    }

    /// Oldest fusion tuple with sequence >= `*seq`; writes back the actual
    /// sequence on a hit.
    #[must_use]
    pub fn fetch(&self, seq: &mut u64) -> Option<FusedTuple<T>> {
        self.fusion_buffer.fetch_at_or_after(seq)
    }

    #[must_use]
    pub fn fusion_buffer(&self) -> &Arc<CacheBuffer<FusedTuple<T>>> {
        &self.fusion_buffer
    }
}

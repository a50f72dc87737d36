// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Data visitor: the consumer edge over 1..=4 input channels.
//!
//! A visitor owns one channel buffer per input, registers each with every
//! transport dispatcher, and (for more than one input) wires an
//! [`AllLatest`] engine onto the primary. `try_fetch` hands back the next
//! fused tuple; the single-input form reads the primary buffer directly.
//!
//! The visitor is a single-consumer object: one task advances the
//! `next_seq` cursor. Producers on any thread are fine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::base::channel_id::ChannelId;
use crate::config::MAX_VISITOR_INPUTS;
use crate::data::cache_buffer::CacheBuffer;
use crate::data::channel_buffer::ChannelBuffer;
use crate::data::fusion::{AllLatest, FusedTuple};
use crate::data::notifier::WakeHandle;
use crate::error::{Error, Result};
use crate::transport::message::MessagePtr;
use crate::transport::Transport;

/// Per-input configuration: which channel, how deep a buffer.
#[derive(Clone, Copy, Debug)]
pub struct VisitorConfig {
    pub channel_id: ChannelId,
    pub queue_size: usize,
}

impl VisitorConfig {
    #[must_use]
    pub fn new(channel_id: ChannelId, queue_size: usize) -> Self {
        Self {
            channel_id,
            queue_size,
        }
    }

    /// Config derived from an endpoint's role attributes: the channel it
    /// speaks, buffered to its QoS history depth.
    #[must_use]
    pub fn from_attributes(attr: &crate::base::role::RoleAttributes) -> Self {
        Self {
            channel_id: attr.channel_id,
            queue_size: attr.qos.depth as usize,
        }
    }
}

/// Synchronized consumer over up to four input channels.
pub struct DataVisitor {
    transport: Arc<Transport>,
    buffers: Vec<Arc<ChannelBuffer<MessagePtr>>>,
    fusion: Option<AllLatest<MessagePtr>>,
    next_seq: AtomicU64,
    wake: Arc<WakeHandle>,
}

impl DataVisitor {
    /// Build a visitor over `configs` (index 0 is the primary input).
    ///
    /// Every input's channel buffer is registered with all three transport
    /// dispatchers; the wake handle is registered under the primary
    /// channel id.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidVisitorArity` when `configs` is empty or has
    /// more than four entries, and propagates buffer construction errors
    /// (zero queue size).
    pub fn new(transport: Arc<Transport>, configs: &[VisitorConfig]) -> Result<Self> {
        if configs.is_empty() || configs.len() > MAX_VISITOR_INPUTS {
            return Err(Error::InvalidVisitorArity(configs.len()));
        }

        let mut buffers = Vec::with_capacity(configs.len());
        for config in configs {
            let cache = Arc::new(CacheBuffer::new(config.queue_size)?);
            buffers.push(Arc::new(ChannelBuffer::new(config.channel_id, cache)));
        }

        let fusion = if buffers.len() > 1 {
            Some(AllLatest::new(&buffers[0], buffers[1..].to_vec())?)
        } else {
            None
        };

        let mut registered = 0usize;
        for buffer in &buffers {
            if let Err(e) = transport.register_channel_buffer(buffer) {
                for done in &buffers[..registered] {
                    transport.deregister_channel_buffer(done.channel_id(), done.id());
                }
                return Err(e);
            }
            registered += 1;
        }
        let wake = WakeHandle::shared();
        transport
            .notifier_registry()
            .register(buffers[0].channel_id(), Arc::clone(&wake));

        Ok(Self {
            transport,
            buffers,
            fusion,
            next_seq: AtomicU64::new(1),
            wake,
        })
    }

    /// Fetch the next fused tuple if one is available, advancing the
    /// cursor on success. Empty after shutdown.
    #[must_use]
    pub fn try_fetch(&self) -> Option<FusedTuple<MessagePtr>> {
        if self.transport.is_shutdown() {
            return None;
        }

        let mut seq = self.next_seq.load(Ordering::Acquire);
        let result = match &self.fusion {
            Some(fusion) => fusion.fetch(&mut seq),
            None => self.buffers[0]
                .fetch_at_or_after(&mut seq)
                .map(|msg| FusedTuple::new(vec![msg])),
        };
        if result.is_some() {
            self.next_seq.store(seq + 1, Ordering::Release);
        }
        result
    }

    /// Park until the primary channel signals new data or the timeout
    /// expires. Returns `true` when woken by a notification.
    #[must_use]
    pub fn wait_for_data(&self, timeout: Duration) -> bool {
        self.wake.wait_timeout(timeout)
    }

    /// The wake handle consumers (or a coroutine scheduler) can park on.
    #[must_use]
    pub fn wake_handle(&self) -> &Arc<WakeHandle> {
        &self.wake
    }

    /// Channel id of the primary input.
    #[must_use]
    pub fn primary_channel_id(&self) -> ChannelId {
        self.buffers[0].channel_id()
    }

    #[must_use]
    pub fn input_count(&self) -> usize {
        self.buffers.len()
    }
}

impl Drop for DataVisitor {
    fn drop(&mut self) {
        self.buffers[0].clear_insert_hook();
        self.transport
            .notifier_registry()
            .deregister(self.buffers[0].channel_id(), &self.wake);
        for buffer in &self.buffers {
            self.transport
                .deregister_channel_buffer(buffer.channel_id(), buffer.id());
        }
    }
}

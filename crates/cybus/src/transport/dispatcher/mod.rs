// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-transport dispatch: channel id -> registered channel buffers and
//! direct listeners.
//!
//! One `Dispatcher` type serves all three transports; the facade owns an
//! instance per transport plus the shm/rtps front-ends that feed them.
//! Dispatch takes only the read side of the subscriber lock (registration
//! is rare, dispatch is the hot path), inserts into every registered
//! buffer, invokes direct listeners with panic isolation, then wakes
//! consumers through the notifier registry.

mod shm;

pub use shm::ShmDispatcher;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::base::channel_id::ChannelId;
use crate::base::identity::Identity;
use crate::data::channel_buffer::ChannelBuffer;
use crate::data::notifier::NotifierRegistry;
use crate::transport::message::MessagePtr;
use crate::transport::metrics::global_metrics;

/// Callback receiving every message dispatched on a channel.
pub type MessageListener = Arc<dyn Fn(&MessagePtr) + Send + Sync>;

#[derive(Default)]
struct ChannelSubscribers {
    buffers: Vec<Arc<ChannelBuffer<MessagePtr>>>,
    listeners: Vec<(Identity, MessageListener)>,
}

impl ChannelSubscribers {
    fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.listeners.is_empty()
    }
}

/// Routes arriving messages into every subscriber of their channel.
pub struct Dispatcher {
    name: &'static str,
    channels: RwLock<HashMap<ChannelId, ChannelSubscribers>>,
    notifiers: Arc<NotifierRegistry>,
    is_shutdown: AtomicBool,
}

impl Dispatcher {
    #[must_use]
    pub fn new(name: &'static str, notifiers: Arc<NotifierRegistry>) -> Arc<Self> {
        Arc::new(Self {
            name,
            channels: RwLock::new(HashMap::new()),
            notifiers,
            is_shutdown: AtomicBool::new(false),
        })
    }

    /// Register a channel buffer. Idempotent on (channel id, buffer
    /// identity).
    pub fn add_buffer(&self, buffer: Arc<ChannelBuffer<MessagePtr>>) {
        let mut channels = self.channels.write();
        let entry = channels.entry(buffer.channel_id()).or_default();
        if entry.buffers.iter().any(|b| b.id() == buffer.id()) {
            return;
        }
        log::debug!(
            "[{}] add_buffer channel={:#018x} buffers={}",
            self.name,
            buffer.channel_id(),
            entry.buffers.len() + 1
        );
        entry.buffers.push(buffer);
    }

    /// Remove a buffer by identity; eager, the entry disappears when the
    /// channel has no subscribers left.
    pub fn remove_buffer(&self, channel_id: ChannelId, id: &Identity) {
        let mut channels = self.channels.write();
        if let Some(entry) = channels.get_mut(&channel_id) {
            entry.buffers.retain(|b| b.id() != id);
            if entry.is_empty() {
                channels.remove(&channel_id);
            }
        }
    }

    /// Register a direct listener. Idempotent on (channel id, identity).
    pub fn add_listener(&self, channel_id: ChannelId, id: Identity, listener: MessageListener) {
        let mut channels = self.channels.write();
        let entry = channels.entry(channel_id).or_default();
        if entry.listeners.iter().any(|(existing, _)| *existing == id) {
            return;
        }
        entry.listeners.push((id, listener));
    }

    pub fn remove_listener(&self, channel_id: ChannelId, id: &Identity) {
        let mut channels = self.channels.write();
        if let Some(entry) = channels.get_mut(&channel_id) {
            entry.listeners.retain(|(existing, _)| existing != id);
            if entry.is_empty() {
                channels.remove(&channel_id);
            }
        }
    }

    /// Route one message: insert into every registered buffer, invoke the
    /// listeners (panics isolated), then wake consumers. Messages for
    /// channels without subscribers are dropped silently.
    pub fn dispatch(&self, msg: &MessagePtr) {
        if self.is_shutdown.load(Ordering::Acquire) {
            return;
        }
        let channel_id = msg.channel_id();
        {
            let channels = self.channels.read();
            let Some(entry) = channels.get(&channel_id) else {
                global_metrics().inc_dispatch_unknown_channel();
                log::trace!(
                    "[{}] no subscribers for channel {:#018x}, dropped",
                    self.name,
                    channel_id
                );
                return;
            };

            for buffer in &entry.buffers {
                buffer.insert(Arc::clone(msg));
            }
            for (_, listener) in &entry.listeners {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    listener(msg);
                }));
                if result.is_err() {
                    log::debug!(
                        "[{}] listener panicked on channel {:#018x}",
                        self.name,
                        channel_id
                    );
                }
            }
        }
        self.notifiers.notify(channel_id);
    }

    #[must_use]
    pub fn has_subscribers(&self, channel_id: ChannelId) -> bool {
        self.channels.read().contains_key(&channel_id)
    }

    #[must_use]
    pub fn notifier_registry(&self) -> &Arc<NotifierRegistry> {
        &self.notifiers
    }

    pub fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::Release);
    }
}

// Rtps front-end lives here; it is a thin bridge, unlike the shm side
// with its listener thread.

use dashmap::DashMap;

use crate::transport::message::Message;
use crate::transport::rtps::Participant;

/// Bridges datagram subscriber callbacks into a [`Dispatcher`].
pub struct RtpsDispatcher {
    dispatcher: Arc<Dispatcher>,
    participant: Arc<Participant>,
    bridges: DashMap<ChannelId, Identity>,
}

impl RtpsDispatcher {
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, participant: Arc<Participant>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            participant,
            bridges: DashMap::new(),
        })
    }

    /// Subscribe the channel on the datagram transport, once.
    pub fn ensure_channel(&self, channel_id: ChannelId) {
        if self.bridges.contains_key(&channel_id) {
            return;
        }
        let subscription_id = Identity::new();
        let dispatcher = Arc::clone(&self.dispatcher);
        self.participant.subscribe(
            channel_id,
            subscription_id,
            Arc::new(move |channel, _seq, type_name, payload| {
                let msg = Message::new(channel, type_name, payload);
                dispatcher.dispatch(&msg);
            }),
        );
        self.bridges.insert(channel_id, subscription_id);
    }

    /// Drop the datagram subscription for a channel.
    pub fn release_channel(&self, channel_id: ChannelId) {
        if let Some((_, subscription_id)) = self.bridges.remove(&channel_id) {
            self.participant.unsubscribe(channel_id, &subscription_id);
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn shutdown(&self) {
        for entry in self.bridges.iter() {
            self.participant.unsubscribe(*entry.key(), entry.value());
        }
        self.bridges.clear();
        self.dispatcher.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::cache_buffer::CacheBuffer;
    use std::sync::atomic::AtomicUsize;

    fn make_dispatcher() -> Arc<Dispatcher> {
        Dispatcher::new("TestDispatcher", Arc::new(NotifierRegistry::new()))
    }

    fn make_buffer(channel_id: ChannelId) -> Arc<ChannelBuffer<MessagePtr>> {
        Arc::new(ChannelBuffer::new(
            channel_id,
            Arc::new(CacheBuffer::new(8).expect("capacity > 0")),
        ))
    }

    #[test]
    fn test_dispatch_inserts_into_registered_buffers() {
        let dispatcher = make_dispatcher();
        let buffer = make_buffer(5);
        dispatcher.add_buffer(Arc::clone(&buffer));

        let msg = Message::new(5, "bytes", vec![1, 2, 3]);
        dispatcher.dispatch(&msg);

        let (seq, received) = buffer.fetch_latest().expect("message dispatched");
        assert_eq!(seq, 1);
        assert_eq!(received.payload(), &[1, 2, 3]);
    }

    #[test]
    fn test_dispatch_unknown_channel_drops() {
        let dispatcher = make_dispatcher();
        let before = global_metrics().dispatch_unknown_channel();
        dispatcher.dispatch(&Message::new(999, "bytes", vec![]));
        // Strictly greater: the counter is process-global and other tests
        // may bump it concurrently.
        assert!(global_metrics().dispatch_unknown_channel() > before);
    }

    #[test]
    fn test_registration_idempotent() {
        let dispatcher = make_dispatcher();
        let buffer = make_buffer(5);
        dispatcher.add_buffer(Arc::clone(&buffer));
        dispatcher.add_buffer(Arc::clone(&buffer));

        dispatcher.dispatch(&Message::new(5, "bytes", vec![7]));
        // Inserted exactly once despite the duplicate registration.
        assert_eq!(buffer.cache().head_seq(), 1);
    }

    #[test]
    fn test_deregistration_stops_inserts() {
        let dispatcher = make_dispatcher();
        let buffer = make_buffer(5);
        dispatcher.add_buffer(Arc::clone(&buffer));
        dispatcher.dispatch(&Message::new(5, "bytes", vec![1]));

        dispatcher.remove_buffer(5, buffer.id());
        dispatcher.dispatch(&Message::new(5, "bytes", vec![2]));
        assert_eq!(buffer.cache().head_seq(), 1);
        assert!(!dispatcher.has_subscribers(5));
    }

    #[test]
    fn test_listeners_invoked_with_panic_isolation() {
        let dispatcher = make_dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));

        let panicking_id = Identity::new();
        dispatcher.add_listener(
            7,
            panicking_id,
            Arc::new(|_msg| panic!("listener failure")),
        );
        let counting_id = Identity::new();
        let counting = Arc::clone(&calls);
        dispatcher.add_listener(
            7,
            counting_id,
            Arc::new(move |_msg| {
                counting.fetch_add(1, Ordering::SeqCst);
            }),
        );

        dispatcher.dispatch(&Message::new(7, "bytes", vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispatch_notifies_registry() {
        let registry = Arc::new(NotifierRegistry::new());
        let dispatcher = Dispatcher::new("TestDispatcher", Arc::clone(&registry));
        let buffer = make_buffer(11);
        dispatcher.add_buffer(buffer);

        let wake = crate::data::notifier::WakeHandle::shared();
        registry.register(11, Arc::clone(&wake));

        dispatcher.dispatch(&Message::new(11, "bytes", vec![]));
        assert!(wake.check_and_clear());
    }

    #[test]
    fn test_shutdown_stops_dispatch() {
        let dispatcher = make_dispatcher();
        let buffer = make_buffer(5);
        dispatcher.add_buffer(Arc::clone(&buffer));
        dispatcher.shutdown();
        dispatcher.dispatch(&Message::new(5, "bytes", vec![1]));
        assert!(buffer.fetch_latest().is_none());
    }
}

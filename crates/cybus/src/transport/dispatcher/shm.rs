// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shm dispatch front-end: the listener thread.
//!
//! Blocks on the process-universe notifier with a timeout, re-checking
//! the shutdown flag between waits. Each received descriptor is resolved
//! against the attached channel segments, the block is copied out, the
//! envelope rebuilt and handed to the inner dispatcher. Descriptors for
//! channels this process is not attached to are ignored (another process
//! on the host wants them).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::base::channel_id::ChannelId;
use crate::config::{shm_segment_name, SHM_BLOCK_COUNT, SHM_BLOCK_SIZE, SHM_LISTEN_TIMEOUT};
use crate::transport::dispatcher::Dispatcher;
use crate::transport::message::Message;
use crate::transport::shm::{decode_block_frame, Notifier, ReadableDesc, Segment};

/// Shm dispatcher: inner dispatcher + notifier listener thread + attached
/// segments.
pub struct ShmDispatcher {
    dispatcher: Arc<Dispatcher>,
    notifier: Arc<dyn Notifier>,
    segments: Arc<DashMap<ChannelId, Arc<Segment>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    is_shutdown: Arc<AtomicBool>,
}

impl ShmDispatcher {
    /// Start the listener thread over `notifier`.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        let segments: Arc<DashMap<ChannelId, Arc<Segment>>> = Arc::new(DashMap::new());
        let is_shutdown = Arc::new(AtomicBool::new(false));

        let thread_dispatcher = Arc::clone(&dispatcher);
        let thread_notifier = Arc::clone(&notifier);
        let thread_segments = Arc::clone(&segments);
        let thread_shutdown = Arc::clone(&is_shutdown);
        let listener = std::thread::Builder::new()
            .name("cybus-shm-listen".to_string())
            .spawn(move || {
                listen_loop(
                    &thread_dispatcher,
                    thread_notifier.as_ref(),
                    &thread_segments,
                    &thread_shutdown,
                );
            })
            .ok();
        if listener.is_none() {
            log::debug!("[ShmDispatcher] failed to spawn listener thread");
        }

        Arc::new(Self {
            dispatcher,
            notifier,
            segments,
            listener: Mutex::new(listener),
            is_shutdown,
        })
    }

    /// Map the channel's segment into this process so its descriptors can
    /// be resolved. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates segment mapping failures.
    pub fn attach_channel(&self, channel_id: ChannelId) -> crate::error::Result<()> {
        if self.segments.contains_key(&channel_id) {
            return Ok(());
        }
        let segment = Segment::open_or_create(
            &shm_segment_name(channel_id),
            SHM_BLOCK_COUNT,
            SHM_BLOCK_SIZE,
        )?;
        self.segments.insert(channel_id, Arc::new(segment));
        Ok(())
    }

    /// Forget a channel's segment; descriptors for it are ignored again.
    pub fn detach_channel(&self, channel_id: ChannelId) {
        self.segments.remove(&channel_id);
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Stop the listener thread and the inner dispatcher. Idempotent.
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.notifier.shutdown();
        if let Some(handle) = self.listener.lock().take() {
            if handle.join().is_err() {
                log::debug!("[ShmDispatcher] listener thread panicked");
            }
        }
        self.dispatcher.shutdown();
    }
}

fn listen_loop(
    dispatcher: &Arc<Dispatcher>,
    notifier: &dyn Notifier,
    segments: &DashMap<ChannelId, Arc<Segment>>,
    is_shutdown: &AtomicBool,
) {
    while !is_shutdown.load(Ordering::Acquire) {
        let Some(desc) = notifier.listen(SHM_LISTEN_TIMEOUT) else {
            continue;
        };
        handle_descriptor(dispatcher, segments, &desc);
    }
}

fn handle_descriptor(
    dispatcher: &Arc<Dispatcher>,
    segments: &DashMap<ChannelId, Arc<Segment>>,
    desc: &ReadableDesc,
) {
    let Some(segment) = segments.get(&desc.channel_id).map(|s| Arc::clone(s.value())) else {
        return;
    };
    let Some(block) = segment.read_block(desc.block_index, desc.length) else {
        // Block recycled before we got to it: the reader was too slow.
        log::debug!(
            "[ShmDispatcher] stale descriptor channel={:#018x} block={}",
            desc.channel_id,
            desc.block_index
        );
        return;
    };
    let Some((type_name, payload)) = decode_block_frame(&block) else {
        log::debug!(
            "[ShmDispatcher] malformed block channel={:#018x} block={}",
            desc.channel_id,
            desc.block_index
        );
        return;
    };
    let msg = Message::new(desc.channel_id, type_name, payload);
    dispatcher.dispatch(&msg);
}

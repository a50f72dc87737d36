// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory transmitter: block write plus notifier signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::config::{shm_segment_name, SHM_BLOCK_COUNT, SHM_BLOCK_SIZE};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::message::MessagePtr;
use crate::transport::metrics::global_metrics;
use crate::transport::shm::{encode_block_frame, Notifier, ReadableDesc, Segment};
use crate::transport::transmitter::Transmitter;

/// Segment-writing transmitter.
pub struct ShmTransmitter {
    attr: RoleAttributes,
    enabled: AtomicBool,
    segment: RwLock<Option<Arc<Segment>>>,
    notifier: Arc<dyn Notifier>,
    topology: Option<Arc<TopologyManager>>,
}

impl ShmTransmitter {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        notifier: Arc<dyn Notifier>,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            segment: RwLock::new(None),
            notifier,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid transmitter: no topology role of its own.
    pub(crate) fn detached(attr: RoleAttributes, notifier: Arc<dyn Notifier>) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            segment: RwLock::new(None),
            notifier,
            topology: None,
        })
    }
}

impl Endpoint for ShmTransmitter {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Transmitter for ShmTransmitter {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let segment = match Segment::open_or_create(
            &shm_segment_name(self.attr.channel_id),
            SHM_BLOCK_COUNT,
            SHM_BLOCK_SIZE,
        ) {
            Ok(segment) => segment,
            Err(e) => {
                self.enabled.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        *self.segment.write() = Some(Arc::new(segment));
        if let Some(topology) = &self.topology {
            topology.join(&self.attr, RoleType::Writer);
        }
        Ok(())
    }

    fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.segment.write() = None;
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Writer);
        }
    }

    fn transmit(&self, msg: &MessagePtr) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }
        let segment = match self.segment.read().clone() {
            Some(segment) => segment,
            None => return false,
        };

        let block = encode_block_frame(msg.type_name(), msg.payload());
        match segment.write_block(&block) {
            Ok(index) => {
                let desc = ReadableDesc::new(self.attr.channel_id, index, block.len() as u32);
                if !self.notifier.notify(&desc) {
                    global_metrics().inc_notify_failures();
                }
                true
            }
            Err(e) => {
                // Segment full or payload oversized: drop and count.
                global_metrics().inc_shm_drops();
                log::debug!(
                    "[ShmTransmitter] dropped message on {:#018x}: {}",
                    self.attr.channel_id,
                    e
                );
                false
            }
        }
    }
}

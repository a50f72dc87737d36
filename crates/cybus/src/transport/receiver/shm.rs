// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory receiver: attaches the channel segment and listens on
//! the shm dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::dispatcher::{MessageListener, ShmDispatcher};
use crate::transport::receiver::Receiver;

/// Segment-reading receiver.
pub struct ShmReceiver {
    attr: RoleAttributes,
    enabled: AtomicBool,
    shm_dispatcher: Arc<ShmDispatcher>,
    listener: MessageListener,
    topology: Option<Arc<TopologyManager>>,
}

impl ShmReceiver {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        shm_dispatcher: Arc<ShmDispatcher>,
        listener: MessageListener,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            shm_dispatcher,
            listener,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid receiver: no topology role of its own.
    pub(crate) fn detached(
        attr: RoleAttributes,
        shm_dispatcher: Arc<ShmDispatcher>,
        listener: MessageListener,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            shm_dispatcher,
            listener,
            topology: None,
        })
    }
}

impl Endpoint for ShmReceiver {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Receiver for ShmReceiver {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Err(e) = self.shm_dispatcher.attach_channel(self.attr.channel_id) {
            self.enabled.store(false, Ordering::Release);
            return Err(e);
        }
        self.shm_dispatcher.dispatcher().add_listener(
            self.attr.channel_id,
            self.attr.id,
            Arc::clone(&self.listener),
        );
        if let Some(topology) = &self.topology {
            topology.join(&self.attr, RoleType::Reader);
        }
        Ok(())
    }

    fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        // The segment stays mapped: other endpoints in this process may
        // still be attached to the channel.
        self.shm_dispatcher
            .dispatcher()
            .remove_listener(self.attr.channel_id, &self.attr.id);
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Reader);
        }
    }
}

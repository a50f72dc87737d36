// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram transmitter: hands payloads to a per-channel publisher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::message::MessagePtr;
use crate::transport::rtps::{Participant, RtpsPublisher};
use crate::transport::transmitter::Transmitter;

/// Cross-host transmitter.
pub struct RtpsTransmitter {
    attr: RoleAttributes,
    enabled: AtomicBool,
    publisher: RwLock<Option<Arc<RtpsPublisher>>>,
    participant: Arc<Participant>,
    topology: Option<Arc<TopologyManager>>,
}

impl RtpsTransmitter {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        participant: Arc<Participant>,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            publisher: RwLock::new(None),
            participant,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid transmitter: no topology role of its own.
    pub(crate) fn detached(attr: RoleAttributes, participant: Arc<Participant>) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            publisher: RwLock::new(None),
            participant,
            topology: None,
        })
    }
}

impl Endpoint for RtpsTransmitter {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Transmitter for RtpsTransmitter {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let publisher = self
            .participant
            .create_publisher(self.attr.channel_id, &self.attr.message_type);
        *self.publisher.write() = Some(Arc::new(publisher));
        if let Some(topology) = &self.topology {
            topology.join(&self.attr, RoleType::Writer);
        }
        Ok(())
    }

    fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        *self.publisher.write() = None;
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Writer);
        }
    }

    fn transmit(&self, msg: &MessagePtr) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }
        let publisher = match self.publisher.read().clone() {
            Some(publisher) => publisher,
            None => return false,
        };
        publisher.publish(msg.payload())
    }
}

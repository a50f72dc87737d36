// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram receiver: bridges the channel's subscriber callback into the
//! rtps dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::dispatcher::{MessageListener, RtpsDispatcher};
use crate::transport::receiver::Receiver;

/// Cross-host receiver.
pub struct RtpsReceiver {
    attr: RoleAttributes,
    enabled: AtomicBool,
    rtps_dispatcher: Arc<RtpsDispatcher>,
    listener: MessageListener,
    topology: Option<Arc<TopologyManager>>,
}

impl RtpsReceiver {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        rtps_dispatcher: Arc<RtpsDispatcher>,
        listener: MessageListener,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            rtps_dispatcher,
            listener,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid receiver: no topology role of its own.
    pub(crate) fn detached(
        attr: RoleAttributes,
        rtps_dispatcher: Arc<RtpsDispatcher>,
        listener: MessageListener,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            rtps_dispatcher,
            listener,
            topology: None,
        })
    }
}

impl Endpoint for RtpsReceiver {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Receiver for RtpsReceiver {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.rtps_dispatcher.ensure_channel(self.attr.channel_id);
        self.rtps_dispatcher.dispatcher().add_listener(
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
        self.rtps_dispatcher
            .dispatcher()
            .remove_listener(self.attr.channel_id, &self.attr.id);
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Reader);
        }
    }
}

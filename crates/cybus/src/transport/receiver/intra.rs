// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process receiver: a listener on the intra dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::dispatcher::{Dispatcher, MessageListener};
use crate::transport::receiver::Receiver;

/// Pointer-passing receiver.
pub struct IntraReceiver {
    attr: RoleAttributes,
    enabled: AtomicBool,
    dispatcher: Arc<Dispatcher>,
    listener: MessageListener,
    topology: Option<Arc<TopologyManager>>,
}

impl IntraReceiver {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        dispatcher: Arc<Dispatcher>,
        listener: MessageListener,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            dispatcher,
            listener,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid receiver: no topology role of its own.
    pub(crate) fn detached(
        attr: RoleAttributes,
        dispatcher: Arc<Dispatcher>,
        listener: MessageListener,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            dispatcher,
            listener,
            topology: None,
        })
    }
}

impl Endpoint for IntraReceiver {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Receiver for IntraReceiver {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.dispatcher.add_listener(
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
        self.dispatcher
            .remove_listener(self.attr.channel_id, &self.attr.id);
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Reader);
        }
    }
}

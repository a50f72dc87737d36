// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transmitter: hands the message pointer straight to the
//! intra dispatcher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, RoleAttributes};
use crate::error::Result;
use crate::topology::{RoleType, TopologyManager};
use crate::transport::dispatcher::Dispatcher;
use crate::transport::message::MessagePtr;
use crate::transport::transmitter::Transmitter;

/// Pointer-passing transmitter.
pub struct IntraTransmitter {
    attr: RoleAttributes,
    enabled: AtomicBool,
    dispatcher: Arc<Dispatcher>,
    topology: Option<Arc<TopologyManager>>,
}

impl IntraTransmitter {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        dispatcher: Arc<Dispatcher>,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            dispatcher,
            topology: Some(topology),
        })
    }

    /// Variant owned by a hybrid transmitter: no topology role of its own.
    pub(crate) fn detached(attr: RoleAttributes, dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            attr,
            enabled: AtomicBool::new(false),
            dispatcher,
            topology: None,
        })
    }
}

impl Endpoint for IntraTransmitter {
    fn id(&self) -> &Identity {
        &self.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.attr
    }
}

impl Transmitter for IntraTransmitter {
    fn enable(&self) -> Result<()> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(topology) = &self.topology {
            topology.join(&self.attr, RoleType::Writer);
        }
        Ok(())
    }

    fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(topology) = &self.topology {
            topology.leave(&self.attr, RoleType::Writer);
        }
    }

    fn transmit(&self, msg: &MessagePtr) -> bool {
        if !self.enabled.load(Ordering::Acquire) {
            return false;
        }
        self.dispatcher.dispatch(msg);
        true
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process context: the one explicitly-constructed home for the topology
//! manager and transport facade.
//!
//! There are no hidden singletons; a process builds its context once at
//! startup and threads it to whoever needs it. `ProcessContext::global()`
//! exists for embedders that want process-wide access, and only ever
//! hands out what `init_global` installed.

use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::topology::TopologyManager;
use crate::transport::{Transport, TransportConfig};

static GLOBAL: OnceLock<Arc<ProcessContext>> = OnceLock::new();

/// Everything a process needs to move messages.
pub struct ProcessContext {
    topology: Arc<TopologyManager>,
    transport: Arc<Transport>,
}

impl ProcessContext {
    /// Build a context: topology manager (with its discovery participant)
    /// plus the transport facade.
    ///
    /// # Errors
    ///
    /// Surfaces participant and notifier construction failures.
    pub fn new(config: TransportConfig) -> Result<Arc<Self>> {
        let topology = TopologyManager::new();
        topology.init()?;
        let transport = match Transport::new(Arc::clone(&topology), config) {
            Ok(transport) => transport,
            Err(e) => {
                topology.shutdown();
                return Err(e);
            }
        };
        Ok(Arc::new(Self {
            topology,
            transport,
        }))
    }

    /// Install a context as the process-wide one.
    ///
    /// # Errors
    ///
    /// `Error::AlreadyInitialized` when a global context exists.
    pub fn init_global(config: TransportConfig) -> Result<Arc<Self>> {
        let context = Self::new(config)?;
        match GLOBAL.set(Arc::clone(&context)) {
            Ok(()) => Ok(context),
            Err(_) => {
                context.shutdown();
                Err(Error::AlreadyInitialized)
            }
        }
    }

    /// The installed process-wide context, if any.
    #[must_use]
    pub fn global() -> Option<Arc<Self>> {
        GLOBAL.get().cloned()
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Tear down transport first, then topology. Idempotent.
    pub fn shutdown(&self) {
        self.transport.shutdown();
        self.topology.shutdown();
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hybrid receiver: enables the intra/shm/rtps legs according to the
//! localities of the channel's known writers.
//!
//! Symmetric to the hybrid transmitter: a same-process writer reaches us
//! over intra, a same-host writer over shm, a remote writer over rtps.
//! Legs whose locality disappears are disabled again so a message never
//! arrives through a transport nobody is sending on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, Locality, RoleAttributes};
use crate::error::Result;
use crate::topology::{ChangeMsg, ChangeType, ListenerHandle, OperateType, RoleType, TopologyManager};
use crate::transport::dispatcher::{Dispatcher, MessageListener, RtpsDispatcher, ShmDispatcher};
use crate::transport::receiver::{IntraReceiver, Receiver, RtpsReceiver, ShmReceiver};

struct HybridState {
    /// Known writer roles of this channel, keyed by identity hash.
    writers: HashMap<u64, RoleAttributes>,
    intra: Option<Arc<IntraReceiver>>,
    shm: Option<Arc<ShmReceiver>>,
    rtps: Option<Arc<RtpsReceiver>>,
}

struct HybridCore {
    attr: RoleAttributes,
    enabled: AtomicBool,
    topology: Arc<TopologyManager>,
    intra_dispatcher: Arc<Dispatcher>,
    shm_dispatcher: Arc<ShmDispatcher>,
    rtps_dispatcher: Arc<RtpsDispatcher>,
    listener: MessageListener,
    state: Mutex<HybridState>,
    change_listener: Mutex<Option<ListenerHandle>>,
}

/// Locality-selecting receiver.
pub struct HybridReceiver {
    core: Arc<HybridCore>,
}

impl HybridReceiver {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        intra_dispatcher: Arc<Dispatcher>,
        shm_dispatcher: Arc<ShmDispatcher>,
        rtps_dispatcher: Arc<RtpsDispatcher>,
        listener: MessageListener,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(HybridCore {
                attr,
                enabled: AtomicBool::new(false),
                topology,
                intra_dispatcher,
                shm_dispatcher,
                rtps_dispatcher,
                listener,
                state: Mutex::new(HybridState {
                    writers: HashMap::new(),
                    intra: None,
                    shm: None,
                    rtps: None,
                }),
                change_listener: Mutex::new(None),
            }),
        })
    }

    /// Legs currently enabled, for introspection and tests:
    /// (intra, shm, rtps).
    #[must_use]
    pub fn enabled_transports(&self) -> (bool, bool, bool) {
        let state = self.core.state.lock();
        (
            state.intra.is_some(),
            state.shm.is_some(),
            state.rtps.is_some(),
        )
    }
}

impl HybridCore {
    fn on_change(&self, msg: &ChangeMsg) {
        if !self.enabled.load(Ordering::Acquire) {
            return;
        }
        match msg.change_type {
            ChangeType::Channel => {
                if msg.role_type != RoleType::Writer
                    || msg.role_attr.channel_id != self.attr.channel_id
                {
                    return;
                }
                let mut state = self.state.lock();
                match msg.operate_type {
                    OperateType::Join => {
                        state
                            .writers
                            .insert(msg.role_attr.id.hash_value(), msg.role_attr.clone());
                    }
                    OperateType::Leave => {
                        state.writers.remove(&msg.role_attr.id.hash_value());
                    }
                }
                self.recompute(&mut state);
            }
            ChangeType::Participant => {
                if msg.operate_type != OperateType::Leave {
                    return;
                }
                let host = &msg.role_attr.host_name;
                let pid = msg.role_attr.process_id;
                let mut state = self.state.lock();
                state
                    .writers
                    .retain(|_, attr| !(attr.host_name == *host && attr.process_id == pid));
                self.recompute(&mut state);
            }
            ChangeType::Node | ChangeType::Service => {}
        }
    }

    fn recompute(&self, state: &mut HybridState) {
        let mut need_intra = false;
        let mut need_shm = false;
        let mut need_rtps = false;
        for writer in state.writers.values() {
            match self.attr.locality_of(writer) {
                Locality::SameProcess => need_intra = true,
                Locality::SameHost => need_shm = true,
                Locality::OtherHost => need_rtps = true,
            }
        }

        if need_intra && state.intra.is_none() {
            let receiver = IntraReceiver::detached(
                self.attr.clone(),
                Arc::clone(&self.intra_dispatcher),
                Arc::clone(&self.listener),
            );
            let _ = receiver.enable();
            state.intra = Some(receiver);
        } else if !need_intra {
            if let Some(receiver) = state.intra.take() {
                receiver.disable();
            }
        }

        if need_shm && state.shm.is_none() {
            let receiver = ShmReceiver::detached(
                self.attr.clone(),
                Arc::clone(&self.shm_dispatcher),
                Arc::clone(&self.listener),
            );
            match receiver.enable() {
                Ok(()) => state.shm = Some(receiver),
                Err(e) => {
                    log::debug!(
                        "[HybridReceiver] shm leg unavailable on {:#018x}: {}",
                        self.attr.channel_id,
                        e
                    );
                }
            }
        } else if !need_shm {
            if let Some(receiver) = state.shm.take() {
                receiver.disable();
            }
        }

        if need_rtps && state.rtps.is_none() {
            let receiver = RtpsReceiver::detached(
                self.attr.clone(),
                Arc::clone(&self.rtps_dispatcher),
                Arc::clone(&self.listener),
            );
            let _ = receiver.enable();
            state.rtps = Some(receiver);
        } else if !need_rtps {
            if let Some(receiver) = state.rtps.take() {
                receiver.disable();
            }
        }
    }
}

impl Endpoint for HybridReceiver {
    fn id(&self) -> &Identity {
        &self.core.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.core.attr
    }
}

impl Receiver for HybridReceiver {
    fn enable(&self) -> Result<()> {
        let core = &self.core;
        if core.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let weak = Arc::downgrade(core);
        let handle = core.topology.add_change_listener(Arc::new(move |msg| {
            if let Some(core) = weak.upgrade() {
                core.on_change(msg);
            }
        }));
        *core.change_listener.lock() = Some(handle);

        core.topology.join(&core.attr, RoleType::Reader);

        let writers = core
            .topology
            .channel_manager()
            .writers_of(core.attr.channel_id);
        let mut state = core.state.lock();
        for writer in writers {
            state.writers.insert(writer.id.hash_value(), writer);
        }
        core.recompute(&mut state);
        Ok(())
    }

    fn disable(&self) {
        let core = &self.core;
        if !core.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = core.change_listener.lock().take() {
            core.topology.remove_change_listener(handle);
        }
        core.topology.leave(&core.attr, RoleType::Reader);

        let mut state = core.state.lock();
        if let Some(receiver) = state.intra.take() {
            receiver.disable();
        }
        if let Some(receiver) = state.shm.take() {
            receiver.disable();
        }
        if let Some(receiver) = state.rtps.take() {
            receiver.disable();
        }
        state.writers.clear();
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hybrid transmitter: picks the narrowest feasible transport per known
//! subscriber.
//!
//! Locality rule: same process -> intra, same host -> shm, different
//! host -> rtps. The set of known subscribers comes from the channel
//! manager, seeded at enable time and maintained incrementally from
//! topology change events; the hot path reads the precomputed transport
//! set through an `ArcSwap` and never scans subscribers per message.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::base::identity::Identity;
use crate::base::role::{Endpoint, Locality, RoleAttributes};
use crate::error::Result;
use crate::topology::{ChangeMsg, ChangeType, ListenerHandle, OperateType, RoleType, TopologyManager};
use crate::transport::dispatcher::Dispatcher;
use crate::transport::message::MessagePtr;
use crate::transport::rtps::Participant;
use crate::transport::shm::Notifier;
use crate::transport::transmitter::{
    IntraTransmitter, RtpsTransmitter, ShmTransmitter, Transmitter,
};

/// Precomputed transport fan-out, swapped atomically on topology change.
#[derive(Default)]
struct ActiveSet {
    intra: Option<Arc<IntraTransmitter>>,
    shm: Option<Arc<ShmTransmitter>>,
    rtps: Option<Arc<RtpsTransmitter>>,
}

struct HybridState {
    /// Known subscriber roles of this channel, keyed by identity hash.
    receivers: HashMap<u64, RoleAttributes>,
    intra: Option<Arc<IntraTransmitter>>,
    shm: Option<Arc<ShmTransmitter>>,
    rtps: Option<Arc<RtpsTransmitter>>,
}

struct HybridCore {
    attr: RoleAttributes,
    enabled: AtomicBool,
    topology: Arc<TopologyManager>,
    intra_dispatcher: Arc<Dispatcher>,
    shm_notifier: Arc<dyn Notifier>,
    participant: Arc<Participant>,
    state: Mutex<HybridState>,
    active: ArcSwap<ActiveSet>,
    listener: Mutex<Option<ListenerHandle>>,
}

/// Locality-selecting transmitter.
pub struct HybridTransmitter {
    core: Arc<HybridCore>,
}

impl HybridTransmitter {
    #[must_use]
    pub fn new(
        attr: RoleAttributes,
        intra_dispatcher: Arc<Dispatcher>,
        shm_notifier: Arc<dyn Notifier>,
        participant: Arc<Participant>,
        topology: Arc<TopologyManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: Arc::new(HybridCore {
                attr,
                enabled: AtomicBool::new(false),
                topology,
                intra_dispatcher,
                shm_notifier,
                participant,
                state: Mutex::new(HybridState {
                    receivers: HashMap::new(),
                    intra: None,
                    shm: None,
                    rtps: None,
                }),
                active: ArcSwap::from_pointee(ActiveSet::default()),
                listener: Mutex::new(None),
            }),
        })
    }

    /// Transports currently selected, for introspection and tests:
    /// (intra, shm, rtps).
    #[must_use]
    pub fn selected_transports(&self) -> (bool, bool, bool) {
        let active = self.core.active.load();
        (
            active.intra.is_some(),
            active.shm.is_some(),
            active.rtps.is_some(),
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
                if msg.role_type != RoleType::Reader
                    || msg.role_attr.channel_id != self.attr.channel_id
                {
                    return;
                }
                let mut state = self.state.lock();
                match msg.operate_type {
                    OperateType::Join => {
                        state
                            .receivers
                            .insert(msg.role_attr.id.hash_value(), msg.role_attr.clone());
                    }
                    OperateType::Leave => {
                        state.receivers.remove(&msg.role_attr.id.hash_value());
                    }
                }
                self.recompute(&mut state);
            }
            ChangeType::Participant => {
                if msg.operate_type != OperateType::Leave {
                    return;
                }
                // A process died: drop every subscriber it held.
                let host = &msg.role_attr.host_name;
                let pid = msg.role_attr.process_id;
                let mut state = self.state.lock();
                state
                    .receivers
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
        for receiver in state.receivers.values() {
            match self.attr.locality_of(receiver) {
                Locality::SameProcess => need_intra = true,
                Locality::SameHost => need_shm = true,
                Locality::OtherHost => need_rtps = true,
            }
        }

        if need_intra && state.intra.is_none() {
            let transmitter =
                IntraTransmitter::detached(self.attr.clone(), Arc::clone(&self.intra_dispatcher));
            // Intra enable cannot fail.
            let _ = transmitter.enable();
            state.intra = Some(transmitter);
        }
        if need_shm && state.shm.is_none() {
            let transmitter =
                ShmTransmitter::detached(self.attr.clone(), Arc::clone(&self.shm_notifier));
            match transmitter.enable() {
                Ok(()) => state.shm = Some(transmitter),
                Err(e) => {
                    log::debug!(
                        "[HybridTransmitter] shm leg unavailable on {:#018x}: {}",
                        self.attr.channel_id,
                        e
                    );
                }
            }
        }
        if need_rtps && state.rtps.is_none() {
            let transmitter =
                RtpsTransmitter::detached(self.attr.clone(), Arc::clone(&self.participant));
            let _ = transmitter.enable();
            state.rtps = Some(transmitter);
        }

        self.active.store(Arc::new(ActiveSet {
            intra: need_intra.then(|| state.intra.clone()).flatten(),
            shm: need_shm.then(|| state.shm.clone()).flatten(),
            rtps: need_rtps.then(|| state.rtps.clone()).flatten(),
        }));
    }
}

impl Endpoint for HybridTransmitter {
    fn id(&self) -> &Identity {
        &self.core.attr.id
    }

    fn attributes(&self) -> &RoleAttributes {
        &self.core.attr
    }
}

impl Transmitter for HybridTransmitter {
    fn enable(&self) -> Result<()> {
        let core = &self.core;
        if core.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        // Listener first so no join between seed and registration is lost;
        // duplicate applications are idempotent.
        let weak = Arc::downgrade(core);
        let handle = core.topology.add_change_listener(Arc::new(move |msg| {
            if let Some(core) = weak.upgrade() {
                core.on_change(msg);
            }
        }));
        *core.listener.lock() = Some(handle);

        core.topology.join(&core.attr, RoleType::Writer);

        let readers = core
            .topology
            .channel_manager()
            .readers_of(core.attr.channel_id);
        let mut state = core.state.lock();
        for reader in readers {
            state.receivers.insert(reader.id.hash_value(), reader);
        }
        core.recompute(&mut state);
        Ok(())
    }

    fn disable(&self) {
        let core = &self.core;
        if !core.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = core.listener.lock().take() {
            core.topology.remove_change_listener(handle);
        }
        core.topology.leave(&core.attr, RoleType::Writer);

        let mut state = core.state.lock();
        if let Some(t) = state.intra.take() {
            t.disable();
        }
        if let Some(t) = state.shm.take() {
            t.disable();
        }
        if let Some(t) = state.rtps.take() {
            t.disable();
        }
        state.receivers.clear();
        core.active.store(Arc::new(ActiveSet::default()));
    }

    fn transmit(&self, msg: &MessagePtr) -> bool {
        if !self.core.enabled.load(Ordering::Acquire) {
            return false;
        }
        let active = self.core.active.load();
        let mut delivered = false;
        if let Some(t) = &active.intra {
            delivered |= t.transmit(msg);
        }
        if let Some(t) = &active.shm {
            delivered |= t.transmit(msg);
        }
        if let Some(t) = &active.rtps {
            delivered |= t.transmit(msg);
        }
        // No known subscribers: accepted and silently dropped.
        delivered || active.intra.is_none() && active.shm.is_none() && active.rtps.is_none()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The topology manager and its three sub-managers.
//!
//! Lifecycle is `Uninitialized -> Initialized -> ShutDown`, driven by a
//! single atomic; `init` and `shutdown` are idempotent and the terminal
//! state accepts no further events.
//!
//! Two event sources feed the directories:
//!
//! 1. Participant discovery: the datagram transport reports peers joining
//!    and dropping. Names are parsed as `"<host>+<pid>"` (split on the
//!    first `+`; malformed names are dropped silently). A drop prunes
//!    every role the departed process had registered.
//! 2. Role changes: local endpoints join/leave as writers, readers, nodes
//!    or services. Each change updates the local directory, is broadcast
//!    on an internal channel for remote processes, and is fanned out to
//!    registered change listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::base::channel_id::{register_channel, ChannelId};
use crate::base::identity::Identity;
use crate::base::role::{local_host_name, RoleAttributes};
use crate::error::{Error, Result};
use crate::topology::event::{ChangeMsg, OperateType, RoleType};
use crate::topology::role_directory::RoleDirectory;
use crate::transport::rtps::{
    DiscoveryStatus, PartInfo, Participant, RtpsPublisher,
};

/// Internal channel carrying role-change broadcasts between processes.
const TOPOLOGY_CHANNEL: &str = "/cybus/topology_change";
const TOPOLOGY_MSG_TYPE: &str = "cybus/ChangeMsg";

const UNINITIALIZED: u8 = 0;
const INITIALIZED: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Callback fired on every topology change.
pub type ChangeFunc = Arc<dyn Fn(&ChangeMsg) + Send + Sync>;

/// Opaque handle for removing a change listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ListenerHandle(u64);

// ============================================================================
// Sub-managers
// ============================================================================

/// Directory of live nodes.
pub struct NodeManager {
    directory: RoleDirectory,
}

impl NodeManager {
    fn new() -> Self {
        Self {
            directory: RoleDirectory::new(),
        }
    }

    pub fn join(&self, attr: &RoleAttributes) -> bool {
        self.directory.join(attr)
    }

    pub fn leave(&self, attr: &RoleAttributes) -> bool {
        self.directory.leave(attr)
    }

    pub fn on_topo_module_leave(&self, host_name: &str, process_id: u32) {
        let removed = self.directory.prune_process(host_name, process_id);
        if !removed.is_empty() {
            log::debug!(
                "[NodeManager] pruned {} node(s) of {}+{}",
                removed.len(),
                host_name,
                process_id
            );
        }
    }

    #[must_use]
    pub fn nodes(&self) -> Vec<RoleAttributes> {
        self.directory.all()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

/// Directory of channel writers and readers.
pub struct ChannelManager {
    writers: RoleDirectory,
    readers: RoleDirectory,
}

impl ChannelManager {
    fn new() -> Self {
        Self {
            writers: RoleDirectory::new(),
            readers: RoleDirectory::new(),
        }
    }

    pub fn join_writer(&self, attr: &RoleAttributes) -> bool {
        self.writers.join(attr)
    }

    pub fn leave_writer(&self, attr: &RoleAttributes) -> bool {
        self.writers.leave(attr)
    }

    pub fn join_reader(&self, attr: &RoleAttributes) -> bool {
        self.readers.join(attr)
    }

    pub fn leave_reader(&self, attr: &RoleAttributes) -> bool {
        self.readers.leave(attr)
    }

    /// Writers currently attached to a channel.
    #[must_use]
    pub fn writers_of(&self, channel_id: ChannelId) -> Vec<RoleAttributes> {
        self.writers.roles_of_channel(channel_id)
    }

    /// Readers currently attached to a channel.
    #[must_use]
    pub fn readers_of(&self, channel_id: ChannelId) -> Vec<RoleAttributes> {
        self.readers.roles_of_channel(channel_id)
    }

    /// Every writer and reader role held by one process.
    #[must_use]
    pub fn process_roles(&self, host_name: &str, process_id: u32) -> Vec<RoleAttributes> {
        self.writers
            .all()
            .into_iter()
            .chain(self.readers.all())
            .filter(|attr| attr.host_name == host_name && attr.process_id == process_id)
            .collect()
    }

    pub fn on_topo_module_leave(&self, host_name: &str, process_id: u32) {
        let writers = self.writers.prune_process(host_name, process_id);
        let readers = self.readers.prune_process(host_name, process_id);
        if !writers.is_empty() || !readers.is_empty() {
            log::debug!(
                "[ChannelManager] pruned {} writer(s), {} reader(s) of {}+{}",
                writers.len(),
                readers.len(),
                host_name,
                process_id
            );
        }
    }

    #[must_use]
    pub fn role_count(&self) -> usize {
        self.writers.len() + self.readers.len()
    }
}

/// Directory of live services.
pub struct ServiceManager {
    directory: RoleDirectory,
}

impl ServiceManager {
    fn new() -> Self {
        Self {
            directory: RoleDirectory::new(),
        }
    }

    pub fn join(&self, attr: &RoleAttributes) -> bool {
        self.directory.join(attr)
    }

    pub fn leave(&self, attr: &RoleAttributes) -> bool {
        self.directory.leave(attr)
    }

    pub fn on_topo_module_leave(&self, host_name: &str, process_id: u32) {
        let removed = self.directory.prune_process(host_name, process_id);
        if !removed.is_empty() {
            log::debug!(
                "[ServiceManager] pruned {} service(s) of {}+{}",
                removed.len(),
                host_name,
                process_id
            );
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directory.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directory.is_empty()
    }
}

// ============================================================================
// Topology manager
// ============================================================================

/// Tracks live participants, nodes, channels and services across hosts.
pub struct TopologyManager {
    state: AtomicU8,
    host_name: String,
    process_id: u32,
    node_manager: Arc<NodeManager>,
    channel_manager: Arc<ChannelManager>,
    service_manager: Arc<ServiceManager>,
    /// guid -> name announced at discovery time, so a drop can be mapped
    /// back to (host, pid) even though BYE frames carry no name.
    participant_names: Mutex<HashMap<[u8; 16], String>>,
    listeners: Mutex<Vec<(u64, ChangeFunc)>>,
    next_listener_id: AtomicU64,
    change_publisher: RwLock<Option<RtpsPublisher>>,
    change_subscription: Mutex<Option<(ChannelId, Identity)>>,
    participant: RwLock<Option<Arc<Participant>>>,
}

impl TopologyManager {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(UNINITIALIZED),
            host_name: local_host_name(),
            process_id: std::process::id(),
            node_manager: Arc::new(NodeManager::new()),
            channel_manager: Arc::new(ChannelManager::new()),
            service_manager: Arc::new(ServiceManager::new()),
            participant_names: Mutex::new(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            change_publisher: RwLock::new(None),
            change_subscription: Mutex::new(None),
            participant: RwLock::new(None),
        })
    }

    /// Register this process as a discovery participant and wire the
    /// role-change broadcast channel plus the discovery callback.
    /// Idempotent; returns success if already initialized.
    ///
    /// # Errors
    ///
    /// `Error::ShutDown` when called after `shutdown`; participant
    /// creation failures are surfaced and leave the manager uninitialized.
    pub fn init(self: &Arc<Self>) -> Result<()> {
        match self.state.compare_exchange(
            UNINITIALIZED,
            INITIALIZED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {}
            Err(INITIALIZED) => return Ok(()),
            Err(_) => return Err(Error::ShutDown),
        }

        let participant_name = format!("{}+{}", self.host_name, self.process_id);
        let participant = match Participant::new(&participant_name, crate::config::DISCOVERY_PORT) {
            Ok(participant) => participant,
            Err(e) => {
                self.state.store(UNINITIALIZED, Ordering::Release);
                return Err(e);
            }
        };
        *self.participant.write() = Some(Arc::clone(&participant));

        let channel_id = register_channel(TOPOLOGY_CHANNEL);
        *self.change_publisher.write() =
            Some(participant.create_publisher(channel_id, TOPOLOGY_MSG_TYPE));

        let subscription_id = Identity::new();
        let weak = Arc::downgrade(self);
        participant.subscribe(
            channel_id,
            subscription_id,
            Arc::new(move |_, _, _, payload| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_remote_change(&payload);
                }
            }),
        );
        *self.change_subscription.lock() = Some((channel_id, subscription_id));

        let weak = Arc::downgrade(self);
        participant.set_discovery_callback(Arc::new(move |info| {
            if let Some(manager) = weak.upgrade() {
                manager.handle_participant_event(info);
            }
        }));

        log::debug!(
            "[TopologyManager] initialized as {}+{}",
            self.host_name,
            self.process_id
        );
        Ok(())
    }

    /// Stop accepting events. Runs at most once; later calls are no-ops.
    pub fn shutdown(&self) {
        if self
            .state
            .compare_exchange(INITIALIZED, SHUT_DOWN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        log::debug!("[TopologyManager] shutdown");
        self.listeners.lock().clear();
        *self.change_publisher.write() = None;
        if let Some(participant) = self.participant.write().take() {
            if let Some((channel_id, subscription_id)) = self.change_subscription.lock().take() {
                participant.unsubscribe(channel_id, &subscription_id);
            }
            participant.shutdown();
        }
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state.load(Ordering::Acquire) == INITIALIZED
    }

    #[must_use]
    pub fn node_manager(&self) -> &Arc<NodeManager> {
        &self.node_manager
    }

    #[must_use]
    pub fn channel_manager(&self) -> &Arc<ChannelManager> {
        &self.channel_manager
    }

    #[must_use]
    pub fn service_manager(&self) -> &Arc<ServiceManager> {
        &self.service_manager
    }

    /// Number of live remote participants.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participant_names.lock().len()
    }

    /// Register a callback fired on every topology change. The returned
    /// handle removes it again.
    pub fn add_change_listener(&self, func: ChangeFunc) -> ListenerHandle {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, func));
        ListenerHandle(id)
    }

    pub fn remove_change_listener(&self, handle: ListenerHandle) {
        self.listeners.lock().retain(|(id, _)| *id != handle.0);
    }

    /// Record a local role join, broadcast it, and fire listeners.
    pub fn join(&self, attr: &RoleAttributes, role: RoleType) {
        if !self.is_initialized() {
            return;
        }
        self.apply(attr, role, OperateType::Join);
        let msg = ChangeMsg::now(OperateType::Join, role, attr.clone());
        self.broadcast(&msg);
        self.fire_listeners(&msg);
    }

    /// Record a local role leave, broadcast it, and fire listeners.
    pub fn leave(&self, attr: &RoleAttributes, role: RoleType) {
        if !self.is_initialized() {
            return;
        }
        self.apply(attr, role, OperateType::Leave);
        let msg = ChangeMsg::now(OperateType::Leave, role, attr.clone());
        self.broadcast(&msg);
        self.fire_listeners(&msg);
    }

    /// Translate one participant discovery event.
    ///
    /// Public so embedders (and tests) can drive the manager with
    /// synthetic events; the datagram transport calls this through the
    /// discovery callback.
    pub fn handle_participant_event(&self, info: PartInfo) {
        let (name, operate_type) = match info.status {
            DiscoveryStatus::Discovered => {
                self.participant_names
                    .lock()
                    .insert(info.guid, info.name.clone());
                (info.name, OperateType::Join)
            }
            DiscoveryStatus::Removed => {
                match self.participant_names.lock().remove(&info.guid) {
                    Some(name) => (name, OperateType::Leave),
                    // Never saw this peer join: nothing to prune.
                    None => return,
                }
            }
        };

        let Some((host_name, process_id)) = parse_participant_name(&name) else {
            log::debug!("[TopologyManager] participant name '{}' format mismatch", name);
            return;
        };

        if !self.is_initialized() {
            return;
        }

        if operate_type == OperateType::Leave {
            self.node_manager.on_topo_module_leave(&host_name, process_id);
            self.channel_manager
                .on_topo_module_leave(&host_name, process_id);
            self.service_manager
                .on_topo_module_leave(&host_name, process_id);
        }

        let msg = ChangeMsg::now(
            operate_type,
            RoleType::Participant,
            RoleAttributes::for_process(&host_name, process_id),
        );
        self.fire_listeners(&msg);
    }

    fn handle_remote_change(&self, payload: &[u8]) {
        let Some(msg) = ChangeMsg::decode(payload) else {
            log::debug!("[TopologyManager] dropped malformed change broadcast");
            return;
        };
        // Our own broadcasts loop back through the multicast socket.
        if msg.role_attr.host_name == self.host_name && msg.role_attr.process_id == self.process_id
        {
            return;
        }
        if !self.is_initialized() {
            return;
        }
        self.apply(&msg.role_attr, msg.role_type, msg.operate_type);
        self.fire_listeners(&msg);
    }

    fn apply(&self, attr: &RoleAttributes, role: RoleType, operate: OperateType) {
        match (role, operate) {
            (RoleType::Node, OperateType::Join) => {
                self.node_manager.join(attr);
            }
            (RoleType::Node, OperateType::Leave) => {
                self.node_manager.leave(attr);
            }
            (RoleType::Writer, OperateType::Join) => {
                self.channel_manager.join_writer(attr);
            }
            (RoleType::Writer, OperateType::Leave) => {
                self.channel_manager.leave_writer(attr);
            }
            (RoleType::Reader, OperateType::Join) => {
                self.channel_manager.join_reader(attr);
            }
            (RoleType::Reader, OperateType::Leave) => {
                self.channel_manager.leave_reader(attr);
            }
            (RoleType::Service | RoleType::Client, OperateType::Join) => {
                self.service_manager.join(attr);
            }
            (RoleType::Service | RoleType::Client, OperateType::Leave) => {
                self.service_manager.leave(attr);
            }
            // Participant events never reach apply(); they are handled in
            // handle_participant_event.
            (RoleType::Participant, _) => {}
        }
    }

    fn broadcast(&self, msg: &ChangeMsg) {
        let publisher = self.change_publisher.read();
        if let Some(publisher) = publisher.as_ref() {
            publisher.publish(&msg.encode());
        }
    }

    fn fire_listeners(&self, msg: &ChangeMsg) {
        let funcs: Vec<ChangeFunc> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, func)| Arc::clone(func))
            .collect();
        for func in funcs {
            func(msg);
        }
    }
}

/// Parse `"<host_name>+<decimal_process_id>"`, splitting on the first `+`.
#[must_use]
pub fn parse_participant_name(name: &str) -> Option<(String, u32)> {
    let (host, pid) = name.split_once('+')?;
    let process_id = pid.parse::<u32>().ok()?;
    Some((host.to_string(), process_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_participant_name() {
        assert_eq!(
            parse_participant_name("hostA+1001"),
            Some(("hostA".to_string(), 1001))
        );
        // Split on the FIRST '+': the remainder must be a decimal pid.
        assert_eq!(parse_participant_name("host+with+plus"), None);
        assert_eq!(parse_participant_name("no_separator"), None);
        assert_eq!(parse_participant_name("host+notanumber"), None);
        assert_eq!(parse_participant_name("+123"), Some((String::new(), 123)));
    }

    fn synthetic_join(manager: &Arc<TopologyManager>, guid: u8, name: &str) {
        manager.handle_participant_event(PartInfo {
            guid: [guid; 16],
            name: name.to_string(),
            status: DiscoveryStatus::Discovered,
        });
    }

    fn synthetic_drop(manager: &Arc<TopologyManager>, guid: u8) {
        manager.handle_participant_event(PartInfo {
            guid: [guid; 16],
            name: String::new(),
            status: DiscoveryStatus::Removed,
        });
    }

    #[test]
    fn test_uninitialized_manager_buffers_names_only() {
        let manager = TopologyManager::new();
        synthetic_join(&manager, 1, "hostA+1001");
        assert_eq!(manager.participant_count(), 1);
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_join_twice_leave_unknown_idempotent() {
        let manager = TopologyManager::new();
        synthetic_join(&manager, 1, "hostA+1001");
        synthetic_join(&manager, 1, "hostA+1001");
        assert_eq!(manager.participant_count(), 1);

        // Leave for a guid never seen is a no-op.
        synthetic_drop(&manager, 9);
        assert_eq!(manager.participant_count(), 1);

        synthetic_drop(&manager, 1);
        assert_eq!(manager.participant_count(), 0);
    }

    #[test]
    fn test_malformed_names_silently_dropped() {
        let manager = TopologyManager::new();
        synthetic_join(&manager, 1, "no_plus_sign");
        synthetic_join(&manager, 2, "host+NaN");
        // Names are stored keyed by guid regardless; role pruning and
        // listener fanout never fire for them.
        synthetic_drop(&manager, 1);
        synthetic_drop(&manager, 2);
        assert_eq!(manager.participant_count(), 0);
    }

    #[test]
    fn test_shutdown_before_init_is_noop() {
        let manager = TopologyManager::new();
        manager.shutdown();
        assert!(!manager.is_initialized());
    }

    #[test]
    fn test_listener_handles_remove() {
        let manager = TopologyManager::new();
        let handle = manager.add_change_listener(Arc::new(|_msg| {}));
        let other = manager.add_change_listener(Arc::new(|_msg| {}));
        assert_ne!(handle, other);
        manager.remove_change_listener(handle);
        assert_eq!(manager.listeners.lock().len(), 1);
    }
}

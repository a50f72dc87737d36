// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Participant churn: directory pruning and change-listener fanout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cybus::topology::{OperateType, RoleType, TopologyManager};
use cybus::transport::rtps::{DiscoveryStatus, PartInfo};
use cybus::RoleAttributes;

fn bring_up() -> Arc<TopologyManager> {
    let _ = env_logger::builder().is_test(true).try_init();
    let manager = TopologyManager::new();
    manager.init().expect("topology init");
    manager
}

fn remote_reader(host: &str, pid: u32, channel: &str) -> RoleAttributes {
    let mut attr = RoleAttributes::new("remote_node", channel, "bytes");
    attr.host_name = host.to_string();
    attr.process_id = pid;
    attr
}

fn join_event(guid: u8, name: &str) -> PartInfo {
    PartInfo {
        guid: [guid; 16],
        name: name.to_string(),
        status: DiscoveryStatus::Discovered,
    }
}

fn drop_event(guid: u8) -> PartInfo {
    PartInfo {
        guid: [guid; 16],
        name: String::new(),
        status: DiscoveryStatus::Removed,
    }
}

#[test]
fn test_participant_drop_prunes_channel_roles() {
    let manager = bring_up();
    let channel = format!("/churn/{}", std::process::id());

    manager.handle_participant_event(join_event(1, "hostA+1001"));

    // Roles announced by hostA+1001.
    manager.join(&remote_reader("hostA", 1001, &channel), RoleType::Reader);
    manager.join(&remote_reader("hostA", 1001, &channel), RoleType::Writer);
    assert_eq!(manager.channel_manager().process_roles("hostA", 1001).len(), 2);

    manager.handle_participant_event(drop_event(1));
    assert!(manager
        .channel_manager()
        .process_roles("hostA", 1001)
        .is_empty());

    manager.shutdown();
}

#[test]
fn test_duplicate_join_and_unknown_leave_are_idempotent() {
    let manager = bring_up();
    let channel = format!("/churn_dup/{}", std::process::id());

    manager.handle_participant_event(join_event(2, "hostB+2002"));
    manager.handle_participant_event(join_event(2, "hostB+2002"));
    manager.join(&remote_reader("hostB", 2002, &channel), RoleType::Reader);
    assert_eq!(manager.channel_manager().process_roles("hostB", 2002).len(), 1);

    // A drop for a participant nobody ever saw prunes nothing.
    manager.handle_participant_event(drop_event(7));
    assert_eq!(manager.channel_manager().process_roles("hostB", 2002).len(), 1);

    manager.handle_participant_event(drop_event(2));
    assert!(manager
        .channel_manager()
        .process_roles("hostB", 2002)
        .is_empty());

    manager.shutdown();
}

#[test]
fn test_change_listeners_fire_and_unregister() {
    let manager = bring_up();
    let channel = format!("/churn_listen/{}", std::process::id());

    let joins = Arc::new(AtomicUsize::new(0));
    let leaves = Arc::new(AtomicUsize::new(0));
    let join_count = Arc::clone(&joins);
    let leave_count = Arc::clone(&leaves);
    let handle = manager.add_change_listener(Arc::new(move |msg| match msg.operate_type {
        OperateType::Join => {
            join_count.fetch_add(1, Ordering::SeqCst);
        }
        OperateType::Leave => {
            leave_count.fetch_add(1, Ordering::SeqCst);
        }
    }));

    let attr = remote_reader("hostC", 3003, &channel);
    manager.join(&attr, RoleType::Reader);
    manager.leave(&attr, RoleType::Reader);
    assert_eq!(joins.load(Ordering::SeqCst), 1);
    assert_eq!(leaves.load(Ordering::SeqCst), 1);

    manager.remove_change_listener(handle);
    manager.join(&attr, RoleType::Reader);
    assert_eq!(joins.load(Ordering::SeqCst), 1);

    manager.shutdown();
}

#[test]
fn test_shutdown_is_idempotent_and_terminal() {
    let manager = bring_up();
    manager.shutdown();
    manager.shutdown();
    assert!(!manager.is_initialized());

    // Terminal: events and joins are ignored after shutdown.
    manager.handle_participant_event(join_event(4, "hostD+4004"));
    let channel = format!("/churn_dead/{}", std::process::id());
    manager.join(&remote_reader("hostD", 4004, &channel), RoleType::Reader);
    assert!(manager
        .channel_manager()
        .process_roles("hostD", 4004)
        .is_empty());

    // Re-init is not possible from the terminal state.
    assert!(manager.init().is_err());
}

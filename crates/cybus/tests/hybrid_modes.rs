// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Hybrid transport selection: narrowest feasible transport per
//! subscriber locality, recomputed on topology change.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cybus::topology::{RoleType, TopologyManager};
use cybus::transport::{
    HybridReceiver, HybridTransmitter, Receiver, Transmitter, Transport, TransportConfig,
};
use cybus::{Message, RoleAttributes, TransportMode};

struct Fixture {
    topology: Arc<TopologyManager>,
    transport: Arc<Transport>,
    channel: String,
}

impl Fixture {
    fn new(tag: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let topology = TopologyManager::new();
        topology.init().expect("topology init");
        let transport =
            Transport::new(Arc::clone(&topology), TransportConfig::default()).expect("transport");
        let channel = format!("/hybrid/{}_{}", tag, std::process::id());
        cybus::channel_id::register_channel(&channel);
        Self {
            topology,
            transport,
            channel,
        }
    }

    /// A subscriber role living at the given coordinates.
    fn reader_at(&self, host: &str, pid: u32) -> RoleAttributes {
        let mut attr = RoleAttributes::new("listener", &self.channel, "bytes");
        attr.host_name = host.to_string();
        attr.process_id = pid;
        attr
    }

    fn writer_at(&self, host: &str, pid: u32) -> RoleAttributes {
        let mut attr = RoleAttributes::new("talker", &self.channel, "bytes");
        attr.host_name = host.to_string();
        attr.process_id = pid;
        attr
    }

    fn local_host(&self) -> String {
        cybus::base::role::local_host_name()
    }

    fn local_pid(&self) -> u32 {
        std::process::id()
    }

    fn transmitter(&self) -> Arc<HybridTransmitter> {
        let attr = RoleAttributes::new("talker", &self.channel, "bytes");
        let transmitter = HybridTransmitter::new(
            attr,
            Arc::clone(self.transport.intra_dispatcher()),
            Arc::clone(self.transport.shm_dispatcher().notifier()),
            Arc::clone(self.transport.participant()),
            Arc::clone(&self.topology),
        );
        transmitter.enable().expect("hybrid enable");
        transmitter
    }

    fn teardown(self) {
        self.transport.shutdown();
        self.topology.shutdown();
    }
}

#[test]
fn test_local_and_remote_subscriber_select_intra_and_rtps() {
    let fixture = Fixture::new("local_remote");
    let host = fixture.local_host();

    fixture
        .topology
        .join(&fixture.reader_at(&host, fixture.local_pid()), RoleType::Reader);
    fixture
        .topology
        .join(&fixture.reader_at("other-host", 4242), RoleType::Reader);

    let transmitter = fixture.transmitter();
    // Intra and rtps, never shm.
    assert_eq!(transmitter.selected_transports(), (true, false, true));

    transmitter.disable();
    fixture.teardown();
}

#[test]
fn test_same_host_processes_select_shm_never_rtps() {
    let fixture = Fixture::new("same_host");
    let host = fixture.local_host();

    fixture
        .topology
        .join(&fixture.reader_at(&host, fixture.local_pid()), RoleType::Reader);
    fixture
        .topology
        .join(&fixture.reader_at(&host, fixture.local_pid() + 1), RoleType::Reader);

    let transmitter = fixture.transmitter();
    assert_eq!(transmitter.selected_transports(), (true, true, false));

    transmitter.disable();
    fixture.teardown();
}

#[test]
fn test_selection_tracks_joins_and_leaves_incrementally() {
    let fixture = Fixture::new("incremental");
    let host = fixture.local_host();

    let transmitter = fixture.transmitter();
    assert_eq!(transmitter.selected_transports(), (false, false, false));

    let remote = fixture.reader_at("elsewhere", 9);
    fixture.topology.join(&remote, RoleType::Reader);
    assert_eq!(transmitter.selected_transports(), (false, false, true));

    let neighbor = fixture.reader_at(&host, fixture.local_pid() + 1);
    fixture.topology.join(&neighbor, RoleType::Reader);
    assert_eq!(transmitter.selected_transports(), (false, true, true));

    fixture.topology.leave(&remote, RoleType::Reader);
    assert_eq!(transmitter.selected_transports(), (false, true, false));

    fixture.topology.leave(&neighbor, RoleType::Reader);
    assert_eq!(transmitter.selected_transports(), (false, false, false));

    transmitter.disable();
    fixture.teardown();
}

#[test]
fn test_hybrid_receiver_enables_legs_per_writer_locality() {
    let fixture = Fixture::new("receiver_legs");
    let host = fixture.local_host();

    let attr = RoleAttributes::new("listener", &fixture.channel, "bytes");
    let receiver = HybridReceiver::new(
        attr,
        Arc::clone(fixture.transport.intra_dispatcher()),
        Arc::clone(fixture.transport.shm_dispatcher()),
        Arc::clone(fixture.transport.rtps_dispatcher()),
        Arc::new(|_msg| {}),
        Arc::clone(&fixture.topology),
    );
    receiver.enable().expect("hybrid receiver enable");
    assert_eq!(receiver.enabled_transports(), (false, false, false));

    let local_writer = fixture.writer_at(&host, fixture.local_pid());
    fixture.topology.join(&local_writer, RoleType::Writer);
    assert_eq!(receiver.enabled_transports(), (true, false, false));

    let remote_writer = fixture.writer_at("far-away", 77);
    fixture.topology.join(&remote_writer, RoleType::Writer);
    assert_eq!(receiver.enabled_transports(), (true, false, true));

    fixture.topology.leave(&remote_writer, RoleType::Writer);
    assert_eq!(receiver.enabled_transports(), (true, false, false));

    receiver.disable();
    fixture.teardown();
}

#[test]
fn test_hybrid_end_to_end_same_process_delivers_once() {
    let fixture = Fixture::new("end_to_end");
    let channel_id = cybus::channel_id::hash_name(&fixture.channel);

    let deliveries = Arc::new(AtomicUsize::new(0));
    let sink = Arc::clone(&deliveries);
    let receiver = fixture
        .transport
        .create_receiver(
            RoleAttributes::new("listener", &fixture.channel, "bytes"),
            Arc::new(move |_msg| {
                sink.fetch_add(1, Ordering::SeqCst);
            }),
            TransportMode::Hybrid,
        )
        .expect("receiver");

    let transmitter = fixture
        .transport
        .create_transmitter(
            RoleAttributes::new("talker", &fixture.channel, "bytes"),
            TransportMode::Hybrid,
        )
        .expect("transmitter");

    assert!(transmitter.transmit(&Message::new(channel_id, "bytes", vec![42])));
    // One local subscriber, one local writer: exactly one intra delivery.
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);

    transmitter.disable();
    receiver.disable();
    fixture.teardown();
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Two-channel fusion through the visitor, keyed by the primary channel.

use std::sync::Arc;

use cybus::topology::TopologyManager;
use cybus::transport::{Transmitter, Transport, TransportConfig};
use cybus::{DataVisitor, Message, MessagePtr, RoleAttributes, TransportMode, VisitorConfig};

struct Fixture {
    topology: Arc<TopologyManager>,
    transport: Arc<Transport>,
    primary: String,
    secondary: String,
    primary_id: u64,
    secondary_id: u64,
}

impl Fixture {
    fn new(tag: &str) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        let topology = TopologyManager::new();
        topology.init().expect("topology init");
        let transport =
            Transport::new(Arc::clone(&topology), TransportConfig::default()).expect("transport");
        let primary = format!("/p/{}_{}", tag, std::process::id());
        let secondary = format!("/s/{}_{}", tag, std::process::id());
        let primary_id = cybus::channel_id::register_channel(&primary);
        let secondary_id = cybus::channel_id::register_channel(&secondary);
        Self {
            topology,
            transport,
            primary,
            secondary,
            primary_id,
            secondary_id,
        }
    }

    fn visitor(&self, depth: usize) -> DataVisitor {
        DataVisitor::new(
            Arc::clone(&self.transport),
            &[
                VisitorConfig::new(self.primary_id, depth),
                VisitorConfig::new(self.secondary_id, depth),
            ],
        )
        .expect("visitor")
    }

    fn transmitters(&self) -> (Arc<dyn Transmitter>, Arc<dyn Transmitter>) {
        let p = self
            .transport
            .create_transmitter(
                RoleAttributes::new("producer_a", &self.primary, "u32"),
                TransportMode::Intra,
            )
            .expect("primary transmitter");
        let s = self
            .transport
            .create_transmitter(
                RoleAttributes::new("producer_b", &self.secondary, "u32"),
                TransportMode::Intra,
            )
            .expect("secondary transmitter");
        (p, s)
    }

    fn msg(&self, channel_id: u64, value: u32) -> MessagePtr {
        Message::new(channel_id, "u32", value.to_le_bytes().to_vec())
    }

    fn teardown(self) {
        self.transport.shutdown();
        self.topology.shutdown();
    }
}

fn value_of(msg: &MessagePtr) -> u32 {
    u32::from_le_bytes(msg.payload().try_into().expect("4-byte payload"))
}

#[test]
fn test_balanced_rates_pair_newest_preceding_secondary() {
    let fixture = Fixture::new("balanced");
    let visitor = fixture.visitor(256);
    let (p, s) = fixture.transmitters();

    // Interleave: s_k arrives just before p_k, like two 10 Hz producers.
    for k in 1..=100u32 {
        assert!(s.transmit(&fixture.msg(fixture.secondary_id, 1000 + k)));
        assert!(p.transmit(&fixture.msg(fixture.primary_id, k)));
    }

    for k in 1..=100u32 {
        let tuple = visitor.try_fetch().expect("fused tuple");
        assert_eq!(value_of(tuple.primary()), k);
        // The secondary component is the newest /s message that preceded
        // the paired /p arrival.
        assert_eq!(value_of(tuple.get(1).expect("secondary present")), 1000 + k);
    }
    assert!(visitor.try_fetch().is_none());

    drop(visitor);
    fixture.teardown();
}

#[test]
fn test_slow_secondary_repeats_latest_value() {
    let fixture = Fixture::new("slow");
    let visitor = fixture.visitor(256);
    let (p, s) = fixture.transmitters();

    assert!(s.transmit(&fixture.msg(fixture.secondary_id, 777)));
    for k in 1..=100u32 {
        assert!(p.transmit(&fixture.msg(fixture.primary_id, k)));
    }

    let mut count = 0u32;
    while let Some(tuple) = visitor.try_fetch() {
        count += 1;
        assert_eq!(value_of(tuple.primary()), count);
        assert_eq!(value_of(tuple.get(1).expect("secondary present")), 777);
    }
    assert_eq!(count, 100);

    drop(visitor);
    fixture.teardown();
}

#[test]
fn test_no_tuple_until_secondary_produces() {
    let fixture = Fixture::new("gated");
    let visitor = fixture.visitor(64);
    let (p, s) = fixture.transmitters();

    assert!(p.transmit(&fixture.msg(fixture.primary_id, 1)));
    assert!(p.transmit(&fixture.msg(fixture.primary_id, 2)));
    assert!(visitor.try_fetch().is_none());

    assert!(s.transmit(&fixture.msg(fixture.secondary_id, 50)));
    // Still nothing: fusion only fires on primary arrivals.
    assert!(visitor.try_fetch().is_none());

    assert!(p.transmit(&fixture.msg(fixture.primary_id, 3)));
    let tuple = visitor.try_fetch().expect("first fused tuple");
    assert_eq!(value_of(tuple.primary()), 3);
    assert_eq!(value_of(tuple.get(1).expect("secondary present")), 50);

    drop(visitor);
    fixture.teardown();
}

#[test]
fn test_fused_primary_sequences_strictly_increase() {
    let fixture = Fixture::new("monotonic");
    let visitor = fixture.visitor(8);
    let (p, s) = fixture.transmitters();

    assert!(s.transmit(&fixture.msg(fixture.secondary_id, 1)));
    // Overrun the fusion buffer so the consumer skips tuples.
    for k in 1..=40u32 {
        assert!(p.transmit(&fixture.msg(fixture.primary_id, k)));
    }

    let mut last = 0u32;
    let mut seen = 0u32;
    while let Some(tuple) = visitor.try_fetch() {
        let value = value_of(tuple.primary());
        assert!(value > last, "primary values must strictly increase");
        last = value;
        seen += 1;
    }
    // Depth 8 of 40: the consumer observes only the tail.
    assert_eq!(seen, 8);
    assert_eq!(last, 40);

    drop(visitor);
    fixture.teardown();
}

#[test]
fn test_wake_handle_signals_on_primary_insert() {
    let fixture = Fixture::new("wake");
    let visitor = fixture.visitor(16);
    let (p, s) = fixture.transmitters();

    assert!(s.transmit(&fixture.msg(fixture.secondary_id, 9)));
    assert!(!visitor.wake_handle().check_and_clear());

    assert!(p.transmit(&fixture.msg(fixture.primary_id, 1)));
    assert!(visitor.wake_handle().check_and_clear());

    drop(visitor);
    fixture.teardown();
}

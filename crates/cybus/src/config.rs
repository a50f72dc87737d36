// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Global configuration - single source of truth.
//!
//! This module centralizes ports, multicast groups, segment geometry and
//! default depths. **Never hardcode these elsewhere.**

use std::net::Ipv4Addr;
use std::time::Duration;

// =======================================================================
// Discovery / datagram transport
// =======================================================================

/// UDP port of the topology discovery participant.
pub const DISCOVERY_PORT: u16 = 11511;

/// UDP port of the transport facade's user-data participant. Separate
/// from discovery so endpoint traffic never surfaces as participant
/// events.
pub const DATA_PORT: u16 = 11513;

/// Multicast group for discovery and user data traffic.
pub const DATAGRAM_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 67, 1);

/// Multicast group used by the multicast shared-memory notifier.
pub const NOTIFY_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 67, 2);

/// UDP port used by the multicast shared-memory notifier.
pub const NOTIFY_MULTICAST_PORT: u16 = 11512;

/// Maximum datagram payload we will ever emit; larger payloads belong on
/// shm or intra.
pub const MAX_DATAGRAM_SIZE: usize = 60 * 1024;

// =======================================================================
// Shared memory
// =======================================================================

/// Blocks per channel segment.
pub const SHM_BLOCK_COUNT: u32 = 32;

/// Payload bytes per block (4KB fits most sensor frames' metadata slices).
pub const SHM_BLOCK_SIZE: u32 = 4096;

/// Capacity of the condition notifier's descriptor ring (power of 2).
pub const NOTIFY_RING_CAPACITY: u64 = 512;

/// How long the shm dispatcher listener blocks before re-checking the
/// shutdown flag.
pub const SHM_LISTEN_TIMEOUT: Duration = Duration::from_millis(100);

/// Name of the process-universe condition notifier segment.
pub const NOTIFY_SEGMENT_NAME: &str = "/cybus_notify";

// =======================================================================
// History / fusion
// =======================================================================

/// Default per-channel history depth when the QoS profile leaves it unset.
pub const DEFAULT_HISTORY_DEPTH: u32 = 16;

/// Maximum number of inputs a data visitor accepts.
pub const MAX_VISITOR_INPUTS: usize = 4;

/// Prefix for per-channel shm segment names.
pub const SHM_SEGMENT_PREFIX: &str = "/cybus_shm_";

/// Build the shm segment name for a channel id.
#[must_use]
pub fn shm_segment_name(channel_id: u64) -> String {
    format!("{}{:016x}", SHM_SEGMENT_PREFIX, channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_name_is_posix_shaped() {
        let name = shm_segment_name(0xdead_beef);
        assert!(name.starts_with('/'));
        assert_eq!(name.matches('/').count(), 1);
        assert_eq!(name, "/cybus_shm_00000000deadbeef");
    }

    #[test]
    fn test_notify_ring_capacity_power_of_two() {
        assert!(NOTIFY_RING_CAPACITY.is_power_of_two());
    }
}

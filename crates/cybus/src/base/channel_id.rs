// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Channel-name hashing and the process-wide name registry.
//!
//! Channel ids are a deterministic 64-bit FNV-1a hash of the UTF-8 channel
//! name, stable across hosts and processes. The registry keeps the reverse
//! mapping for diagnostics; on the vanishingly unlikely collision the first
//! registration wins and the collision is logged.

use dashmap::DashMap;
use std::sync::Arc;
use std::sync::OnceLock;

/// 64-bit channel identifier derived from the channel name.
pub type ChannelId = u64;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64 hash of a channel name.
#[must_use]
pub fn hash_name(name: &str) -> ChannelId {
    let mut hash = FNV_OFFSET;
    for byte in name.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn registry() -> &'static DashMap<ChannelId, Arc<str>> {
    static REGISTRY: OnceLock<DashMap<ChannelId, Arc<str>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Hash a channel name and record it in the reverse registry.
///
/// Registration is idempotent. A hash collision keeps the first name and
/// logs the conflict; the returned id is the hash either way.
#[must_use]
pub fn register_channel(name: &str) -> ChannelId {
    let id = hash_name(name);
    match registry().entry(id) {
        dashmap::mapref::entry::Entry::Occupied(existing) => {
            if existing.get().as_ref() != name {
                log::warn!(
                    "[ChannelId] hash collision: '{}' vs '{}' both map to {:#018x}",
                    existing.get(),
                    name,
                    id
                );
            }
        }
        dashmap::mapref::entry::Entry::Vacant(slot) => {
            slot.insert(Arc::from(name));
        }
    }
    id
}

/// Reverse lookup for diagnostics. Returns `None` for never-registered ids.
#[must_use]
pub fn name_of(id: ChannelId) -> Option<Arc<str>> {
    registry().get(&id).map(|entry| Arc::clone(entry.value()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_name("/sensor/lidar"), hash_name("/sensor/lidar"));
        assert_ne!(hash_name("/sensor/lidar"), hash_name("/sensor/radar"));
    }

    #[test]
    fn test_hash_matches_fnv_vectors() {
        // Published FNV-1a 64 test vectors.
        assert_eq!(hash_name(""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(hash_name("a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_register_and_reverse_lookup() {
        let id = register_channel("/test/reverse_lookup");
        assert_eq!(name_of(id).as_deref(), Some("/test/reverse_lookup"));
        // Idempotent.
        assert_eq!(register_channel("/test/reverse_lookup"), id);
    }

    #[test]
    fn test_unregistered_id_has_no_name() {
        let id = hash_name("/test/never_registered_name");
        assert!(name_of(id).is_none());
    }
}

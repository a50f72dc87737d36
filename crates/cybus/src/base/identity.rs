// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Opaque 16-byte endpoint identity.
//!
//! Distinguishes endpoint instances; two endpoints on the same channel in
//! the same process still carry distinct identities. The hash is cached so
//! identities are cheap map keys.

use std::fmt;
use std::hash::{Hash, Hasher};

/// Length of an identity value in bytes.
pub const IDENTITY_LEN: usize = 16;

/// Opaque endpoint instance identifier.
#[derive(Clone, Copy, Eq)]
pub struct Identity {
    bytes: [u8; IDENTITY_LEN],
    hash: u64,
}

impl Identity {
    /// Create a fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = [0u8; IDENTITY_LEN];
        fill_random(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// Wrap an existing 16-byte value (e.g. a datagram-layer guid).
    #[must_use]
    pub fn from_bytes(bytes: [u8; IDENTITY_LEN]) -> Self {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in &bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        Self { bytes, hash }
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.bytes
    }

    /// Cached FNV hash of the identity bytes.
    #[must_use]
    pub fn hash_value(&self) -> u64 {
        self.hash
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Identity {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.bytes == other.bytes
    }
}

impl Hash for Identity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({:016x})", self.hash)
    }
}

#[cfg(target_os = "linux")]
fn fill_random(buf: &mut [u8]) {
    let mut filled = 0usize;
    while filled < buf.len() {
        // SAFETY: buf is a valid writable region of buf.len() - filled bytes
        // starting at offset filled; getrandom writes at most that many.
        let ret = unsafe {
            libc::getrandom(
                buf[filled..].as_mut_ptr().cast::<libc::c_void>(),
                buf.len() - filled,
                0,
            )
        };
        if ret <= 0 {
            // EINTR or transient failure: mix in a clock-derived fallback
            // rather than looping forever on a broken kernel.
            fallback_fill(&mut buf[filled..]);
            return;
        }
        filled += ret as usize;
    }
}

#[cfg(not(target_os = "linux"))]
fn fill_random(buf: &mut [u8]) {
    fallback_fill(buf);
}

fn fallback_fill(buf: &mut [u8]) {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::{SystemTime, UNIX_EPOCH};

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);
    let mut state = nanos ^ COUNTER.fetch_add(1, Ordering::Relaxed).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    for byte in buf.iter_mut() {
        // splitmix64 step
        state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        *byte = (z ^ (z >> 31)) as u8;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_identities_are_distinct() {
        let mut seen = HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(Identity::new()));
        }
    }

    #[test]
    fn test_from_bytes_roundtrip() {
        let bytes = [7u8; IDENTITY_LEN];
        let id = Identity::from_bytes(bytes);
        assert_eq!(id.bytes(), &bytes);
        assert_eq!(id, Identity::from_bytes(bytes));
    }

    #[test]
    fn test_hash_is_stable() {
        let id = Identity::from_bytes([1u8; IDENTITY_LEN]);
        assert_eq!(id.hash_value(), Identity::from_bytes([1u8; IDENTITY_LEN]).hash_value());
    }
}

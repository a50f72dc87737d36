// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded ring buffer keyed by monotonically increasing sequence numbers.
//!
//! Stores the K most recent values for one channel. Sequence numbers start
//! at 1, are assigned on insert, and are never reused. A value with
//! sequence S lives in slot `S % K` until overwritten by S + K.
//!
//! Readers take the read side of the lock, so they observe either the
//! pre- or post-insert state of a slot, never a torn value; each slot is
//! stamped with its sequence and the stamp is validated on every read, so
//! an evicted (or never-filled) sequence reads as a miss.

use parking_lot::RwLock;

use crate::error::{Error, Result};

#[derive(Clone)]
struct Slot<T> {
    seq: u64,
    value: T,
}

struct Ring<T> {
    slots: Box<[Option<Slot<T>>]>,
    /// Sequence of the newest entry; 0 before the first insert.
    head_seq: u64,
}

/// Bounded per-channel history ring.
///
/// Insert is mutually exclusive against other inserts; fetches run under
/// the shared side of the lock and never block each other.
pub struct CacheBuffer<T> {
    ring: RwLock<Ring<T>>,
    capacity: u64,
}

impl<T: Clone> CacheBuffer<T> {
    /// Create a buffer holding the `capacity` most recent values.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidCapacity` for a zero capacity.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidCapacity(capacity));
        }
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Ok(Self {
            ring: RwLock::new(Ring {
                slots: slots.into_boxed_slice(),
                head_seq: 0,
            }),
            capacity: capacity as u64,
        })
    }

    /// Insert a value, assigning and returning the next sequence number.
    pub fn insert(&self, value: T) -> u64 {
        let mut ring = self.ring.write();
        let seq = ring.head_seq + 1;
        let idx = (seq % self.capacity) as usize;
        ring.slots[idx] = Some(Slot { seq, value });
        ring.head_seq = seq;
        seq
    }

    /// Insert a value under an explicit sequence, which must exceed the
    /// current head. Sequences skipped over become holes that read as
    /// misses. Used by the fusion engine to stamp tuples with the primary
    /// channel's sequence.
    pub fn insert_at(&self, seq: u64, value: T) -> bool {
        let mut ring = self.ring.write();
        if seq <= ring.head_seq {
            return false;
        }
        let idx = (seq % self.capacity) as usize;
        ring.slots[idx] = Some(Slot { seq, value });
        ring.head_seq = seq;
        true
    }

    /// Most recent entry, or `None` before the first insert.
    #[must_use]
    pub fn fetch_latest(&self) -> Option<(u64, T)> {
        let ring = self.ring.read();
        if ring.head_seq == 0 {
            return None;
        }
        let idx = (ring.head_seq % self.capacity) as usize;
        match &ring.slots[idx] {
            Some(slot) if slot.seq == ring.head_seq => Some((slot.seq, slot.value.clone())),
            _ => None,
        }
    }

    /// Entry at exactly `seq`, if still resident.
    #[must_use]
    pub fn fetch(&self, seq: u64) -> Option<T> {
        let ring = self.ring.read();
        if !Self::resident_range_contains(&ring, self.capacity, seq) {
            return None;
        }
        let idx = (seq % self.capacity) as usize;
        match &ring.slots[idx] {
            Some(slot) if slot.seq == seq => Some(slot.value.clone()),
            _ => None,
        }
    }

    /// Oldest resident entry with sequence >= `*seq`. On a hit the actual
    /// sequence is written back through `seq`.
    #[must_use]
    pub fn fetch_at_or_after(&self, seq: &mut u64) -> Option<T> {
        let ring = self.ring.read();
        if ring.head_seq == 0 || *seq > ring.head_seq {
            return None;
        }
        let oldest = ring.head_seq.saturating_sub(self.capacity - 1).max(1);
        let start = (*seq).max(oldest);
        for candidate in start..=ring.head_seq {
            let idx = (candidate % self.capacity) as usize;
            if let Some(slot) = &ring.slots[idx] {
                if slot.seq == candidate {
                    *seq = candidate;
                    return Some(slot.value.clone());
                }
            }
        }
        None
    }

    /// Sequence of the newest entry; 0 before the first insert.
    #[must_use]
    pub fn head_seq(&self) -> u64 {
        self.ring.read().head_seq
    }

    /// Number of resident entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let ring = self.ring.read();
        let oldest = ring.head_seq.saturating_sub(self.capacity - 1).max(1);
        if ring.head_seq == 0 {
            return 0;
        }
        let mut count = 0usize;
        for candidate in oldest..=ring.head_seq {
            let idx = (candidate % self.capacity) as usize;
            if matches!(&ring.slots[idx], Some(slot) if slot.seq == candidate) {
                count += 1;
            }
        }
        count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.read().head_seq == 0
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    fn resident_range_contains(ring: &Ring<T>, capacity: u64, seq: u64) -> bool {
        if ring.head_seq == 0 || seq == 0 || seq > ring.head_seq {
            return false;
        }
        let oldest = ring.head_seq.saturating_sub(capacity - 1).max(1);
        seq >= oldest
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-process notifiers: how a writer tells readers a block is ready.
//!
//! Two variants behind one trait:
//!
//! - [`ConditionNotifier`] (default): a dedicated shm segment carrying a
//!   ring of readable descriptors plus a futex word for wakeups. One
//!   segment serves the whole process universe; descriptors carry the
//!   channel id so each listener filters its own channels.
//! - [`MulticastNotifier`]: each descriptor is one UDP multicast datagram.
//!   Delivery is not assumed and duplicates are tolerated.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};

use super::futex::{futex_wait, futex_wake_all};
use super::readable::{ReadableDesc, READABLE_DESC_LEN};
use super::{Result, ShmError};
use crate::config::NOTIFY_RING_CAPACITY;
use crate::transport::metrics::global_metrics;

/// Signal/listen contract shared by both notifier variants.
pub trait Notifier: Send + Sync {
    /// Publish a descriptor. Returns `false` when the signal could not be
    /// delivered (counted, not raised).
    fn notify(&self, desc: &ReadableDesc) -> bool;

    /// Block for up to `timeout` waiting for the next descriptor.
    fn listen(&self, timeout: Duration) -> Option<ReadableDesc>;

    /// Stop accepting and delivering signals.
    fn shutdown(&self);
}

// ============================================================================
// Condition notifier (shm ring + futex)
// ============================================================================

const NOTIFY_MAGIC: u64 = 0x4359_4255_534e_4f54; // "CYBUSNOT"
const NOTIFY_HEADER_SIZE: usize = 64;
const NOTIFY_CELL_SIZE: usize = 32;
const STAMP_SPIN_LIMIT: u32 = 1024;

use super::segment::{RawSegment, INIT_WAIT_LIMIT, INIT_WAIT_SLICE};

/// Shared-memory condition notifier.
///
/// The ring is multi-writer multi-reader: writers claim a ticket from the
/// shared `written` counter, invalidate the cell stamp, copy the
/// descriptor, restamp, then bump the futex word and wake. Each listener
/// keeps a private cursor and validates the stamp before and after
/// copying, so a lapping writer turns into a skip, never a torn read.
/// A listener attaching late starts at the current ticket; history is not
/// replayed.
pub struct ConditionNotifier {
    raw: RawSegment,
    cursor: AtomicU64,
    is_shutdown: AtomicBool,
}

impl ConditionNotifier {
    /// Open (or create) the named notifier segment.
    ///
    /// # Errors
    ///
    /// Propagates segment mapping failures.
    pub fn new(name: &str) -> Result<Self> {
        let size = NOTIFY_HEADER_SIZE + NOTIFY_RING_CAPACITY as usize * NOTIFY_CELL_SIZE;
        let (raw, created) = RawSegment::open_or_create(name, size)?;
        let notifier = Self {
            raw,
            cursor: AtomicU64::new(0),
            is_shutdown: AtomicBool::new(false),
        };

        if created {
            notifier.futex_word().store(0, Ordering::Relaxed);
            notifier.written().store(0, Ordering::Relaxed);
            for cell in 0..NOTIFY_RING_CAPACITY {
                notifier.cell_stamp(cell).store(0, Ordering::Relaxed);
            }
            notifier.magic().store(NOTIFY_MAGIC, Ordering::Release);
        } else {
            let mut waited = 0u32;
            while notifier.magic().load(Ordering::Acquire) != NOTIFY_MAGIC {
                waited += 1;
                if waited > INIT_WAIT_LIMIT {
                    return Err(ShmError::InitTimeout(notifier.raw.name().to_string()));
                }
                std::thread::sleep(INIT_WAIT_SLICE);
            }
        }

        notifier
            .cursor
            .store(notifier.written().load(Ordering::Acquire), Ordering::Relaxed);
        Ok(notifier)
    }

    fn base(&self) -> *mut u8 {
        self.raw.as_ptr()
    }

    fn magic(&self) -> &AtomicU64 {
        // SAFETY: the ring area starts with a 64-byte header whose first
        // word is the magic.
        unsafe { &*self.base().cast::<AtomicU64>() }
    }

    fn futex_word(&self) -> &AtomicU32 {
        // SAFETY: offset 8 of the header, 4-byte aligned.
        unsafe { &*self.base().add(8).cast::<AtomicU32>() }
    }

    fn written(&self) -> &AtomicU64 {
        // SAFETY: offset 16 of the header, 8-byte aligned.
        unsafe { &*self.base().add(16).cast::<AtomicU64>() }
    }

    fn cell_stamp(&self, cell: u64) -> &AtomicU64 {
        // SAFETY: cell < NOTIFY_RING_CAPACITY; each cell is 32 bytes with
        // the stamp first.
        unsafe {
            &*self
                .base()
                .add(NOTIFY_HEADER_SIZE + cell as usize * NOTIFY_CELL_SIZE)
                .cast::<AtomicU64>()
        }
    }

    fn cell_desc_ptr(&self, cell: u64) -> *mut u8 {
        // SAFETY: descriptor bytes sit right after the 8-byte stamp.
        unsafe {
            self.base()
                .add(NOTIFY_HEADER_SIZE + cell as usize * NOTIFY_CELL_SIZE + 8)
        }
    }

    fn try_pop(&self) -> Option<ReadableDesc> {
        loop {
            let written = self.written().load(Ordering::Acquire);
            let mut cursor = self.cursor.load(Ordering::Relaxed);
            if cursor >= written {
                return None;
            }
            // Fell more than a full ring behind: jump to the oldest
            // possibly-intact ticket.
            if written - cursor > NOTIFY_RING_CAPACITY {
                cursor = written - NOTIFY_RING_CAPACITY;
                self.cursor.store(cursor, Ordering::Relaxed);
            }

            let cell = cursor % NOTIFY_RING_CAPACITY;
            let expected = cursor + 1;
            let mut spins = 0u32;
            loop {
                let stamp = self.cell_stamp(cell).load(Ordering::Acquire);
                if stamp == expected {
                    let mut buf = [0u8; READABLE_DESC_LEN];
                    // SAFETY: the cell's descriptor area is READABLE_DESC_LEN
                    // bytes; concurrent rewrites are detected by the stamp
                    // re-check below.
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            self.cell_desc_ptr(cell),
                            buf.as_mut_ptr(),
                            READABLE_DESC_LEN,
                        );
                    }
                    if self.cell_stamp(cell).load(Ordering::Acquire) == expected {
                        self.cursor.store(cursor + 1, Ordering::Relaxed);
                        return ReadableDesc::decode(&buf);
                    }
                    // Lapped mid-copy: skip this ticket.
                    self.cursor.store(cursor + 1, Ordering::Relaxed);
                    break;
                }
                if stamp > expected {
                    // Cell already recycled by a later ticket.
                    self.cursor.store(cursor + 1, Ordering::Relaxed);
                    break;
                }
                // Writer claimed the ticket but has not stamped yet.
                spins += 1;
                if spins > STAMP_SPIN_LIMIT {
                    return None;
                }
                std::hint::spin_loop();
            }
        }
    }
}

impl Notifier for ConditionNotifier {
    fn notify(&self, desc: &ReadableDesc) -> bool {
        if self.is_shutdown.load(Ordering::Acquire) {
            return false;
        }
        let ticket = self.written().fetch_add(1, Ordering::AcqRel);
        let cell = ticket % NOTIFY_RING_CAPACITY;
        let encoded = desc.encode();

        self.cell_stamp(cell).store(0, Ordering::Release);
        // SAFETY: the descriptor area is READABLE_DESC_LEN bytes; readers
        // observing the zero stamp will not trust these bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                encoded.as_ptr(),
                self.cell_desc_ptr(cell),
                READABLE_DESC_LEN,
            );
        }
        self.cell_stamp(cell).store(ticket + 1, Ordering::Release);

        self.futex_word().fetch_add(1, Ordering::Release);
        futex_wake_all(self.futex_word());
        true
    }

    fn listen(&self, timeout: Duration) -> Option<ReadableDesc> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_shutdown.load(Ordering::Acquire) {
                return None;
            }
            if let Some(desc) = self.try_pop() {
                return Some(desc);
            }
            let snapshot = self.futex_word().load(Ordering::Acquire);
            // Re-check between snapshot and wait to close the lost-wake
            // window.
            if let Some(desc) = self.try_pop() {
                return Some(desc);
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            futex_wait(self.futex_word(), snapshot, Some(deadline - now));
        }
    }

    fn shutdown(&self) {
        if !self.is_shutdown.swap(true, Ordering::AcqRel) {
            // Kick any listener out of its futex wait.
            self.futex_word().fetch_add(1, Ordering::Release);
            futex_wake_all(self.futex_word());
        }
    }
}

impl ConditionNotifier {
    /// Remove the notifier segment name; used on final teardown and by
    /// tests.
    pub fn unlink(&self) {
        self.raw.unlink();
    }
}

// ============================================================================
// Multicast notifier (UDP datagrams)
// ============================================================================

/// UDP multicast notifier: one descriptor per datagram.
pub struct MulticastNotifier {
    socket: UdpSocket,
    target: SocketAddr,
    is_shutdown: AtomicBool,
}

impl MulticastNotifier {
    /// Bind and join the notifier multicast group.
    ///
    /// The group join is best-effort (interfaces without multicast routes
    /// degrade to loopback delivery); socket creation and bind failures
    /// are construction errors.
    ///
    /// # Errors
    ///
    /// Returns `ShmError::Socket` when socket setup fails.
    pub fn new(group: Ipv4Addr, port: u16) -> Result<Self> {
        let socket =
            Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(ShmError::Socket)?;
        socket.set_reuse_address(true).map_err(ShmError::Socket)?;
        #[cfg(unix)]
        socket.set_reuse_port(true).map_err(ShmError::Socket)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket.bind(&bind_addr.into()).map_err(ShmError::Socket)?;

        let socket: UdpSocket = socket.into();
        if let Err(e) = socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            log::debug!("[MulticastNotifier] join_multicast_v4({}) failed (non-fatal): {}", group, e);
        }
        let _ = socket.set_multicast_loop_v4(true);
        let _ = socket.set_multicast_ttl_v4(1);

        Ok(Self {
            socket,
            target: SocketAddr::V4(SocketAddrV4::new(group, port)),
            is_shutdown: AtomicBool::new(false),
        })
    }
}

impl Notifier for MulticastNotifier {
    fn notify(&self, desc: &ReadableDesc) -> bool {
        if self.is_shutdown.load(Ordering::Acquire) {
            return false;
        }
        match self.socket.send_to(&desc.encode(), self.target) {
            Ok(_) => true,
            Err(e) => {
                global_metrics().inc_notify_failures();
                log::debug!("[MulticastNotifier] send failed: {}", e);
                false
            }
        }
    }

    fn listen(&self, timeout: Duration) -> Option<ReadableDesc> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return None;
        }
        if self.socket.set_read_timeout(Some(timeout)).is_err() {
            return None;
        }
        let mut buf = [0u8; 64];
        match self.socket.recv_from(&mut buf) {
            Ok((len, _)) if len >= READABLE_DESC_LEN => ReadableDesc::decode(&buf[..len]),
            Ok(_) => None,
            Err(_) => None,
        }
    }

    fn shutdown(&self) {
        self.is_shutdown.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NOTIFY_MULTICAST_GROUP, NOTIFY_MULTICAST_PORT};
    use std::sync::atomic::AtomicU32 as StdAtomicU32;
    use std::sync::Arc;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        static COUNTER: StdAtomicU32 = StdAtomicU32::new(0);
        format!(
            "/cybus_test_notify_{}_{}_{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_condition_notify_then_listen() {
        let name = unique_name("basic");
        let notifier = ConditionNotifier::new(&name).expect("notifier");
        let desc = ReadableDesc::new(42, 3, 128);

        assert!(notifier.notify(&desc));
        let received = notifier.listen(Duration::from_millis(100)).expect("descriptor");
        assert_eq!(received, desc);

        // Nothing further: times out empty.
        assert!(notifier.listen(Duration::from_millis(20)).is_none());
        notifier.unlink();
    }

    #[test]
    fn test_condition_preserves_order() {
        let name = unique_name("order");
        let notifier = ConditionNotifier::new(&name).expect("notifier");
        for i in 0..10u32 {
            assert!(notifier.notify(&ReadableDesc::new(7, i, 16)));
        }
        for i in 0..10u32 {
            let desc = notifier.listen(Duration::from_millis(100)).expect("descriptor");
            assert_eq!(desc.block_index, i);
        }
        notifier.unlink();
    }

    #[test]
    fn test_condition_wakes_blocked_listener() {
        let name = unique_name("wake");
        let notifier = Arc::new(ConditionNotifier::new(&name).expect("notifier"));
        let listener = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || notifier.listen(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        assert!(notifier.notify(&ReadableDesc::new(9, 1, 8)));
        let received = listener.join().expect("listener thread");
        assert_eq!(received, Some(ReadableDesc::new(9, 1, 8)));
        notifier.unlink();
    }

    #[test]
    fn test_condition_shutdown_stops_listen() {
        let name = unique_name("shutdown");
        let notifier = Arc::new(ConditionNotifier::new(&name).expect("notifier"));
        let listener = {
            let notifier = Arc::clone(&notifier);
            thread::spawn(move || notifier.listen(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(30));
        notifier.shutdown();
        assert_eq!(listener.join().expect("listener thread"), None);
        assert!(!notifier.notify(&ReadableDesc::new(1, 1, 1)));
        notifier.unlink();
    }

    #[test]
    fn test_late_listener_skips_history() {
        let name = unique_name("late");
        let early = ConditionNotifier::new(&name).expect("notifier");
        assert!(early.notify(&ReadableDesc::new(1, 0, 8)));

        let late = ConditionNotifier::new(&name).expect("second mapping");
        assert!(late.listen(Duration::from_millis(20)).is_none());
        assert!(early.notify(&ReadableDesc::new(1, 1, 8)));
        let desc = late.listen(Duration::from_millis(100)).expect("descriptor");
        assert_eq!(desc.block_index, 1);
        early.unlink();
    }

    #[test]
    fn test_multicast_notifier_construction() {
        let notifier = MulticastNotifier::new(NOTIFY_MULTICAST_GROUP, NOTIFY_MULTICAST_PORT)
            .expect("socket setup");
        notifier.shutdown();
        assert!(!notifier.notify(&ReadableDesc::new(1, 2, 3)));
        assert!(notifier.listen(Duration::from_millis(1)).is_none());
    }
}

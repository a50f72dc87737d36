// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Process-level participant on the datagram transport.
//!
//! Owns the multicast socket and the receive thread. Discovery is
//! announce-based: a participant multicasts ANNOUNCE on startup,
//! re-announces once whenever it first hears an unknown peer (so late
//! joiners converge without a periodic beacon) and multicasts BYE on
//! shutdown. User payloads travel as per-channel DATA frames handed to
//! channel-filtered subscriber callbacks.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, Socket, Type};

use crate::base::channel_id::ChannelId;
use crate::base::identity::Identity;
use crate::config::{DATAGRAM_MULTICAST_GROUP, MAX_DATAGRAM_SIZE};
use crate::error::{Error, Result};
use crate::transport::metrics::global_metrics;
use crate::transport::rtps::wire::Frame;

const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Discovery event surfaced to the topology manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartInfo {
    pub guid: [u8; 16],
    /// Participant name as announced; empty for `Removed` events (the
    /// topology manager recovers it from its own directory).
    pub name: String,
    pub status: DiscoveryStatus,
}

/// What happened to the peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DiscoveryStatus {
    Discovered,
    Removed,
}

/// Callback invoked on every discovery event.
pub type DiscoveryCallback = Arc<dyn Fn(PartInfo) + Send + Sync>;

/// Callback invoked per received DATA frame: (channel, seq, type, payload).
pub type DataCallback = Arc<dyn Fn(ChannelId, u64, &str, Vec<u8>) + Send + Sync>;

struct Inner {
    name: String,
    guid: [u8; 16],
    socket: Arc<UdpSocket>,
    target: SocketAddr,
    discovery_cb: RwLock<Option<DiscoveryCallback>>,
    subscribers: RwLock<HashMap<ChannelId, Vec<(Identity, DataCallback)>>>,
    /// guid -> announced name of every live peer.
    peers: Mutex<HashMap<[u8; 16], String>>,
    is_shutdown: AtomicBool,
}

/// Participant handle; shuts the transport down on drop.
pub struct Participant {
    inner: Arc<Inner>,
    recv_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Participant {
    /// Create the participant on `port`, bind the multicast socket and
    /// start the receive thread.
    ///
    /// The multicast group join is best-effort (it degrades to loopback
    /// delivery on hosts without a multicast route); bind failures are
    /// construction errors.
    ///
    /// # Errors
    ///
    /// Returns `Error::ParticipantCreate` when socket setup fails.
    pub fn new(name: &str, port: u16) -> Result<Arc<Self>> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(Error::ParticipantCreate)?;
        socket
            .set_reuse_address(true)
            .map_err(Error::ParticipantCreate)?;
        #[cfg(unix)]
        socket
            .set_reuse_port(true)
            .map_err(Error::ParticipantCreate)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
        socket
            .bind(&bind_addr.into())
            .map_err(Error::ParticipantCreate)?;

        let socket: UdpSocket = socket.into();
        if let Err(e) = socket.join_multicast_v4(&DATAGRAM_MULTICAST_GROUP, &Ipv4Addr::UNSPECIFIED)
        {
            log::debug!(
                "[Participant] join_multicast_v4({}) failed (non-fatal): {}",
                DATAGRAM_MULTICAST_GROUP,
                e
            );
        }
        let _ = socket.set_multicast_loop_v4(true);
        let _ = socket.set_multicast_ttl_v4(1);
        socket
            .set_read_timeout(Some(RECV_TIMEOUT))
            .map_err(Error::ParticipantCreate)?;

        let inner = Arc::new(Inner {
            name: name.to_string(),
            guid: *Identity::new().bytes(),
            socket: Arc::new(socket),
            target: SocketAddr::V4(SocketAddrV4::new(DATAGRAM_MULTICAST_GROUP, port)),
            discovery_cb: RwLock::new(None),
            subscribers: RwLock::new(HashMap::new()),
            peers: Mutex::new(HashMap::new()),
            is_shutdown: AtomicBool::new(false),
        });

        let recv_inner = Arc::clone(&inner);
        let handle = std::thread::Builder::new()
            .name("cybus-rtps-recv".to_string())
            .spawn(move || recv_loop(&recv_inner))
            .map_err(Error::ParticipantCreate)?;

        inner.announce();
        log::debug!("[Participant] '{}' up, guid={:02x?}", name, &inner.guid[..4]);

        Ok(Arc::new(Self {
            inner,
            recv_thread: Mutex::new(Some(handle)),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[must_use]
    pub fn guid(&self) -> [u8; 16] {
        self.inner.guid
    }

    /// Install the discovery callback, replaying already-known peers so a
    /// late-registered listener still sees the full picture.
    pub fn set_discovery_callback(&self, callback: DiscoveryCallback) {
        let known: Vec<PartInfo> = {
            let peers = self.inner.peers.lock();
            peers
                .iter()
                .map(|(guid, name)| PartInfo {
                    guid: *guid,
                    name: name.clone(),
                    status: DiscoveryStatus::Discovered,
                })
                .collect()
        };
        for info in known {
            callback(info);
        }
        *self.inner.discovery_cb.write() = Some(callback);
    }

    /// Create a per-channel publisher.
    #[must_use]
    pub fn create_publisher(&self, channel_id: ChannelId, type_name: &str) -> RtpsPublisher {
        RtpsPublisher {
            inner: Arc::clone(&self.inner),
            channel_id,
            type_name: type_name.to_string(),
            seq: AtomicU64::new(0),
        }
    }

    /// Register a channel-filtered data callback.
    pub fn subscribe(&self, channel_id: ChannelId, id: Identity, callback: DataCallback) {
        let mut subs = self.inner.subscribers.write();
        let entries = subs.entry(channel_id).or_default();
        if entries.iter().any(|(existing, _)| *existing == id) {
            return;
        }
        entries.push((id, callback));
    }

    pub fn unsubscribe(&self, channel_id: ChannelId, id: &Identity) {
        let mut subs = self.inner.subscribers.write();
        if let Some(entries) = subs.get_mut(&channel_id) {
            entries.retain(|(existing, _)| existing != id);
            if entries.is_empty() {
                subs.remove(&channel_id);
            }
        }
    }

    /// Say goodbye and stop the receive thread. Idempotent.
    pub fn shutdown(&self) {
        if self.inner.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let bye = Frame::Bye {
            guid: self.inner.guid,
        }
        .encode();
        if let Err(e) = self.inner.socket.send_to(&bye, self.inner.target) {
            log::debug!("[Participant] BYE send failed: {}", e);
        }
        if let Some(handle) = self.recv_thread.lock().take() {
            if handle.join().is_err() {
                log::debug!("[Participant] receive thread panicked");
            }
        }
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Inner {
    fn announce(&self) {
        let frame = Frame::Announce {
            guid: self.guid,
            name: self.name.clone(),
        }
        .encode();
        if let Err(e) = self.socket.send_to(&frame, self.target) {
            log::debug!("[Participant] ANNOUNCE send failed: {}", e);
        }
    }

    fn emit_discovery(&self, info: PartInfo) {
        let callback = self.discovery_cb.read().clone();
        if let Some(callback) = callback {
            callback(info);
        }
    }
}

fn recv_loop(inner: &Arc<Inner>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 1024];
    while !inner.is_shutdown.load(Ordering::Acquire) {
        let len = match inner.socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            // Timeout: loop around and re-check the shutdown flag.
            Err(ref e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(e) => {
                log::debug!("[Participant] recv failed: {}", e);
                continue;
            }
        };

        let Some(frame) = Frame::decode(&buf[..len]) else {
            continue;
        };
        match frame {
            Frame::Announce { guid, name } => {
                if guid == inner.guid {
                    continue;
                }
                let first_sight = inner.peers.lock().insert(guid, name.clone()).is_none();
                if first_sight {
                    // Answer so the new peer learns about us too.
                    inner.announce();
                    inner.emit_discovery(PartInfo {
                        guid,
                        name,
                        status: DiscoveryStatus::Discovered,
                    });
                }
            }
            Frame::Bye { guid } => {
                if guid == inner.guid {
                    continue;
                }
                if inner.peers.lock().remove(&guid).is_some() {
                    inner.emit_discovery(PartInfo {
                        guid,
                        name: String::new(),
                        status: DiscoveryStatus::Removed,
                    });
                }
            }
            Frame::Data {
                channel_id,
                seq,
                type_name,
                payload,
                ..
            } => {
                let callbacks: Vec<DataCallback> = {
                    let subs = inner.subscribers.read();
                    match subs.get(&channel_id) {
                        Some(entries) => entries.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
                        None => continue,
                    }
                };
                for callback in callbacks {
                    callback(channel_id, seq, &type_name, payload.clone());
                }
            }
        }
    }
}

/// Per-channel sender on the datagram transport.
pub struct RtpsPublisher {
    inner: Arc<Inner>,
    channel_id: ChannelId,
    type_name: String,
    seq: AtomicU64,
}

impl RtpsPublisher {
    /// Multicast one payload. Failures are counted, not raised.
    pub fn publish(&self, payload: &[u8]) -> bool {
        if payload.len() > MAX_DATAGRAM_SIZE {
            global_metrics().inc_rtps_send_failures();
            log::debug!(
                "[RtpsPublisher] payload of {} bytes exceeds datagram limit",
                payload.len()
            );
            return false;
        }
        let frame = Frame::Data {
            guid: self.inner.guid,
            channel_id: self.channel_id,
            seq: self.seq.fetch_add(1, Ordering::Relaxed) + 1,
            type_name: self.type_name.clone(),
            payload: payload.to_vec(),
        }
        .encode();
        match self.inner.socket.send_to(&frame, self.inner.target) {
            Ok(_) => true,
            Err(e) => {
                global_metrics().inc_rtps_send_failures();
                log::debug!("[RtpsPublisher] send failed: {}", e);
                false
            }
        }
    }

    #[must_use]
    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PORT: u16 = 21511;

    #[test]
    fn test_participant_lifecycle() {
        let participant = Participant::new("hostT+4242", TEST_PORT).expect("participant");
        assert_eq!(participant.name(), "hostT+4242");
        participant.shutdown();
        // Idempotent.
        participant.shutdown();
    }

    #[test]
    fn test_subscribe_unsubscribe_bookkeeping() {
        let participant = Participant::new("hostT+4243", TEST_PORT).expect("participant");
        let id = Identity::new();
        participant.subscribe(5, id, Arc::new(|_, _, _, _| {}));
        // Duplicate registration is a no-op.
        participant.subscribe(5, id, Arc::new(|_, _, _, _| {}));
        assert_eq!(participant.inner.subscribers.read().get(&5).map(Vec::len), Some(1));
        participant.unsubscribe(5, &id);
        assert!(participant.inner.subscribers.read().get(&5).is_none());
        participant.shutdown();
    }

    #[test]
    fn test_publisher_sequences_increase() {
        let participant = Participant::new("hostT+4244", TEST_PORT).expect("participant");
        let publisher = participant.create_publisher(9, "bytes");
        // Sequence numbering is per publisher, starting at 1.
        assert_eq!(publisher.seq.load(Ordering::Relaxed), 0);
        let _ = publisher.publish(b"one");
        let _ = publisher.publish(b"two");
        assert_eq!(publisher.seq.load(Ordering::Relaxed), 2);
        participant.shutdown();
    }
}

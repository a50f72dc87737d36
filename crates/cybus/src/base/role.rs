// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Role attributes and the endpoint contract.
//!
//! Every transmitter and receiver carries the attributes of the role it
//! plays on a channel: where it lives (host, process), what it belongs to
//! (node), what it speaks (channel, message type) and how (QoS profile).
//! Host name and process id are all the hybrid transport needs to judge
//! the relative position of two endpoints.

use crate::base::channel_id::{register_channel, ChannelId};
use crate::base::identity::Identity;
use crate::qos::QosProfile;

/// Relative position of a remote endpoint, used for transport selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Locality {
    /// Same host name, same process id.
    SameProcess,
    /// Same host name, different process id.
    SameHost,
    /// Different host name.
    OtherHost,
}

/// Attributes attached to every channel endpoint.
#[derive(Clone, Debug)]
pub struct RoleAttributes {
    pub host_name: String,
    pub process_id: u32,
    pub node_name: String,
    pub channel_name: String,
    pub channel_id: ChannelId,
    pub message_type: String,
    pub id: Identity,
    pub qos: QosProfile,
}

impl RoleAttributes {
    /// Build attributes for an endpoint in this process.
    #[must_use]
    pub fn new(node_name: &str, channel_name: &str, message_type: &str) -> Self {
        Self {
            host_name: local_host_name(),
            process_id: std::process::id(),
            node_name: node_name.to_string(),
            channel_name: channel_name.to_string(),
            channel_id: register_channel(channel_name),
            message_type: message_type.to_string(),
            id: Identity::new(),
            qos: QosProfile::default(),
        }
    }

    /// Attributes identifying a bare process, as carried by participant
    /// join/leave events (no node or channel binding).
    #[must_use]
    pub fn for_process(host_name: &str, process_id: u32) -> Self {
        Self {
            host_name: host_name.to_string(),
            process_id,
            node_name: String::new(),
            channel_name: String::new(),
            channel_id: 0,
            message_type: String::new(),
            id: Identity::new(),
            qos: QosProfile::default(),
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QosProfile) -> Self {
        self.qos = qos;
        self
    }

    /// Judge where `other` lives relative to this endpoint.
    #[must_use]
    pub fn locality_of(&self, other: &RoleAttributes) -> Locality {
        if self.host_name != other.host_name {
            Locality::OtherHost
        } else if self.process_id != other.process_id {
            Locality::SameHost
        } else {
            Locality::SameProcess
        }
    }
}

/// Common surface of transmitters and receivers.
pub trait Endpoint {
    fn id(&self) -> &Identity;
    fn attributes(&self) -> &RoleAttributes;
}

/// Host name of this machine, with a stable fallback when the hostname
/// syscall fails.
#[must_use]
pub fn local_host_name() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: buf is a valid writable buffer of 256 bytes; gethostname
    // null-terminates on success for lengths below the buffer size.
    let ret = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if ret == 0 {
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        if let Ok(name) = std::str::from_utf8(&buf[..end]) {
            if !name.is_empty() {
                return name.to_string();
            }
        }
    }
    "localhost".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(host: &str, pid: u32) -> RoleAttributes {
        let mut attr = RoleAttributes::new("node", "/test/locality", "bytes");
        attr.host_name = host.to_string();
        attr.process_id = pid;
        attr
    }

    #[test]
    fn test_locality_same_process() {
        let a = remote("hostA", 100);
        let b = remote("hostA", 100);
        assert_eq!(a.locality_of(&b), Locality::SameProcess);
    }

    #[test]
    fn test_locality_same_host() {
        let a = remote("hostA", 100);
        let b = remote("hostA", 200);
        assert_eq!(a.locality_of(&b), Locality::SameHost);
    }

    #[test]
    fn test_locality_other_host() {
        let a = remote("hostA", 100);
        let b = remote("hostB", 100);
        assert_eq!(a.locality_of(&b), Locality::OtherHost);
    }

    #[test]
    fn test_new_fills_channel_id() {
        let attr = RoleAttributes::new("node", "/test/role_attr", "bytes");
        assert_eq!(attr.channel_id, crate::base::channel_id::hash_name("/test/role_attr"));
        assert!(!attr.host_name.is_empty());
    }
}

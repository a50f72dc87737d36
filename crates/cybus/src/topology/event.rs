// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Topology change messages and their wire encoding.
//!
//! Change messages are produced from participant discovery events and from
//! local endpoint role changes; the latter are also broadcast on an
//! internal channel so remote processes can mirror the channel directory.
//! Encoding is hand-rolled little-endian, same dialect as the datagram
//! wire format.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::base::identity::Identity;
use crate::base::role::RoleAttributes;
use crate::qos::{Durability, QosProfile, Reliability};

/// Which directory a change applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeType {
    Participant,
    Node,
    Channel,
    Service,
}

/// Join or leave.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperateType {
    Join,
    Leave,
}

/// The role the changed endpoint plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleType {
    Participant,
    Node,
    Writer,
    Reader,
    Service,
    Client,
}

impl RoleType {
    /// Directory a role belongs to.
    #[must_use]
    pub fn change_type(self) -> ChangeType {
        match self {
            RoleType::Participant => ChangeType::Participant,
            RoleType::Node => ChangeType::Node,
            RoleType::Writer | RoleType::Reader => ChangeType::Channel,
            RoleType::Service | RoleType::Client => ChangeType::Service,
        }
    }
}

/// One topology change.
#[derive(Clone, Debug)]
pub struct ChangeMsg {
    pub timestamp_ns: u64,
    pub change_type: ChangeType,
    pub operate_type: OperateType,
    pub role_type: RoleType,
    pub role_attr: RoleAttributes,
}

impl ChangeMsg {
    /// Build a change message stamped with the current time.
    #[must_use]
    pub fn now(operate_type: OperateType, role_type: RoleType, role_attr: RoleAttributes) -> Self {
        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self {
            timestamp_ns,
            change_type: role_type.change_type(),
            operate_type,
            role_type,
            role_attr,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let attr = &self.role_attr;
        let host = attr.host_name.as_bytes();
        let node = attr.node_name.as_bytes();
        let channel = attr.channel_name.as_bytes();
        let message_type = attr.message_type.as_bytes();

        let mut buf = Vec::with_capacity(
            8 + 3 + 2 + host.len() + 4 + 2 + node.len() + 2 + channel.len() + 8 + 2
                + message_type.len()
                + 16
                + 6,
        );
        buf.extend_from_slice(&self.timestamp_ns.to_le_bytes());
        buf.push(change_type_tag(self.change_type));
        buf.push(operate_type_tag(self.operate_type));
        buf.push(role_type_tag(self.role_type));
        push_str(&mut buf, host);
        buf.extend_from_slice(&attr.process_id.to_le_bytes());
        push_str(&mut buf, node);
        push_str(&mut buf, channel);
        buf.extend_from_slice(&attr.channel_id.to_le_bytes());
        push_str(&mut buf, message_type);
        buf.extend_from_slice(attr.id.bytes());
        buf.extend_from_slice(&attr.qos.depth.to_le_bytes());
        buf.push(match attr.qos.reliability {
            Reliability::BestEffort => 0,
            Reliability::Reliable => 1,
        });
        buf.push(match attr.qos.durability {
            Durability::Volatile => 0,
            Durability::TransientLocal => 1,
        });
        buf
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let mut cursor = Cursor { buf, pos: 0 };
        let timestamp_ns = cursor.u64()?;
        let change_type = parse_change_type(cursor.u8()?)?;
        let operate_type = parse_operate_type(cursor.u8()?)?;
        let role_type = parse_role_type(cursor.u8()?)?;
        let host_name = cursor.string()?;
        let process_id = cursor.u32()?;
        let node_name = cursor.string()?;
        let channel_name = cursor.string()?;
        let channel_id = cursor.u64()?;
        let message_type = cursor.string()?;
        let id = Identity::from_bytes(cursor.bytes16()?);
        let depth = cursor.u32()?;
        let reliability = match cursor.u8()? {
            0 => Reliability::BestEffort,
            1 => Reliability::Reliable,
            _ => return None,
        };
        let durability = match cursor.u8()? {
            0 => Durability::Volatile,
            1 => Durability::TransientLocal,
            _ => return None,
        };

        Some(Self {
            timestamp_ns,
            change_type,
            operate_type,
            role_type,
            role_attr: RoleAttributes {
                host_name,
                process_id,
                node_name,
                channel_name,
                channel_id,
                message_type,
                id,
                qos: QosProfile {
                    depth,
                    reliability,
                    durability,
                },
            },
        })
    }
}

fn push_str(buf: &mut Vec<u8>, s: &[u8]) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s);
}

fn change_type_tag(t: ChangeType) -> u8 {
    match t {
        ChangeType::Participant => 0,
        ChangeType::Node => 1,
        ChangeType::Channel => 2,
        ChangeType::Service => 3,
    }
}

fn parse_change_type(tag: u8) -> Option<ChangeType> {
    match tag {
        0 => Some(ChangeType::Participant),
        1 => Some(ChangeType::Node),
        2 => Some(ChangeType::Channel),
        3 => Some(ChangeType::Service),
        _ => None,
    }
}

fn operate_type_tag(t: OperateType) -> u8 {
    match t {
        OperateType::Join => 0,
        OperateType::Leave => 1,
    }
}

fn parse_operate_type(tag: u8) -> Option<OperateType> {
    match tag {
        0 => Some(OperateType::Join),
        1 => Some(OperateType::Leave),
        _ => None,
    }
}

fn role_type_tag(t: RoleType) -> u8 {
    match t {
        RoleType::Participant => 0,
        RoleType::Node => 1,
        RoleType::Writer => 2,
        RoleType::Reader => 3,
        RoleType::Service => 4,
        RoleType::Client => 5,
    }
}

fn parse_role_type(tag: u8) -> Option<RoleType> {
    match tag {
        0 => Some(RoleType::Participant),
        1 => Some(RoleType::Node),
        2 => Some(RoleType::Writer),
        3 => Some(RoleType::Reader),
        4 => Some(RoleType::Service),
        5 => Some(RoleType::Client),
        _ => None,
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn u8(&mut self) -> Option<u8> {
        let value = *self.buf.get(self.pos)?;
        self.pos += 1;
        Some(value)
    }

    fn u32(&mut self) -> Option<u32> {
        let bytes = self.buf.get(self.pos..self.pos + 4)?;
        self.pos += 4;
        Some(u32::from_le_bytes(bytes.try_into().ok()?))
    }

    fn u64(&mut self) -> Option<u64> {
        let bytes = self.buf.get(self.pos..self.pos + 8)?;
        self.pos += 8;
        Some(u64::from_le_bytes(bytes.try_into().ok()?))
    }

    fn string(&mut self) -> Option<String> {
        let len = {
            let bytes = self.buf.get(self.pos..self.pos + 2)?;
            self.pos += 2;
            u16::from_le_bytes(bytes.try_into().ok()?) as usize
        };
        let bytes = self.buf.get(self.pos..self.pos + len)?;
        self.pos += len;
        let s = std::str::from_utf8(bytes).ok()?;
        Some(s.to_string())
    }

    fn bytes16(&mut self) -> Option<[u8; 16]> {
        let bytes = self.buf.get(self.pos..self.pos + 16)?;
        self.pos += 16;
        bytes.try_into().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attr() -> RoleAttributes {
        RoleAttributes::new("perception", "/sensor/lidar", "pointcloud")
    }

    #[test]
    fn test_role_to_change_type() {
        assert_eq!(RoleType::Writer.change_type(), ChangeType::Channel);
        assert_eq!(RoleType::Reader.change_type(), ChangeType::Channel);
        assert_eq!(RoleType::Node.change_type(), ChangeType::Node);
        assert_eq!(RoleType::Service.change_type(), ChangeType::Service);
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = ChangeMsg::now(OperateType::Join, RoleType::Writer, sample_attr());
        let decoded = ChangeMsg::decode(&msg.encode()).expect("well-formed message");

        assert_eq!(decoded.timestamp_ns, msg.timestamp_ns);
        assert_eq!(decoded.change_type, ChangeType::Channel);
        assert_eq!(decoded.operate_type, OperateType::Join);
        assert_eq!(decoded.role_type, RoleType::Writer);
        assert_eq!(decoded.role_attr.host_name, msg.role_attr.host_name);
        assert_eq!(decoded.role_attr.process_id, msg.role_attr.process_id);
        assert_eq!(decoded.role_attr.channel_id, msg.role_attr.channel_id);
        assert_eq!(decoded.role_attr.id, msg.role_attr.id);
        assert_eq!(decoded.role_attr.qos, msg.role_attr.qos);
    }

    #[test]
    fn test_truncated_message_rejected() {
        let buf = ChangeMsg::now(OperateType::Leave, RoleType::Reader, sample_attr()).encode();
        for len in 0..buf.len() {
            assert!(ChangeMsg::decode(&buf[..len]).is_none(), "len {}", len);
        }
    }
}

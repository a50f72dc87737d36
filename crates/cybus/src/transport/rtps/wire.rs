// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Datagram wire format.
//!
//! Every frame starts with the 4-byte magic `CYB1` and a kind byte; all
//! integers are little-endian.
//!
//! ```text
//! ANNOUNCE: magic(4) kind=1 guid(16) name_len:u16 name
//! BYE:      magic(4) kind=2 guid(16)
//! DATA:     magic(4) kind=3 guid(16) channel_id:u64 seq:u64
//!           type_len:u16 type payload_len:u32 payload
//! ```
//!
//! Malformed frames decode to `None` and are dropped by the receive loop.

use crate::base::channel_id::ChannelId;

pub(super) const WIRE_MAGIC: [u8; 4] = *b"CYB1";

const KIND_ANNOUNCE: u8 = 1;
const KIND_BYE: u8 = 2;
const KIND_DATA: u8 = 3;

/// One decoded datagram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Announce {
        guid: [u8; 16],
        name: String,
    },
    Bye {
        guid: [u8; 16],
    },
    Data {
        guid: [u8; 16],
        channel_id: ChannelId,
        seq: u64,
        type_name: String,
        payload: Vec<u8>,
    },
}

impl Frame {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Announce { guid, name } => {
                let name = name.as_bytes();
                let mut buf = Vec::with_capacity(4 + 1 + 16 + 2 + name.len());
                buf.extend_from_slice(&WIRE_MAGIC);
                buf.push(KIND_ANNOUNCE);
                buf.extend_from_slice(guid);
                buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
                buf.extend_from_slice(name);
                buf
            }
            Frame::Bye { guid } => {
                let mut buf = Vec::with_capacity(4 + 1 + 16);
                buf.extend_from_slice(&WIRE_MAGIC);
                buf.push(KIND_BYE);
                buf.extend_from_slice(guid);
                buf
            }
            Frame::Data {
                guid,
                channel_id,
                seq,
                type_name,
                payload,
            } => {
                let type_bytes = type_name.as_bytes();
                let mut buf =
                    Vec::with_capacity(4 + 1 + 16 + 8 + 8 + 2 + type_bytes.len() + 4 + payload.len());
                buf.extend_from_slice(&WIRE_MAGIC);
                buf.push(KIND_DATA);
                buf.extend_from_slice(guid);
                buf.extend_from_slice(&channel_id.to_le_bytes());
                buf.extend_from_slice(&seq.to_le_bytes());
                buf.extend_from_slice(&(type_bytes.len() as u16).to_le_bytes());
                buf.extend_from_slice(type_bytes);
                buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                buf.extend_from_slice(payload);
                buf
            }
        }
    }

    #[must_use]
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < 5 || buf[0..4] != WIRE_MAGIC {
            return None;
        }
        let kind = buf[4];
        let rest = &buf[5..];
        match kind {
            KIND_ANNOUNCE => {
                let guid: [u8; 16] = rest.get(0..16)?.try_into().ok()?;
                let name_len = u16::from_le_bytes(rest.get(16..18)?.try_into().ok()?) as usize;
                let name_bytes = rest.get(18..18 + name_len)?;
                let name = std::str::from_utf8(name_bytes).ok()?.to_string();
                Some(Frame::Announce { guid, name })
            }
            KIND_BYE => {
                let guid: [u8; 16] = rest.get(0..16)?.try_into().ok()?;
                Some(Frame::Bye { guid })
            }
            KIND_DATA => {
                let guid: [u8; 16] = rest.get(0..16)?.try_into().ok()?;
                let channel_id = u64::from_le_bytes(rest.get(16..24)?.try_into().ok()?);
                let seq = u64::from_le_bytes(rest.get(24..32)?.try_into().ok()?);
                let type_len = u16::from_le_bytes(rest.get(32..34)?.try_into().ok()?) as usize;
                let type_bytes = rest.get(34..34 + type_len)?;
                let type_name = std::str::from_utf8(type_bytes).ok()?.to_string();
                let payload_off = 34 + type_len;
                let payload_len =
                    u32::from_le_bytes(rest.get(payload_off..payload_off + 4)?.try_into().ok()?)
                        as usize;
                let payload = rest
                    .get(payload_off + 4..payload_off + 4 + payload_len)?
                    .to_vec();
                Some(Frame::Data {
                    guid,
                    channel_id,
                    seq,
                    type_name,
                    payload,
                })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_announce_roundtrip() {
        let frame = Frame::Announce {
            guid: [3u8; 16],
            name: "hostA+1001".to_string(),
        };
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn test_bye_roundtrip() {
        let frame = Frame::Bye { guid: [9u8; 16] };
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn test_data_roundtrip() {
        let frame = Frame::Data {
            guid: [1u8; 16],
            channel_id: 0xfeed_f00d,
            seq: 77,
            type_name: "std_msgs/ByteArray".to_string(),
            payload: vec![0xaa; 300],
        };
        assert_eq!(Frame::decode(&frame.encode()), Some(frame));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut buf = Frame::Bye { guid: [0u8; 16] }.encode();
        buf[0] = b'X';
        assert!(Frame::decode(&buf).is_none());
    }

    #[test]
    fn test_truncated_frames_rejected() {
        let buf = Frame::Data {
            guid: [1u8; 16],
            channel_id: 1,
            seq: 1,
            type_name: "t".to_string(),
            payload: vec![1, 2, 3],
        }
        .encode();
        for len in 0..buf.len() {
            assert!(Frame::decode(&buf[..len]).is_none(), "len {}", len);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let mut buf = Frame::Bye { guid: [0u8; 16] }.encode();
        buf[4] = 99;
        assert!(Frame::decode(&buf).is_none());
    }
}

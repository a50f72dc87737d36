// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared-memory transport: per-channel block segments plus the
//! cross-process notification machinery.
//!
//! # Architecture
//!
//! ```text
//! +------------------+               +------------------+
//! |   Process A      |    Shared     |   Process B      |
//! |  ShmTransmitter -+-> Segment ----+-> ShmDispatcher  |
//! |        |         |   (blocks)    |   listener thread|
//! |        +---------+-> Notifier ---+-------^          |
//! +------------------+  (descriptor  +------------------+
//!                        ring+futex or multicast)
//! ```
//!
//! A transmitter serializes the payload into a free block of the channel
//! segment and publishes a 16-byte readable descriptor through the
//! notifier. The receiving side's listener thread blocks on the notifier,
//! maps the block in and dispatches.

mod futex;
mod notifier;
mod readable;
mod segment;

pub use futex::{futex_wait, futex_wake_all};
pub use notifier::{ConditionNotifier, MulticastNotifier, Notifier};
pub use readable::{ReadableDesc, READABLE_DESC_LEN};
pub use segment::Segment;

use std::fmt;
use std::io;

/// Errors local to the shared-memory transport.
#[derive(Debug)]
pub enum ShmError {
    /// `shm_open` with `O_CREAT` failed.
    SegmentCreate(io::Error),
    /// Opening an existing segment failed.
    SegmentOpen(io::Error),
    /// `mmap` failed.
    Mmap(io::Error),
    /// Segment name is not a valid POSIX shm name.
    InvalidName(String),
    /// Existing segment does not match the expected geometry.
    GeometryMismatch { expected: usize, actual: usize },
    /// Peer never finished initializing the segment header.
    InitTimeout(String),
    /// Payload exceeds the block size.
    PayloadTooLarge { size: usize, capacity: usize },
    /// Every block is claimed; the message is dropped.
    SegmentFull,
    /// Notifier socket setup failed.
    Socket(io::Error),
}

impl fmt::Display for ShmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SegmentCreate(e) => write!(f, "segment creation failed: {e}"),
            Self::SegmentOpen(e) => write!(f, "segment open failed: {e}"),
            Self::Mmap(e) => write!(f, "memory mapping failed: {e}"),
            Self::InvalidName(name) => write!(f, "invalid segment name: {name}"),
            Self::GeometryMismatch { expected, actual } => {
                write!(f, "segment geometry mismatch: expected {expected} bytes, found {actual}")
            }
            Self::InitTimeout(name) => write!(f, "segment '{name}' was never initialized"),
            Self::PayloadTooLarge { size, capacity } => {
                write!(f, "payload of {size} bytes exceeds block capacity {capacity}")
            }
            Self::SegmentFull => write!(f, "no free block in segment"),
            Self::Socket(e) => write!(f, "notifier socket setup failed: {e}"),
        }
    }
}

impl std::error::Error for ShmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::SegmentCreate(e)
            | Self::SegmentOpen(e)
            | Self::Mmap(e)
            | Self::Socket(e) => Some(e),
            _ => None,
        }
    }
}

/// Result alias local to this module.
pub type Result<T> = std::result::Result<T, ShmError>;

/// Encode the content of one block: `type_len: u16 LE, type bytes,
/// payload`. The readable descriptor's `length` covers the whole frame.
#[must_use]
pub fn encode_block_frame(type_name: &str, payload: &[u8]) -> Vec<u8> {
    let type_bytes = type_name.as_bytes();
    let mut buf = Vec::with_capacity(2 + type_bytes.len() + payload.len());
    buf.extend_from_slice(&(type_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(type_bytes);
    buf.extend_from_slice(payload);
    buf
}

/// Decode a block frame back into (type name, payload).
#[must_use]
pub fn decode_block_frame(buf: &[u8]) -> Option<(&str, Vec<u8>)> {
    let type_len = u16::from_le_bytes(buf.get(0..2)?.try_into().ok()?) as usize;
    let type_name = std::str::from_utf8(buf.get(2..2 + type_len)?).ok()?;
    let payload = buf.get(2 + type_len..)?.to_vec();
    Some((type_name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_frame_roundtrip() {
        let buf = encode_block_frame("sensor/Image", b"pixels");
        let (type_name, payload) = decode_block_frame(&buf).expect("well-formed block");
        assert_eq!(type_name, "sensor/Image");
        assert_eq!(payload, b"pixels");
    }

    #[test]
    fn test_block_frame_truncated() {
        let buf = encode_block_frame("sensor/Image", b"pixels");
        assert!(decode_block_frame(&buf[..1]).is_none());
        assert!(decode_block_frame(&buf[..5]).is_none());
    }
}

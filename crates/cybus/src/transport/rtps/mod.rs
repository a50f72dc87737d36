// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cross-host datagram transport.
//!
//! A lightweight participant/publisher/subscriber service over UDP
//! multicast. A participant announces itself on creation, re-announces
//! when it first hears an unknown peer (so late joiners converge), says
//! goodbye on shutdown, and carries user payloads as per-channel DATA
//! frames. Discovery events surface through a callback consumed by the
//! topology manager.
//!
//! Datagrams are best-effort: drops and duplicates are tolerated by every
//! consumer of this module.

mod participant;
mod wire;

pub use participant::{
    DataCallback, DiscoveryCallback, DiscoveryStatus, PartInfo, Participant, RtpsPublisher,
};
pub use wire::Frame;

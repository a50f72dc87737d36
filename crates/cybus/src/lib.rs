// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # cybus - component bus for robotics stacks
//!
//! Publish/subscribe transport and data-fusion runtime connecting
//! independent processing modules over named channels. Three transports
//! sit behind one transmitter/receiver surface, selected per subscriber
//! by locality:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Processing Modules                       |
//! |        Transmitter / Receiver / DataVisitor (fusion)         |
//! +--------------------------------------------------------------+
//! |                      Transport Facade                        |
//! |   mode selection | dispatchers | notifier registry | QoS     |
//! +--------------------------------------------------------------+
//! |   intra          |  shm                |  rtps               |
//! |   pointer pass   |  segment + notifier |  UDP multicast      |
//! +--------------------------------------------------------------+
//! |          Topology Manager (participants, roles)              |
//! +--------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cybus::transport::Transmitter;
//! use cybus::{Message, ProcessContext, RoleAttributes, TransportMode};
//!
//! fn main() -> cybus::Result<()> {
//!     let context = ProcessContext::init_global(Default::default())?;
//!     let transport = context.transport();
//!
//!     let writer_attr = RoleAttributes::new("talker", "/chatter", "bytes");
//!     let transmitter = transport.create_transmitter(writer_attr, TransportMode::Intra)?;
//!
//!     let reader_attr = RoleAttributes::new("listener", "/chatter", "bytes");
//!     let _receiver = transport.create_receiver(
//!         reader_attr,
//!         Arc::new(|msg| println!("got {} bytes", msg.payload_len())),
//!         TransportMode::Intra,
//!     )?;
//!
//!     transmitter.transmit(&Message::new(
//!         cybus::channel_id::hash_name("/chatter"),
//!         "bytes",
//!         b"hello".to_vec(),
//!     ));
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ProcessContext`] | Explicitly-constructed process runtime |
//! | [`transport::Transport`] | Facade building transmitters/receivers by mode |
//! | [`data::DataVisitor`] | Synchronized consumer over 1..=4 channels |
//! | [`topology::TopologyManager`] | Live participants, nodes, channels, services |
//! | [`QosProfile`] | History depth, reliability, durability |

/// Shared base types: channel ids, identities, role attributes.
pub mod base;
/// Global configuration constants.
pub mod config;
/// Process context wiring topology and transport together.
pub mod context;
/// Consumer-edge buffers, wake handles, fusion and visitors.
pub mod data;
/// Crate error type.
pub mod error;
/// Bootloader CLI surface.
pub mod mainboard;
/// QoS profiles.
pub mod qos;
/// Service discovery.
pub mod topology;
/// Transport layer (intra / shm / rtps, dispatchers, facade).
pub mod transport;

pub use base::channel_id;
pub use base::{Endpoint, Identity, Locality, RoleAttributes};
pub use context::ProcessContext;
pub use data::{CacheBuffer, ChannelBuffer, DataVisitor, FusedTuple, VisitorConfig};
pub use error::{Error, Result};
pub use qos::{Durability, QosProfile, Reliability};
pub use transport::{Message, MessagePtr, TransportConfig, TransportMode};

/// Runtime version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

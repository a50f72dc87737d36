// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared base types: channel identifiers, endpoint identity and role
//! attributes.

pub mod channel_id;
pub mod identity;
pub mod role;

pub use channel_id::{hash_name, name_of, register_channel, ChannelId};
pub use identity::Identity;
pub use role::{Endpoint, Locality, RoleAttributes};

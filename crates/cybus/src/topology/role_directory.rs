// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Directory of live roles, keyed by endpoint identity.
//!
//! One instance per role kind (nodes, channel writers, channel readers,
//! services). Each directory owns its own lock; callers never need more
//! than one at a time.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::base::channel_id::ChannelId;
use crate::base::role::RoleAttributes;

/// Identity-keyed role directory.
pub struct RoleDirectory {
    roles: RwLock<HashMap<u64, RoleAttributes>>,
}

impl RoleDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
        }
    }

    /// Insert a role. Returns `true` when the role was not yet present;
    /// re-joining with the same identity refreshes the attributes.
    pub fn join(&self, attr: &RoleAttributes) -> bool {
        self.roles
            .write()
            .insert(attr.id.hash_value(), attr.clone())
            .is_none()
    }

    /// Remove a role by identity. Unknown identities are a no-op.
    pub fn leave(&self, attr: &RoleAttributes) -> bool {
        self.roles.write().remove(&attr.id.hash_value()).is_some()
    }

    /// Prune every role bound to `(host_name, process_id)`; returns the
    /// removed attributes.
    pub fn prune_process(&self, host_name: &str, process_id: u32) -> Vec<RoleAttributes> {
        let mut roles = self.roles.write();
        let doomed: Vec<u64> = roles
            .iter()
            .filter(|(_, attr)| attr.host_name == host_name && attr.process_id == process_id)
            .map(|(key, _)| *key)
            .collect();
        doomed
            .into_iter()
            .filter_map(|key| roles.remove(&key))
            .collect()
    }

    /// Roles attached to one channel.
    #[must_use]
    pub fn roles_of_channel(&self, channel_id: ChannelId) -> Vec<RoleAttributes> {
        self.roles
            .read()
            .values()
            .filter(|attr| attr.channel_id == channel_id)
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn all(&self) -> Vec<RoleAttributes> {
        self.roles.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.read().is_empty()
    }
}

impl Default for RoleDirectory {
    fn default() -> Self {
        Self::new()
    }
}

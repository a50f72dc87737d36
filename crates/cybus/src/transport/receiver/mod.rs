// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-channel receivers, one per transport plus the hybrid selector.
//!
//! A receiver binds a message listener to its transport's dispatcher;
//! the hybrid variant enables the intra/shm/rtps legs according to the
//! transports the channel's writers actually use.

mod hybrid;
mod intra;
mod rtps;
mod shm;

pub use hybrid::HybridReceiver;
pub use intra::IntraReceiver;
pub use rtps::RtpsReceiver;
pub use shm::ShmReceiver;

use crate::base::role::Endpoint;
use crate::error::Result;

/// Consumer-side endpoint on one channel.
pub trait Receiver: Endpoint + Send + Sync {
    /// Bind the listener and join the topology. Idempotent.
    ///
    /// # Errors
    ///
    /// Surfaces resource acquisition failures (segment mapping and the
    /// like). A failed enable leaves the receiver disabled.
    fn enable(&self) -> Result<()>;

    /// Unbind and leave the topology. Idempotent.
    fn disable(&self);
}

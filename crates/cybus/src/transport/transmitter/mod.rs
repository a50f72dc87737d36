// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-channel senders, one per transport plus the hybrid selector.
//!
//! `transmit` is the hot path: non-blocking everywhere, with the shm leg
//! dropping (and counting) when its segment is full. `enable` acquires
//! the transport resources and registers the writer role with the
//! topology; `disable` releases both. Endpoints created internally by the
//! hybrid variant skip the topology registration so the hybrid stays the
//! single writer role for its channel.

mod hybrid;
mod intra;
mod rtps;
mod shm;

pub use hybrid::HybridTransmitter;
pub use intra::IntraTransmitter;
pub use rtps::RtpsTransmitter;
pub use shm::ShmTransmitter;

use crate::base::role::Endpoint;
use crate::error::Result;
use crate::transport::message::MessagePtr;

/// Producer-side endpoint on one channel.
pub trait Transmitter: Endpoint + Send + Sync {
    /// Acquire transport resources and join the topology. Idempotent.
    ///
    /// # Errors
    ///
    /// Surfaces resource acquisition failures (segment mapping and the
    /// like). A failed enable leaves the transmitter disabled.
    fn enable(&self) -> Result<()>;

    /// Release resources and leave the topology. Idempotent.
    fn disable(&self);

    /// Hand one message to the transport. Returns `false` when the
    /// transmitter is disabled or the transport refused the message
    /// (already counted); per-message failures are never raised.
    fn transmit(&self, msg: &MessagePtr) -> bool;
}

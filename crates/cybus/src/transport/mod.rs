// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport layer: three transports behind one transmitter/receiver
//! surface.
//!
//! The [`Transport`] facade owns the user-data participant, the three
//! dispatchers and the shm notifier for its whole lifetime, and builds
//! endpoints by transport mode. Once `shutdown` runs, every public
//! operation returns a neutral empty result without side effects.

pub mod dispatcher;
pub mod message;
pub mod metrics;
pub mod receiver;
pub mod rtps;
pub mod shm;
pub mod transmitter;

pub use dispatcher::{Dispatcher, MessageListener, RtpsDispatcher, ShmDispatcher};
pub use message::{Message, MessagePtr};
pub use metrics::{global_metrics, TransportMetrics};
pub use receiver::{HybridReceiver, IntraReceiver, Receiver, RtpsReceiver, ShmReceiver};
pub use transmitter::{
    HybridTransmitter, IntraTransmitter, RtpsTransmitter, ShmTransmitter, Transmitter,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::base::channel_id::ChannelId;
use crate::base::identity::Identity;
use crate::base::role::RoleAttributes;
use crate::config::{DATA_PORT, NOTIFY_MULTICAST_GROUP, NOTIFY_MULTICAST_PORT, NOTIFY_SEGMENT_NAME};
use crate::data::channel_buffer::ChannelBuffer;
use crate::data::notifier::NotifierRegistry;
use crate::error::{Error, Result};
use crate::topology::TopologyManager;
use crate::transport::rtps::Participant;
use crate::transport::shm::{ConditionNotifier, MulticastNotifier, Notifier};

/// How an endpoint reaches its peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TransportMode {
    /// In-process pointer passing only.
    Intra,
    /// Cross-process shared memory only.
    Shm,
    /// Cross-host datagrams only.
    Rtps,
    /// Per-subscriber narrowest feasible transport.
    #[default]
    Hybrid,
}

/// Which shm notifier variant the facade runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NotifierKind {
    /// Shared-memory descriptor ring with futex wakeups (default).
    #[default]
    Condition,
    /// One UDP multicast datagram per descriptor.
    Multicast,
}

/// Facade construction knobs.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportConfig {
    pub notifier: NotifierKind,
}

/// Process-wide transport coordinator.
pub struct Transport {
    participant: Arc<Participant>,
    topology: Arc<TopologyManager>,
    notifier_registry: Arc<NotifierRegistry>,
    shm_notifier: Arc<dyn Notifier>,
    intra_dispatcher: Arc<Dispatcher>,
    shm_dispatcher: Arc<ShmDispatcher>,
    rtps_dispatcher: Arc<RtpsDispatcher>,
    is_shutdown: AtomicBool,
}

impl Transport {
    /// Build the facade: user-data participant, notifier, dispatchers.
    ///
    /// # Errors
    ///
    /// Surfaces participant and notifier construction failures.
    pub fn new(topology: Arc<TopologyManager>, config: TransportConfig) -> Result<Arc<Self>> {
        let participant_name = format!(
            "{}+{}",
            crate::base::role::local_host_name(),
            std::process::id()
        );
        let participant = Participant::new(&participant_name, DATA_PORT)?;

        let notifier_registry = Arc::new(NotifierRegistry::new());
        let shm_notifier: Arc<dyn Notifier> = match config.notifier {
            NotifierKind::Condition => Arc::new(ConditionNotifier::new(NOTIFY_SEGMENT_NAME)?),
            NotifierKind::Multicast => Arc::new(MulticastNotifier::new(
                NOTIFY_MULTICAST_GROUP,
                NOTIFY_MULTICAST_PORT,
            )?),
        };

        let intra_dispatcher = Dispatcher::new("IntraDispatcher", Arc::clone(&notifier_registry));
        let shm_dispatcher = ShmDispatcher::new(
            Dispatcher::new("ShmDispatcher", Arc::clone(&notifier_registry)),
            Arc::clone(&shm_notifier),
        );
        let rtps_dispatcher = RtpsDispatcher::new(
            Dispatcher::new("RtpsDispatcher", Arc::clone(&notifier_registry)),
            Arc::clone(&participant),
        );

        Ok(Arc::new(Self {
            participant,
            topology,
            notifier_registry,
            shm_notifier,
            intra_dispatcher,
            shm_dispatcher,
            rtps_dispatcher,
            is_shutdown: AtomicBool::new(false),
        }))
    }

    /// Build a transmitter for `attr` on the given transport mode and
    /// enable it.
    ///
    /// # Errors
    ///
    /// `Error::ShutDown` after shutdown, `Error::InvalidQos` for a bad
    /// profile, plus whatever the endpoint's `enable` surfaces.
    pub fn create_transmitter(
        &self,
        attr: RoleAttributes,
        mode: TransportMode,
    ) -> Result<Arc<dyn Transmitter>> {
        if self.is_shutdown.load(Ordering::Acquire) {
            log::info!("[Transport] has been shut down, no transmitter created");
            return Err(Error::ShutDown);
        }
        attr.qos.validate()?;

        let transmitter: Arc<dyn Transmitter> = match mode {
            TransportMode::Intra => IntraTransmitter::new(
                attr,
                Arc::clone(&self.intra_dispatcher),
                Arc::clone(&self.topology),
            ),
            TransportMode::Shm => ShmTransmitter::new(
                attr,
                Arc::clone(&self.shm_notifier),
                Arc::clone(&self.topology),
            ),
            TransportMode::Rtps => RtpsTransmitter::new(
                attr,
                Arc::clone(&self.participant),
                Arc::clone(&self.topology),
            ),
            TransportMode::Hybrid => HybridTransmitter::new(
                attr,
                Arc::clone(&self.intra_dispatcher),
                Arc::clone(&self.shm_notifier),
                Arc::clone(&self.participant),
                Arc::clone(&self.topology),
            ),
        };
        transmitter.enable()?;
        Ok(transmitter)
    }

    /// Build a receiver for `attr` with a message listener and enable it.
    ///
    /// # Errors
    ///
    /// Same failure surface as [`Transport::create_transmitter`].
    pub fn create_receiver(
        &self,
        attr: RoleAttributes,
        listener: MessageListener,
        mode: TransportMode,
    ) -> Result<Arc<dyn Receiver>> {
        if self.is_shutdown.load(Ordering::Acquire) {
            log::info!("[Transport] has been shut down, no receiver created");
            return Err(Error::ShutDown);
        }
        attr.qos.validate()?;

        let receiver: Arc<dyn Receiver> = match mode {
            TransportMode::Intra => IntraReceiver::new(
                attr,
                Arc::clone(&self.intra_dispatcher),
                listener,
                Arc::clone(&self.topology),
            ),
            TransportMode::Shm => ShmReceiver::new(
                attr,
                Arc::clone(&self.shm_dispatcher),
                listener,
                Arc::clone(&self.topology),
            ),
            TransportMode::Rtps => RtpsReceiver::new(
                attr,
                Arc::clone(&self.rtps_dispatcher),
                listener,
                Arc::clone(&self.topology),
            ),
            TransportMode::Hybrid => HybridReceiver::new(
                attr,
                Arc::clone(&self.intra_dispatcher),
                Arc::clone(&self.shm_dispatcher),
                Arc::clone(&self.rtps_dispatcher),
                listener,
                Arc::clone(&self.topology),
            ),
        };
        receiver.enable()?;
        Ok(receiver)
    }

    /// Register a channel buffer with all three dispatchers, so messages
    /// arriving over any transport land in it. Used by data visitors.
    ///
    /// # Errors
    ///
    /// Propagates shm segment attach failures.
    pub fn register_channel_buffer(
        &self,
        buffer: &Arc<ChannelBuffer<MessagePtr>>,
    ) -> Result<()> {
        if self.is_shutdown.load(Ordering::Acquire) {
            return Err(Error::ShutDown);
        }
        self.shm_dispatcher.attach_channel(buffer.channel_id())?;
        self.rtps_dispatcher.ensure_channel(buffer.channel_id());
        self.intra_dispatcher.add_buffer(Arc::clone(buffer));
        self.shm_dispatcher.dispatcher().add_buffer(Arc::clone(buffer));
        self.rtps_dispatcher.dispatcher().add_buffer(Arc::clone(buffer));
        Ok(())
    }

    /// Remove a buffer from every dispatcher; eager.
    pub fn deregister_channel_buffer(&self, channel_id: ChannelId, id: &Identity) {
        self.intra_dispatcher.remove_buffer(channel_id, id);
        self.shm_dispatcher.dispatcher().remove_buffer(channel_id, id);
        self.rtps_dispatcher.dispatcher().remove_buffer(channel_id, id);
    }

    #[must_use]
    pub fn notifier_registry(&self) -> &Arc<NotifierRegistry> {
        &self.notifier_registry
    }

    #[must_use]
    pub fn participant(&self) -> &Arc<Participant> {
        &self.participant
    }

    #[must_use]
    pub fn topology(&self) -> &Arc<TopologyManager> {
        &self.topology
    }

    #[must_use]
    pub fn intra_dispatcher(&self) -> &Arc<Dispatcher> {
        &self.intra_dispatcher
    }

    #[must_use]
    pub fn shm_dispatcher(&self) -> &Arc<ShmDispatcher> {
        &self.shm_dispatcher
    }

    #[must_use]
    pub fn rtps_dispatcher(&self) -> &Arc<RtpsDispatcher> {
        &self.rtps_dispatcher
    }

    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::Acquire)
    }

    /// Tear down dispatchers and the participant. Idempotent.
    pub fn shutdown(&self) {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("[Transport] shutdown");
        self.intra_dispatcher.shutdown();
        self.shm_dispatcher.shutdown();
        self.rtps_dispatcher.shutdown();
        self.participant.shutdown();
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport failure counters.
//!
//! Fast paths never raise: when a segment is full, a datagram send fails
//! or a dispatch finds no subscribers, the event is counted here and the
//! caller is not notified per message. All counters use `Relaxed`
//! ordering; readings are eventually consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

/// Atomic drop/failure counters for all three transports.
#[derive(Debug, Default)]
pub struct TransportMetrics {
    /// Messages dropped because the shm segment had no free block.
    pub shm_drops: AtomicU64,
    /// Datagram publishes that returned an error.
    pub rtps_send_failures: AtomicU64,
    /// Notifier signals that could not be delivered.
    pub notify_failures: AtomicU64,
    /// Dispatches on channels with no registered subscribers.
    pub dispatch_unknown_channel: AtomicU64,
}

impl TransportMetrics {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            shm_drops: AtomicU64::new(0),
            rtps_send_failures: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
            dispatch_unknown_channel: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn inc_shm_drops(&self) {
        self.shm_drops.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rtps_send_failures(&self) {
        self.rtps_send_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_notify_failures(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_dispatch_unknown_channel(&self) {
        self.dispatch_unknown_channel.fetch_add(1, Ordering::Relaxed);
    }

    #[must_use]
    pub fn shm_drops(&self) -> u64 {
        self.shm_drops.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rtps_send_failures(&self) -> u64 {
        self.rtps_send_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn notify_failures(&self) -> u64 {
        self.notify_failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dispatch_unknown_channel(&self) -> u64 {
        self.dispatch_unknown_channel.load(Ordering::Relaxed)
    }
}

/// Process-global metrics instance.
pub fn global_metrics() -> &'static TransportMetrics {
    static METRICS: OnceLock<TransportMetrics> = OnceLock::new();
    METRICS.get_or_init(TransportMetrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = TransportMetrics::new();
        assert_eq!(metrics.shm_drops(), 0);
        assert_eq!(metrics.rtps_send_failures(), 0);
        assert_eq!(metrics.notify_failures(), 0);
        assert_eq!(metrics.dispatch_unknown_channel(), 0);
    }

    #[test]
    fn test_increment() {
        let metrics = TransportMetrics::new();
        metrics.inc_shm_drops();
        metrics.inc_shm_drops();
        metrics.inc_rtps_send_failures();
        assert_eq!(metrics.shm_drops(), 2);
        assert_eq!(metrics.rtps_send_failures(), 1);
    }

    #[test]
    fn test_global_instance_is_shared() {
        let a = global_metrics() as *const TransportMetrics;
        let b = global_metrics() as *const TransportMetrics;
        assert_eq!(a, b);
    }
}

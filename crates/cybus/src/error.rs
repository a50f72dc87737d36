// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Crate-wide error type.
//!
//! Only construction-time misconfiguration surfaces as an error. Once a
//! pipeline is built, the fast paths never raise: buffer misses come back
//! as empty results and transport drops are recorded in counters.

use std::fmt;
use std::io;

use crate::transport::shm::ShmError;

/// Errors surfaced by endpoint and runtime construction.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// QoS profile is invalid (e.g., zero history depth).
    InvalidQos(String),
    /// Cache buffer capacity must be non-zero.
    InvalidCapacity(usize),
    /// Visitor input count out of range (must be 1..=4).
    InvalidVisitorArity(usize),
    /// Channel name is empty or otherwise unusable.
    InvalidChannelName(String),

    // ========================================================================
    // Entity Errors
    // ========================================================================
    /// Participant creation failed (socket setup, name registration).
    ParticipantCreate(io::Error),
    /// Runtime context initialized twice with different configuration.
    AlreadyInitialized,

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Generic I/O error on a transport path.
    Io(io::Error),
    /// Shared-memory transport error.
    Shm(ShmError),
    /// Send operation failed at enable time.
    SendFailed(String),

    // ========================================================================
    // State Errors
    // ========================================================================
    /// The facade or topology manager has been shut down.
    ShutDown,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Configuration
            Error::InvalidQos(msg) => write!(f, "Invalid QoS: {}", msg),
            Error::InvalidCapacity(cap) => {
                write!(f, "Invalid cache buffer capacity: {} (must be > 0)", cap)
            }
            Error::InvalidVisitorArity(n) => {
                write!(f, "Invalid visitor input count: {} (must be 1..=4)", n)
            }
            Error::InvalidChannelName(name) => write!(f, "Invalid channel name: '{}'", name),
            // Entity
            Error::ParticipantCreate(e) => write!(f, "Participant creation failed: {}", e),
            Error::AlreadyInitialized => write!(f, "Process context already initialized"),
            // Transport
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Shm(e) => write!(f, "Shared-memory error: {}", e),
            Error::SendFailed(msg) => write!(f, "Send failed: {}", msg),
            // State
            Error::ShutDown => write!(f, "Runtime has been shut down"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) | Error::ParticipantCreate(e) => Some(e),
            Error::Shm(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ShmError> for Error {
    fn from(e: ShmError) -> Self {
        Error::Shm(e)
    }
}

/// Convenient alias for API results using the crate `Error` type.
pub type Result<T> = std::result::Result<T, Error>;

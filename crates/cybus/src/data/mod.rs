// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Consumer-edge data plane: per-channel bounded buffers, the wake-handle
//! registry, and the multi-input fusion engine behind the data visitor.
//!
//! ```text
//!  dispatcher --insert--> ChannelBuffer --hook--> AllLatest --insert--> fusion CacheBuffer
//!       |                                                                     |
//!       +--notify--> NotifierRegistry --wake--> consumer --try_fetch----------+
//! ```

pub mod cache_buffer;
pub mod channel_buffer;
pub mod fusion;
pub mod notifier;
pub mod visitor;

pub use cache_buffer::CacheBuffer;
pub use channel_buffer::{ChannelBuffer, InsertHook};
pub use fusion::{AllLatest, FusedTuple};
pub use notifier::{NotifierRegistry, WakeHandle};
pub use visitor::{DataVisitor, VisitorConfig};

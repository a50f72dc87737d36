// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Linux futex wrappers for cross-process wakeups.
//!
//! These use the SHARED `FUTEX_WAIT`/`FUTEX_WAKE` operations, not the
//! `_PRIVATE` variants: private futexes never wake waiters in other
//! processes, which is exactly what the condition notifier needs them to
//! do. The word lives in a shared-memory mapping.

use std::sync::atomic::AtomicU32;
use std::time::Duration;

#[cfg(target_os = "linux")]
const FUTEX_WAIT: i32 = 0;
#[cfg(target_os = "linux")]
const FUTEX_WAKE: i32 = 1;

/// Block until the word changes away from `expected` or the timeout
/// expires. Returns 0 on wake (including spurious), -1 with errno set on
/// `EAGAIN` (value already changed) or `ETIMEDOUT`.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> i32 {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: word is a live reference for the duration of the call and
    // the remaining syscall arguments are unused by FUTEX_WAIT.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0i32,
        ) as i32
    }
}

/// Wake every waiter blocked on the word. Returns the number woken.
#[cfg(target_os = "linux")]
pub fn futex_wake_all(word: &AtomicU32) -> i32 {
    // SAFETY: word is a live reference; trailing arguments are unused by
    // FUTEX_WAKE.
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            FUTEX_WAKE,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0i32,
        ) as i32
    }
}

/// Polling fallback for platforms without futexes: sleep out the timeout
/// in small slices, re-checking the word.
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> i32 {
    use std::sync::atomic::Ordering;
    let deadline = timeout.map(|t| std::time::Instant::now() + t);
    loop {
        if word.load(Ordering::Acquire) != expected {
            return 0;
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                return -1;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_word: &AtomicU32) -> i32 {
    0
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-channel POSIX shared-memory segment with a fixed block table.
//!
//! # Layout
//!
//! ```text
//! +--------------------------------------------------+
//! | SegmentHeader      (64 bytes, cache aligned)     |
//! | BlockState[0]      (64 bytes, cache aligned)     |
//! | ...                                              |
//! | BlockState[count-1]                              |
//! | block data: count x block_size bytes             |
//! +--------------------------------------------------+
//! ```
//!
//! Writers claim a free block (round-robin from a shared cursor), fill it
//! and publish a readable descriptor. Readers take a shared read lock on
//! the block state so a writer cannot reclaim it mid-read; the writer
//! keeps appending into other blocks meanwhile. The first process to map
//! the segment initializes the header and stamps the magic; late openers
//! wait for the stamp.

use std::ffi::CString;
use std::io;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use super::{Result, ShmError};

const SEGMENT_MAGIC: u64 = 0x4359_4255_5353_4547; // "CYBUSSEG"
const HEADER_SIZE: usize = 64;
const BLOCK_STATE_SIZE: usize = 64;
pub(super) const INIT_WAIT_SLICE: Duration = Duration::from_millis(1);
pub(super) const INIT_WAIT_LIMIT: u32 = 2000;

#[repr(C, align(64))]
struct SegmentHeader {
    magic: AtomicU64,
    block_count: AtomicU32,
    block_size: AtomicU32,
    next_block: AtomicU32,
    _pad: [u8; 44],
}

/// Per-block claim state.
///
/// `state` is 0 when free, -1 while a writer fills the block, and the
/// reader count while readers hold it. `len` is the payload length of the
/// last completed write.
#[repr(C, align(64))]
struct BlockState {
    state: AtomicI32,
    len: AtomicU32,
    _pad: [u8; 56],
}

impl BlockState {
    fn try_acquire_write(&self) -> bool {
        self.state
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release_write(&self) {
        self.state.store(0, Ordering::Release);
    }

    fn acquire_read(&self) -> bool {
        loop {
            let current = self.state.load(Ordering::Acquire);
            if current < 0 {
                return false;
            }
            if self
                .state
                .compare_exchange_weak(current, current + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release_read(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }
}

/// Raw mapped region; unmapped on drop, unlinked only on request.
///
/// Shared by the block segment and the condition notifier, which lay out
/// their own headers on top of it.
pub(super) struct RawSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
}

// SAFETY: the mapping is shared memory synchronized through the atomics
// embedded in it; the raw pointer itself is never reallocated.
unsafe impl Send for RawSegment {}
unsafe impl Sync for RawSegment {}

impl RawSegment {
    /// Map the named segment, creating it if nobody has yet. Returns the
    /// mapping and whether this call created the segment.
    pub(super) fn open_or_create(name: &str, size: usize) -> Result<(Self, bool)> {
        validate_name(name)?;
        let c_name = CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))?;

        // SAFETY: c_name is a valid NUL-terminated string; O_CREAT|O_EXCL
        // either creates a fresh segment or fails with EEXIST.
        let (fd, created) = unsafe {
            let fd = libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            );
            if fd >= 0 {
                (fd, true)
            } else {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::EEXIST) {
                    return Err(ShmError::SegmentCreate(err));
                }
                let fd = libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0o600);
                if fd < 0 {
                    return Err(ShmError::SegmentOpen(io::Error::last_os_error()));
                }
                (fd, false)
            }
        };

        if created {
            // SAFETY: fd is the valid descriptor obtained above.
            let ret = unsafe { libc::ftruncate(fd, size as libc::off_t) };
            if ret < 0 {
                let err = io::Error::last_os_error();
                // SAFETY: fd is valid and not yet mapped.
                unsafe {
                    libc::close(fd);
                    libc::shm_unlink(c_name.as_ptr());
                }
                return Err(ShmError::SegmentCreate(err));
            }
        } else {
            // The creator may still be mid-ftruncate; wait for the size.
            let mut waited = 0u32;
            loop {
                let mut stat: libc::stat = unsafe { std::mem::zeroed() };
                // SAFETY: fd is valid and stat points to writable storage.
                let ret = unsafe { libc::fstat(fd, &mut stat) };
                if ret < 0 {
                    let err = io::Error::last_os_error();
                    // SAFETY: fd is valid and not yet mapped.
                    unsafe { libc::close(fd) };
                    return Err(ShmError::SegmentOpen(err));
                }
                let actual = stat.st_size as usize;
                if actual == size {
                    break;
                }
                if actual != 0 {
                    // SAFETY: fd is valid and not yet mapped.
                    unsafe { libc::close(fd) };
                    return Err(ShmError::GeometryMismatch {
                        expected: size,
                        actual,
                    });
                }
                waited += 1;
                if waited > INIT_WAIT_LIMIT {
                    // SAFETY: fd is valid and not yet mapped.
                    unsafe { libc::close(fd) };
                    return Err(ShmError::InitTimeout(name.to_string()));
                }
                std::thread::sleep(INIT_WAIT_SLICE);
            }
        }

        // SAFETY: fd is valid and sized; MAP_SHARED with RW protection is
        // the intended cross-process mapping. The fd can be closed after
        // mmap, the mapping keeps its own reference.
        let ptr = unsafe {
            let ptr = libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            );
            libc::close(fd);
            if ptr == libc::MAP_FAILED {
                return Err(ShmError::Mmap(io::Error::last_os_error()));
            }
            ptr.cast::<u8>()
        };

        Ok((
            Self {
                ptr,
                size,
                name: name.to_string(),
            },
            created,
        ))
    }

    pub(super) fn unlink(&self) {
        if let Ok(c_name) = CString::new(self.name.as_str()) {
            // SAFETY: c_name is a valid NUL-terminated string; unlink
            // errors (already removed) are irrelevant.
            unsafe { libc::shm_unlink(c_name.as_ptr()) };
        }
    }

    pub(super) fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub(super) fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RawSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/size describe the mapping created in open_or_create.
        unsafe { libc::munmap(self.ptr.cast::<libc::c_void>(), self.size) };
    }
}

fn validate_name(name: &str) -> Result<()> {
    if !name.starts_with('/') || name.len() < 2 || name.len() > 255 || name[1..].contains('/') {
        return Err(ShmError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// One channel's block segment.
pub struct Segment {
    raw: RawSegment,
    block_count: u32,
    block_size: u32,
}

impl Segment {
    /// Map (and initialize if first) the named segment.
    ///
    /// # Errors
    ///
    /// Fails on invalid names, geometry mismatch with an existing segment,
    /// or any of the underlying shm/mmap calls failing.
    pub fn open_or_create(name: &str, block_count: u32, block_size: u32) -> Result<Self> {
        let size = Self::total_size(block_count, block_size);
        let (raw, created) = RawSegment::open_or_create(name, size)?;
        let segment = Self {
            raw,
            block_count,
            block_size,
        };

        if created {
            let header = segment.header();
            header.block_count.store(block_count, Ordering::Relaxed);
            header.block_size.store(block_size, Ordering::Relaxed);
            header.next_block.store(0, Ordering::Relaxed);
            for index in 0..block_count {
                let state = segment.block_state(index);
                state.state.store(0, Ordering::Relaxed);
                state.len.store(0, Ordering::Relaxed);
            }
            header.magic.store(SEGMENT_MAGIC, Ordering::Release);
        } else {
            segment.wait_for_init()?;
            let header = segment.header();
            if header.block_count.load(Ordering::Acquire) != block_count
                || header.block_size.load(Ordering::Acquire) != block_size
            {
                return Err(ShmError::GeometryMismatch {
                    expected: size,
                    actual: Self::total_size(
                        header.block_count.load(Ordering::Acquire),
                        header.block_size.load(Ordering::Acquire),
                    ),
                });
            }
        }
        Ok(segment)
    }

    /// Claim a free block, copy `payload` in, and return its index.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` when the payload exceeds the block size;
    /// `SegmentFull` when every block is claimed by writers or readers.
    pub fn write_block(&self, payload: &[u8]) -> Result<u32> {
        if payload.len() > self.block_size as usize {
            return Err(ShmError::PayloadTooLarge {
                size: payload.len(),
                capacity: self.block_size as usize,
            });
        }

        let start = self.header().next_block.fetch_add(1, Ordering::Relaxed);
        for offset in 0..self.block_count {
            let index = (start.wrapping_add(offset)) % self.block_count;
            let state = self.block_state(index);
            if !state.try_acquire_write() {
                continue;
            }
            // SAFETY: index < block_count, the write claim excludes every
            // other writer and reader, and payload fits the block.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    payload.as_ptr(),
                    self.block_data_ptr(index),
                    payload.len(),
                );
            }
            state.len.store(payload.len() as u32, Ordering::Release);
            state.release_write();
            return Ok(index);
        }
        Err(ShmError::SegmentFull)
    }

    /// Copy out the payload of `index` if it still carries `length` bytes.
    ///
    /// Returns `None` when the block is being rewritten or has been
    /// recycled since the descriptor was published; the caller treats that
    /// as a transport drop.
    #[must_use]
    pub fn read_block(&self, index: u32, length: u32) -> Option<Vec<u8>> {
        if index >= self.block_count || length > self.block_size {
            return None;
        }
        let state = self.block_state(index);
        if !state.acquire_read() {
            return None;
        }
        let result = if state.len.load(Ordering::Acquire) == length {
            let mut out = vec![0u8; length as usize];
            // SAFETY: index < block_count, the read claim excludes writers,
            // and length <= block_size.
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.block_data_ptr(index),
                    out.as_mut_ptr(),
                    length as usize,
                );
            }
            Some(out)
        } else {
            None
        };
        state.release_read();
        result
    }

    #[must_use]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    #[must_use]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.raw.name
    }

    /// Remove the segment name from the filesystem namespace. Existing
    /// mappings stay valid; call on final teardown.
    pub fn unlink(&self) {
        self.raw.unlink();
    }

    fn total_size(block_count: u32, block_size: u32) -> usize {
        HEADER_SIZE
            + block_count as usize * BLOCK_STATE_SIZE
            + block_count as usize * block_size as usize
    }

    fn header(&self) -> &SegmentHeader {
        // SAFETY: the mapping is at least HEADER_SIZE bytes and the header
        // sits at its 64-byte aligned base.
        unsafe { &*self.raw.ptr.cast::<SegmentHeader>() }
    }

    fn block_state(&self, index: u32) -> &BlockState {
        debug_assert!(index < self.block_count);
        // SAFETY: index is bounds-checked by callers; the state table
        // starts right after the header at 64-byte aligned offsets.
        unsafe {
            &*self
                .raw
                .ptr
                .add(HEADER_SIZE + index as usize * BLOCK_STATE_SIZE)
                .cast::<BlockState>()
        }
    }

    fn block_data_ptr(&self, index: u32) -> *mut u8 {
        let data_base = HEADER_SIZE + self.block_count as usize * BLOCK_STATE_SIZE;
        // SAFETY: callers bounds-check index; the data area spans
        // block_count * block_size bytes from data_base.
        unsafe {
            self.raw
                .ptr
                .add(data_base + index as usize * self.block_size as usize)
        }
    }

    fn wait_for_init(&self) -> Result<()> {
        let mut waited = 0u32;
        while self.header().magic.load(Ordering::Acquire) != SEGMENT_MAGIC {
            waited += 1;
            if waited > INIT_WAIT_LIMIT {
                return Err(ShmError::InitTimeout(self.raw.name.clone()));
            }
            std::thread::sleep(INIT_WAIT_SLICE);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32 as StdAtomicU32;

    fn unique_name(tag: &str) -> String {
        static COUNTER: StdAtomicU32 = StdAtomicU32::new(0);
        format!(
            "/cybus_test_{}_{}_{}",
            tag,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        )
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(matches!(
            Segment::open_or_create("no_slash", 4, 64),
            Err(ShmError::InvalidName(_))
        ));
        assert!(matches!(
            Segment::open_or_create("/nested/name", 4, 64),
            Err(ShmError::InvalidName(_))
        ));
    }

    #[test]
    fn test_write_then_read_roundtrip() {
        let name = unique_name("roundtrip");
        let segment = Segment::open_or_create(&name, 4, 64).expect("segment");
        let payload = b"hello blocks";

        let index = segment.write_block(payload).expect("free block");
        let read = segment
            .read_block(index, payload.len() as u32)
            .expect("block still resident");
        assert_eq!(read, payload);
        segment.unlink();
    }

    #[test]
    fn test_payload_too_large() {
        let name = unique_name("toolarge");
        let segment = Segment::open_or_create(&name, 4, 16).expect("segment");
        let result = segment.write_block(&[0u8; 17]);
        assert!(matches!(result, Err(ShmError::PayloadTooLarge { .. })));
        segment.unlink();
    }

    #[test]
    fn test_blocks_recycle_round_robin() {
        let name = unique_name("recycle");
        let segment = Segment::open_or_create(&name, 4, 64).expect("segment");
        let mut indices = Vec::new();
        for i in 0..8u8 {
            indices.push(segment.write_block(&[i; 8]).expect("free block"));
        }
        // Eight writes over four blocks reuse every index twice.
        for index in 0..4u32 {
            assert_eq!(indices.iter().filter(|&&i| i == index).count(), 2);
        }
        segment.unlink();
    }

    #[test]
    fn test_read_with_stale_length_misses() {
        let name = unique_name("stale");
        let segment = Segment::open_or_create(&name, 4, 64).expect("segment");
        let index = segment.write_block(b"abcd").expect("free block");
        assert!(segment.read_block(index, 3).is_none());
        assert!(segment.read_block(index, 4).is_some());
        segment.unlink();
    }

    #[test]
    fn test_second_mapping_sees_data() {
        let name = unique_name("shared");
        let writer = Segment::open_or_create(&name, 4, 64).expect("writer mapping");
        let reader = Segment::open_or_create(&name, 4, 64).expect("reader mapping");

        let index = writer.write_block(b"cross-mapping").expect("free block");
        let read = reader.read_block(index, 13).expect("shared visibility");
        assert_eq!(read, b"cross-mapping");
        writer.unlink();
    }

    #[test]
    fn test_geometry_mismatch_detected() {
        let name = unique_name("geometry");
        let _segment = Segment::open_or_create(&name, 4, 64).expect("segment");
        let result = Segment::open_or_create(&name, 8, 64);
        assert!(matches!(
            result,
            Err(ShmError::GeometryMismatch { .. }) | Err(ShmError::InitTimeout(_))
        ));
        _segment.unlink();
    }
}

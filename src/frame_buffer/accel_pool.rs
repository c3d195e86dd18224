// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A pool of frame-sized slots carved out of a single mapped region.
//!
//! Accelerators that perform inter prediction need all reference frames to live in one buffer
//! object that is mapped once for the lifetime of the decoder. Frames are therefore addressed by
//! slot index rather than allocated independently, and releasing a frame only clears its slot.

use std::num::NonZeroUsize;
use std::ptr::NonNull;
use std::slice;

use nix::libc;
use nix::sys::mman::mmap_anonymous;
use nix::sys::mman::munmap;
use nix::sys::mman::MapFlags;
use nix::sys::mman::ProtFlags;

use crate::frame_buffer::FrameBufferError;
use crate::frame_buffer::Result;
use crate::frame_buffer::FRAME_ALIGNMENT;
use crate::utils::align_up;

/// The number of reference frames a VP9 decoder keeps around.
pub const NUM_REF_FRAMES: usize = 8;

/// Maximum number of frames alive at the same time: every reference slot plus the frames being
/// decoded or waiting to be output.
pub const MAX_FRAME_BUFFERS: usize = NUM_REF_FRAMES + 4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum size of each slot. The pool rounds it up to a multiple of [`FRAME_ALIGNMENT`], so
    /// [`AcceleratorPool::slot_size`] may be larger; that rounded size is what a slot can hold and
    /// what [`AcceleratorPool::release_slot`] zeroes.
    pub slot_size: usize,
    pub num_slots: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            slot_size: 0,
            num_slots: MAX_FRAME_BUFFERS,
        }
    }
}

/// Anonymous shared mapping backing the pool.
struct MappedRegion {
    addr: NonNull<libc::c_void>,
    len: NonZeroUsize,
}

// SAFETY: the mapping is exclusively owned by the region and only reachable through the
// borrow-checked accessors of `AcceleratorPool`.
unsafe impl Send for MappedRegion {}
// SAFETY: shared references only ever produce shared slices of the mapping.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    fn new(len: NonZeroUsize) -> nix::Result<Self> {
        // SAFETY: we request a fresh anonymous mapping and do not alias any existing memory.
        let addr = unsafe {
            mmap_anonymous(
                None,
                len,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_SHARED,
            )?
        };

        Ok(Self { addr, len })
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: `addr` points to `len` readable bytes for as long as `self` lives.
        unsafe { slice::from_raw_parts(self.addr.as_ptr() as *const u8, self.len.get()) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `addr` points to `len` writable bytes for as long as `self` lives, and the
        // exclusive borrow of `self` guarantees no other slice of the mapping exists.
        unsafe { slice::from_raw_parts_mut(self.addr.as_ptr() as *mut u8, self.len.get()) }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: the mapping was created by `mmap_anonymous` with this exact length and no
        // slice into it can outlive `self`.
        if let Err(e) = unsafe { munmap(self.addr, self.len.get()) } {
            log::warn!("failed to unmap frame pool region: {}", e);
        }
    }
}

/// Fixed number of equally sized frame slots inside one mapped region.
///
/// The pool is created once by the decoder context, before any parallel decoding work starts,
/// and lives as long as the decoder. Distinct slots never overlap.
pub struct AcceleratorPool {
    region: MappedRegion,
    slot_size: usize,
    num_slots: usize,
}

impl AcceleratorPool {
    /// Maps the region for all the slots described by `config`. The region starts zeroed.
    pub fn new(config: PoolConfig) -> Result<Self> {
        if config.slot_size == 0 || config.num_slots == 0 {
            return Err(FrameBufferError::InvalidArgument(
                "frame pool needs a non-zero slot size and slot count",
            ));
        }

        let slot_size = align_up(config.slot_size, FRAME_ALIGNMENT);
        let len = slot_size
            .checked_mul(config.num_slots)
            .and_then(NonZeroUsize::new)
            .ok_or_else(|| FrameBufferError::AllocationFailure {
                size: usize::MAX,
                reason: "frame pool size overflows".into(),
            })?;

        let region = MappedRegion::new(len).map_err(|e| {
            log::warn!("failed to map {} bytes for the frame pool: {}", len, e);
            FrameBufferError::AllocationFailure {
                size: len.get(),
                reason: e.to_string(),
            }
        })?;

        log::debug!(
            "created frame pool: {} slots of {} bytes",
            config.num_slots,
            slot_size
        );

        Ok(Self {
            region,
            slot_size,
            num_slots: config.num_slots,
        })
    }

    /// Size of every slot, i.e. the configured size rounded up to [`FRAME_ALIGNMENT`].
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    fn slot_range(&self, index: usize) -> Result<std::ops::Range<usize>> {
        if index >= self.num_slots {
            return Err(FrameBufferError::InvalidArgument(
                "frame pool slot index out of range",
            ));
        }

        let start = index * self.slot_size;
        Ok(start..start + self.slot_size)
    }

    /// Reserves slot `index` for a frame of `size` bytes and returns the offset of the slot in
    /// the region.
    ///
    /// Reserving the same slot twice returns the same offset. Frames larger than a slot are
    /// refused rather than allowed to spill into the next slot.
    pub fn reserve_slot(&mut self, index: usize, size: usize) -> Result<usize> {
        let range = self.slot_range(index)?;

        if size > self.slot_size {
            return Err(FrameBufferError::AllocationFailure {
                size,
                reason: format!("frame pool slots are only {} bytes", self.slot_size),
            });
        }

        log::trace!("reserved slot {} at offset {:#x}", index, range.start);

        Ok(range.start)
    }

    /// Zeroes slot `index` in place. The memory stays mapped.
    pub fn release_slot(&mut self, index: usize) -> Result<()> {
        let range = self.slot_range(index)?;
        self.region.as_mut_slice()[range].fill(0);

        log::trace!("released slot {}", index);

        Ok(())
    }

    pub fn slot(&self, index: usize) -> Option<&[u8]> {
        let range = self.slot_range(index).ok()?;
        Some(&self.region.as_slice()[range])
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        let range = self.slot_range(index).ok()?;
        Some(&mut self.region.as_mut_slice()[range])
    }

    /// The whole region, as it would be handed to the accelerator.
    pub fn region(&self) -> &[u8] {
        self.region.as_slice()
    }
}

impl std::fmt::Debug for AcceleratorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcceleratorPool")
            .field("slot_size", &self.slot_size)
            .field("num_slots", &self.num_slots)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(slot_size: usize, num_slots: usize) -> AcceleratorPool {
        AcceleratorPool::new(PoolConfig {
            slot_size,
            num_slots,
        })
        .unwrap()
    }

    #[test]
    fn test_slot_size_is_aligned() {
        let pool = pool(100, 3);
        assert_eq!(pool.slot_size(), 128);
        assert_eq!(pool.region().len(), 384);
        assert!(pool.region().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_release_zeroes_rounded_slot() {
        let mut pool = pool(100, 2);
        assert_eq!(pool.slot_size(), 128);

        // The rounded slot size is usable, not just the configured one.
        assert_eq!(pool.reserve_slot(0, 128).unwrap(), 0);
        pool.slot_mut(0).unwrap().fill(0xaa);
        pool.slot_mut(1).unwrap().fill(0xbb);

        pool.release_slot(0).unwrap();

        let region = pool.region();
        assert!(region[..128].iter().all(|&b| b == 0));
        assert!(region[128..].iter().all(|&b| b == 0xbb));
    }

    #[test]
    fn test_reserve_is_idempotent() {
        let mut pool = pool(4096, 4);

        let first = pool.reserve_slot(2, 4000).unwrap();
        let second = pool.reserve_slot(2, 4096).unwrap();
        assert_eq!(first, 2 * 4096);
        assert_eq!(first, second);
        assert_eq!(pool.reserve_slot(0, 1).unwrap(), 0);
    }

    #[test]
    fn test_release_zeroes_only_its_slot() {
        let mut pool = pool(256, 4);

        for i in 0..pool.num_slots() {
            pool.slot_mut(i).unwrap().fill(0xaa);
        }

        pool.release_slot(1).unwrap();

        let region = pool.region();
        assert!(region[..256].iter().all(|&b| b == 0xaa));
        assert!(region[256..512].iter().all(|&b| b == 0));
        assert!(region[512..].iter().all(|&b| b == 0xaa));
    }

    #[test]
    fn test_out_of_range_slot() {
        let mut pool = pool(256, 2);

        assert!(matches!(
            pool.reserve_slot(2, 16),
            Err(FrameBufferError::InvalidArgument(_))
        ));
        assert!(matches!(
            pool.release_slot(5),
            Err(FrameBufferError::InvalidArgument(_))
        ));
        assert!(pool.slot(2).is_none());
    }

    #[test]
    fn test_oversized_reservation() {
        let mut pool = pool(256, 2);

        assert!(matches!(
            pool.reserve_slot(0, 257),
            Err(FrameBufferError::AllocationFailure { size: 257, .. })
        ));
    }

    #[test]
    fn test_empty_pool_is_rejected() {
        assert!(AcceleratorPool::new(PoolConfig::default()).is_err());
        assert!(AcceleratorPool::new(PoolConfig {
            slot_size: 64,
            num_slots: 0,
        })
        .is_err());
    }
}

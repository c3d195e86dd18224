// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Strategies providing the backing storage of frame buffers.
//!
//! The frame layout computation is shared by every strategy; they only differ in where the bytes
//! come from and how they are given back:
//!
//! * [`SystemAllocator`] owns 32-byte aligned heap memory,
//! * [`ExternalAllocator`] asks a client callback for memory that the client keeps ownership of,
//! * [`AcceleratorAllocator`] hands out slots of an [`AcceleratorPool`].

use std::fmt;

use aligned_vec::AVec;
use aligned_vec::ConstAlign;

use crate::frame_buffer::accel_pool::AcceleratorPool;
use crate::frame_buffer::FrameBufferError;
use crate::frame_buffer::Result;
use crate::frame_buffer::FRAME_ALIGNMENT;
use crate::utils::align_offset;

/// Extra bytes requested from external providers so the start of the frame can be aligned
/// regardless of the address they return.
pub const ALIGN_ADDR_EXTRA_SIZE: usize = FRAME_ALIGNMENT - 1;

/// Heap storage aligned to [`FRAME_ALIGNMENT`].
pub type AlignedStorage = AVec<u8, ConstAlign<FRAME_ALIGNMENT>>;

/// Memory provided by a client of the decoder.
///
/// Dropping the object gives the memory back to the client, who decides what to do with it. The
/// address of the memory must not change while the object is alive.
pub trait ExternalMemory: Send + Sync {
    fn as_slice(&self) -> &[u8];
    fn as_mut_slice(&mut self) -> &mut [u8];
}

impl ExternalMemory for Vec<u8> {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

impl ExternalMemory for Box<[u8]> {
    fn as_slice(&self) -> &[u8] {
        self
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        self
    }
}

/// Where the bytes of a frame buffer currently live.
#[derive(Default)]
pub enum Backing {
    #[default]
    Unallocated,
    /// Heap memory owned by the frame buffer.
    Owned(AlignedStorage),
    /// Client memory. The frame starts `offset` bytes into `memory`.
    External {
        memory: Box<dyn ExternalMemory>,
        offset: usize,
    },
    /// The first `size` bytes of a pool slot.
    Pooled { slot: usize, size: usize },
}

impl Backing {
    pub fn is_unallocated(&self) -> bool {
        matches!(self, Backing::Unallocated)
    }

    /// Number of bytes usable for frame data without growing the backing.
    pub fn capacity(&self) -> usize {
        match self {
            Backing::Unallocated => 0,
            Backing::Owned(buf) => buf.len(),
            Backing::External { memory, offset } => memory.as_slice().len() - offset,
            Backing::Pooled { size, .. } => *size,
        }
    }
}

impl fmt::Debug for Backing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backing::Unallocated => f.write_str("Unallocated"),
            Backing::Owned(buf) => f.debug_tuple("Owned").field(&buf.len()).finish(),
            Backing::External { memory, offset } => f
                .debug_struct("External")
                .field("len", &memory.as_slice().len())
                .field("offset", offset)
                .finish(),
            Backing::Pooled { slot, size } => f
                .debug_struct("Pooled")
                .field("slot", slot)
                .field("size", size)
                .finish(),
        }
    }
}

/// Common interface of the frame storage strategies.
pub trait FrameAllocator {
    /// Whether `backing` was produced by this kind of allocator and can be grown or released by
    /// it.
    fn owns(&self, backing: &Backing) -> bool;

    /// Makes `backing` hold at least `size` bytes.
    ///
    /// Storage that is already large enough is kept as-is, including its content. New storage is
    /// zeroed. On error `backing` is left untouched. `slot` selects the pool slot for strategies
    /// that need one and is ignored by the others.
    fn ensure_capacity(
        &mut self,
        backing: &mut Backing,
        size: usize,
        slot: Option<usize>,
    ) -> Result<()>;

    /// Gives the storage back to wherever it came from and leaves `backing` unallocated.
    fn release(&mut self, backing: &mut Backing);

    /// Bytes of the frame, starting at the aligned frame start.
    fn storage<'a>(&'a self, backing: &'a Backing) -> &'a [u8];

    fn storage_mut<'a>(&'a mut self, backing: &'a mut Backing) -> &'a mut [u8];
}

/// Allocates frames on the heap, aligned to [`FRAME_ALIGNMENT`].
#[derive(Debug, Default)]
pub struct SystemAllocator;

impl FrameAllocator for SystemAllocator {
    fn owns(&self, backing: &Backing) -> bool {
        matches!(backing, Backing::Owned(_))
    }

    fn ensure_capacity(
        &mut self,
        backing: &mut Backing,
        size: usize,
        _slot: Option<usize>,
    ) -> Result<()> {
        if let Backing::Owned(buf) = backing {
            if buf.len() >= size {
                log::trace!("reusing {} bytes of frame storage for {}", buf.len(), size);
                return Ok(());
            }
        }

        if size > isize::MAX as usize - FRAME_ALIGNMENT {
            log::warn!("refusing to allocate {} bytes of frame storage", size);
            return Err(FrameBufferError::AllocationFailure {
                size,
                reason: "size exceeds the address space".into(),
            });
        }

        // Drop the old storage first so both are never alive at the same time.
        *backing = Backing::Unallocated;

        let mut buf = AlignedStorage::with_capacity(FRAME_ALIGNMENT, size);
        buf.resize(size, 0);

        log::debug!("allocated {} bytes of frame storage", size);

        *backing = Backing::Owned(buf);
        Ok(())
    }

    fn release(&mut self, backing: &mut Backing) {
        *backing = Backing::Unallocated;
    }

    fn storage<'a>(&'a self, backing: &'a Backing) -> &'a [u8] {
        match backing {
            Backing::Owned(buf) => &buf[..],
            _ => &[],
        }
    }

    fn storage_mut<'a>(&'a mut self, backing: &'a mut Backing) -> &'a mut [u8] {
        match backing {
            Backing::Owned(buf) => &mut buf[..],
            _ => &mut [],
        }
    }
}

/// Callback used by [`ExternalAllocator`] to obtain memory of at least the given size.
pub type GetFrameBufferCb = dyn FnMut(usize) -> anyhow::Result<Box<dyn ExternalMemory>> + Send;

/// Stores frames in memory obtained from the client through a callback.
///
/// The callback is only invoked when the memory currently held by a frame is too small. The
/// memory is zeroed on arrival since filters read the borders before anything is written there.
pub struct ExternalAllocator {
    get_frame_buffer: Box<GetFrameBufferCb>,
}

impl ExternalAllocator {
    pub fn new(
        get_frame_buffer: impl FnMut(usize) -> anyhow::Result<Box<dyn ExternalMemory>>
            + Send
            + 'static,
    ) -> Self {
        Self {
            get_frame_buffer: Box::new(get_frame_buffer),
        }
    }
}

impl FrameAllocator for ExternalAllocator {
    fn owns(&self, backing: &Backing) -> bool {
        matches!(backing, Backing::External { .. })
    }

    fn ensure_capacity(
        &mut self,
        backing: &mut Backing,
        size: usize,
        _slot: Option<usize>,
    ) -> Result<()> {
        let external_size = size + ALIGN_ADDR_EXTRA_SIZE;

        if let Backing::External { memory, .. } = backing {
            if memory.as_slice().len() >= external_size {
                log::trace!(
                    "reusing {} bytes of external memory for {}",
                    memory.as_slice().len(),
                    external_size
                );
                return Ok(());
            }
        }

        let mut memory = (self.get_frame_buffer)(external_size).map_err(|e| {
            log::warn!("external frame buffer request failed: {:#}", e);
            FrameBufferError::AllocationFailure {
                size: external_size,
                reason: format!("{:#}", e),
            }
        })?;

        let capacity = memory.as_slice().len();
        if capacity < external_size {
            log::warn!(
                "external frame buffer too small: {} < {}",
                capacity,
                external_size
            );
            return Err(FrameBufferError::AllocationFailure {
                size: external_size,
                reason: format!("provider returned only {} bytes", capacity),
            });
        }

        memory.as_mut_slice().fill(0);
        let offset = align_offset(memory.as_slice(), FRAME_ALIGNMENT);

        log::debug!(
            "got {} bytes of external memory, frame starts at offset {}",
            capacity,
            offset
        );

        *backing = Backing::External { memory, offset };
        Ok(())
    }

    fn release(&mut self, backing: &mut Backing) {
        *backing = Backing::Unallocated;
    }

    fn storage<'a>(&'a self, backing: &'a Backing) -> &'a [u8] {
        match backing {
            Backing::External { memory, offset } => &memory.as_slice()[*offset..],
            _ => &[],
        }
    }

    fn storage_mut<'a>(&'a mut self, backing: &'a mut Backing) -> &'a mut [u8] {
        match backing {
            Backing::External { memory, offset } => &mut memory.as_mut_slice()[*offset..],
            _ => &mut [],
        }
    }
}

impl fmt::Debug for ExternalAllocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExternalAllocator")
    }
}

/// Stores frames in the slots of an [`AcceleratorPool`].
#[derive(Debug)]
pub struct AcceleratorAllocator<'p> {
    pool: &'p mut AcceleratorPool,
}

impl<'p> AcceleratorAllocator<'p> {
    pub fn new(pool: &'p mut AcceleratorPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &AcceleratorPool {
        &*self.pool
    }
}

impl<'p> FrameAllocator for AcceleratorAllocator<'p> {
    fn owns(&self, backing: &Backing) -> bool {
        matches!(backing, Backing::Pooled { .. })
    }

    fn ensure_capacity(
        &mut self,
        backing: &mut Backing,
        size: usize,
        slot: Option<usize>,
    ) -> Result<()> {
        if let Backing::Pooled { slot, size: current } = *backing {
            if current >= size {
                log::trace!("reusing slot {} ({} bytes) for {}", slot, current, size);
                return Ok(());
            }
        }

        let index = slot.ok_or(FrameBufferError::InvalidArgument(
            "pooled frame storage needs a slot index",
        ))?;

        // Validates the index and the size before the current slot is given up.
        let offset = self.pool.reserve_slot(index, size)?;

        if let Backing::Pooled { slot: previous, .. } = *backing {
            self.pool.release_slot(previous)?;
        }

        if let Some(mem) = self.pool.slot_mut(index) {
            mem[..size].fill(0);
        }

        log::debug!(
            "frame storage of {} bytes in slot {} (offset {:#x})",
            size,
            index,
            offset
        );

        *backing = Backing::Pooled { slot: index, size };
        Ok(())
    }

    fn release(&mut self, backing: &mut Backing) {
        if let Backing::Pooled { slot, .. } = *backing {
            if let Err(e) = self.pool.release_slot(slot) {
                log::warn!("failed to release slot {}: {}", slot, e);
            }
        }

        *backing = Backing::Unallocated;
    }

    fn storage<'a>(&'a self, backing: &'a Backing) -> &'a [u8] {
        match *backing {
            Backing::Pooled { slot, size } => {
                self.pool.slot(slot).map(|mem| &mem[..size]).unwrap_or(&[])
            }
            _ => &[],
        }
    }

    fn storage_mut<'a>(&'a mut self, backing: &'a mut Backing) -> &'a mut [u8] {
        match *backing {
            Backing::Pooled { slot, size } => match self.pool.slot_mut(slot) {
                Some(mem) => &mut mem[..size],
                None => &mut [],
            },
            _ => &mut [],
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use super::*;
    use crate::frame_buffer::accel_pool::PoolConfig;

    #[test]
    fn test_system_allocator_grows_only() {
        let mut alloc = SystemAllocator;
        let mut backing = Backing::default();

        alloc.ensure_capacity(&mut backing, 1024, None).unwrap();
        assert_eq!(backing.capacity(), 1024);
        let ptr = alloc.storage(&backing).as_ptr();
        assert_eq!(ptr as usize % FRAME_ALIGNMENT, 0);

        alloc.storage_mut(&mut backing)[10] = 7;
        alloc.ensure_capacity(&mut backing, 512, None).unwrap();
        assert_eq!(alloc.storage(&backing).as_ptr(), ptr);
        assert_eq!(alloc.storage(&backing)[10], 7);

        alloc.ensure_capacity(&mut backing, 2048, None).unwrap();
        assert_eq!(backing.capacity(), 2048);
        assert!(alloc.storage(&backing).iter().all(|&b| b == 0));

        alloc.release(&mut backing);
        assert!(backing.is_unallocated());
    }

    /// Memory that counts how many times it was handed back.
    struct TrackedMemory {
        data: Vec<u8>,
        returned: Arc<AtomicUsize>,
    }

    impl ExternalMemory for TrackedMemory {
        fn as_slice(&self) -> &[u8] {
            &self.data
        }

        fn as_mut_slice(&mut self) -> &mut [u8] {
            &mut self.data
        }
    }

    impl Drop for TrackedMemory {
        fn drop(&mut self) {
            self.returned.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_external_allocator() {
        let requests = Arc::new(AtomicUsize::new(0));
        let returned = Arc::new(AtomicUsize::new(0));

        let mut alloc = {
            let requests = requests.clone();
            let returned = returned.clone();
            ExternalAllocator::new(move |size| {
                requests.fetch_add(1, Ordering::SeqCst);
                Ok(Box::new(TrackedMemory {
                    data: vec![0xff; size],
                    returned: returned.clone(),
                }) as Box<dyn ExternalMemory>)
            })
        };
        let mut backing = Backing::default();

        alloc.ensure_capacity(&mut backing, 1000, None).unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert!(backing.capacity() >= 1000);
        let storage = alloc.storage(&backing);
        assert_eq!(storage.as_ptr() as usize % FRAME_ALIGNMENT, 0);
        assert!(storage.iter().all(|&b| b == 0));

        // Enough room already, the provider is not called again.
        alloc.ensure_capacity(&mut backing, 900, None).unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 1);

        alloc.ensure_capacity(&mut backing, 4000, None).unwrap();
        assert_eq!(requests.load(Ordering::SeqCst), 2);
        assert_eq!(returned.load(Ordering::SeqCst), 1);

        alloc.release(&mut backing);
        assert_eq!(returned.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_external_allocator_failures() {
        let mut failing = ExternalAllocator::new(|_| Err(anyhow::anyhow!("out of buffers")));
        let mut backing = Backing::default();
        assert!(matches!(
            failing.ensure_capacity(&mut backing, 64, None),
            Err(FrameBufferError::AllocationFailure { size: 95, .. })
        ));
        assert!(backing.is_unallocated());

        let mut short = ExternalAllocator::new(|size| {
            Ok(Box::new(vec![0u8; size - 1]) as Box<dyn ExternalMemory>)
        });
        assert!(matches!(
            short.ensure_capacity(&mut backing, 64, None),
            Err(FrameBufferError::AllocationFailure { .. })
        ));
        assert!(backing.is_unallocated());
    }

    #[test]
    fn test_accelerator_allocator() {
        let mut pool = AcceleratorPool::new(PoolConfig {
            slot_size: 1024,
            num_slots: 4,
        })
        .unwrap();
        let mut alloc = AcceleratorAllocator::new(&mut pool);
        let mut backing = Backing::default();

        assert!(matches!(
            alloc.ensure_capacity(&mut backing, 512, None),
            Err(FrameBufferError::InvalidArgument(_))
        ));

        alloc.ensure_capacity(&mut backing, 512, Some(1)).unwrap();
        alloc.storage_mut(&mut backing).fill(0x55);
        assert_eq!(alloc.storage(&backing).len(), 512);

        // Growing moves the frame to the requested slot and clears the previous one.
        alloc.ensure_capacity(&mut backing, 1024, Some(2)).unwrap();
        assert!(matches!(backing, Backing::Pooled { slot: 2, size: 1024 }));
        assert!(alloc.pool().slot(1).unwrap().iter().all(|&b| b == 0));

        // Frames never outgrow their slot.
        assert!(matches!(
            alloc.ensure_capacity(&mut backing, 1025, Some(3)),
            Err(FrameBufferError::AllocationFailure { .. })
        ));
        assert!(matches!(backing, Backing::Pooled { slot: 2, size: 1024 }));

        alloc.storage_mut(&mut backing).fill(0x55);
        alloc.release(&mut backing);
        assert!(backing.is_unallocated());
        assert!(pool.region().iter().all(|&b| b == 0));
    }
}

// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bordered planar frame buffers used as reconstruction targets and references.
//!
//! A [`FrameBuffer`] describes where each plane lives inside one contiguous backing storage. The
//! storage itself is provided by a [`FrameAllocator`], which is chosen once when the decoder is
//! created: plain heap memory ([`SystemAllocator`]), client memory ([`ExternalAllocator`]) or the
//! slots of a mapped accelerator pool ([`AcceleratorAllocator`]). The plane layout is the same
//! whatever the strategy.
//!
//! Buffers are grown but never shrunk: reallocating a buffer for a frame that fits in its current
//! storage keeps the storage and its content untouched.

pub mod accel_pool;
pub mod allocator;
pub mod geometry;

use enumn::N;
use thiserror::Error;

pub use crate::frame_buffer::accel_pool::AcceleratorPool;
pub use crate::frame_buffer::accel_pool::PoolConfig;
pub use crate::frame_buffer::allocator::AcceleratorAllocator;
pub use crate::frame_buffer::allocator::Backing;
pub use crate::frame_buffer::allocator::ExternalAllocator;
pub use crate::frame_buffer::allocator::ExternalMemory;
pub use crate::frame_buffer::allocator::FrameAllocator;
pub use crate::frame_buffer::allocator::SystemAllocator;
pub use crate::frame_buffer::geometry::DimAlign;
pub use crate::frame_buffer::geometry::FrameGeometry;
pub use crate::frame_buffer::geometry::PlaneLayout;
use crate::frame_buffer::geometry::BORDER_ALIGNMENT;
use crate::Resolution;

/// Alignment of the start of the frame storage, in bytes.
pub const FRAME_ALIGNMENT: usize = 32;

/// Border used for VP9 reference frames, in pixels.
pub const BORDER_IN_PIXELS: u32 = 160;

pub type Result<T> = std::result::Result<T, FrameBufferError>;

#[derive(Error, Debug)]
pub enum FrameBufferError {
    /// The call cannot be carried out with these arguments, e.g. the subsampling is not 0 or 1,
    /// the storage of the frame was provided by another kind of allocator or a pool slot index is
    /// missing or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Borders must be a multiple of 32 pixels.
    #[error("border of {0} pixels is not a multiple of 32")]
    UnsupportedAlignment(u32),
    /// No storage could be obtained for the frame.
    #[error("failed to allocate {size} bytes of frame storage: {reason}")]
    AllocationFailure { size: usize, reason: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, N)]
#[repr(u8)]
pub enum Plane {
    Y = 0,
    U = 1,
    V = 2,
    Alpha = 3,
}

/// Parameters of a frame buffer allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameParams {
    /// Displayed size of the frame.
    pub resolution: Resolution,
    /// Horizontal chroma subsampling, as a shift. Must be 0 or 1.
    pub ss_x: u32,
    /// Vertical chroma subsampling, as a shift. Must be 0 or 1.
    pub ss_y: u32,
    /// Border around every plane, in luma pixels. Must be a multiple of 32.
    pub border: u32,
    /// Whether to add an alpha plane after the chroma planes.
    pub alpha: bool,
    pub dim_align: DimAlign,
}

impl Default for FrameParams {
    fn default() -> Self {
        Self {
            resolution: Default::default(),
            ss_x: 1,
            ss_y: 1,
            border: BORDER_IN_PIXELS,
            alpha: false,
            dim_align: Default::default(),
        }
    }
}

/// A planar frame inside a single backing storage.
///
/// The buffer is not synchronized internally. Once a frame is fully decoded it can be shared
/// between threads for reading.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    geometry: FrameGeometry,
    planes: [PlaneLayout; 3],
    alpha: Option<PlaneLayout>,
    corrupted: bool,
    backing: Backing,
}

impl FrameBuffer {
    /// Releases any storage held by the buffer, then allocates it for `params`.
    ///
    /// Fails without touching the buffer if the parameters are invalid.
    pub fn alloc<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        params: &FrameParams,
        slot: Option<usize>,
    ) -> Result<()> {
        FrameGeometry::compute(params)?;
        self.free(allocator)?;
        self.realloc(allocator, params, slot)
    }

    /// Lays out the buffer for `params`, growing its storage if it is too small.
    ///
    /// Storage that is large enough is reused without being cleared. `slot` is the pool slot to
    /// use when `allocator` is an [`AcceleratorAllocator`]. On error the buffer keeps its previous
    /// layout and storage.
    pub fn realloc<A: FrameAllocator + ?Sized>(
        &mut self,
        allocator: &mut A,
        params: &FrameParams,
        slot: Option<usize>,
    ) -> Result<()> {
        let geometry = FrameGeometry::compute(params)?;

        if !self.backing.is_unallocated() && !allocator.owns(&self.backing) {
            return Err(FrameBufferError::InvalidArgument(
                "frame storage belongs to another allocator",
            ));
        }

        allocator.ensure_capacity(&mut self.backing, geometry.frame_size, slot)?;

        if allocator.storage(&self.backing).len() < geometry.frame_size {
            return Err(FrameBufferError::AllocationFailure {
                size: geometry.frame_size,
                reason: "allocator returned short storage".into(),
            });
        }

        debug_assert_eq!(geometry.border as u32 % BORDER_ALIGNMENT, 0);

        self.planes = [Plane::Y, Plane::U, Plane::V]
            .map(|p| geometry.plane(p).unwrap_or_default());
        self.alpha = geometry.plane(Plane::Alpha);
        self.geometry = geometry;
        self.corrupted = false;

        log::trace!(
            "frame buffer laid out for {}x{} ({} bytes, capacity {})",
            geometry.crop_width,
            geometry.crop_height,
            geometry.frame_size,
            self.backing.capacity()
        );

        Ok(())
    }

    /// Gives the storage back through `allocator` and resets the buffer to its default state.
    pub fn free<A: FrameAllocator + ?Sized>(&mut self, allocator: &mut A) -> Result<()> {
        if !self.backing.is_unallocated() {
            if !allocator.owns(&self.backing) {
                return Err(FrameBufferError::InvalidArgument(
                    "frame storage belongs to another allocator",
                ));
            }

            allocator.release(&mut self.backing);
        }

        *self = Default::default();
        Ok(())
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    pub fn backing(&self) -> &Backing {
        &self.backing
    }

    /// Whether the buffer currently has no layout and no storage.
    pub fn is_empty(&self) -> bool {
        self.backing.is_unallocated() && self.geometry == FrameGeometry::default()
    }

    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: self.geometry.crop_width as u32,
            height: self.geometry.crop_height as u32,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Marks the frame as containing errors. Cleared by the next successful reallocation.
    pub fn set_corrupted(&mut self, corrupted: bool) {
        self.corrupted = corrupted;
    }

    pub fn plane_layout(&self, plane: Plane) -> Option<PlaneLayout> {
        if self.backing.is_unallocated() {
            return None;
        }

        match plane {
            Plane::Y | Plane::U | Plane::V => Some(self.planes[plane as usize]),
            Plane::Alpha => self.alpha,
        }
    }

    /// Returns a read-only view of `plane`, borders included.
    pub fn plane<'a, A: FrameAllocator + ?Sized>(
        &'a self,
        allocator: &'a A,
        plane: Plane,
    ) -> Option<PlaneRef<'a>> {
        let layout = self.plane_layout(plane)?;
        let data = allocator.storage(&self.backing).get(layout.region())?;

        Some(PlaneRef { layout, data })
    }

    /// Returns a writable view of `plane`, borders included.
    pub fn plane_mut<'a, A: FrameAllocator + ?Sized>(
        &'a mut self,
        allocator: &'a mut A,
        plane: Plane,
    ) -> Option<PlaneMut<'a>> {
        let layout = self.plane_layout(plane)?;
        let data = allocator
            .storage_mut(&mut self.backing)
            .get_mut(layout.region())?;

        Some(PlaneMut { layout, data })
    }
}

fn visible_row_range(layout: &PlaneLayout, y: usize) -> std::ops::Range<usize> {
    debug_assert!(y < layout.height, "row {} out of {}", y, layout.height);
    let start = (layout.border_h + y) * layout.stride + layout.border_w;
    start..start + layout.width
}

/// Read-only view of one plane. Row accessors address the coded area and skip the border.
#[derive(Copy, Clone, Debug)]
pub struct PlaneRef<'a> {
    layout: PlaneLayout,
    data: &'a [u8],
}

impl<'a> PlaneRef<'a> {
    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }

    /// The whole plane, borders included.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Coded samples of row `y`.
    pub fn row(&self, y: usize) -> &'a [u8] {
        let data = self.data;
        &data[visible_row_range(&self.layout, y)]
    }

    /// Iterates over the displayed part of every displayed row.
    pub fn visible_rows(&self) -> impl Iterator<Item = &'a [u8]> + '_ {
        (0..self.layout.crop_height).map(move |y| &self.row(y)[..self.layout.crop_width])
    }
}

/// Writable view of one plane.
#[derive(Debug)]
pub struct PlaneMut<'a> {
    layout: PlaneLayout,
    data: &'a mut [u8],
}

impl<'a> PlaneMut<'a> {
    pub fn layout(&self) -> &PlaneLayout {
        &self.layout
    }

    pub fn data(&self) -> &[u8] {
        &*self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[visible_row_range(&self.layout, y)]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u8] {
        &mut self.data[visible_row_range(&self.layout, y)]
    }
}

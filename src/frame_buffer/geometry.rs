// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Memory layout of a bordered, planar YUV(A) frame.
//!
//! All sizes and offsets are in bytes (one byte per sample) and relative to the start of the
//! frame's backing storage. The layout is laid out as the luma plane, followed by the two chroma
//! planes and, if requested, an alpha plane. Every plane is surrounded by a border that in-loop
//! filters and motion compensation are allowed to read from.

use std::ops::Range;

use crate::frame_buffer::FrameBufferError;
use crate::frame_buffer::FrameParams;
use crate::frame_buffer::Plane;
use crate::frame_buffer::Result;
use crate::utils::align_up;

/// Borders must be a multiple of this many pixels. This keeps the start of the chroma rows
/// 16-byte aligned without introducing gaps between planes.
pub const BORDER_ALIGNMENT: u32 = 32;

/// Alignment of the luma stride, in bytes.
pub const STRIDE_ALIGNMENT: usize = 32;

/// Granularity the coded dimensions are rounded up to.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DimAlign {
    /// Round to 8 pixels, the mode-info unit.
    #[default]
    Eight,
    /// Round to 16 pixels, used by the legacy single reference plane layout.
    Sixteen,
}

impl DimAlign {
    pub const fn pixels(self) -> usize {
        match self {
            DimAlign::Eight => 8,
            DimAlign::Sixteen => 16,
        }
    }
}

/// Position and extent of one plane inside the backing storage of a frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Offset of the first visible sample.
    pub offset: usize,
    /// Distance between two consecutive rows.
    pub stride: usize,
    /// Coded width, i.e. rounded up to the dimension alignment.
    pub width: usize,
    /// Coded height, i.e. rounded up to the dimension alignment.
    pub height: usize,
    /// Displayed width.
    pub crop_width: usize,
    /// Displayed height.
    pub crop_height: usize,
    /// Number of border columns on each side.
    pub border_w: usize,
    /// Number of border rows above and below.
    pub border_h: usize,
}

impl PlaneLayout {
    /// Size of the plane, borders included.
    pub fn size(&self) -> usize {
        (self.height + 2 * self.border_h) * self.stride
    }

    /// Byte range covered by the plane, borders included.
    pub fn region(&self) -> Range<usize> {
        let start = self.offset - self.border_h * self.stride - self.border_w;
        start..start + self.size()
    }
}

/// Dimensions, strides and plane sizes of a frame.
///
/// The chroma planes always use the luma stride shifted by the horizontal subsampling factor.
/// Several reconstruction and filtering routines rely on this relationship, so it is not
/// configurable.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameGeometry {
    pub crop_width: usize,
    pub crop_height: usize,
    pub aligned_width: usize,
    pub aligned_height: usize,
    pub border: usize,
    pub ss_x: u32,
    pub ss_y: u32,

    pub y_stride: usize,
    pub y_plane_size: usize,

    pub uv_crop_width: usize,
    pub uv_crop_height: usize,
    pub uv_width: usize,
    pub uv_height: usize,
    pub uv_stride: usize,
    pub uv_border_w: usize,
    pub uv_border_h: usize,
    pub uv_plane_size: usize,

    /// Zero unless the alpha plane is enabled.
    pub alpha_plane_size: usize,

    /// Total number of bytes needed to store all the planes.
    pub frame_size: usize,
}

impl FrameGeometry {
    /// Computes the layout of a frame described by `params`.
    ///
    /// Only the subsampling and the border are validated. Dimensions are used as given and the
    /// arithmetic is not checked for overflow.
    pub fn compute(params: &FrameParams) -> Result<Self> {
        if params.ss_x > 1 || params.ss_y > 1 {
            return Err(FrameBufferError::InvalidArgument(
                "chroma subsampling must be 0 or 1 on each axis",
            ));
        }

        if params.border % BORDER_ALIGNMENT != 0 {
            return Err(FrameBufferError::UnsupportedAlignment(params.border));
        }

        let width = params.resolution.width as usize;
        let height = params.resolution.height as usize;
        let border = params.border as usize;
        let (ss_x, ss_y) = (params.ss_x, params.ss_y);

        let aligned_width = align_up(width, params.dim_align.pixels());
        let aligned_height = align_up(height, params.dim_align.pixels());
        let y_stride = align_up(aligned_width + 2 * border, STRIDE_ALIGNMENT);
        let y_plane_size = (aligned_height + 2 * border) * y_stride;

        let uv_width = aligned_width >> ss_x;
        let uv_height = aligned_height >> ss_y;
        let uv_stride = y_stride >> ss_x;
        let uv_border_w = border >> ss_x;
        let uv_border_h = border >> ss_y;
        let uv_plane_size = (uv_height + 2 * uv_border_h) * uv_stride;

        let alpha_plane_size = if params.alpha {
            (aligned_height + 2 * border) * y_stride
        } else {
            0
        };

        Ok(Self {
            crop_width: width,
            crop_height: height,
            aligned_width,
            aligned_height,
            border,
            ss_x,
            ss_y,
            y_stride,
            y_plane_size,
            uv_crop_width: (width + ss_x as usize) >> ss_x,
            uv_crop_height: (height + ss_y as usize) >> ss_y,
            uv_width,
            uv_height,
            uv_stride,
            uv_border_w,
            uv_border_h,
            uv_plane_size,
            alpha_plane_size,
            frame_size: y_plane_size + 2 * uv_plane_size + alpha_plane_size,
        })
    }

    pub fn has_alpha(&self) -> bool {
        self.alpha_plane_size != 0
    }

    /// Returns the layout of `plane`, or `None` for the alpha plane of a frame without one.
    pub fn plane(&self, plane: Plane) -> Option<PlaneLayout> {
        let border = self.border;

        let layout = match plane {
            Plane::Y => PlaneLayout {
                offset: border * self.y_stride + border,
                stride: self.y_stride,
                width: self.aligned_width,
                height: self.aligned_height,
                crop_width: self.crop_width,
                crop_height: self.crop_height,
                border_w: border,
                border_h: border,
            },
            Plane::U | Plane::V => {
                let base = match plane {
                    Plane::U => self.y_plane_size,
                    _ => self.y_plane_size + self.uv_plane_size,
                };

                PlaneLayout {
                    offset: base + self.uv_border_h * self.uv_stride + self.uv_border_w,
                    stride: self.uv_stride,
                    width: self.uv_width,
                    height: self.uv_height,
                    crop_width: self.uv_crop_width,
                    crop_height: self.uv_crop_height,
                    border_w: self.uv_border_w,
                    border_h: self.uv_border_h,
                }
            }
            Plane::Alpha if self.has_alpha() => PlaneLayout {
                offset: self.y_plane_size
                    + 2 * self.uv_plane_size
                    + border * self.y_stride
                    + border,
                stride: self.y_stride,
                width: self.aligned_width,
                height: self.aligned_height,
                crop_width: self.crop_width,
                crop_height: self.crop_height,
                border_w: border,
                border_h: border,
            },
            Plane::Alpha => return None,
        };

        Some(layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Resolution;

    fn params(width: u32, height: u32, border: u32) -> FrameParams {
        FrameParams {
            resolution: Resolution { width, height },
            border,
            ..Default::default()
        }
    }

    #[test]
    fn test_geometry_420() {
        let geometry = FrameGeometry::compute(&params(352, 288, 160)).unwrap();

        assert_eq!(geometry.aligned_width, 352);
        assert_eq!(geometry.aligned_height, 288);
        assert_eq!(geometry.y_stride, 672);
        assert_eq!(geometry.y_plane_size, (288 + 320) * 672);
        assert_eq!(geometry.uv_width, 176);
        assert_eq!(geometry.uv_height, 144);
        assert_eq!(geometry.uv_stride, 336);
        assert_eq!(geometry.uv_border_w, 80);
        assert_eq!(geometry.uv_border_h, 80);
        assert_eq!(geometry.uv_plane_size, (144 + 160) * 336);
        assert_eq!(geometry.alpha_plane_size, 0);
        assert_eq!(
            geometry.frame_size,
            geometry.y_plane_size + 2 * geometry.uv_plane_size
        );
    }

    #[test]
    fn test_geometry_odd_dimensions() {
        let geometry = FrameGeometry::compute(&params(101, 57, 32)).unwrap();

        assert_eq!(geometry.crop_width, 101);
        assert_eq!(geometry.crop_height, 57);
        assert_eq!(geometry.aligned_width, 104);
        assert_eq!(geometry.aligned_height, 64);
        // 104 + 64 = 168, rounded up to 32.
        assert_eq!(geometry.y_stride, 192);
        assert_eq!(geometry.uv_crop_width, 51);
        assert_eq!(geometry.uv_crop_height, 29);
    }

    #[test]
    fn test_geometry_legacy_alignment() {
        let geometry = FrameGeometry::compute(&FrameParams {
            dim_align: DimAlign::Sixteen,
            ..params(101, 57, 32)
        })
        .unwrap();

        assert_eq!(geometry.aligned_width, 112);
        assert_eq!(geometry.aligned_height, 64);
        assert_eq!(geometry.y_stride, 192);
    }

    #[test]
    fn test_geometry_444_with_alpha() {
        let geometry = FrameGeometry::compute(&FrameParams {
            ss_x: 0,
            ss_y: 0,
            alpha: true,
            ..params(64, 64, 32)
        })
        .unwrap();

        assert_eq!(geometry.uv_stride, geometry.y_stride);
        assert_eq!(geometry.uv_plane_size, geometry.y_plane_size);
        assert_eq!(geometry.alpha_plane_size, geometry.y_plane_size);
        assert_eq!(geometry.frame_size, 4 * geometry.y_plane_size);
    }

    #[test]
    fn test_unaligned_border() {
        for border in [1, 16, 31, 33, 100, 161] {
            assert!(matches!(
                FrameGeometry::compute(&params(64, 64, border)),
                Err(FrameBufferError::UnsupportedAlignment(b)) if b == border
            ));
        }
    }

    #[test]
    fn test_unsupported_subsampling() {
        for (ss_x, ss_y) in [(2, 1), (1, 2), (64, 0), (0, u32::MAX)] {
            assert!(matches!(
                FrameGeometry::compute(&FrameParams {
                    ss_x,
                    ss_y,
                    ..params(64, 64, 32)
                }),
                Err(FrameBufferError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn test_plane_layouts() {
        let geometry = FrameGeometry::compute(&FrameParams {
            alpha: true,
            ..params(64, 48, 32)
        })
        .unwrap();

        let y = geometry.plane(Plane::Y).unwrap();
        let u = geometry.plane(Plane::U).unwrap();
        let v = geometry.plane(Plane::V).unwrap();
        let a = geometry.plane(Plane::Alpha).unwrap();

        assert_eq!(y.offset, 32 * geometry.y_stride + 32);
        assert_eq!(y.region(), 0..geometry.y_plane_size);
        assert_eq!(u.region().start, geometry.y_plane_size);
        assert_eq!(v.region().start, u.region().end);
        assert_eq!(a.region().start, v.region().end);
        assert_eq!(a.region().end, geometry.frame_size);
        assert_eq!(u.offset % 16, 0);
        assert_eq!(v.offset % 16, 0);
    }

    #[test]
    fn test_no_alpha_plane() {
        let geometry = FrameGeometry::compute(&params(64, 48, 32)).unwrap();
        assert!(!geometry.has_alpha());
        assert_eq!(geometry.plane(Plane::Alpha), None);
    }
}

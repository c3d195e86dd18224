// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reconstruction support for a VP9 decoder.
//!
//! This crate provides the two pieces the block reconstruction stage builds upon:
//!
//! * [`frame_buffer`], bordered planar frames and the strategies used to allocate their storage
//!   (system memory, client-provided memory, or slots of an accelerator pool).
//! * [`mv_pred`], the selection of the nearest and near motion vector predictors from the ranked
//!   candidates of a block or sub-block.

pub mod frame_buffer;
pub mod mv_pred;
pub mod utils;

pub use crate::frame_buffer::FrameBuffer;
pub use crate::frame_buffer::FrameBufferError;
pub use crate::frame_buffer::FrameParams;
pub use crate::frame_buffer::Plane;
pub use crate::mv_pred::MotionVector;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}

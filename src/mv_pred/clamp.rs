// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Clamping of motion vector predictors to the readable area around a block.

use crate::frame_buffer::BORDER_IN_PIXELS;
use crate::mv_pred::MotionVector;
use crate::mv_pred::MvRefContext;

/// Size of a mode info unit, in pixels.
pub const MI_SIZE: i32 = 8;

/// Extra pixels the sub-pixel interpolation filters read past the reference block.
pub const INTERP_EXTEND: i32 = 4;

/// How far, in 1/8 pel, a predictor may point past the frame edge.
pub const MV_BORDER: i32 = (BORDER_IN_PIXELS as i32 - INTERP_EXTEND) << 3;

/// Distance from a block to each edge of the frame, in 1/8 pel.
///
/// `to_left` and `to_top` are zero or negative, `to_right` and `to_bottom` zero or positive for
/// blocks inside the frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockEdges {
    pub to_left: i32,
    pub to_right: i32,
    pub to_top: i32,
    pub to_bottom: i32,
}

impl BlockEdges {
    /// Edges of the block at (`mi_row`, `mi_col`) spanning `bh` x `bw` mode info units, in a
    /// frame of `mi_rows` x `mi_cols` units.
    pub fn new(mi_row: i32, mi_col: i32, bh: i32, bw: i32, mi_rows: i32, mi_cols: i32) -> Self {
        let to_pel = |units: i32| units * MI_SIZE * 8;

        Self {
            to_left: -to_pel(mi_col),
            to_right: to_pel(mi_cols - bw - mi_col),
            to_top: -to_pel(mi_row),
            to_bottom: to_pel(mi_rows - bh - mi_row),
        }
    }
}

fn clamp_component(value: i16, min: i32, max: i32) -> i16 {
    let clamped = i32::from(value).clamp(min, max.max(min));
    // The result lies between `value` and one of the bounds it was moved to, and `value` fits.
    i16::try_from(clamped).unwrap_or(if clamped < 0 { i16::MIN } else { i16::MAX })
}

impl MvRefContext for BlockEdges {
    fn clamp_mv(&self, mv: MotionVector) -> MotionVector {
        MotionVector {
            row: clamp_component(
                mv.row,
                self.to_top - MV_BORDER,
                self.to_bottom + MV_BORDER,
            ),
            col: clamp_component(
                mv.col,
                self.to_left - MV_BORDER,
                self.to_right + MV_BORDER,
            ),
        }
    }
}

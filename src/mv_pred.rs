// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Selection of the nearest and near motion vector predictors.
//!
//! The neighbour scan producing the ranked candidate list lives with the rest of the mode info
//! decoding and is reached through [`MvRefScanner`]. This module only turns the two ranked
//! candidates into the predictors used to code the motion vector of a block, or of one of the
//! four 4x4 sub-blocks of a split 8x8 block.

pub mod clamp;

use enumn::N;

pub use crate::mv_pred::clamp::BlockEdges;

/// Number of ranked candidates produced by the neighbour scan.
pub const MAX_MV_REF_CANDIDATES: usize = 2;

/// Vectors whose magnitude reaches this many full pixels on either axis are coded at quarter-pel
/// precision even when high precision is allowed.
pub const COMPANDED_MVREF_THRESH: u16 = 8;

/// A motion vector in 1/8 pel units.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct MotionVector {
    pub row: i16,
    pub col: i16,
}

impl MotionVector {
    pub const ZERO: Self = Self { row: 0, col: 0 };

    pub const fn new(row: i16, col: i16) -> Self {
        Self { row, col }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Whether the vector is short enough for 1/8 pel precision to be used.
    pub fn is_hp_usable(&self) -> bool {
        (self.row.unsigned_abs() >> 3) < COMPANDED_MVREF_THRESH
            && (self.col.unsigned_abs() >> 3) < COMPANDED_MVREF_THRESH
    }

    /// Moves every odd component one step toward zero.
    pub fn to_quarter_pel(self) -> Self {
        fn lower(v: i16) -> i16 {
            if v & 1 == 0 {
                v
            } else if v > 0 {
                v - 1
            } else {
                v + 1
            }
        }

        Self {
            row: lower(self.row),
            col: lower(self.col),
        }
    }
}

/// The two ranked candidates for a block and reference frame, best first.
pub type CandidateList = [MotionVector; MAX_MV_REF_CANDIDATES];

/// Per-block hooks the selector needs from the decoder.
pub trait MvRefContext {
    /// Restricts `mv` so that the reference block stays within the area the decoder can read.
    fn clamp_mv(&self, mv: MotionVector) -> MotionVector;

    /// Whether `mv` is allowed to keep its 1/8 pel precision.
    fn use_mv_hp(&self, mv: &MotionVector) -> bool {
        mv.is_hp_usable()
    }
}

/// Plain closures act as a clamp with the default precision rule.
impl<F: Fn(MotionVector) -> MotionVector> MvRefContext for F {
    fn clamp_mv(&self, mv: MotionVector) -> MotionVector {
        self(mv)
    }
}

/// Lowers `mv` to quarter-pel unless high precision is allowed for the frame and usable for this
/// vector.
pub fn lower_mv_precision<C: MvRefContext + ?Sized>(
    ctx: &C,
    mv: MotionVector,
    allow_hp: bool,
) -> MotionVector {
    if allow_hp && ctx.use_mv_hp(&mv) {
        mv
    } else {
        mv.to_quarter_pel()
    }
}

/// Reference frame slot of a compound-predicted block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, N)]
#[repr(u8)]
pub enum RefDirection {
    First = 0,
    Second = 1,
}

/// Position of a 4x4 sub-block inside its 8x8 block, in decoding order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, N)]
#[repr(u8)]
pub enum SubBlockIndex {
    TopLeft = 0,
    TopRight = 1,
    BottomLeft = 2,
    BottomRight = 3,
}

impl SubBlockIndex {
    /// Converts a raw block index coming from the mode info decoder.
    ///
    /// Panics if `index` is not in `0..4`.
    pub fn from_raw(index: usize) -> Self {
        u8::try_from(index)
            .ok()
            .and_then(Self::n)
            .unwrap_or_else(|| panic!("sub-block index {} out of range", index))
    }
}

/// The predictors for one block and reference frame.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MvPair {
    pub nearest: MotionVector,
    pub near: MotionVector,
}

/// Motion vectors already decoded for the sub-blocks of the current 8x8 block.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubBlockMvs([[MotionVector; 2]; 4]);

impl SubBlockMvs {
    pub fn get(&self, block: SubBlockIndex, dir: RefDirection) -> MotionVector {
        self.0[block as usize][dir as usize]
    }

    pub fn set(&mut self, block: SubBlockIndex, dir: RefDirection, mv: MotionVector) {
        self.0[block as usize][dir as usize] = mv;
    }
}

/// Source of ranked candidates for the block being decoded.
pub trait MvRefScanner {
    /// Scans the neighbours of the current block, or of sub-block `block` of it, for candidates
    /// predicting reference `dir`.
    fn find_mv_refs(&mut self, dir: RefDirection, block: Option<SubBlockIndex>)
        -> CandidateList;
}

/// Derives the predictors of a whole block from its ranked candidates.
///
/// Every candidate has its precision lowered first, then gets clamped.
pub fn find_best_ref_mvs<C: MvRefContext + ?Sized>(
    ctx: &C,
    allow_hp: bool,
    candidates: &CandidateList,
) -> MvPair {
    let [nearest, near] =
        candidates.map(|mv| ctx.clamp_mv(lower_mv_precision(ctx, mv, allow_hp)));

    log::trace!("nearest {:?}, near {:?}", nearest, near);

    MvPair { nearest, near }
}

/// Derives the predictors of sub-block `block` for reference `dir`.
///
/// `siblings` must hold the vectors of every sub-block decoded before `block`. The candidates are
/// used as produced by the scan; the vectors of the earlier sub-blocks take precedence over them,
/// and `near` is always a vector different from `nearest`, or zero if there is none.
pub fn resolve_sub_block(
    block: SubBlockIndex,
    dir: RefDirection,
    candidates: &CandidateList,
    siblings: &SubBlockMvs,
) -> MvPair {
    let first_different = |nearest: MotionVector, list: &[MotionVector]| {
        list.iter()
            .copied()
            .find(|&mv| mv != nearest)
            .unwrap_or(MotionVector::ZERO)
    };

    match block {
        SubBlockIndex::TopLeft => MvPair {
            nearest: candidates[0],
            near: candidates[1],
        },
        SubBlockIndex::TopRight | SubBlockIndex::BottomLeft => {
            let nearest = siblings.get(SubBlockIndex::TopLeft, dir);
            MvPair {
                nearest,
                near: first_different(nearest, candidates),
            }
        }
        SubBlockIndex::BottomRight => {
            let nearest = siblings.get(SubBlockIndex::BottomLeft, dir);
            let list = [
                siblings.get(SubBlockIndex::TopRight, dir),
                siblings.get(SubBlockIndex::TopLeft, dir),
                candidates[0],
                candidates[1],
            ];
            MvPair {
                nearest,
                near: first_different(nearest, &list),
            }
        }
    }
}

/// Scans the candidates of sub-block `block` and derives its predictors.
pub fn append_sub8x8_mvs_for_idx<S: MvRefScanner + ?Sized>(
    scanner: &mut S,
    block: SubBlockIndex,
    dir: RefDirection,
    siblings: &SubBlockMvs,
) -> MvPair {
    let candidates = scanner.find_mv_refs(dir, Some(block));
    let pair = resolve_sub_block(block, dir, &candidates, siblings);

    log::trace!("sub-block {:?} ({:?}): {:?}", block, dir, pair);

    pair
}

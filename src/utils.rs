// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility functions used by several parts of this crate.

/// Rounds `value` up to the next multiple of `alignment`, which must be a power of two.
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Returns the number of bytes to skip from the start of `data` to reach an address aligned to
/// `alignment`.
pub fn align_offset(data: &[u8], alignment: usize) -> usize {
    let addr = data.as_ptr() as usize;
    align_up(addr, alignment) - addr
}

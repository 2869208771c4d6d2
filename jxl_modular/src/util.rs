// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

mod log2;
#[cfg(test)]
pub mod test;
pub mod tracing_wrappers;

pub use log2::*;

/// Maps a zig-zag coded value back to a signed integer: 0, 1, 2, 3, 4 -> 0, -1, 1, -2, 2.
#[inline]
pub fn unpack_signed(u: u32) -> i32 {
    ((u >> 1) as i32) ^ (-((u & 1) as i32))
}

#[cfg(test)]
mod tests {
    use super::unpack_signed;
    use test_log::test;

    #[test]
    fn unpack_signed_small() {
        let unpacked: Vec<_> = (0..7).map(unpack_signed).collect();
        assert_eq!(unpacked, vec![0, -1, 1, -2, 2, -3, 3]);
    }

    #[test]
    fn unpack_signed_extremes() {
        assert_eq!(unpack_signed(u32::MAX), i32::MIN);
        assert_eq!(unpack_signed(u32::MAX - 1), i32::MAX);
    }
}

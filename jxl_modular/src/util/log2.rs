// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

pub trait FloorLog2 {
    /// Panics (in debug builds) on zero.
    fn floor_log2(&self) -> Self;
}

pub trait CeilLog2 {
    fn ceil_log2(&self) -> Self;
}

macro_rules! impl_log2 {
    ($($ty: ty),*) => {
        $(
            impl FloorLog2 for $ty {
                fn floor_log2(&self) -> Self {
                    debug_assert_ne!(*self, 0);
                    (<$ty>::BITS - 1 - self.leading_zeros()) as $ty
                }
            }

            impl CeilLog2 for $ty {
                fn ceil_log2(&self) -> Self {
                    if *self <= 1 {
                        0
                    } else {
                        (<$ty>::BITS - (*self - 1).leading_zeros()) as $ty
                    }
                }
            }
        )*
    };
}

impl_log2!(u32, u64, usize);

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use crate::{
    error::{Error, Result},
    util::tracing_wrappers::*,
};

mod private {
    pub trait Sealed {}
}

/// Types that can be stored in an [`Image`].
pub trait ImageDataType: private::Sealed + Copy + Default + Debug + PartialEq + 'static {
    const NAME: &'static str;
}

impl private::Sealed for i32 {}
impl ImageDataType for i32 {
    const NAME: &'static str = "i32";
}

impl private::Sealed for f32 {}
impl ImageDataType for f32 {
    const NAME: &'static str = "f32";
}

/// A plane of samples stored row after row. Either dimension may be zero.
pub struct Image<T: ImageDataType> {
    size: (usize, usize),
    data: Vec<T>,
}

impl<T: ImageDataType> Debug for Image<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}x{}", T::NAME, self.size.0, self.size.1)
    }
}

impl<T: ImageDataType> Image<T> {
    /// Allocates a zero-filled image, failing instead of aborting if memory runs out.
    pub fn new(size: (usize, usize)) -> Result<Image<T>> {
        let (xsize, ysize) = size;
        // Keeps every coordinate computation on samples within i64.
        let limit = i64::MAX as u64 / 4;
        if xsize as u64 >= limit || ysize as u64 >= limit {
            return Err(Error::ImageSizeTooLarge(xsize, ysize));
        }
        let len = xsize
            .checked_mul(ysize)
            .ok_or(Error::ImageSizeTooLarge(xsize, ysize))?;
        trace!(xsize, ysize, "allocating image");
        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, T::default());
        Ok(Image { size, data })
    }

    pub fn size(&self) -> (usize, usize) {
        self.size
    }

    pub fn row(&self, y: usize) -> &[T] {
        let width = self.size.0;
        &self.data[y * width..(y + 1) * width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let width = self.size.0;
        &mut self.data[y * width..(y + 1) * width]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    pub fn try_clone(&self) -> Result<Image<T>> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);
        Ok(Image {
            size: self.size,
            data,
        })
    }

    /// Copies all of `src` into this image, with its top-left corner at `origin`.
    pub fn paste(&mut self, origin: (usize, usize), src: &Image<T>) -> Result<()> {
        let (x0, y0) = origin;
        let (w, h) = src.size;
        let fits = |start: usize, len: usize, limit: usize| {
            start.checked_add(len).is_some_and(|end| end <= limit)
        };
        if !fits(x0, w, self.size.0) || !fits(y0, h, self.size.1) {
            return Err(Error::RectOutOfBounds(
                w,
                h,
                x0,
                y0,
                self.size.0,
                self.size.1,
            ));
        }
        for y in 0..h {
            self.row_mut(y0 + y)[x0..x0 + w].copy_from_slice(src.row(y));
        }
        Ok(())
    }
}

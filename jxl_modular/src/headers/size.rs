// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jxl_macros::UnconditionalCoder;
use num_derive::FromPrimitive;

use crate::headers::encodings::*;

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
enum AspectRatio {
    Unknown = 0,
    Ratio1Over1 = 1,
    Ratio12Over10 = 2,
    Ratio4Over3 = 3,
    Ratio3Over2 = 4,
    Ratio16Over9 = 5,
    Ratio5Over4 = 6,
    Ratio2Over1 = 7,
}

#[derive(UnconditionalCoder, Debug, Clone)]
pub struct Size {
    small: bool,
    #[condition(small)]
    #[coder(Bits(5) + 1)]
    ysize_div8: Option<u32>,
    #[condition(!small)]
    #[coder(1 + u2S(Bits(9), Bits(13), Bits(18), Bits(30)))]
    ysize: Option<u32>,
    #[coder(Bits(3))]
    #[default(AspectRatio::Unknown)]
    ratio: AspectRatio,
    #[condition(small && ratio == AspectRatio::Unknown)]
    #[coder(Bits(5) + 1)]
    xsize_div8: Option<u32>,
    #[condition(!small && ratio == AspectRatio::Unknown)]
    #[coder(1 + u2S(Bits(9), Bits(13), Bits(18), Bits(30)))]
    xsize: Option<u32>,
}

#[derive(UnconditionalCoder, Debug, Clone)]
pub struct Preview {
    div8: bool,
    #[condition(div8)]
    #[coder(u2S(16, 32, Bits(5) + 1, Bits(9) + 33))]
    ysize_div8: Option<u32>,
    #[condition(!div8)]
    #[coder(1 + u2S(Bits(6), Bits(8) + 64, Bits(10) + 320, Bits(12) + 1344))]
    ysize: Option<u32>,
    #[coder(Bits(3))]
    #[default(AspectRatio::Unknown)]
    ratio: AspectRatio,
    #[condition(div8 && ratio == AspectRatio::Unknown)]
    #[coder(u2S(16, 32, Bits(5) + 1, Bits(9) + 33))]
    xsize_div8: Option<u32>,
    #[condition(!div8 && ratio == AspectRatio::Unknown)]
    #[coder(1 + u2S(Bits(6), Bits(8) + 64, Bits(10) + 320, Bits(12) + 1344))]
    xsize: Option<u32>,
}

fn map_aspect_ratio(ysize: u32, ratio: AspectRatio) -> Option<u32> {
    let ysize = ysize as u64;
    let xsize = match ratio {
        AspectRatio::Unknown => return None,
        AspectRatio::Ratio1Over1 => ysize,
        AspectRatio::Ratio12Over10 => ysize * 12 / 10,
        AspectRatio::Ratio4Over3 => ysize * 4 / 3,
        AspectRatio::Ratio3Over2 => ysize * 3 / 2,
        AspectRatio::Ratio16Over9 => ysize * 16 / 9,
        AspectRatio::Ratio5Over4 => ysize * 5 / 4,
        AspectRatio::Ratio2Over1 => ysize * 2,
    };
    Some(xsize.min(u32::MAX as u64) as u32)
}

fn div8_or_plain(div8: Option<u32>, plain: Option<u32>) -> u32 {
    div8.map(|s| s * 8).or(plain).unwrap_or_default()
}

impl Size {
    pub fn ysize(&self) -> u32 {
        div8_or_plain(self.ysize_div8, self.ysize)
    }

    pub fn xsize(&self) -> u32 {
        map_aspect_ratio(self.ysize(), self.ratio)
            .unwrap_or_else(|| div8_or_plain(self.xsize_div8, self.xsize))
    }
}

impl Preview {
    pub fn ysize(&self) -> u32 {
        div8_or_plain(self.ysize_div8, self.ysize)
    }

    pub fn xsize(&self) -> u32 {
        map_aspect_ratio(self.ysize(), self.ratio)
            .unwrap_or_else(|| div8_or_plain(self.xsize_div8, self.xsize))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bit_reader::BitReader;
    use crate::headers::JxlHeader;
    use crate::util::test::BitWriter;
    use test_log::test;

    #[test]
    fn small_with_ratio() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(5, 3);
        w.write(3, 3);
        let data = w.finish();
        let size = Size::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!(size.ysize(), 32);
        assert_eq!(size.xsize(), 42);
    }

    #[test]
    fn explicit_size() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(2, 1);
        w.write(13, 2447);
        w.write(3, 0);
        w.write(2, 1);
        w.write(13, 3263);
        let data = w.finish();
        let size = Size::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!((size.xsize(), size.ysize()), (3264, 2448));
    }
}

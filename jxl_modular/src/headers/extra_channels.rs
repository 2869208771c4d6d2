// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::{Error, Result},
    headers::{bit_depth::BitDepth, encodings::*},
};
use jxl_macros::UnconditionalCoder;
use num_derive::FromPrimitive;

#[allow(clippy::upper_case_acronyms)]
#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive, Eq)]
pub enum ExtraChannel {
    Alpha,
    Depth,
    SpotColor,
    SelectionMask,
    Black,
    CFA,
    Thermal,
    Reserved0,
    Reserved1,
    Reserved2,
    Reserved3,
    Reserved4,
    Reserved5,
    Reserved6,
    Reserved7,
    Unknown,
    Optional,
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[validate]
pub struct ExtraChannelInfo {
    #[all_default]
    #[allow(dead_code)]
    all_default: bool,
    #[default(ExtraChannel::Alpha)]
    pub ec_type: ExtraChannel,
    #[default(BitDepth::default(&field_nonserialized))]
    bit_depth: BitDepth,
    #[coder(u2S(0, 3, 4, Bits(3) + 1))]
    #[default(0)]
    dim_shift: u32,
    pub name: String,
    #[condition(ec_type == ExtraChannel::Alpha)]
    #[default(false)]
    alpha_associated: bool,
    #[condition(ec_type == ExtraChannel::SpotColor)]
    pub spot_color: Option<[f32; 4]>,
    #[condition(ec_type == ExtraChannel::CFA)]
    #[coder(u2S(1, Bits(2), Bits(4) + 3, Bits(8) + 19))]
    pub cfa_channel: Option<u32>,
}

impl ExtraChannelInfo {
    pub fn dim_shift(&self) -> u32 {
        self.dim_shift
    }
    pub fn alpha_associated(&self) -> bool {
        self.alpha_associated
    }
    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }
    fn check(&self, _: &Empty) -> Result<()> {
        if self.dim_shift > 3 {
            Err(Error::DimShiftTooLarge(self.dim_shift))
        } else {
            Ok(())
        }
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
    fn default_is_8bit_alpha() {
        let data = [1u8];
        let info = ExtraChannelInfo::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!(info.ec_type, ExtraChannel::Alpha);
        assert_eq!(info.bit_depth(), BitDepth::integer_samples(8));
        assert_eq!(info.dim_shift(), 0);
        assert!(!info.alpha_associated());
    }

    #[test]
    fn depth_channel_with_own_bit_depth() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        // ec_type = Depth.
        w.write_enum(1);
        // 16-bit integer samples: not float, selector 3, Bits(6) + 1.
        w.write(1, 0);
        w.write(2, 3);
        w.write(6, 15);
        // dim_shift = 3.
        w.write(2, 1);
        // name = "d".
        w.write(2, 1);
        w.write(4, 1);
        w.write(8, b'd' as u64);
        let data = w.finish();
        let info = ExtraChannelInfo::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!(info.ec_type, ExtraChannel::Depth);
        assert_eq!(info.bit_depth().bits_per_sample(), 16);
        assert_eq!(info.dim_shift(), 3);
        assert_eq!(info.name, "d");
    }

    #[test]
    fn dim_shift_is_validated() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write_enum(0);
        w.write(1, 0);
        w.write(2, 0);
        // dim_shift = Bits(3) + 1 = 8.
        w.write(2, 3);
        w.write(3, 7);
        let data = w.finish();
        assert!(matches!(
            ExtraChannelInfo::read(&mut BitReader::new(&data)),
            Err(Error::DimShiftTooLarge(8))
        ));
    }
}

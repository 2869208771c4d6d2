// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt;

use crate::{
    error::{Error, Result},
    headers::encodings::*,
};
use jxl_macros::UnconditionalCoder;
use num_derive::FromPrimitive;

#[allow(clippy::upper_case_acronyms)]
#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum ColorSpace {
    RGB,
    Gray,
    XYB,
    Unknown,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum WhitePoint {
    D65 = 1,
    Custom = 2,
    E = 10,
    DCI = 11,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum Primaries {
    SRGB = 1,
    Custom = 2,
    BT2100 = 9,
    P3 = 11,
}

#[allow(clippy::upper_case_acronyms)]
#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum TransferFunction {
    BT709 = 1,
    Unknown = 2,
    Linear = 8,
    SRGB = 13,
    PQ = 16,
    DCI = 17,
    HLG = 18,
}

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum RenderingIntent {
    Perceptual = 0,
    Relative,
    Saturation,
    Absolute,
}

/// Chromaticity coordinates, scaled by 10^6.
#[derive(UnconditionalCoder, Debug, Clone)]
pub struct CustomXY {
    #[coder(u2S(Bits(19), Bits(19) + 524288, Bits(20) + 1048576, Bits(21) + 2097152))]
    pub x: i32,
    #[coder(u2S(Bits(19), Bits(19) + 524288, Bits(20) + 1048576, Bits(21) + 2097152))]
    pub y: i32,
}

pub struct CustomTransferFunctionNonserialized {
    color_space: ColorSpace,
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[nonserialized(CustomTransferFunctionNonserialized)]
#[validate]
pub struct CustomTransferFunction {
    #[condition(nonserialized.color_space != ColorSpace::XYB)]
    #[default(false)]
    pub have_gamma: bool,
    #[condition(have_gamma)]
    #[default(3333333)] // XYB gamma
    #[coder(Bits(24))]
    pub gamma: u32,
    #[condition(!have_gamma && nonserialized.color_space != ColorSpace::XYB)]
    #[default(TransferFunction::SRGB)]
    pub transfer_function: TransferFunction,
}

impl CustomTransferFunction {
    /// Gamma exponent, only meaningful if `have_gamma` is set.
    pub fn gamma(&self) -> f32 {
        self.gamma as f32 * 0.0000001
    }

    pub fn check(&self, _: &CustomTransferFunctionNonserialized) -> Result<()> {
        if self.have_gamma {
            let gamma = self.gamma();
            if gamma > 1.0 || gamma * 8192.0 < 1.0 {
                return Err(Error::InvalidGamma(gamma));
            }
        }
        Ok(())
    }
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[validate]
pub struct ColorEncoding {
    #[all_default]
    #[allow(dead_code)]
    all_default: bool,
    #[default(false)]
    pub want_icc: bool,
    #[default(ColorSpace::RGB)]
    pub color_space: ColorSpace,
    #[condition(!want_icc && color_space != ColorSpace::XYB)]
    #[default(WhitePoint::D65)]
    pub white_point: WhitePoint,
    #[condition(white_point == WhitePoint::Custom)]
    #[default(CustomXY::default(&field_nonserialized))]
    pub white: CustomXY,
    #[condition(!want_icc && color_space != ColorSpace::XYB && color_space != ColorSpace::Gray)]
    #[default(Primaries::SRGB)]
    pub primaries: Primaries,
    #[condition(primaries == Primaries::Custom)]
    #[default([CustomXY::default(&field_nonserialized), CustomXY::default(&field_nonserialized), CustomXY::default(&field_nonserialized)])]
    pub custom_primaries: [CustomXY; 3],
    #[condition(!want_icc)]
    #[default(CustomTransferFunction::default(&field_nonserialized))]
    #[nonserialized(color_space: color_space)]
    pub tf: CustomTransferFunction,
    #[condition(!want_icc)]
    #[default(RenderingIntent::Relative)]
    pub rendering_intent: RenderingIntent,
}

impl ColorEncoding {
    pub fn check(&self, _: &Empty) -> Result<()> {
        if !self.want_icc
            && (self.color_space == ColorSpace::Unknown
                || self.tf.transfer_function == TransferFunction::Unknown)
        {
            Err(Error::InvalidColorEncoding)
        } else {
            Ok(())
        }
    }

    /// Number of color channels of the image, not counting extra channels.
    pub fn num_color_channels(&self) -> usize {
        if self.color_space == ColorSpace::Gray {
            1
        } else {
            3
        }
    }
}

impl fmt::Display for ColorEncoding {
    /// Short description such as `RGB D65 SRGB/SRGB`, or `ICC` when an ICC profile is
    /// embedded instead.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.want_icc {
            return write!(f, "ICC");
        }
        write!(f, "{:?}", self.color_space)?;
        if self.color_space == ColorSpace::XYB {
            return Ok(());
        }
        write!(f, " {:?}", self.white_point)?;
        if self.color_space != ColorSpace::Gray {
            write!(f, " {:?}", self.primaries)?;
        }
        if self.tf.have_gamma {
            write!(f, " gamma {:.3}", self.tf.gamma())
        } else {
            write!(f, "/{:?}", self.tf.transfer_function)
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
    fn all_default_is_srgb() {
        let data = [1u8];
        let encoding = ColorEncoding::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!(encoding.color_space, ColorSpace::RGB);
        assert_eq!(encoding.primaries, Primaries::SRGB);
        assert_eq!(encoding.tf.transfer_function, TransferFunction::SRGB);
        assert_eq!(encoding.num_color_channels(), 3);
        assert_eq!(encoding.to_string(), "RGB D65 SRGB/SRGB");
    }

    #[test]
    fn gray_with_gamma() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        // want_icc
        w.write(1, 0);
        w.write_enum(ColorSpace::Gray as u32);
        w.write_enum(WhitePoint::D65 as u32);
        // have_gamma, gamma = 1 / 2.2
        w.write(1, 1);
        w.write(24, 4545455);
        w.write_enum(RenderingIntent::Perceptual as u32);
        let data = w.finish();
        let encoding = ColorEncoding::read(&mut BitReader::new(&data)).unwrap();
        assert_eq!(encoding.num_color_channels(), 1);
        assert!(encoding.tf.have_gamma);
        assert!((encoding.tf.gamma() - 0.4545455).abs() < 1e-6);
        assert_eq!(encoding.rendering_intent, RenderingIntent::Perceptual);
        assert_eq!(encoding.to_string(), "Gray D65 gamma 0.455");
    }

    #[test]
    fn invalid_gamma() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(1, 0);
        w.write_enum(ColorSpace::Gray as u32);
        w.write_enum(WhitePoint::D65 as u32);
        w.write(1, 1);
        w.write(24, 1);
        let data = w.finish();
        assert!(matches!(
            ColorEncoding::read(&mut BitReader::new(&data)),
            Err(Error::InvalidGamma(_))
        ));
    }
}

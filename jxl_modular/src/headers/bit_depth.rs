// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jxl_macros::UnconditionalCoder;

use crate::error::{Error, Result};
use crate::headers::encodings::*;

#[derive(UnconditionalCoder, Debug, Clone, Copy, PartialEq)]
#[validate]
pub struct BitDepth {
    #[default(false)]
    floating_point_sample: bool,
    #[select_coder(floating_point_sample)]
    #[coder_true(u2S(32, 16, 24, Bits(6)+1))]
    #[coder_false(u2S(8, 10, 12, Bits(6)+1))]
    #[default(8)]
    bits_per_sample: u32,
    #[condition(floating_point_sample)]
    #[default(0)]
    #[coder(Bits(4)+1)]
    exponent_bits_per_sample: u32,
}

impl BitDepth {
    pub fn integer_samples(bits_per_sample: u32) -> BitDepth {
        BitDepth {
            floating_point_sample: false,
            bits_per_sample,
            exponent_bits_per_sample: 0,
        }
    }

    pub fn f32() -> BitDepth {
        BitDepth {
            floating_point_sample: true,
            bits_per_sample: 32,
            exponent_bits_per_sample: 8,
        }
    }

    pub fn floating_point_sample(&self) -> bool {
        self.floating_point_sample
    }

    pub fn bits_per_sample(&self) -> u32 {
        self.bits_per_sample
    }

    /// Zero for integer samples.
    pub fn exponent_bits_per_sample(&self) -> u32 {
        self.exponent_bits_per_sample
    }

    fn check(&self, _: &Empty) -> Result<()> {
        if !self.floating_point_sample {
            return match self.bits_per_sample {
                0..=31 => Ok(()),
                bits => Err(Error::InvalidBitsPerSample(bits)),
            };
        }
        let exponent = self.exponent_bits_per_sample;
        if !(2..=8).contains(&exponent) {
            return Err(Error::InvalidExponent(exponent));
        }
        // Floats are stored as sign, exponent and mantissa.
        let mantissa = self.bits_per_sample as i32 - exponent as i32 - 1;
        if !(2..=23).contains(&mantissa) {
            return Err(Error::InvalidMantissa(mantissa));
        }
        Ok(())
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
    fn half_float() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(2, 1);
        w.write(4, 4);
        let data = w.finish();
        let bit_depth = BitDepth::read(&mut BitReader::new(&data)).unwrap();
        assert!(bit_depth.floating_point_sample());
        assert_eq!(bit_depth.bits_per_sample(), 16);
        assert_eq!(bit_depth.exponent_bits_per_sample(), 5);
    }

    #[test]
    fn too_many_integer_bits() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(2, 3);
        w.write(6, 31);
        let data = w.finish();
        assert!(matches!(
            BitDepth::read(&mut BitReader::new(&data)),
            Err(Error::InvalidBitsPerSample(32))
        ));
    }
}

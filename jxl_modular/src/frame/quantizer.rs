// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::encodings::{Empty, UnconditionalCoder},
};

/// Dequantization factors of the XYB channels, in X, Y, B order. Modular frames use them to
/// scale integer XYB samples back to floats.
#[derive(Debug, Clone, PartialEq)]
pub struct LfQuantFactors {
    pub quant_factors: [f32; 3],
}

impl Default for LfQuantFactors {
    fn default() -> Self {
        LfQuantFactors {
            quant_factors: [1.0 / 4096.0, 1.0 / 512.0, 1.0 / 256.0],
        }
    }
}

impl LfQuantFactors {
    pub fn new(br: &mut BitReader) -> Result<LfQuantFactors> {
        if br.read(1)? == 1 {
            return Ok(LfQuantFactors::default());
        }
        let mut quant_factors = [0.0f32; 3];
        for qf in quant_factors.iter_mut() {
            *qf = f32::read_unconditional(&(), br, &Empty {})? / 128.0;
            if *qf < 1e-8 {
                return Err(Error::LfQuantFactorTooSmall(*qf));
            }
        }
        Ok(LfQuantFactors { quant_factors })
    }
}

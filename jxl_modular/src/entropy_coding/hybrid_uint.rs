// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    util::CeilLog2,
};

/// Splits decoded tokens into a value: tokens below `1 << split_exponent` are literal values,
/// larger ones carry the position of the leading one plus `msb_in_token` bits after it and
/// `lsb_in_token` low bits; the remaining middle bits are read raw from the bitstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridUintConfig {
    split_exponent: u32,
    msb_in_token: u32,
    lsb_in_token: u32,
}

impl HybridUintConfig {
    pub fn new(split_exponent: u32, msb_in_token: u32, lsb_in_token: u32) -> Result<Self> {
        if msb_in_token + lsb_in_token > split_exponent {
            return Err(Error::InvalidUintConfig(
                split_exponent,
                msb_in_token,
                Some(lsb_in_token),
            ));
        }
        Ok(HybridUintConfig {
            split_exponent,
            msb_in_token,
            lsb_in_token,
        })
    }

    /// Reads a configuration for an alphabet of `1 << log_alpha_size` tokens.
    pub fn read(log_alpha_size: usize, br: &mut BitReader) -> Result<Self> {
        let split_exponent = br.read((log_alpha_size + 1).ceil_log2())? as u32;
        if split_exponent == log_alpha_size as u32 {
            return Self::new(split_exponent, 0, 0);
        }
        let msb_in_token = br.read((split_exponent + 1).ceil_log2() as usize)? as u32;
        if msb_in_token > split_exponent {
            return Err(Error::InvalidUintConfig(split_exponent, msb_in_token, None));
        }
        let lsb_bits = (split_exponent - msb_in_token + 1).ceil_log2() as usize;
        let lsb_in_token = br.read(lsb_bits)? as u32;
        Self::new(split_exponent, msb_in_token, lsb_in_token)
    }

    /// Turns `token` into a value, reading the raw middle bits from `br` if needed.
    pub fn value(&self, token: u32, br: &mut BitReader) -> Result<u32> {
        let split = 1 << self.split_exponent;
        if token < split {
            return Ok(token);
        }
        let in_token = self.msb_in_token + self.lsb_in_token;
        let nbits = self.split_exponent - in_token + ((token - split) >> in_token);
        // Values are limited to 32 bits.
        if nbits > 31 {
            return Err(Error::IntegerTooLarge(nbits));
        }
        let lsb = token & ((1 << self.lsb_in_token) - 1);
        let msb = (token >> self.lsb_in_token) & ((1 << self.msb_in_token) - 1);
        let leading = (1 << self.msb_in_token) | msb;
        let middle = br.read(nbits as usize)? as u32;
        Ok((((leading << nbits) | middle) << self.lsb_in_token) | lsb)
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jxl_macros::UnconditionalCoder;

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::encodings::*,
    util::tracing_wrappers::*,
};

use super::hybrid_uint::HybridUintConfig;

const WINDOW_SIZE: usize = 1 << 20;
const NUM_SPECIAL_DISTANCES: u32 = 120;

/// (dx, dy) offsets of the short distance codes, for distances relative to the row width.
#[rustfmt::skip]
const SPECIAL_DISTANCES: [(i8, u8); NUM_SPECIAL_DISTANCES as usize] = [
    ( 0, 1), ( 1, 0), ( 1, 1), (-1, 1), ( 0, 2), ( 2, 0), ( 1, 2), (-1, 2), ( 2, 1), (-2, 1),
    ( 2, 2), (-2, 2), ( 0, 3), ( 3, 0), ( 1, 3), (-1, 3), ( 3, 1), (-3, 1), ( 2, 3), (-2, 3),
    ( 3, 2), (-3, 2), ( 0, 4), ( 4, 0), ( 1, 4), (-1, 4), ( 4, 1), (-4, 1), ( 3, 3), (-3, 3),
    ( 2, 4), (-2, 4), ( 4, 2), (-4, 2), ( 0, 5), ( 3, 4), (-3, 4), ( 4, 3), (-4, 3), ( 5, 0),
    ( 1, 5), (-1, 5), ( 5, 1), (-5, 1), ( 2, 5), (-2, 5), ( 5, 2), (-5, 2), ( 4, 4), (-4, 4),
    ( 3, 5), (-3, 5), ( 5, 3), (-5, 3), ( 0, 6), ( 6, 0), ( 1, 6), (-1, 6), ( 6, 1), (-6, 1),
    ( 2, 6), (-2, 6), ( 6, 2), (-6, 2), ( 4, 5), (-4, 5), ( 5, 4), (-5, 4), ( 3, 6), (-3, 6),
    ( 6, 3), (-6, 3), ( 0, 7), ( 7, 0), ( 1, 7), (-1, 7), ( 5, 5), (-5, 5), ( 7, 1), (-7, 1),
    ( 4, 6), (-4, 6), ( 6, 4), (-6, 4), ( 2, 7), (-2, 7), ( 7, 2), (-7, 2), ( 3, 7), (-3, 7),
    ( 7, 3), (-7, 3), ( 5, 6), (-5, 6), ( 6, 5), (-6, 5), ( 8, 0), ( 4, 7), (-4, 7), ( 7, 4),
    (-7, 4), ( 8, 1), ( 8, 2), ( 6, 6), (-6, 6), ( 8, 3), ( 5, 7), (-5, 7), ( 7, 5), (-7, 5),
    ( 8, 4), ( 6, 7), (-6, 7), ( 7, 6), (-7, 6), ( 8, 5), ( 7, 7), (-7, 7), ( 8, 6), ( 8, 7),
];

#[derive(UnconditionalCoder, Debug)]
struct Lz77Params {
    enabled: bool,
    #[condition(enabled)]
    #[coder(u2S(224, 512, 4096, Bits(15) + 8))]
    min_symbol: Option<u32>,
    #[condition(enabled)]
    #[coder(u2S(3, 4, Bits(2) + 5, Bits(8) + 9))]
    min_length: Option<u32>,
}

/// LZ77 parameters of an entropy code: tokens from `min_symbol` on start a copy of at least
/// `min_length` previous values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lz77Config {
    pub min_symbol: u32,
    pub min_length: u32,
    pub length_config: HybridUintConfig,
}

impl Lz77Config {
    /// Returns `None` if LZ77 is disabled for this entropy code.
    pub fn read(br: &mut BitReader, allow_lz77: bool) -> Result<Option<Lz77Config>> {
        let params = Lz77Params::read_unconditional(&(), br, &Empty {})?;
        let (Some(min_symbol), Some(min_length)) = (params.min_symbol, params.min_length) else {
            return Ok(None);
        };
        if !allow_lz77 {
            return Err(Error::Lz77Disallowed);
        }
        let length_config = HybridUintConfig::read(8, br)?;
        Ok(Some(Lz77Config {
            min_symbol,
            min_length,
            length_config,
        }))
    }
}

/// Decoded values of one reader and the copy in progress.
#[derive(Debug)]
pub struct Lz77State {
    config: Lz77Config,
    /// Cluster of the extra context used for distances.
    distance_cluster: usize,
    /// Row width for the special distance codes, or 0 to disable them.
    dist_multiplier: u32,
    window: Vec<u32>,
    num_decoded: usize,
    copy_pos: usize,
    copy_remaining: u32,
}

impl Lz77State {
    pub fn new(config: Lz77Config, distance_cluster: usize, dist_multiplier: u32) -> Lz77State {
        Lz77State {
            config,
            distance_cluster,
            dist_multiplier,
            window: vec![],
            num_decoded: 0,
            copy_pos: 0,
            copy_remaining: 0,
        }
    }

    pub fn distance_cluster(&self) -> usize {
        self.distance_cluster
    }

    /// Records a value decoded by the reader, copied or not.
    pub fn push(&mut self, value: u32) {
        let pos = self.num_decoded % WINDOW_SIZE;
        if pos < self.window.len() {
            self.window[pos] = value;
        } else {
            self.window.push(value);
        }
        self.num_decoded += 1;
    }

    /// The next value of the copy in progress, if any.
    pub fn next_copied(&mut self) -> Option<u32> {
        if self.copy_remaining == 0 {
            return None;
        }
        self.copy_remaining -= 1;
        let value = self.window[self.copy_pos % WINDOW_SIZE];
        self.copy_pos += 1;
        Some(value)
    }

    /// If `token` starts a copy, reads its length and returns it.
    pub fn copy_length(&self, token: u32, br: &mut BitReader) -> Result<Option<u32>> {
        let Some(length_token) = token.checked_sub(self.config.min_symbol) else {
            return Ok(None);
        };
        if self.num_decoded == 0 {
            return Err(Error::UnexpectedLz77Repeat);
        }
        let length = self.config.length_config.value(length_token, br)?;
        let Some(length) = length.checked_add(self.config.min_length) else {
            warn!(length, min_length = self.config.min_length, "LZ77 length overflow");
            return Err(Error::ArithmeticOverflow);
        };
        Ok(Some(length))
    }

    /// Starts copying `length` values from `distance_symbol` values back.
    pub fn start_copy(&mut self, length: u32, distance_symbol: u32) {
        let distance_minus_one = if self.dist_multiplier == 0 {
            distance_symbol
        } else if let Some(d) = distance_symbol.checked_sub(NUM_SPECIAL_DISTANCES) {
            d
        } else {
            let (dx, dy) = SPECIAL_DISTANCES[distance_symbol as usize];
            self.dist_multiplier
                .checked_mul(dy as u32)
                .and_then(|d| d.checked_add_signed(dx as i32 - 1))
                .unwrap_or(0)
        };
        let distance = (distance_minus_one as usize).min(WINDOW_SIZE - 1) + 1;
        self.copy_pos = self.num_decoded - distance.min(self.num_decoded);
        self.copy_remaining = length;
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::encodings::*,
};

use jxl_macros::UnconditionalCoder;
use num_derive::FromPrimitive;

/// Parameters of the self-correcting (weighted) predictor.
#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
pub struct WeightedHeader {
    #[all_default]
    #[default(true)]
    all_default: bool,

    #[coder(Bits(5))]
    #[default(16)]
    pub p1c: u32,

    #[coder(Bits(5))]
    #[default(10)]
    pub p2c: u32,

    #[coder(Bits(5))]
    #[default(7)]
    pub p3ca: u32,

    #[coder(Bits(5))]
    #[default(7)]
    pub p3cb: u32,

    #[coder(Bits(5))]
    #[default(7)]
    pub p3cc: u32,

    #[coder(Bits(5))]
    #[default(0)]
    pub p3cd: u32,

    #[coder(Bits(5))]
    #[default(0)]
    pub p3ce: u32,

    #[coder(Bits(4))]
    #[default([13, 12, 12, 12])]
    pub w: [u32; 4],
}

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum TransformId {
    Rct = 0,
    Palette = 1,
    Squeeze = 2,
    Invalid = 3,
}

#[derive(UnconditionalCoder, Debug, PartialEq, Clone, Copy)]
pub struct SqueezeParams {
    pub horizontal: bool,
    pub in_place: bool,
    #[coder(u2S(Bits(3), Bits(6) + 8, Bits(10) + 72, Bits(13) + 1096))]
    pub begin_channel: u32,
    #[coder(u2S(1, 2, 3, Bits(4) + 4))]
    pub num_channels: u32,
}

/// Number of palette predictors: the 14 modular predictors.
const NUM_PALETTE_PREDICTORS: u32 = 14;

#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
#[validate]
pub struct Transform {
    #[coder(u2S(0, 1, 2, 3))]
    #[default(TransformId::Invalid)]
    pub id: TransformId,

    #[condition(id == TransformId::Rct || id == TransformId::Palette)]
    #[coder(u2S(Bits(3), Bits(6) + 8, Bits(10) + 72, Bits(13) + 1096))]
    #[default(0)]
    pub begin_channel: u32,

    #[condition(id == TransformId::Rct)]
    #[coder(u2S(6, Bits(2), Bits(4) + 2, Bits(6) + 10))]
    #[default(6)]
    pub rct_type: u32,

    #[condition(id == TransformId::Palette)]
    #[coder(u2S(1, 3, 4, Bits(13) + 1))]
    #[default(3)]
    pub num_channels: u32,

    #[condition(id == TransformId::Palette)]
    #[coder(u2S(Bits(8), Bits(10) + 256, Bits(12) + 1280, Bits(16) + 5376))]
    #[default(256)]
    pub num_colors: u32,

    #[condition(id == TransformId::Palette)]
    #[coder(u2S(0, Bits(8) + 1, Bits(10) + 257, Bits(16) + 1281))]
    #[default(0)]
    pub num_deltas: u32,

    #[condition(id == TransformId::Palette)]
    #[coder(Bits(4))]
    #[default(0)]
    pub predictor_id: u32,

    #[condition(id == TransformId::Squeeze)]
    #[size_coder(implicit(u2S(0, Bits(4) + 1, Bits(6) + 9, Bits(8) + 41)))]
    pub squeezes: Vec<SqueezeParams>,
}

impl Transform {
    fn check(&self, _: &Empty) -> Result<()> {
        match self.id {
            TransformId::Invalid => Err(Error::InvalidTransformId(self.id as u32)),
            TransformId::Rct if self.rct_type >= 42 => Err(Error::InvalidRCT(self.rct_type)),
            TransformId::Palette if self.predictor_id >= NUM_PALETTE_PREDICTORS => {
                Err(Error::InvalidPredictor(self.predictor_id))
            }
            _ => Ok(()),
        }
    }
}

#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
pub struct GroupHeader {
    pub use_global_tree: bool,
    pub wp_header: WeightedHeader,
    #[size_coder(implicit(u2S(0, 1, Bits(4) + 2, Bits(8) + 18)))]
    pub transforms: Vec<Transform>,
}

impl GroupHeader {
    pub fn read(br: &mut BitReader) -> Result<GroupHeader> {
        Self::read_unconditional(&(), br, &Empty {})
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use num_derive::FromPrimitive;
use num_traits::FromPrimitive;

use crate::{
    error::{Error, Result},
    headers::modular::{SqueezeParams, Transform, TransformId, WeightedHeader},
    util::tracing_wrappers::*,
};

use super::{ModularChannel, Predictor};

mod palette;
mod rct;
mod squeeze;

#[derive(Debug, FromPrimitive, PartialEq, Eq, Clone, Copy)]
pub enum RctPermutation {
    Rgb = 0,
    Gbr = 1,
    Brg = 2,
    Rbg = 3,
    Grb = 4,
    Bgr = 5,
}

#[derive(Debug, FromPrimitive, PartialEq, Eq, Clone, Copy)]
pub enum RctOp {
    Noop = 0,
    AddFirstToThird = 1,
    AddFirstToSecond = 2,
    AddFirstToSecondAndThird = 3,
    AddAvgToSecond = 4,
    AddFirstToThirdAndAvgToSecond = 5,
    YCoCg = 6,
}

/// A transform as applied to the channel list, with everything needed to undo it.
#[derive(Debug)]
pub enum TransformStep {
    Rct {
        begin_channel: usize,
        op: RctOp,
        perm: RctPermutation,
    },
    Palette {
        begin_channel: usize,
        num_channels: usize,
        num_colors: usize,
        num_deltas: usize,
        predictor: Predictor,
        wp_header: WeightedHeader,
    },
    Squeeze {
        steps: Vec<SqueezeParams>,
    },
}

#[instrument(level = "trace", skip(channels), err)]
fn check_equal_channels(channels: &[ModularChannel], first_chan: usize, num: usize) -> Result<()> {
    if num == 0 || first_chan + num > channels.len() {
        return Err(Error::InvalidChannelRange(
            first_chan,
            first_chan + num,
            channels.len(),
        ));
    }
    for inc in 1..num {
        if !channels[first_chan].same_shape(&channels[first_chan + inc]) {
            return Err(Error::MixingDifferentChannels);
        }
    }
    Ok(())
}

/// Applies `transforms` to the shapes of `channels`, in order, and returns the steps that undo
/// them. Channel contents are not touched; channels created here are not decoded yet.
pub fn meta_apply_transforms(
    channels: &mut Vec<ModularChannel>,
    num_meta_channels: &mut usize,
    transforms: &[Transform],
    wp_header: &WeightedHeader,
) -> Result<Vec<TransformStep>> {
    let mut steps = vec![];
    for transform in transforms {
        let step = match transform.id {
            TransformId::Rct => {
                let begin_channel = transform.begin_channel as usize;
                check_equal_channels(channels, begin_channel, 3)?;
                let op = RctOp::from_u32(transform.rct_type % 7)
                    .ok_or(Error::InvalidRCT(transform.rct_type))?;
                let perm = RctPermutation::from_u32(transform.rct_type / 7)
                    .ok_or(Error::InvalidRCT(transform.rct_type))?;
                TransformStep::Rct {
                    begin_channel,
                    op,
                    perm,
                }
            }
            TransformId::Palette => {
                let begin_channel = transform.begin_channel as usize;
                let num_channels = transform.num_channels as usize;
                let num_colors = transform.num_colors as usize;
                let num_deltas = transform.num_deltas as usize;
                let predictor = Predictor::try_from(transform.predictor_id)?;
                palette::meta_apply(
                    channels,
                    num_meta_channels,
                    begin_channel,
                    num_channels,
                    num_colors + num_deltas,
                )?;
                TransformStep::Palette {
                    begin_channel,
                    num_channels,
                    num_colors,
                    num_deltas,
                    predictor,
                    wp_header: wp_header.clone(),
                }
            }
            TransformId::Squeeze => {
                let steps = if transform.squeezes.is_empty() {
                    squeeze::default_squeeze(channels, *num_meta_channels)?
                } else {
                    transform.squeezes.clone()
                };
                for params in steps.iter() {
                    squeeze::meta_apply(channels, num_meta_channels, params)?;
                }
                TransformStep::Squeeze { steps }
            }
            TransformId::Invalid => {
                return Err(Error::InvalidTransformId(transform.id as u32));
            }
        };
        trace!(?step, ?channels, num_meta_channels, "applied transform");
        steps.push(step);
    }
    Ok(steps)
}

impl TransformStep {
    /// Reverts this transform on the decoded `channels`.
    #[instrument(level = "debug", skip(channels), err)]
    pub fn inverse(
        &self,
        channels: &mut Vec<ModularChannel>,
        num_meta_channels: &mut usize,
        bit_depth: u32,
    ) -> Result<()> {
        match self {
            TransformStep::Rct {
                begin_channel,
                op,
                perm,
            } => {
                check_equal_channels(channels, *begin_channel, 3)?;
                rct::do_rct_step(&mut channels[*begin_channel..*begin_channel + 3], *op, *perm);
                Ok(())
            }
            TransformStep::Palette {
                begin_channel,
                num_colors,
                num_deltas,
                predictor,
                wp_header,
                ..
            } => palette::do_palette_step(
                channels,
                num_meta_channels,
                *begin_channel,
                *num_colors,
                *num_deltas,
                *predictor,
                wp_header,
                bit_depth,
            ),
            TransformStep::Squeeze { steps } => {
                for params in steps.iter().rev() {
                    squeeze::do_squeeze_step(channels, num_meta_channels, params)?;
                }
                Ok(())
            }
        }
    }
}

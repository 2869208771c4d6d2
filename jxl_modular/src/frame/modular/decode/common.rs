// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    frame::modular::{ModularChannel, predict::clamped_gradient, tree::PROPERTIES_PER_PREVCHAN},
    headers::frame_header::FrameHeader,
    image::Image,
};

/// Number of stream ids reserved for quantization tables, which modular frames never use but
/// still count when numbering the pass groups.
const NUM_QUANT_TABLES: usize = 17;

/// Identifies a modular stream within a frame. The numeric id is visible to the MA tree as
/// property 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModularStreamId {
    GlobalData,
    ModularLF(usize),
    ModularHF { pass: usize, group: usize },
}

impl ModularStreamId {
    pub fn get_id(&self, frame_header: &FrameHeader) -> usize {
        match self {
            Self::GlobalData => 0,
            Self::ModularLF(g) => 1 + frame_header.num_lf_groups() + g,
            Self::ModularHF { pass, group } => {
                1 + frame_header.num_lf_groups() * 3
                    + NUM_QUANT_TABLES
                    + frame_header.num_groups() * *pass
                    + *group
            }
        }
    }
}

fn saturate(v: i64) -> i32 {
    v.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

/// Fills `references` (one row per pixel of row `y`) with the properties derived from the
/// previously decoded channels that have the same size and shift as `channel`, nearest first.
/// Each reference contributes |v|, v, |v - gradient| and v - gradient.
pub(in crate::frame::modular) fn precompute_references(
    previous: &[ModularChannel],
    channel: &ModularChannel,
    y: usize,
    references: &mut Image<i32>,
) {
    references.fill(0);
    let num_references = references.size().0 / PROPERTIES_PER_PREVCHAN;
    let same_shape = previous
        .iter()
        .rev()
        .filter(|reference| reference.same_shape(channel))
        .take(num_references);
    for (i, reference) in same_shape.enumerate() {
        let offset = i * PROPERTIES_PER_PREVCHAN;
        let row = reference.data.row(y);
        let above = (y > 0).then(|| reference.data.row(y - 1));
        for (x, &v) in row.iter().enumerate() {
            let left = if x > 0 { row[x - 1] } else { 0 };
            let (top, topleft) = match above {
                Some(above) if x > 0 => (above[x], above[x - 1]),
                Some(above) => (above[x], left),
                None => (left, left),
            };
            let diff = v as i64 - clamped_gradient(left as i64, top as i64, topleft as i64);
            references.row_mut(x)[offset..offset + PROPERTIES_PER_PREVCHAN].copy_from_slice(&[
                v.wrapping_abs(),
                v,
                saturate(diff.abs()),
                saturate(diff),
            ]);
        }
    }
}

/// Reconstructs a sample from its decoded residual, saturating to the i32 range.
pub(in crate::frame::modular) fn make_pixel(residual: i32, multiplier: u32, prediction: i64) -> i32 {
    saturate(prediction + multiplier as i64 * residual as i64)
}

#[cfg(test)]
mod test {
    use super::{make_pixel, precompute_references};
    use crate::frame::modular::ModularChannel;
    use crate::image::Image;
    use test_log::test;

    #[test]
    fn pixels_saturate() {
        assert_eq!(make_pixel(1, 1, i32::MAX as i64), i32::MAX);
        assert_eq!(make_pixel(1, 2, (i32::MAX - 1) as i64), i32::MAX);
        assert_eq!(make_pixel(-1, 1, i32::MIN as i64), i32::MIN);
        assert_eq!(make_pixel(-1, 2, (i32::MIN + 1) as i64), i32::MIN);
        assert_eq!(make_pixel(-3, 4, 20), 8);
    }

    #[test]
    fn reference_residual_saturates() {
        let mut chan0 = ModularChannel::new((1, 2), Some((0, 0))).unwrap();
        chan0.data.row_mut(0)[0] = i32::MIN;
        chan0.data.row_mut(1)[0] = i32::MAX;
        let chan1 = ModularChannel::new((1, 2), Some((0, 0))).unwrap();

        let mut references = Image::<i32>::new((4, 1)).unwrap();
        // vleft and vtopleft are 0, so the prediction is vtop = MIN and the difference
        // overflows i32.
        precompute_references(&[chan0], &chan1, 1, &mut references);

        assert_eq!(references.row(0)[2], i32::MAX);
        assert_eq!(references.row(0)[3], i32::MAX);
    }

    #[test]
    fn references_skip_channels_of_other_shapes() {
        let mut same = ModularChannel::new((2, 1), Some((0, 0))).unwrap();
        same.data.row_mut(0).copy_from_slice(&[-3, 5]);
        let other = ModularChannel::new((2, 1), Some((1, 0))).unwrap();
        let current = ModularChannel::new((2, 1), Some((0, 0))).unwrap();

        let mut references = Image::<i32>::new((8, 2)).unwrap();
        precompute_references(&[same, other], &current, 0, &mut references);
        assert_eq!(references.row(0), &[3, -3, 3, -3, 0, 0, 0, 0]);
        // Predicted from the left neighbour -3.
        assert_eq!(references.row(1), &[5, 5, 8, 8, 0, 0, 0, 0]);
    }
}

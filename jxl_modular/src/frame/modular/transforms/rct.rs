// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    frame::modular::{
        ModularChannel,
        transforms::{RctOp, RctPermutation},
    },
    util::tracing_wrappers::*,
};

/// Channel that receives the `i`-th output of the inverse lifting.
fn output_channel(perm: RctPermutation, i: usize) -> usize {
    let p = perm as usize;
    match i {
        0 => p % 3,
        1 => (p + 1 + p / 3) % 3,
        _ => (p + 2 - p / 3) % 3,
    }
}

#[inline]
fn inverse_pixel(op: RctOp, [first, second, third]: [i32; 3]) -> [i32; 3] {
    match op {
        RctOp::Noop => [first, second, third],
        RctOp::YCoCg => {
            let (y, co, cg) = (first, second, third);
            let tmp = y.wrapping_sub(cg >> 1);
            let g = cg.wrapping_add(tmp);
            let b = tmp.wrapping_sub(co >> 1);
            let r = b.wrapping_add(co);
            [r, g, b]
        }
        _ => {
            let op = op as u32;
            let third = if op & 1 != 0 {
                third.wrapping_add(first)
            } else {
                third
            };
            let second = match op >> 1 {
                1 => second.wrapping_add(first),
                2 => second.wrapping_add(first.wrapping_add(third) >> 1),
                _ => second,
            };
            [first, second, third]
        }
    }
}

// Undoes a RCT in-place on the given three channels, then moves them to their original order.
#[instrument(level = "debug", skip(channels))]
pub fn do_rct_step(channels: &mut [ModularChannel], op: RctOp, perm: RctPermutation) {
    let [c0, c1, c2] = channels else {
        unreachable!("incorrect channel count for RCT");
    };
    if op != RctOp::Noop {
        let (w, h) = c0.size();
        for y in 0..h {
            let (r0, r1, r2) = (
                c0.data.row_mut(y),
                c1.data.row_mut(y),
                c2.data.row_mut(y),
            );
            for x in 0..w {
                let [a, b, c] = inverse_pixel(op, [r0[x], r1[x], r2[x]]);
                r0[x] = a;
                r1[x] = b;
                r2[x] = c;
            }
        }
    }
    if perm != RctPermutation::Rgb {
        let mut target = [0, 1, 2].map(|i| output_channel(perm, i));
        for i in 0..3 {
            while target[i] != i {
                let t = target[i];
                channels.swap(i, t);
                target.swap(i, t);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use arbtest::arbitrary::Unstructured;
    use num_traits::FromPrimitive;
    use test_log::test;

    fn forward_pixel(op: RctOp, [first, second, third]: [i32; 3]) -> [i32; 3] {
        match op {
            RctOp::Noop => [first, second, third],
            RctOp::YCoCg => {
                let (r, g, b) = (first, second, third);
                let co = r - b;
                let tmp = b + (co >> 1);
                let cg = g - tmp;
                let y = tmp + (cg >> 1);
                [y, co, cg]
            }
            _ => {
                let op = op as u32;
                let second = match op >> 1 {
                    1 => second - first,
                    2 => second - ((first + third) >> 1),
                    _ => second,
                };
                let third = if op & 1 != 0 { third - first } else { third };
                [first, second, third]
            }
        }
    }

    fn channels_from(values: &[[i32; 3]]) -> Vec<ModularChannel> {
        (0..3)
            .map(|c| {
                let mut channel = ModularChannel::new((values.len(), 1), Some((0, 0))).unwrap();
                for (x, v) in values.iter().enumerate() {
                    channel.data.row_mut(0)[x] = v[c];
                }
                channel
            })
            .collect()
    }

    #[test]
    fn ycocg_known_values() {
        // R = 10, G = 20, B = 30: Co = -20, tmp = 20, Cg = 0, Y = 20.
        assert_eq!(forward_pixel(RctOp::YCoCg, [10, 20, 30]), [20, -20, 0]);
        assert_eq!(inverse_pixel(RctOp::YCoCg, [20, -20, 0]), [10, 20, 30]);
    }

    #[test]
    fn permutation_only() {
        let mut channels = channels_from(&[[1, 2, 3]]);
        do_rct_step(&mut channels, RctOp::Noop, RctPermutation::Bgr);
        // Permutation 5 sends input 0 to channel 2, input 1 to 1 and input 2 to 0.
        let values: Vec<_> = channels.iter().map(|c| c.data.row(0)[0]).collect();
        assert_eq!(values, vec![3, 2, 1]);
    }

    #[test]
    fn all_rct_types_invert() {
        arbtest::arbtest(|u: &mut Unstructured| {
            let rct_type = u.int_in_range(0..=41u32)?;
            let op = RctOp::from_u32(rct_type % 7).unwrap();
            let perm = RctPermutation::from_u32(rct_type / 7).unwrap();
            let num_pixels = u.int_in_range(1..=16usize)?;
            let mut original = vec![];
            for _ in 0..num_pixels {
                original.push([
                    u.int_in_range(-(1 << 20)..=(1 << 20))?,
                    u.int_in_range(-(1 << 20)..=(1 << 20))?,
                    u.int_in_range(-(1 << 20)..=(1 << 20))?,
                ]);
            }
            // The encoder reads its inputs from the permuted positions.
            let coded: Vec<_> = original
                .iter()
                .map(|p| {
                    let input = [0, 1, 2].map(|i| p[output_channel(perm, i)]);
                    forward_pixel(op, input)
                })
                .collect();
            let mut channels = channels_from(&coded);
            do_rct_step(&mut channels, op, perm);
            for (x, p) in original.iter().enumerate() {
                for c in 0..3 {
                    assert_eq!(channels[c].data.row(0)[x], p[c], "type {rct_type}");
                }
            }
            Ok(())
        });
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::{Error, Result},
    frame::modular::{
        ModularChannel, Predictor, WeightedPredictorState, predict::PredictionData,
    },
    headers::modular::WeightedHeader,
    image::Image,
    util::tracing_wrappers::*,
};

use super::check_equal_channels;

const RGB_CHANNELS: usize = 3;

// 5x5x5 color cube for the larger cube.
const LARGE_CUBE: usize = 5;

// Smaller interleaved color cube to fill the holes of the larger cube.
const SMALL_CUBE: usize = 4;
const SMALL_CUBE_BITS: usize = 2;
// SMALL_CUBE ** 3
const LARGE_CUBE_OFFSET: usize = SMALL_CUBE * SMALL_CUBE * SMALL_CUBE;

fn scale<const DENOM: usize>(value: usize, bit_depth: usize) -> i32 {
    // return (value * ((1 << bit_depth) - 1)) / DENOM;
    // We only call this function with SMALL_CUBE or LARGE_CUBE - 1 as DENOM,
    // allowing us to avoid a division here.
    const {
        assert!(DENOM == 4, "denom must be 4");
    }
    ((value * ((1 << bit_depth) - 1)) >> 2) as i32
}

// The purpose of this function is solely to extend the interpretation of
// palette indices to implicit values. If index < nb_deltas, indicating that the
// result is a delta palette entry, it is the responsibility of the caller to
// treat it as such.
fn get_palette_value(
    palette: &Image<i32>,
    index: isize,
    c: usize,
    palette_size: usize,
    bit_depth: usize,
) -> i32 {
    if index < 0 {
        const DELTA_PALETTE: [[i32; 3]; 72] = [
            [0, 0, 0],
            [4, 4, 4],
            [11, 0, 0],
            [0, 0, -13],
            [0, -12, 0],
            [-10, -10, -10],
            [-18, -18, -18],
            [-27, -27, -27],
            [-18, -18, 0],
            [0, 0, -32],
            [-32, 0, 0],
            [-37, -37, -37],
            [0, -32, -32],
            [24, 24, 45],
            [50, 50, 50],
            [-45, -24, -24],
            [-24, -45, -45],
            [0, -24, -24],
            [-34, -34, 0],
            [-24, 0, -24],
            [-45, -45, -24],
            [64, 64, 64],
            [-32, 0, -32],
            [0, -32, 0],
            [-32, 0, 32],
            [-24, -45, -24],
            [45, 24, 45],
            [24, -24, -45],
            [-45, -24, 24],
            [80, 80, 80],
            [64, 0, 0],
            [0, 0, -64],
            [0, -64, -64],
            [-24, -24, 45],
            [96, 96, 96],
            [64, 64, 0],
            [45, -24, -24],
            [34, -34, 0],
            [112, 112, 112],
            [24, -45, -45],
            [45, 45, -24],
            [0, -32, 32],
            [24, -24, 45],
            [0, 96, 96],
            [45, -24, 24],
            [24, -45, -24],
            [-24, -45, 24],
            [0, -64, 0],
            [96, 0, 0],
            [128, 128, 128],
            [64, 0, 64],
            [144, 144, 144],
            [96, 96, 0],
            [-36, -36, 36],
            [45, -24, -45],
            [45, -45, -24],
            [0, 0, -96],
            [0, 128, 128],
            [0, 96, 0],
            [45, 24, -45],
            [-128, 0, 0],
            [24, -45, 24],
            [-45, 24, -45],
            [64, 0, -64],
            [64, -64, -64],
            [96, 0, 96],
            [45, -45, 24],
            [24, 45, -45],
            [64, 64, -64],
            [128, 128, 0],
            [0, 0, -128],
            [-24, 45, -45],
        ];
        if c >= RGB_CHANNELS {
            return 0;
        }
        // Do not open the brackets, otherwise INT32_MIN negation could overflow.
        let mut index = -(index + 1) as usize;
        index %= 1 + 2 * (DELTA_PALETTE.len() - 1);
        const MULTIPLIER: [i32; 2] = [-1, 1];
        let mut result = DELTA_PALETTE[(index + 1) >> 1][c] * MULTIPLIER[index & 1];
        if bit_depth > 8 {
            result *= 1 << (bit_depth - 8);
        }
        result
    } else {
        let mut index = index as usize;
        if palette_size <= index && index < palette_size + LARGE_CUBE_OFFSET {
            if c >= RGB_CHANNELS {
                return 0;
            }
            index -= palette_size;
            index >>= c * SMALL_CUBE_BITS;
            scale::<SMALL_CUBE>(index % SMALL_CUBE, bit_depth)
                + (1 << (0.max(bit_depth as isize - 3)))
        } else if palette_size + LARGE_CUBE_OFFSET <= index {
            if c >= RGB_CHANNELS {
                return 0;
            }
            index -= palette_size + LARGE_CUBE_OFFSET;
            match c {
                0 => (),
                1 => {
                    index /= LARGE_CUBE;
                }
                2 => {
                    index /= LARGE_CUBE * LARGE_CUBE;
                }
                _ => (),
            }
            scale::<{ LARGE_CUBE - 1 }>(index % LARGE_CUBE, bit_depth)
        } else {
            palette.row(c)[index]
        }
    }
}

/// Replaces channels `begin_channel..begin_channel + num_channels` by a single index channel and
/// prepends the palette meta-channel.
#[instrument(level = "trace", skip(channels), err)]
pub fn meta_apply(
    channels: &mut Vec<ModularChannel>,
    num_meta_channels: &mut usize,
    begin_channel: usize,
    num_channels: usize,
    palette_width: usize,
) -> Result<()> {
    check_equal_channels(channels, begin_channel, num_channels)?;
    if begin_channel >= *num_meta_channels {
        *num_meta_channels += 1;
    } else {
        let end_channel = begin_channel + num_channels - 1;
        if end_channel >= *num_meta_channels {
            return Err(Error::MixingDifferentChannels);
        }
        *num_meta_channels = *num_meta_channels + 2 - num_channels;
    }
    channels.drain(begin_channel + 1..begin_channel + num_channels);
    channels.insert(0, ModularChannel::new((palette_width, num_channels), None)?);
    Ok(())
}

/// Expands the index channel at `begin_channel + 1` into one channel per palette row, using the
/// palette stored in meta-channel 0, then drops the palette.
#[allow(clippy::too_many_arguments)]
#[instrument(level = "debug", skip(channels, wp_header), err)]
pub fn do_palette_step(
    channels: &mut Vec<ModularChannel>,
    num_meta_channels: &mut usize,
    begin_channel: usize,
    num_colors: usize,
    num_deltas: usize,
    predictor: Predictor,
    wp_header: &WeightedHeader,
    bit_depth: u32,
) -> Result<()> {
    if *num_meta_channels < 1 || channels.is_empty() {
        return Err(Error::MissingPalette);
    }
    let c0 = begin_channel + 1;
    if c0 >= channels.len() {
        return Err(Error::InvalidChannelRange(c0, c0 + 1, channels.len()));
    }
    let (palette_size, num_out) = channels[0].size();
    if !channels[0].is_meta() || palette_size != num_colors + num_deltas {
        return Err(Error::MissingPalette);
    }
    for i in 1..num_out {
        let copy = channels[c0].empty_like()?;
        channels.insert(c0 + i, copy);
    }
    let (w, h) = channels[c0].size();
    let bit_depth = bit_depth.min(24) as usize;
    let (palette_chan, rest) = channels.split_at_mut(1);
    let palette = &palette_chan[0].data;
    let outputs = &mut rest[c0 - 1..c0 - 1 + num_out];
    trace!(palette_size, num_colors, w, h, "inverse palette");

    if w > 0 {
        let indices = outputs[0].data.try_clone()?;
        for (c, out) in outputs.iter_mut().enumerate() {
            if num_deltas == 0 && predictor == Predictor::Zero {
                for y in 0..h {
                    let row = out.data.row_mut(y);
                    for (x, &index) in indices.row(y).iter().enumerate() {
                        row[x] = get_palette_value(
                            &palette,
                            index as isize,
                            c,
                            palette_size,
                            bit_depth,
                        );
                    }
                }
                continue;
            }
            let mut wp_state = if predictor == Predictor::Weighted {
                Some(WeightedPredictorState::new(wp_header, w)?)
            } else {
                None
            };
            for y in 0..h {
                for x in 0..w {
                    let index = indices.row(y)[x];
                    let palette_entry =
                        get_palette_value(&palette, index as isize, c, palette_size, bit_depth);
                    let val = if index < num_deltas as i32 {
                        let data = PredictionData::get(&out.data, x, y);
                        let wp_pred = match wp_state.as_mut() {
                            Some(state) => state.predict_and_property((x, y), w, &data).0,
                            None => 0,
                        };
                        let pred = predictor.predict_one(data, wp_pred);
                        (pred + palette_entry as i64) as i32
                    } else {
                        palette_entry
                    };
                    out.data.row_mut(y)[x] = val;
                    if let Some(state) = wp_state.as_mut() {
                        state.update_errors(val, (x, y), w);
                    }
                }
            }
        }
    }
    for out in outputs.iter_mut() {
        out.mark_decoded();
    }
    channels.remove(0);
    *num_meta_channels -= 1;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::headers::encodings::Empty;
    use test_log::test;

    fn channel_from_rows(rows: &[&[i32]], shift: Option<(usize, usize)>) -> ModularChannel {
        let mut channel = ModularChannel::new((rows[0].len(), rows.len()), shift).unwrap();
        for (y, row) in rows.iter().enumerate() {
            channel.data.row_mut(y).copy_from_slice(row);
        }
        channel.mark_decoded();
        channel
    }

    fn rows(channel: &ModularChannel) -> Vec<Vec<i32>> {
        let (_, h) = channel.size();
        (0..h).map(|y| channel.data.row(y).to_vec()).collect()
    }

    #[test]
    fn meta_apply_shapes() {
        let mut channels: Vec<_> = (0..4)
            .map(|_| ModularChannel::new((7, 5), Some((0, 0))).unwrap())
            .collect();
        let mut nb_meta = 0;
        meta_apply(&mut channels, &mut nb_meta, 1, 2, 12).unwrap();
        assert_eq!(nb_meta, 1);
        assert_eq!(channels.len(), 4);
        assert_eq!(channels[0].size(), (12, 2));
        assert!(channels[0].is_meta());
        assert!(channels[1..].iter().all(|c| c.size() == (7, 5)));
    }

    #[test]
    fn meta_apply_rejects_meta_and_data_mix() {
        let mut channels = vec![
            ModularChannel::new((4, 1), None).unwrap(),
            ModularChannel::new((4, 1), None).unwrap(),
        ];
        let mut nb_meta = 1;
        assert!(matches!(
            meta_apply(&mut channels, &mut nb_meta, 0, 2, 3),
            Err(Error::MixingDifferentChannels)
        ));
    }

    #[test]
    fn simple_lookup() {
        let wp = WeightedHeader::default(&Empty {});
        let palette = channel_from_rows(&[&[10, 20], &[30, 40], &[50, 60]], None);
        let index = channel_from_rows(&[&[0, 1, 1], &[1, 0, 0]], Some((0, 0)));
        let mut channels = vec![palette, index];
        let mut nb_meta = 1;
        do_palette_step(&mut channels, &mut nb_meta, 0, 2, 0, Predictor::Zero, &wp, 8).unwrap();
        assert_eq!(nb_meta, 0);
        assert_eq!(channels.len(), 3);
        assert_eq!(rows(&channels[0]), vec![vec![10, 20, 20], vec![20, 10, 10]]);
        assert_eq!(rows(&channels[1]), vec![vec![30, 40, 40], vec![40, 30, 30]]);
        assert_eq!(rows(&channels[2]), vec![vec![50, 60, 60], vec![60, 50, 50]]);
        assert!(channels.iter().all(|c| c.is_decoded()));
    }

    #[test]
    fn implicit_colors() {
        let palette = channel_from_rows(&[&[0], &[0], &[0]], None);
        let palette = &palette.data;
        // First entry of the small cube, offset by half a step.
        assert_eq!(get_palette_value(&palette, 1, 0, 1, 8), 32);
        // Index 1 + 64 + 124 is the last entry of the large cube.
        assert_eq!(get_palette_value(&palette, 1 + 64 + 124, 0, 1, 8), 255);
        assert_eq!(get_palette_value(&palette, 1 + 64 + 124, 2, 1, 8), 255);
        assert_eq!(get_palette_value(&palette, 1 + 64 + 124, 3, 1, 8), 0);
        // Negative indices select from the delta palette.
        assert_eq!(get_palette_value(&palette, -1, 0, 1, 8), 0);
        assert_eq!(get_palette_value(&palette, -2, 0, 1, 8), 4);
        assert_eq!(get_palette_value(&palette, -3, 0, 1, 8), -4);
        assert_eq!(get_palette_value(&palette, -3, 0, 1, 10), -16);
    }

    #[test]
    fn delta_entries_add_prediction() {
        let wp = WeightedHeader::default(&Empty {});
        // Entry 0 is a delta of +5, entry 1 a plain color of 100.
        let palette = channel_from_rows(&[&[5, 100]], None);
        let index = channel_from_rows(&[&[1, 0, 0, 1]], Some((0, 0)));
        let mut channels = vec![palette, index];
        let mut nb_meta = 1;
        do_palette_step(&mut channels, &mut nb_meta, 0, 1, 1, Predictor::West, &wp, 8).unwrap();
        assert_eq!(rows(&channels[0]), vec![vec![100, 105, 110, 100]]);
    }

    #[test]
    fn weighted_delta_on_constant_image() {
        let wp = WeightedHeader::default(&Empty {});
        let palette = channel_from_rows(&[&[0, 7]], None);
        // A leading color followed by zero deltas keeps predicting the same value.
        let index = channel_from_rows(&[&[1, 0, 0], &[0, 0, 0]], Some((0, 0)));
        let mut channels = vec![palette, index];
        let mut nb_meta = 1;
        do_palette_step(&mut channels, &mut nb_meta, 0, 1, 1, Predictor::Weighted, &wp, 8)
            .unwrap();
        assert_eq!(rows(&channels[0]), vec![vec![7, 7, 7], vec![7, 7, 7]]);
    }

    #[test]
    fn missing_palette() {
        let wp = WeightedHeader::default(&Empty {});
        let mut channels = vec![channel_from_rows(&[&[0]], Some((0, 0)))];
        let mut nb_meta = 0;
        assert!(matches!(
            do_palette_step(&mut channels, &mut nb_meta, 0, 1, 0, Predictor::Zero, &wp, 8),
            Err(Error::MissingPalette)
        ));
    }
}

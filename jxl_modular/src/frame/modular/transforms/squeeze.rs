// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    error::{Error, Result},
    frame::modular::ModularChannel,
    headers::modular::SqueezeParams,
};

use crate::util::tracing_wrappers::*;

const MAX_FIRST_PREVIEW_SIZE: usize = 8;
const MAX_SHIFT: usize = 30;

/// Returns `(begin, end)` of the squeezed range, both inclusive.
fn squeeze_range(params: &SqueezeParams, num_channels: usize) -> Result<(usize, usize)> {
    let begin = params.begin_channel as usize;
    let num = params.num_channels as usize;
    if num == 0 || begin >= num_channels || begin + num > num_channels {
        return Err(Error::InvalidChannelRange(begin, begin + num, num_channels));
    }
    Ok((begin, begin + num - 1))
}

/// The squeeze steps used when the transform does not list any explicitly.
pub fn default_squeeze(
    channels: &[ModularChannel],
    num_meta_channels: usize,
) -> Result<Vec<SqueezeParams>> {
    let nc = channels.len().saturating_sub(num_meta_channels);
    if nc == 0 {
        return Err(Error::InvalidChannelRange(
            num_meta_channels,
            num_meta_channels,
            channels.len(),
        ));
    }
    let (mut w, mut h) = channels[num_meta_channels].size();

    let mut params = vec![];

    if nc > 2 && channels[num_meta_channels + 1].size() == (w, h) {
        // 420 previews
        let sp = SqueezeParams {
            horizontal: true,
            in_place: false,
            begin_channel: num_meta_channels as u32 + 1,
            num_channels: 2,
        };
        params.push(sp);
        params.push(SqueezeParams {
            horizontal: false,
            ..sp
        });
    }

    let sp = SqueezeParams {
        begin_channel: num_meta_channels as u32,
        num_channels: nc as u32,
        in_place: true,
        horizontal: false,
    };

    // vertical first on tall images
    if w <= h && h > MAX_FIRST_PREVIEW_SIZE {
        params.push(SqueezeParams {
            horizontal: false,
            ..sp
        });
        h = h.div_ceil(2);
    }
    while w > MAX_FIRST_PREVIEW_SIZE || h > MAX_FIRST_PREVIEW_SIZE {
        if w > MAX_FIRST_PREVIEW_SIZE {
            params.push(SqueezeParams {
                horizontal: true,
                ..sp
            });
            w = w.div_ceil(2);
        }
        if h > MAX_FIRST_PREVIEW_SIZE {
            params.push(SqueezeParams {
                horizontal: false,
                ..sp
            });
            h = h.div_ceil(2);
        }
    }

    Ok(params)
}

/// Halves the squeezed channels and inserts their residual channels.
#[instrument(level = "trace", skip(channels), err)]
pub fn meta_apply(
    channels: &mut Vec<ModularChannel>,
    num_meta_channels: &mut usize,
    params: &SqueezeParams,
) -> Result<()> {
    let (begin, end) = squeeze_range(params, channels.len())?;
    if begin < *num_meta_channels {
        if end >= *num_meta_channels {
            return Err(Error::MixingDifferentChannels);
        }
        if !params.in_place {
            return Err(Error::MetaSqueezeRequiresInPlace);
        }
        *num_meta_channels += end - begin + 1;
    }
    let offset = if params.in_place {
        end + 1
    } else {
        channels.len()
    };
    for c in begin..=end {
        let channel = &channels[c];
        if let Some((hs, vs)) = channel.shift {
            let shift = if params.horizontal { hs } else { vs };
            if shift > MAX_SHIFT {
                return Err(Error::TooManySqueezes(shift as i32));
            }
        }
        if channel.is_empty() {
            return Err(Error::SqueezeOfEmptyChannel);
        }
        let (w, h) = channel.size();
        let (avg_size, residual_size) = if params.horizontal {
            ((w.div_ceil(2), h), (w / 2, h))
        } else {
            ((w, h.div_ceil(2)), (w, h / 2))
        };
        let shift = channel.shift.map(|(hs, vs)| {
            if params.horizontal {
                (hs + 1, vs)
            } else {
                (hs, vs + 1)
            }
        });
        channels[c] = ModularChannel::new(avg_size, shift)?;
        channels.insert(
            offset + (c - begin),
            ModularChannel::new(residual_size, shift)?,
        );
    }
    Ok(())
}

/// Undoes one squeeze step: merges each averaged channel with its residual channel.
#[instrument(level = "debug", skip(channels), err)]
pub fn do_squeeze_step(
    channels: &mut Vec<ModularChannel>,
    num_meta_channels: &mut usize,
    params: &SqueezeParams,
) -> Result<()> {
    let (begin, end) = squeeze_range(params, channels.len())?;
    let num = end - begin + 1;
    let offset = if params.in_place {
        end + 1
    } else {
        channels.len() - num
    };
    if offset + num > channels.len() {
        return Err(Error::InvalidChannelRange(offset, offset + num, channels.len()));
    }
    if begin < *num_meta_channels {
        *num_meta_channels = num_meta_channels
            .checked_sub(num)
            .ok_or(Error::MixingDifferentChannels)?;
    }
    for c in begin..=end {
        let residual = &channels[offset + c - begin];
        let average = &channels[c];
        let (aw, ah) = average.size();
        let (rw, rh) = residual.size();
        let fits = if params.horizontal {
            ah == rh && aw >= rw && aw <= rw + 1
        } else {
            aw == rw && ah >= rh && ah <= rh + 1
        };
        if !fits {
            return Err(Error::InvalidSqueezeResidual(rw, rh, aw, ah));
        }
        let merged = if params.horizontal {
            inv_h_squeeze(average, residual)?
        } else {
            inv_v_squeeze(average, residual)?
        };
        trace!(c, ?merged, "unsqueezed");
        channels[c] = merged;
    }
    channels.drain(offset..offset + num);
    Ok(())
}

#[inline]
fn smooth_tendency(b: i64, a: i64, n: i64) -> i64 {
    let mut diff = 0;
    if b >= a && a >= n {
        diff = (4 * b - 3 * n - a + 6) / 12;
        if diff - (diff & 1) > 2 * (b - a) {
            diff = 2 * (b - a) + 1;
        }
        if diff + (diff & 1) > 2 * (a - n) {
            diff = 2 * (a - n);
        }
    } else if b <= a && a <= n {
        diff = (4 * b - 3 * n - a - 6) / 12;
        if diff + (diff & 1) < 2 * (b - a) {
            diff = 2 * (b - a) - 1;
        }
        if diff - (diff & 1) < 2 * (a - n) {
            diff = 2 * (a - n);
        }
    }
    diff
}

fn unsqueezed_shift(shift: Option<(usize, usize)>, horizontal: bool) -> Option<(usize, usize)> {
    shift.map(|(hs, vs)| {
        if horizontal {
            (hs.saturating_sub(1), vs)
        } else {
            (hs, vs.saturating_sub(1))
        }
    })
}

fn inv_h_squeeze(average: &ModularChannel, residual: &ModularChannel) -> Result<ModularChannel> {
    let (aw, h) = average.size();
    let rw = residual.size().0;
    let mut out = ModularChannel::new((aw + rw, h), unsqueezed_shift(average.shift, true))?;
    out.mark_decoded();
    if rw == 0 {
        out.data = average.data.try_clone()?;
        return Ok(out);
    }
    for y in 0..h {
        let avg_row = average.data.row(y);
        let res_row = residual.data.row(y);
        let out_row = out.data.row_mut(y);
        for x in 0..rw {
            let avg = avg_row[x] as i64;
            let next_avg = if x + 1 < aw { avg_row[x + 1] as i64 } else { avg };
            let left = if x > 0 { out_row[2 * x - 1] as i64 } else { avg };
            let diff = res_row[x] as i64 + smooth_tendency(left, avg, next_avg);
            let first = avg + diff / 2;
            out_row[2 * x] = first as i32;
            out_row[2 * x + 1] = (first - diff) as i32;
        }
        if aw > rw {
            out_row[2 * rw] = avg_row[rw];
        }
    }
    Ok(out)
}

fn inv_v_squeeze(average: &ModularChannel, residual: &ModularChannel) -> Result<ModularChannel> {
    let (w, ah) = average.size();
    let rh = residual.size().1;
    let mut out = ModularChannel::new((w, ah + rh), unsqueezed_shift(average.shift, false))?;
    out.mark_decoded();
    if rh == 0 {
        out.data = average.data.try_clone()?;
        return Ok(out);
    }
    let mut top_row = vec![0; w];
    for y in 0..rh {
        let avg_row = average.data.row(y);
        let next_row = average.data.row((y + 1).min(ah - 1));
        let res_row = residual.data.row(y);
        if y == 0 {
            top_row.copy_from_slice(avg_row);
        } else {
            top_row.copy_from_slice(out.data.row(2 * y - 1));
        }
        let mut first_row = vec![0; w];
        let mut second_row = vec![0; w];
        for x in 0..w {
            let avg = avg_row[x] as i64;
            let next_avg = if y + 1 < ah { next_row[x] as i64 } else { avg };
            let top = top_row[x] as i64;
            let diff = res_row[x] as i64 + smooth_tendency(top, avg, next_avg);
            let first = avg + diff / 2;
            first_row[x] = first as i32;
            second_row[x] = (first - diff) as i32;
        }
        out.data.row_mut(2 * y).copy_from_slice(&first_row);
        out.data.row_mut(2 * y + 1).copy_from_slice(&second_row);
    }
    if ah > rh {
        out.data.row_mut(2 * rh).copy_from_slice(average.data.row(rh));
    }
    Ok(out)
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Conversion of decoded integer channels to floating point samples.

use half::f16;

use crate::{
    error::{Error, Result},
    headers::bit_depth::BitDepth,
    image::Image,
    util::tracing_wrappers::*,
};

use super::{modular::ModularChannel, quantizer::LfQuantFactors};

/// Interprets the low `bits` bits of `v` as a float with `exp_bits` exponent bits, one sign
/// bit and the remaining bits of mantissa.
pub fn int_to_float(v: i32, bits: u32, exp_bits: u32) -> f32 {
    match (bits, exp_bits) {
        (32, 8) => f32::from_bits(v as u32),
        (16, 5) => f16::from_bits(v as u16).to_f32(),
        _ => rebias_float(v as u32, bits, exp_bits),
    }
}

fn rebias_float(v: u32, bits: u32, exp_bits: u32) -> f32 {
    let mant_bits = bits - exp_bits - 1;
    let sign = (v >> (bits - 1)) & 1;
    let mut mantissa = v & ((1 << mant_bits) - 1);
    let mut exponent = ((v >> mant_bits) & ((1 << exp_bits) - 1)) as i32;
    let max_exponent = (1 << exp_bits) - 1;
    let sign_bit = sign << 31;
    if exponent == max_exponent {
        // Infinity keeps a zero mantissa; any payload becomes a NaN.
        let payload = if mantissa != 0 { 1 << 22 } else { 0 };
        return f32::from_bits(sign_bit | 0x7f80_0000 | payload);
    }
    if exponent == 0 {
        if mantissa == 0 {
            return f32::from_bits(sign_bit);
        }
        // Subnormal: shift the mantissa until its leading one becomes implicit.
        exponent = 1;
        while mantissa & (1 << mant_bits) == 0 {
            exponent -= 1;
            mantissa <<= 1;
        }
        mantissa &= (1 << mant_bits) - 1;
    }
    let exp_bias = (1 << (exp_bits - 1)) - 1;
    let exponent = exponent - exp_bias + 127;
    // Header validation keeps mant_bits <= 23 and exp_bits <= 8.
    let mantissa = mantissa << (23 - mant_bits);
    if exponent <= 0 {
        // Subnormal in f32 too, only with 8 exponent bits.
        let denormal = ((1 << 23) | mantissa) >> (1 - exponent);
        return f32::from_bits(sign_bit | denormal);
    }
    f32::from_bits(sign_bit | ((exponent as u32) << 23) | mantissa)
}

fn convert_with(channel: &Image<i32>, f: impl Fn(i32) -> f32) -> Result<Image<f32>> {
    let size = channel.size();
    let mut out = Image::<f32>::new(size)?;
    for y in 0..size.1 {
        let (src, dst) = (channel.row(y), out.row_mut(y));
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = f(*s);
        }
    }
    Ok(out)
}

/// Converts one channel according to its bit depth: integers are scaled to `[0, 1]`, floats
/// are reinterpreted.
pub fn convert_channel(channel: &Image<i32>, bit_depth: &BitDepth) -> Result<Image<f32>> {
    let bits = bit_depth.bits_per_sample();
    if bit_depth.floating_point_sample() {
        let exp_bits = bit_depth.exponent_bits_per_sample();
        convert_with(channel, |v| int_to_float(v, bits, exp_bits))
    } else {
        let factor = 1.0 / ((1u64 << bits) - 1) as f32;
        convert_with(channel, |v| v as f32 * factor)
    }
}

/// Converts the XYB channels, coded in Y, X, B-Y order, to X, Y, B.
pub fn convert_xyb(
    channels: &[ModularChannel],
    lf_quant: &LfQuantFactors,
) -> Result<[Image<f32>; 3]> {
    let [y, x, b] = channels else {
        return Err(Error::ChannelCountMismatch(channels.len(), 3));
    };
    let [fx, fy, fb] = lf_quant.quant_factors;
    let out_x = convert_with(&x.data, |v| v as f32 * fx)?;
    let out_y = convert_with(&y.data, |v| v as f32 * fy)?;
    let size = b.size();
    let mut out_b = Image::<f32>::new(size)?;
    for row in 0..size.1 {
        let (rb, ry, out) = (b.data.row(row), y.data.row(row), out_b.row_mut(row));
        for ((o, vb), vy) in out.iter_mut().zip(rb).zip(ry) {
            *o = (vb.wrapping_add(*vy)) as f32 * fb;
        }
    }
    Ok([out_x, out_y, out_b])
}

/// Converts the channels of a decoded frame. The first `color_channels` channels are color,
/// the rest are extra channels with the matching entries of `ec_bit_depths`.
#[instrument(level = "debug", skip(channels, lf_quant, ec_bit_depths), err)]
pub fn convert_frame(
    channels: &[ModularChannel],
    color_channels: usize,
    xyb: bool,
    lf_quant: &LfQuantFactors,
    bit_depth: &BitDepth,
    ec_bit_depths: &[BitDepth],
) -> Result<Vec<Image<f32>>> {
    let expected = color_channels + ec_bit_depths.len();
    if channels.len() != expected {
        return Err(Error::ChannelCountMismatch(channels.len(), expected));
    }
    let (color, extra) = channels.split_at(color_channels);
    let mut out = Vec::with_capacity(expected);
    if xyb {
        out.extend(convert_xyb(color, lf_quant)?);
    } else {
        for channel in color {
            out.push(convert_channel(&channel.data, bit_depth)?);
        }
    }
    for (channel, ec_bit_depth) in extra.iter().zip(ec_bit_depths) {
        out.push(convert_channel(&channel.data, ec_bit_depth)?);
    }
    trace!(num_channels = out.len(), "converted to float");
    Ok(out)
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use color_eyre::eyre::{Result, eyre};
use jxl_modular::DecodedImage;

const MAGIC: [u8; 8] = [0x93, b'N', b'U', b'M', b'P', b'Y', 0x01, 0x00];

fn numpy_header(xsize: usize, ysize: usize, num_channels: usize, num_frames: usize) -> Vec<u8> {
    // '<f4' is little-endian 32-bit float.
    let mut dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': \
         ({num_frames}, {ysize}, {xsize}, {num_channels}), }}"
    );
    // Magic, 2 length bytes, dict and the final newline are padded to a multiple of 16.
    let unpadded = MAGIC.len() + 2 + dict.len() + 1;
    dict.extend(std::iter::repeat_n(' ', (16 - unpadded % 16) % 16));
    dict.push('\n');

    let mut header = MAGIC.to_vec();
    header.extend_from_slice(&(dict.len() as u16).to_le_bytes());
    header.extend_from_slice(dict.as_bytes());
    header
}

/// Converts all the frames of `image` to a .npy array of shape
/// (num_frames, height, width, num_channels), with samples as decoded.
pub fn to_numpy(image: &DecodedImage) -> Result<Vec<u8>> {
    let (xsize, ysize) = image.size;
    let num_channels = image.frames.first().map_or(0, |f| f.channels.len());
    if num_channels == 0 || xsize == 0 || ysize == 0 {
        return Err(eyre!("Nothing to write"));
    }
    for frame in &image.frames {
        if frame.channels.len() != num_channels
            || frame.channels.iter().any(|c| c.size() != image.size)
        {
            return Err(eyre!("Frames have different shapes"));
        }
    }

    let mut ret = numpy_header(xsize, ysize, num_channels, image.frames.len());
    for frame in &image.frames {
        for y in 0..ysize {
            for x in 0..xsize {
                for channel in &frame.channels {
                    ret.extend_from_slice(&channel.row(y)[x].to_le_bytes());
                }
            }
        }
    }
    Ok(ret)
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use color_eyre::eyre::{Result, eyre};
use jxl_modular::image::Image;

pub fn to_u8_for_writing(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

pub fn to_pgm_as_8bit(img: &Image<f32>) -> Vec<u8> {
    let (xsize, ysize) = img.size();
    let mut ret = format!("P5\n{xsize} {ysize}\n255\n").into_bytes();
    ret.extend(
        (0..ysize)
            .flat_map(|y| img.row(y).iter())
            .map(|&v| to_u8_for_writing(v)),
    );
    ret
}

pub fn to_ppm_as_8bit(img: &[Image<f32>]) -> Result<Vec<u8>> {
    let [r, g, b] = img else {
        return Err(eyre!("PPM needs 3 channels, got {}", img.len()));
    };
    let (xsize, ysize) = r.size();
    if g.size() != r.size() || b.size() != r.size() {
        return Err(eyre!("Channel sizes differ"));
    }
    let mut ret = format!("P6\n{xsize} {ysize}\n255\n").into_bytes();
    for y in 0..ysize {
        for ((&r, &g), &b) in r.row(y).iter().zip(g.row(y)).zip(b.row(y)) {
            ret.extend([r, g, b].map(to_u8_for_writing));
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn convert_to_pgm() -> Result<()> {
        let image = Image::<f32>::new((32, 32))?;
        let pgm = to_pgm_as_8bit(&image);
        assert!(pgm.starts_with(b"P5\n32 32\n255\n"));
        assert_eq!(pgm.len(), 13 + 32 * 32);
        Ok(())
    }

    #[test]
    fn convert_to_ppm() -> Result<()> {
        let mut channels = vec![];
        for v in [0.0, 0.5, 1.0] {
            let mut image = Image::<f32>::new((2, 1))?;
            image.row_mut(0).fill(v);
            channels.push(image);
        }
        let ppm = to_ppm_as_8bit(&channels)?;
        assert_eq!(&ppm[..], b"P6\n2 1\n255\n\x00\x80\xff\x00\x80\xff");
        assert!(to_ppm_as_8bit(&channels[..2]).is_err());
        Ok(())
    }

    #[test]
    fn f32_to_u8() {
        let epsilon = 1e-4f32;
        for want_u8 in 0x00u8..0xffu8 {
            let threshold = 1f32 / 510f32 + (1f32 / 255f32) * (want_u8 as f32);
            assert_eq!(to_u8_for_writing(threshold - epsilon), want_u8);
            assert_eq!(to_u8_for_writing(threshold + epsilon), want_u8 + 1);
        }
        assert_eq!(to_u8_for_writing(-3.0), 0);
        assert_eq!(to_u8_for_writing(7.0), 255);
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

#![allow(clippy::excessive_precision)]

use crate::{
    error::{Error, Result},
    headers::{encodings::*, extra_channels::ExtraChannelInfo},
    util::CeilLog2,
};

use jxl_macros::UnconditionalCoder;
use num_derive::FromPrimitive;

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum FrameType {
    RegularFrame = 0,
    LFFrame = 1,
    ReferenceOnly = 2,
    SkipProgressive = 3,
}

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum Encoding {
    VarDCT = 0,
    Modular = 1,
}

struct Flags;

#[allow(dead_code)]
impl Flags {
    pub const ENABLE_NOISE: u64 = 1;
    pub const ENABLE_PATCHES: u64 = 2;
    pub const ENABLE_SPLINES: u64 = 0x10;
    pub const USE_LF_FRAME: u64 = 0x20;
    pub const SKIP_ADAPTIVE_LF_SMOOTHING: u64 = 0x80;
}

#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
#[validate]
pub struct Passes {
    #[coder(u2S(1, 2, 3, Bits(3) + 4))]
    #[default(1)]
    pub num_passes: u32,

    #[coder(u2S(0, 1, 2, Bits(1) + 3))]
    #[default(0)]
    #[condition(num_passes != 1)]
    pub num_ds: u32,

    #[size_coder(explicit(num_passes - 1))]
    #[coder(Bits(2))]
    #[default_element(0)]
    #[condition(num_passes != 1)]
    pub shift: Vec<u32>,

    #[size_coder(explicit(num_ds))]
    #[coder(u2S(1, 2, 4, 8))]
    #[default_element(1)]
    #[condition(num_passes != 1)]
    pub downsample: Vec<u32>,

    #[size_coder(explicit(num_ds))]
    #[coder(u2S(0, 1, 2, Bits(3)))]
    #[default_element(0)]
    #[condition(num_passes != 1)]
    pub last_pass: Vec<u32>,
}

impl Passes {
    fn check(&self, _: &Empty) -> Result<()> {
        if self.num_ds >= self.num_passes {
            return Err(Error::NumPassesTooLarge(self.num_ds, self.num_passes));
        }
        if self.last_pass.iter().any(|&p| p >= self.num_passes) {
            return Err(Error::NumPassesTooLarge(self.num_ds, self.num_passes));
        }
        Ok(())
    }

    /// Range of channel shifts `(min_shift, max_shift)` whose samples are sent in pass `pass`.
    /// Channels are assigned to the first pass whose range contains their shift; the last pass
    /// covers everything down to shift 0.
    pub fn downsampling_bracket(&self, pass: usize) -> (i32, i32) {
        let mut max_shift = 2;
        let mut min_shift = 3;
        for i in 0..self.num_passes as usize {
            for (&downsample, &last_pass) in self.downsample.iter().zip(self.last_pass.iter()) {
                if i == last_pass as usize {
                    min_shift = downsample.ceil_log2() as i32;
                }
            }
            if i + 1 == self.num_passes as usize {
                min_shift = 0;
            }
            if i == pass {
                return (min_shift, max_shift);
            }
            max_shift = min_shift - 1;
        }
        (0, max_shift)
    }
}

#[derive(UnconditionalCoder, Copy, Clone, PartialEq, Debug, FromPrimitive)]
pub enum BlendingMode {
    Replace = 0,
    Add = 1,
    Blend = 2,
    AlphaWeightedAdd = 3,
    Mul = 4,
}

pub struct BlendingInfoNonserialized {
    num_extra_channels: u32,
    full_frame: bool,
}

#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
#[nonserialized(BlendingInfoNonserialized)]
pub struct BlendingInfo {
    #[coder(u2S(0, 1, 2, Bits(2) + 3))]
    #[default(BlendingMode::Replace)]
    pub mode: BlendingMode,

    #[coder(u2S(0, 1, 2, Bits(3) + 3))]
    #[default(0)]
    #[condition(nonserialized.num_extra_channels > 0 &&
        (mode == BlendingMode::Blend || mode == BlendingMode::AlphaWeightedAdd))]
    pub alpha_channel: u32,

    #[default(false)]
    #[condition(nonserialized.num_extra_channels > 0 &&
        (mode == BlendingMode::Blend || mode == BlendingMode::AlphaWeightedAdd || mode == BlendingMode::Mul))]
    pub clamp: bool,

    #[coder(u2S(0, 1, 2, 3))]
    #[default(0)]
    #[condition(mode != BlendingMode::Replace || !nonserialized.full_frame)]
    pub source: u32,
}

pub struct RestorationFilterNonserialized {
    encoding: Encoding,
}

/// Loop filter parameters. Only stored: Modular frames are not filtered here.
#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
#[nonserialized(RestorationFilterNonserialized)]
pub struct RestorationFilter {
    #[all_default]
    #[default(true)]
    all_default: bool,

    #[default(true)]
    pub gab: bool,

    #[default(false)]
    #[condition(gab)]
    gab_custom: bool,

    #[default(0.115169525)]
    #[condition(gab_custom)]
    gab_x_weight1: f32,

    #[default(0.061248592)]
    #[condition(gab_custom)]
    gab_x_weight2: f32,

    #[default(0.115169525)]
    #[condition(gab_custom)]
    gab_y_weight1: f32,

    #[default(0.061248592)]
    #[condition(gab_custom)]
    gab_y_weight2: f32,

    #[default(0.115169525)]
    #[condition(gab_custom)]
    gab_b_weight1: f32,

    #[default(0.061248592)]
    #[condition(gab_custom)]
    gab_b_weight2: f32,

    #[coder(Bits(2))]
    #[default(2)]
    pub epf_iters: u32,

    #[default(false)]
    #[condition(epf_iters > 0 && nonserialized.encoding == Encoding::VarDCT)]
    epf_sharp_custom: bool,

    #[default([0.0, 1.0 / 7.0, 2.0 / 7.0, 3.0 / 7.0, 4.0 / 7.0, 5.0 / 7.0, 6.0 / 7.0, 1.0])]
    #[condition(epf_sharp_custom)]
    epf_sharp_lut: [f32; 8],

    #[default(false)]
    #[condition(epf_iters > 0)]
    epf_weight_custom: bool,

    #[default([40.0, 5.0, 3.5])]
    #[condition(epf_weight_custom)]
    epf_channel_scale: [f32; 3],

    #[default(0.45)]
    #[condition(epf_weight_custom)]
    epf_pass1_zeroflush: f32,

    #[default(0.6)]
    #[condition(epf_weight_custom)]
    epf_pass2_zeroflush: f32,

    #[default(false)]
    #[condition(epf_iters > 0)]
    epf_sigma_custom: bool,

    #[default(0.46)]
    #[condition(epf_sigma_custom && nonserialized.encoding == Encoding::VarDCT)]
    epf_quant_mul: f32,

    #[default(0.9)]
    #[condition(epf_sigma_custom)]
    epf_pass0_sigma_scale: f32,

    #[default(6.5)]
    #[condition(epf_sigma_custom)]
    epf_pass2_sigma_scale: f32,

    #[default(2.0 / 3.0)]
    #[condition(epf_sigma_custom)]
    epf_border_sad_mul: f32,

    #[default(1.0)]
    #[condition(epf_iters > 0 && nonserialized.encoding == Encoding::Modular)]
    epf_sigma_for_modular: f32,

    #[default(Extensions::default())]
    extensions: Extensions,
}

#[derive(Clone, Debug, Default)]
pub struct FrameHeaderNonserialized {
    pub xyb_encoded: bool,
    pub num_extra_channels: u32,
    pub extra_channel_info: Vec<ExtraChannelInfo>,
    pub have_animation: bool,
    pub have_timecode: bool,
    pub img_width: u32,
    pub img_height: u32,
}

#[derive(UnconditionalCoder, Debug, PartialEq, Clone)]
#[nonserialized(FrameHeaderNonserialized)]
#[aligned]
#[validate]
pub struct FrameHeader {
    #[all_default]
    #[default(true)]
    all_default: bool,

    #[default(FrameType::RegularFrame)]
    pub frame_type: FrameType,

    #[coder(Bits(1))]
    #[default(Encoding::VarDCT)]
    pub encoding: Encoding,

    #[default(0)]
    flags: u64,

    #[default(false)]
    #[condition(!nonserialized.xyb_encoded)]
    pub do_ycbcr: bool,

    #[coder(Bits(2))]
    #[default([0, 0, 0])]
    #[condition(do_ycbcr && flags & Flags::USE_LF_FRAME == 0)]
    pub jpeg_upsampling: [u32; 3],

    #[coder(u2S(1, 2, 4, 8))]
    #[default(1)]
    #[condition(flags & Flags::USE_LF_FRAME == 0)]
    pub upsampling: u32,

    #[size_coder(explicit(nonserialized.num_extra_channels))]
    #[coder(u2S(1, 2, 4, 8))]
    #[default_element(1)]
    #[condition(flags & Flags::USE_LF_FRAME == 0)]
    pub ec_upsampling: Vec<u32>,

    #[coder(Bits(2))]
    #[default(1)]
    #[condition(encoding == Encoding::Modular)]
    pub group_size_shift: u32,

    #[coder(Bits(3))]
    #[default(3)]
    #[condition(encoding == Encoding::VarDCT && nonserialized.xyb_encoded)]
    x_qm_scale: u32,

    #[coder(Bits(3))]
    #[default(2)]
    #[condition(encoding == Encoding::VarDCT && nonserialized.xyb_encoded)]
    b_qm_scale: u32,

    #[condition(frame_type != FrameType::ReferenceOnly)]
    #[default(Passes::default(&field_nonserialized))]
    pub passes: Passes,

    #[coder(u2S(1, 2, 3, 4))]
    #[default(0)]
    #[condition(frame_type == FrameType::LFFrame)]
    pub lf_level: u32,

    #[default(false)]
    #[condition(frame_type != FrameType::LFFrame)]
    pub have_crop: bool,

    #[coder(u2S(Bits(8), Bits(11) + 256, Bits(14) + 2304, Bits(30) + 18688))]
    #[default(0)]
    #[condition(have_crop && frame_type != FrameType::ReferenceOnly)]
    pub x0: i32,

    #[coder(u2S(Bits(8), Bits(11) + 256, Bits(14) + 2304, Bits(30) + 18688))]
    #[default(0)]
    #[condition(have_crop && frame_type != FrameType::ReferenceOnly)]
    pub y0: i32,

    // Without a crop, the frame covers the whole image.
    #[coder(u2S(Bits(8), Bits(11) + 256, Bits(14) + 2304, Bits(30) + 18688))]
    #[default(nonserialized.img_width)]
    #[condition(have_crop)]
    pub width: u32,

    #[coder(u2S(Bits(8), Bits(11) + 256, Bits(14) + 2304, Bits(30) + 18688))]
    #[default(nonserialized.img_height)]
    #[condition(have_crop)]
    pub height: u32,

    #[default(BlendingInfo::default(&field_nonserialized))]
    #[condition(frame_type == FrameType::RegularFrame || frame_type == FrameType::SkipProgressive)]
    #[nonserialized(num_extra_channels: nonserialized.num_extra_channels,
        full_frame: is_full_frame(have_crop, x0, y0, width, height, nonserialized))]
    pub blending_info: BlendingInfo,

    #[size_coder(explicit(nonserialized.num_extra_channels))]
    #[default_element(BlendingInfo::default(&field_nonserialized))]
    #[condition(frame_type == FrameType::RegularFrame || frame_type == FrameType::SkipProgressive)]
    #[nonserialized(num_extra_channels: nonserialized.num_extra_channels,
        full_frame: is_full_frame(have_crop, x0, y0, width, height, nonserialized))]
    pub ec_blending_info: Vec<BlendingInfo>,

    #[coder(u2S(0, 1, Bits(8), Bits(32)))]
    #[default(0)]
    #[condition((frame_type == FrameType::RegularFrame ||
        frame_type == FrameType::SkipProgressive) && nonserialized.have_animation)]
    pub duration: u32,

    #[coder(Bits(32))]
    #[default(0)]
    #[condition((frame_type == FrameType::RegularFrame ||
        frame_type == FrameType::SkipProgressive) && nonserialized.have_timecode)]
    pub timecode: u32,

    #[default(frame_type == FrameType::RegularFrame)]
    #[condition(frame_type == FrameType::RegularFrame || frame_type == FrameType::SkipProgressive)]
    pub is_last: bool,

    #[coder(Bits(2))]
    #[default(0)]
    #[condition(frame_type != FrameType::LFFrame && !is_last)]
    pub save_as_reference: u32,

    #[default(frame_type == FrameType::LFFrame)]
    #[condition(frame_type == FrameType::ReferenceOnly ||
        (is_full_frame(have_crop, x0, y0, width, height, nonserialized) &&
         (frame_type == FrameType::RegularFrame || frame_type == FrameType::SkipProgressive) &&
         blending_info.mode == BlendingMode::Replace &&
         (duration == 0 || save_as_reference != 0) && !is_last))]
    pub save_before_ct: bool,

    pub name: String,

    #[default(RestorationFilter::default(&field_nonserialized))]
    #[nonserialized(encoding: encoding)]
    pub restoration_filter: RestorationFilter,

    #[default(Extensions::default())]
    extensions: Extensions,
}

fn is_full_frame(
    have_crop: bool,
    x0: i32,
    y0: i32,
    width: u32,
    height: u32,
    nonserialized: &FrameHeaderNonserialized,
) -> bool {
    !have_crop
        || (x0 <= 0
            && y0 <= 0
            && width as i64 + x0 as i64 >= nonserialized.img_width as i64
            && height as i64 + y0 as i64 >= nonserialized.img_height as i64)
}

impl FrameHeader {
    fn check(&self, nonserialized: &FrameHeaderNonserialized) -> Result<()> {
        if self.upsampling > 1 {
            if let Some((info, upsampling)) = nonserialized
                .extra_channel_info
                .iter()
                .zip(&self.ec_upsampling)
                .find(|(info, ec_upsampling)| {
                    ((*ec_upsampling << info.dim_shift()) < self.upsampling)
                        || (**ec_upsampling > 8)
                })
            {
                return Err(Error::InvalidEcUpsampling(
                    self.upsampling,
                    info.dim_shift(),
                    *upsampling,
                ));
            }
        }
        Ok(())
    }

    pub fn log_group_dim(&self) -> usize {
        7 + self.group_size_shift as usize
    }

    pub fn group_dim(&self) -> usize {
        1 << self.log_group_dim()
    }

    pub fn lf_group_dim(&self) -> usize {
        self.group_dim() * 8
    }

    /// Frame size in samples, before upsampling.
    pub fn size_upsampled(&self) -> (usize, usize) {
        let shift = 3 * self.lf_level as usize;
        (
            (self.width as usize).div_ceil(1 << shift),
            (self.height as usize).div_ceil(1 << shift),
        )
    }

    /// Size of the coded color channels.
    pub fn size(&self) -> (usize, usize) {
        let (xsize, ysize) = self.size_upsampled();
        let upsampling = self.upsampling as usize;
        (xsize.div_ceil(upsampling), ysize.div_ceil(upsampling))
    }

    pub fn size_groups(&self) -> (usize, usize) {
        let (xsize, ysize) = self.size();
        (
            xsize.div_ceil(self.group_dim()),
            ysize.div_ceil(self.group_dim()),
        )
    }

    pub fn size_lf_groups(&self) -> (usize, usize) {
        let (xsize, ysize) = self.size();
        (
            xsize.div_ceil(self.lf_group_dim()),
            ysize.div_ceil(self.lf_group_dim()),
        )
    }

    pub fn num_groups(&self) -> usize {
        let (x, y) = self.size_groups();
        x * y
    }

    pub fn num_lf_groups(&self) -> usize {
        let (x, y) = self.size_lf_groups();
        x * y
    }

    pub fn num_passes(&self) -> usize {
        self.passes.num_passes as usize
    }

    pub fn num_toc_entries(&self) -> usize {
        let num_groups = self.num_groups();
        let num_passes = self.num_passes();
        if num_groups == 1 && num_passes == 1 {
            1
        } else {
            1 + self.num_lf_groups() + 1 + num_groups * num_passes
        }
    }

    /// Upsampling factor of extra channel `index`, relative to the upsampled frame.
    pub fn ec_upsampling_with_shift(&self, index: usize, info: &ExtraChannelInfo) -> usize {
        let upsampling = self.ec_upsampling.get(index).copied().unwrap_or(1) as usize;
        upsampling << info.dim_shift()
    }

    pub fn has_noise(&self) -> bool {
        self.flags & Flags::ENABLE_NOISE != 0
    }

    pub fn has_patches(&self) -> bool {
        self.flags & Flags::ENABLE_PATCHES != 0
    }

    pub fn has_splines(&self) -> bool {
        self.flags & Flags::ENABLE_SPLINES != 0
    }

    pub fn has_lf_frame(&self) -> bool {
        self.flags & Flags::USE_LF_FRAME != 0
    }

    /// Whether the frame is shown on its own, as opposed to being only a reference for later
    /// frames or a part of an animation step that is not displayed.
    pub fn is_visible(&self) -> bool {
        (self.frame_type == FrameType::RegularFrame
            || self.frame_type == FrameType::SkipProgressive)
            && (self.is_last || self.duration > 0)
    }

    /// Whether showing the frame requires combining it with previously decoded frames.
    pub fn needs_blending(&self) -> bool {
        self.have_crop
            || self.blending_info.mode != BlendingMode::Replace
            || self
                .ec_blending_info
                .iter()
                .any(|info| info.mode != BlendingMode::Replace)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bit_reader::BitReader;
    use crate::util::test::BitWriter;
    use test_log::test;

    fn nonserialized(width: u32, height: u32) -> FrameHeaderNonserialized {
        FrameHeaderNonserialized {
            img_width: width,
            img_height: height,
            ..Default::default()
        }
    }

    /// Writes a modular frame header with a single pass and no crop.
    fn write_modular_header(w: &mut BitWriter, group_size_shift: u64, is_last: bool) {
        w.write(1, 0);
        w.write_enum(FrameType::RegularFrame as u32);
        w.write(1, 1);
        // flags
        w.write_u64(0);
        // do_ycbcr
        w.write(1, 0);
        // upsampling = 1
        w.write(2, 0);
        w.write(2, group_size_shift);
        // num_passes = 1
        w.write(2, 0);
        // have_crop
        w.write(1, 0);
        // blending mode = Replace
        w.write(2, 0);
        w.write(1, is_last as u64);
        if !is_last {
            // save_as_reference, save_before_ct
            w.write(2, 0);
            w.write(1, 0);
        }
        // empty name
        w.write(2, 0);
        // restoration filter: all default
        w.write(1, 1);
        // extensions
        w.write_u64(0);
    }

    fn read_header(data: &[u8], ns: &FrameHeaderNonserialized) -> FrameHeader {
        let mut br = BitReader::new(data);
        FrameHeader::read_unconditional(&(), &mut br, ns).unwrap()
    }

    #[test]
    fn all_default_frame() {
        let header = read_header(&[1], &nonserialized(100, 50));
        assert_eq!(header.encoding, Encoding::VarDCT);
        assert!(header.is_last);
        assert!(header.is_visible());
        assert_eq!(header.size(), (100, 50));
        assert_eq!(header.group_dim(), 256);
        assert_eq!(header.num_toc_entries(), 1);
    }

    #[test]
    fn modular_frame_geometry() {
        let mut w = BitWriter::new();
        write_modular_header(&mut w, 0, true);
        let header = read_header(&w.finish(), &nonserialized(300, 200));
        assert!(header.is_modular());
        assert_eq!(header.group_dim(), 128);
        assert_eq!(header.lf_group_dim(), 1024);
        assert_eq!(header.size_groups(), (3, 2));
        assert_eq!(header.num_groups(), 6);
        assert_eq!(header.num_lf_groups(), 1);
        assert_eq!(header.num_toc_entries(), 1 + 1 + 1 + 6);
        assert!(!header.needs_blending());
        assert!(!header.has_patches());
    }

    #[test]
    fn non_last_frame_is_not_visible() {
        let mut w = BitWriter::new();
        write_modular_header(&mut w, 1, false);
        let header = read_header(&w.finish(), &nonserialized(16, 16));
        assert!(!header.is_last);
        assert!(!header.is_visible());
        assert_eq!(header.num_toc_entries(), 1);
    }

    #[test]
    fn downsampling_brackets() {
        let passes = Passes {
            num_passes: 3,
            num_ds: 2,
            shift: vec![0, 0],
            downsample: vec![4, 2],
            last_pass: vec![0, 1],
        };
        assert_eq!(passes.downsampling_bracket(0), (2, 2));
        assert_eq!(passes.downsampling_bracket(1), (1, 1));
        assert_eq!(passes.downsampling_bracket(2), (0, 0));

        let single = Passes::default(&Empty {});
        assert_eq!(single.downsampling_bracket(0), (0, 2));
    }
}

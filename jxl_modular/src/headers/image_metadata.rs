// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jxl_macros::UnconditionalCoder;

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::{
        bit_depth::BitDepth,
        color_encoding::ColorEncoding,
        encodings::*,
        extra_channels::ExtraChannelInfo,
        size::{Preview, Size},
    },
};

/// The two bytes every bare codestream starts with.
#[derive(Debug, Clone, Copy)]
pub struct Signature;

impl Signature {
    #[allow(clippy::should_implement_trait)]
    pub fn default(_: &Empty) -> Signature {
        Signature
    }
}

impl UnconditionalCoder<()> for Signature {
    type Nonserialized = Empty;
    fn read_unconditional(_: &(), br: &mut BitReader, _: &Empty) -> Result<Signature> {
        let sig1 = br.read(8)? as u8;
        let sig2 = br.read(8)? as u8;
        if (sig1, sig2) != (0xff, 0x0a) {
            Err(Error::InvalidSignature(sig1, sig2))
        } else {
            Ok(Signature)
        }
    }
}

#[derive(UnconditionalCoder, Debug, Clone)]
pub struct Animation {
    #[coder(u2S(100, 1000, Bits(10) + 1, Bits(30) + 1))]
    pub tps_numerator: u32,
    #[coder(u2S(1, 1001, Bits(8) + 1, Bits(10) + 1))]
    pub tps_denominator: u32,
    #[coder(u2S(0, Bits(3), Bits(16), Bits(32)))]
    pub num_loops: u32,
    pub have_timecodes: bool,
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[validate]
pub struct ToneMapping {
    #[all_default]
    pub all_default: bool,
    #[default(255.0)]
    pub intensity_target: f32,
    #[default(0.0)]
    pub min_nits: f32,
    #[default(false)]
    pub relative_to_max_display: bool,
    #[default(0.0)]
    pub linear_below: f32,
}

impl ToneMapping {
    fn check(&self, _: &Empty) -> Result<()> {
        if self.intensity_target <= 0.0 {
            return Err(Error::InvalidIntensityTarget(self.intensity_target));
        }
        if self.min_nits < 0.0 || self.min_nits > self.intensity_target {
            return Err(Error::InvalidMinNits(self.min_nits));
        }
        if self.linear_below < 0.0 || (self.relative_to_max_display && self.linear_below > 1.0) {
            return Err(Error::InvalidLinearBelow(
                self.relative_to_max_display,
                self.linear_below,
            ));
        }
        Ok(())
    }
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[allow(dead_code)]
pub struct ImageMetadata {
    #[all_default]
    #[allow(dead_code)]
    all_default: bool,
    #[default(false)]
    extra_fields: bool,
    #[condition(extra_fields)]
    #[default(1)]
    #[coder(Bits(3) + 1)]
    pub orientation: u32,
    #[condition(extra_fields)]
    #[default(false)]
    have_intrinsic_size: bool,
    #[condition(have_intrinsic_size)]
    pub intrinsic_size: Option<Size>,
    #[condition(extra_fields)]
    #[default(false)]
    have_preview: bool,
    #[condition(have_preview)]
    pub preview: Option<Preview>,
    #[condition(extra_fields)]
    #[default(false)]
    have_animation: bool,
    #[condition(have_animation)]
    pub animation: Option<Animation>,
    #[default(BitDepth::default(&field_nonserialized))]
    pub bit_depth: BitDepth,
    #[default(true)]
    pub modular_16bit_sufficient: bool,
    #[coder(u2S(0, 1, Bits(4) + 2, Bits(12) + 1))]
    #[default(0)]
    num_extra_channels: u32,
    #[size_coder(explicit(num_extra_channels))]
    pub extra_channel_info: Vec<ExtraChannelInfo>,
    #[default(true)]
    pub xyb_encoded: bool,
    #[default(ColorEncoding::default(&field_nonserialized))]
    pub color_encoding: ColorEncoding,
    #[condition(extra_fields)]
    #[default(ToneMapping::default(&field_nonserialized))]
    pub tone_mapping: ToneMapping,
    #[default(Extensions::default())]
    pub extensions: Extensions,
}

#[derive(UnconditionalCoder, Debug, Clone)]
#[allow(clippy::excessive_precision)]
pub struct OpsinInverseMatrix {
    #[all_default]
    #[allow(dead_code)]
    all_default: bool,
    #[default([11.031566901960783, -9.866943921568629, -0.16462299647058826,
               -3.254147380392157, 4.418770392156863, -0.16462299647058826,
               -3.6588512862745097, 2.7129230470588235, 1.9459282392156863])]
    pub inverse_matrix: [f32; 9],
    #[default([-0.0037930732552754493; 3])]
    pub opsin_biases: [f32; 3],
    #[default([1.0 - 0.05465007330715401, 1.0 - 0.07005449891748593, 1.0 - 0.049935103337343655, 0.145])]
    pub quant_biases: [f32; 4],
}

#[derive(Default)]
pub struct CustomTransformDataNonserialized {
    pub xyb_encoded: bool,
}

/// Decoding parameters that follow the image metadata. Only stored: none of them affect
/// Modular decoding.
#[derive(UnconditionalCoder, Debug, Clone)]
#[nonserialized(CustomTransformDataNonserialized)]
#[allow(dead_code)]
pub struct CustomTransformData {
    #[all_default]
    #[allow(dead_code)]
    all_default: bool,
    #[condition(nonserialized.xyb_encoded)]
    #[default(OpsinInverseMatrix::default(&field_nonserialized))]
    pub opsin_inverse_matrix: OpsinInverseMatrix,
    #[coder(Bits(3))]
    #[default(0)]
    custom_weight_mask: u32,
    #[condition(custom_weight_mask & 1 != 0)]
    pub upsampling2_weights: Option<[f32; 15]>,
    #[condition(custom_weight_mask & 2 != 0)]
    pub upsampling4_weights: Option<[f32; 55]>,
    #[condition(custom_weight_mask & 4 != 0)]
    pub upsampling8_weights: Option<[f32; 210]>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::headers::JxlHeader;
    use crate::util::test::BitWriter;
    use test_log::test;

    #[test]
    fn all_default_metadata() {
        let data = [1u8];
        let metadata = ImageMetadata::read(&mut BitReader::new(&data)).unwrap();
        assert!(metadata.xyb_encoded);
        assert!(metadata.extra_channel_info.is_empty());
        assert_eq!(metadata.bit_depth.bits_per_sample(), 8);
        assert_eq!(metadata.orientation, 1);
        assert!(metadata.preview.is_none());
    }

    #[test]
    fn signature_is_checked() {
        let data = [0xff, 0x0b];
        assert!(matches!(
            Signature::read(&mut BitReader::new(&data)),
            Err(Error::InvalidSignature(0xff, 0x0b))
        ));
    }

    #[test]
    fn metadata_with_alpha() {
        let mut w = BitWriter::new();
        // all_default, extra_fields
        w.write(1, 0);
        w.write(1, 0);
        // 8 bit integer samples
        w.write(1, 0);
        w.write(2, 0);
        // modular_16bit_sufficient
        w.write(1, 1);
        // One extra channel, all default (8-bit alpha).
        w.write(2, 1);
        w.write(1, 1);
        // xyb_encoded = false, color encoding all default
        w.write(1, 0);
        w.write(1, 1);
        // No extensions.
        w.write_u64(0);
        let data = w.finish();
        let metadata = ImageMetadata::read(&mut BitReader::new(&data)).unwrap();
        assert!(!metadata.xyb_encoded);
        assert_eq!(metadata.extra_channel_info.len(), 1);
        assert_eq!(metadata.tone_mapping.intensity_target, 255.0);
    }

    #[test]
    fn transform_data_reads_weights() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(3, 1);
        for _ in 0..15 {
            // f16 0.5
            w.write(16, 0x3800);
        }
        let data = w.finish();
        let transform_data = CustomTransformData::read_unconditional(
            &(),
            &mut BitReader::new(&data),
            &CustomTransformDataNonserialized { xyb_encoded: false },
        )
        .unwrap();
        assert_eq!(transform_data.upsampling2_weights, Some([0.5; 15]));
        assert!(transform_data.upsampling4_weights.is_none());
    }
}

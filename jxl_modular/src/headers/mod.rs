// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

pub mod bit_depth;
pub mod color_encoding;
pub mod encodings;
pub mod extra_channels;
pub mod frame_header;
pub mod image_metadata;
pub mod modular;
pub mod permutation;
pub mod size;
pub mod toc;

use crate::{bit_reader::BitReader, error::Result, headers::encodings::*};
use jxl_macros::UnconditionalCoder;

pub use image_metadata::*;
pub use size::Size;

#[derive(UnconditionalCoder, Debug)]
pub struct FileHeader {
    #[allow(dead_code)]
    signature: Signature,
    pub size: Size,
    pub image_metadata: ImageMetadata,
    #[nonserialized(xyb_encoded: image_metadata.xyb_encoded)]
    pub transform_data: CustomTransformData,
}

impl FileHeader {
    /// Parameters of the frame headers that follow this file header.
    pub fn frame_header_nonserialized(&self) -> frame_header::FrameHeaderNonserialized {
        let metadata = &self.image_metadata;
        frame_header::FrameHeaderNonserialized {
            xyb_encoded: metadata.xyb_encoded,
            num_extra_channels: metadata.extra_channel_info.len() as u32,
            extra_channel_info: metadata.extra_channel_info.clone(),
            have_animation: metadata.animation.is_some(),
            have_timecode: metadata
                .animation
                .as_ref()
                .is_some_and(|animation| animation.have_timecodes),
            img_width: self.size.xsize(),
            img_height: self.size.ysize(),
        }
    }

    /// Same as [`FileHeader::frame_header_nonserialized`], for the preview frame.
    pub fn preview_frame_header_nonserialized(
        &self,
    ) -> Option<frame_header::FrameHeaderNonserialized> {
        let preview = self.image_metadata.preview.as_ref()?;
        Some(frame_header::FrameHeaderNonserialized {
            img_width: preview.xsize(),
            img_height: preview.ysize(),
            ..self.frame_header_nonserialized()
        })
    }
}

pub trait JxlHeader
where
    Self: Sized,
{
    fn read(br: &mut BitReader) -> Result<Self>;
}

impl<T> JxlHeader for T
where
    T: UnconditionalCoder<()>,
    T::Nonserialized: Default,
{
    fn read(br: &mut BitReader) -> Result<Self> {
        Self::read_unconditional(&(), br, &T::Nonserialized::default())
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    headers::{
        ImageMetadata,
        bit_depth::BitDepth,
        encodings::UnconditionalCoder,
        frame_header::{Encoding, FrameHeader, FrameHeaderNonserialized, FrameType},
        toc::{Toc, TocNonserialized},
    },
    util::{CeilLog2, tracing_wrappers::*},
};
use modular::{ModularStream, Tree};
use quantizer::LfQuantFactors;

pub mod decode;
pub mod group;
pub mod modular;
pub mod quantizer;
pub mod render;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Section {
    LfGlobal,
    Lf { group: usize },
    HfGlobal,
    Hf { group: usize, pass: usize },
}

/// Everything the LF global section carries for a modular frame: the XYB dequantization
/// factors, the optional global MA tree and the global modular stream. Channels too large for
/// the global section are filled in by the groups.
pub struct LfGlobalState {
    lf_quant: LfQuantFactors,
    tree: Option<Tree>,
    modular_global: ModularStream,
}

/// A frame whose header and TOC have been read. Sections are decoded with the methods in
/// [`decode`](self::decode).
pub struct Frame {
    header: FrameHeader,
    toc: Toc,
    color_channels: usize,
    xyb_encoded: bool,
    bit_depth: BitDepth,
    ec_bit_depths: Vec<BitDepth>,
    /// Downsampling shift of each extra channel relative to the frame.
    ec_shifts: Vec<usize>,
    lf_global: Option<LfGlobalState>,
}

impl Frame {
    /// Reads a frame header and its TOC, leaving `br` at the first section.
    #[instrument(level = "debug", skip_all, err)]
    pub fn read(
        br: &mut BitReader,
        image_metadata: &ImageMetadata,
        nonserialized: &FrameHeaderNonserialized,
    ) -> Result<Frame> {
        let header = FrameHeader::read_unconditional(&(), br, nonserialized)?;
        debug!(?header);
        let toc = Toc::read_unconditional(
            &(),
            br,
            &TocNonserialized {
                num_entries: header.num_toc_entries() as u32,
            },
        )?;
        br.jump_to_byte_boundary()?;
        trace!(?toc);
        let color_channels = if image_metadata.xyb_encoded {
            3
        } else {
            image_metadata.color_encoding.num_color_channels()
        };
        Ok(Frame {
            toc,
            color_channels,
            xyb_encoded: image_metadata.xyb_encoded,
            bit_depth: image_metadata.bit_depth,
            ec_bit_depths: image_metadata
                .extra_channel_info
                .iter()
                .map(|info| info.bit_depth())
                .collect(),
            ec_shifts: image_metadata
                .extra_channel_info
                .iter()
                .enumerate()
                .map(|(i, info)| {
                    let upsampling = header.ec_upsampling_with_shift(i, info).ceil_log2();
                    upsampling.saturating_sub((header.upsampling as usize).ceil_log2())
                })
                .collect(),
            header,
            lf_global: None,
        })
    }

    pub fn header(&self) -> &FrameHeader {
        &self.header
    }

    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    pub fn color_channels(&self) -> usize {
        self.color_channels
    }

    pub fn total_bytes_in_toc(&self) -> usize {
        self.toc.total_size()
    }

    pub fn is_last(&self) -> bool {
        self.header.is_last
    }

    /// Fails on frame features outside of plain modular decoding.
    pub fn check_supported(&self) -> Result<()> {
        let header = &self.header;
        if header.encoding == Encoding::VarDCT {
            return Err(Error::Unsupported("VarDCT encoding"));
        }
        if header.frame_type == FrameType::LFFrame || header.has_lf_frame() {
            return Err(Error::Unsupported("LF frames"));
        }
        if header.has_patches() {
            return Err(Error::Unsupported("patches"));
        }
        if header.has_splines() {
            return Err(Error::Unsupported("splines"));
        }
        if header.has_noise() {
            return Err(Error::Unsupported("noise"));
        }
        if header.do_ycbcr {
            return Err(Error::Unsupported("YCbCr frames"));
        }
        if header.upsampling != 1 || header.ec_upsampling.iter().any(|&u| u != 1) {
            return Err(Error::Unsupported("upsampling"));
        }
        if header.needs_blending() {
            return Err(Error::Unsupported("cropped or blended frames"));
        }
        Ok(())
    }

    /// Given a bit reader pointing at the end of the TOC, returns one `BitReader` per section,
    /// in logical order. `br` is left after the last section.
    pub fn sections<'a>(&self, br: &mut BitReader<'a>) -> Result<Vec<BitReader<'a>>> {
        let stored = self
            .toc
            .entries
            .iter()
            .map(|&size| br.split_at(size as usize))
            .collect::<Result<Vec<_>>>()?;
        if !self.toc.permuted {
            return Ok(stored);
        }
        Ok(self
            .toc
            .permutation
            .iter()
            .map(|&i| stored[i].clone())
            .collect())
    }

    /// Moves `br` past all the sections of this frame without decoding them.
    pub fn skip_sections(&self, br: &mut BitReader) -> Result<()> {
        br.jump_to_byte_boundary()?;
        let total_bytes = self.total_bytes_in_toc();
        if total_bytes * 8 > br.total_bits_available() {
            return Err(Error::SectionTooShort(
                br.total_bits_read() / 8,
                total_bytes,
                br.total_bits_available() / 8,
            ));
        }
        br.skip_bits(total_bytes * 8)
    }

    #[instrument(level = "trace", skip(self), ret)]
    pub fn get_section_idx(&self, section: Section) -> usize {
        if self.header.num_toc_entries() == 1 {
            0
        } else {
            match section {
                Section::LfGlobal => 0,
                Section::Lf { group } => 1 + group,
                Section::HfGlobal => self.header.num_lf_groups() + 1,
                Section::Hf { group, pass } => {
                    2 + self.header.num_lf_groups() + self.header.num_groups() * pass + group
                }
            }
        }
    }
}

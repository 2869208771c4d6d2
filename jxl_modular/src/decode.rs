// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    frame::{Frame, group::GroupPool},
    headers::{FileHeader, ImageMetadata, JxlHeader, frame_header::FrameHeader},
    icc::read_icc,
    image::Image,
    util::tracing_wrappers::*,
};

/// Signature box, file type box and the header of the codestream box of a JPEG XL container
/// that holds a single codestream box.
const CONTAINER_PREFIX_SIZE: usize = 40;
const CONTAINER_SIGNATURE: [u8; 12] = [0, 0, 0, 0xc, b'J', b'X', b'L', b' ', 0xd, 0xa, 0x87, 0xa];

#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Number of threads used to decode groups. 1 decodes on the calling thread; 0 uses one
    /// thread per core.
    pub num_threads: usize,
    /// Only read headers and TOCs, skipping the content of every section.
    pub parse_only: bool,
}

impl DecodeOptions {
    pub fn new() -> DecodeOptions {
        DecodeOptions {
            num_threads: 0,
            parse_only: false,
        }
    }
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    /// Color channels followed by extra channels; empty in parse-only mode.
    pub channels: Vec<Image<f32>>,
}

#[derive(Debug)]
pub struct DecodedImage {
    pub size: (usize, usize),
    pub image_metadata: ImageMetadata,
    /// The ICC profile, still in its encoded form.
    pub icc: Option<Vec<u8>>,
    pub frames: Vec<DecodedFrame>,
}

/// Returns the codestream inside a container made of a signature box, a file type box and a
/// single codestream box, or `data` unchanged if it does not start with a container signature.
pub fn skip_container_prefix(data: &[u8]) -> &[u8] {
    if data.len() >= CONTAINER_PREFIX_SIZE
        && data[..CONTAINER_SIGNATURE.len()] == CONTAINER_SIGNATURE
        && &data[CONTAINER_PREFIX_SIZE - 4..CONTAINER_PREFIX_SIZE] == b"jxlc"
    {
        &data[CONTAINER_PREFIX_SIZE..]
    } else {
        data
    }
}

/// Decodes all the displayed frames of a codestream. Frames that are only used as references
/// and the preview frame are skipped.
#[instrument(level = "debug", skip(data), err)]
pub fn decode_codestream(data: &[u8], options: &DecodeOptions) -> Result<DecodedImage> {
    let pool = GroupPool::new(options.num_threads)?;
    let mut br = BitReader::new(data);
    let file_header = FileHeader::read(&mut br)?;
    info!(
        "Image size: {} x {}",
        file_header.size.xsize(),
        file_header.size.ysize()
    );
    let image_metadata = &file_header.image_metadata;
    if image_metadata.animation.is_some() && !options.parse_only {
        return Err(Error::Unsupported("animation"));
    }

    let icc = if image_metadata.color_encoding.want_icc {
        let icc = read_icc(&mut br)?;
        info!("found {}-byte ICC", icc.len());
        Some(icc)
    } else {
        None
    };
    br.jump_to_byte_boundary()?;

    if let Some(nonserialized) = file_header.preview_frame_header_nonserialized() {
        let preview = Frame::read(&mut br, image_metadata, &nonserialized)?;
        debug!(bytes = preview.total_bytes_in_toc(), "skipping preview frame");
        preview.skip_sections(&mut br)?;
    }

    let nonserialized = file_header.frame_header_nonserialized();
    let mut frames = vec![];
    loop {
        let mut frame = Frame::read(&mut br, image_metadata, &nonserialized)?;
        let is_last = frame.is_last();
        if !frame.header().is_visible() {
            debug!(frame_type = ?frame.header().frame_type, "skipping frame that is not displayed");
            frame.skip_sections(&mut br)?;
        } else if options.parse_only {
            frame.skip_sections(&mut br)?;
            frames.push(DecodedFrame {
                header: frame.header().clone(),
                channels: vec![],
            });
        } else {
            frame.check_supported()?;
            let sections = frame.sections(&mut br)?;
            info!("read frame with {} sections", sections.len());
            frame.decode_sections(sections, &pool)?;
            let header = frame.header().clone();
            let channels = frame.finalize()?;
            frames.push(DecodedFrame { header, channels });
        }
        if is_last {
            break;
        }
    }

    if frames.is_empty() {
        return Err(Error::NoFrames);
    }
    Ok(DecodedImage {
        size: (
            file_header.size.xsize() as usize,
            file_header.size.ysize() as usize,
        ),
        image_metadata: file_header.image_metadata,
        icc,
        frames,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use test_log::test;

    const TOC_DIST: [(u32, usize); 4] = [(0, 10), (1024, 14), (17408, 22), (4211712, 30)];
    const SIZE_DIST: [(u32, usize); 4] = [(0, 9), (0, 13), (0, 18), (0, 30)];

    fn sample(c: usize, x: usize, y: usize) -> i32 {
        ((x * 7 + y * 3 + c * 11) % 50) as i32 - 10
    }

    // XYB image with default metadata and no ICC.
    fn write_file_header(w: &mut BitWriter, width: u32, height: u32) {
        w.write(8, 0xff);
        w.write(8, 0x0a);
        w.write_bool(false);
        w.write_u32(SIZE_DIST, height - 1);
        w.write(3, 0);
        w.write_u32(SIZE_DIST, width - 1);
        w.write_bool(true);
        w.write_bool(true);
        w.zero_pad_to_byte();
    }

    fn write_modular_frame_header(w: &mut BitWriter, group_size_shift: u64) {
        w.write_bool(false);
        w.write_enum(0);
        w.write(1, 1);
        w.write_u64(0);
        w.write(2, 0);
        w.write(2, group_size_shift);
        w.write(2, 0);
        w.write_bool(false);
        w.write(2, 0);
        w.write_bool(true);
        w.write(2, 0);
        w.write_bool(true);
        w.write_u64(0);
        w.zero_pad_to_byte();
    }

    fn write_toc_and_sections(w: &mut BitWriter, sections: &[Vec<u8>]) {
        w.write(1, 0);
        w.zero_pad_to_byte();
        for section in sections {
            w.write_u32(TOC_DIST, section.len() as u32);
        }
        w.zero_pad_to_byte();
        for section in sections {
            w.append_bytes(section);
        }
    }

    // A single leaf with the zero predictor, followed by the pixel histograms.
    fn write_leaf_tree(w: &mut BitWriter) {
        w.write_histograms(6);
        w.write_symbol(0);
        w.write_symbol(0);
        w.write_signed_symbol(0);
        w.write_symbol(0);
        w.write_symbol(0);
        w.write_histograms(1);
    }

    fn write_group_header(w: &mut BitWriter, use_global_tree: bool, ycocg: bool) {
        w.write_bool(use_global_tree);
        w.write_bool(true);
        if ycocg {
            // One RCT on channels 0..3 with type 6.
            w.write(2, 1);
            w.write(2, 0);
            w.write(2, 0);
            w.write(3, 0);
            w.write(2, 0);
        } else {
            w.write(2, 0);
        }
    }

    fn write_pixels(w: &mut BitWriter, x0: usize, xsize: usize, height: usize) {
        for c in 0..3 {
            for y in 0..height {
                for x in x0..x0 + xsize {
                    w.write_signed_symbol(sample(c, x, y));
                }
            }
        }
    }

    fn single_group_image(width: usize, height: usize) -> Vec<u8> {
        let mut section = BitWriter::new();
        // Default LF dequantization, no global tree.
        section.write_bool(true);
        section.write_bool(false);
        write_group_header(&mut section, false, false);
        write_leaf_tree(&mut section);
        write_pixels(&mut section, 0, width, height);

        let mut w = BitWriter::new();
        write_file_header(&mut w, width as u32, height as u32);
        write_modular_frame_header(&mut w, 1);
        write_toc_and_sections(&mut w, &[section.finish()]);
        w.finish()
    }

    // Three groups of 128 columns next to each other.
    fn multi_group_image(height: usize, global_tree: bool, ycocg: bool) -> Vec<u8> {
        let width = 300;
        let mut lf_global = BitWriter::new();
        lf_global.write_bool(true);
        lf_global.write_bool(global_tree);
        if global_tree {
            write_leaf_tree(&mut lf_global);
        }
        write_group_header(&mut lf_global, global_tree, ycocg);
        let mut sections = vec![lf_global.finish(), vec![], vec![]];
        for group in 0..3 {
            let x0 = group * 128;
            let mut w = BitWriter::new();
            write_group_header(&mut w, global_tree, false);
            if !global_tree {
                write_leaf_tree(&mut w);
            }
            write_pixels(&mut w, x0, (width - x0).min(128), height);
            sections.push(w.finish());
        }

        let mut w = BitWriter::new();
        write_file_header(&mut w, width as u32, height as u32);
        write_modular_frame_header(&mut w, 0);
        write_toc_and_sections(&mut w, &sections);
        w.finish()
    }

    fn options(num_threads: usize) -> DecodeOptions {
        DecodeOptions {
            num_threads,
            ..DecodeOptions::new()
        }
    }

    fn check_xyb_samples(image: &DecodedImage) {
        let (width, height) = image.size;
        let channels = &image.frames[0].channels;
        assert_eq!(channels.len(), 3);
        for y in 0..height {
            for x in 0..width {
                let (m0, m1, m2) = (sample(0, x, y), sample(1, x, y), sample(2, x, y));
                assert_eq!(channels[0].row(y)[x], m1 as f32 / 4096.0, "X at {x},{y}");
                assert_eq!(channels[1].row(y)[x], m0 as f32 / 512.0, "Y at {x},{y}");
                assert_eq!(channels[2].row(y)[x], (m2 + m0) as f32 / 256.0, "B at {x},{y}");
            }
        }
    }

    #[test]
    fn single_group() {
        let data = single_group_image(5, 3);
        let image = decode_codestream(&data, &options(1)).unwrap();
        assert_eq!(image.size, (5, 3));
        assert!(image.icc.is_none());
        assert_eq!(image.frames.len(), 1);
        check_xyb_samples(&image);
    }

    #[test]
    fn multiple_groups() {
        for global_tree in [false, true] {
            let data = multi_group_image(3, global_tree, false);
            let image = decode_codestream(&data, &options(1)).unwrap();
            assert_eq!(image.size, (300, 3));
            check_xyb_samples(&image);
        }
    }

    #[test]
    fn pooled_decode_matches_serial() {
        let data = multi_group_image(4, true, true);
        let serial = decode_codestream(&data, &options(1)).unwrap();
        for num_threads in [0, 2, 3] {
            let pooled = decode_codestream(&data, &options(num_threads)).unwrap();
            let (a, b) = (&serial.frames[0].channels, &pooled.frames[0].channels);
            assert_eq!(a.len(), b.len());
            for (ca, cb) in a.iter().zip(b.iter()) {
                for y in 0..4 {
                    assert_eq!(ca.row(y), cb.row(y));
                }
            }
        }
    }

    #[test]
    fn parse_only_skips_sections() {
        let data = multi_group_image(3, false, false);
        let options = DecodeOptions {
            parse_only: true,
            ..DecodeOptions::new()
        };
        let image = decode_codestream(&data, &options).unwrap();
        assert_eq!(image.frames.len(), 1);
        assert!(image.frames[0].channels.is_empty());
        assert_eq!(image.frames[0].header.num_groups(), 3);
    }

    #[test]
    fn truncated_codestream() {
        let data = multi_group_image(3, false, false);
        for len in [1, 10, data.len() - 1] {
            assert!(decode_codestream(&data[..len], &options(1)).is_err(), "{len}");
        }
    }

    #[test]
    fn vardct_is_unsupported() {
        let mut w = BitWriter::new();
        write_file_header(&mut w, 16, 8);
        // All-default frame header: VarDCT.
        w.write_bool(true);
        w.zero_pad_to_byte();
        write_toc_and_sections(&mut w, &[vec![0; 4]]);
        let data = w.finish();
        assert!(matches!(
            decode_codestream(&data, &options(1)),
            Err(Error::Unsupported(_))
        ));
    }

    #[test]
    fn container_prefix() {
        let codestream = single_group_image(2, 2);
        let mut data = CONTAINER_SIGNATURE.to_vec();
        data.extend_from_slice(&[0, 0, 0, 0x14]);
        data.extend_from_slice(b"ftypjxl \0\0\0\0jxl ");
        data.extend_from_slice(&[0, 0, 0, 0]);
        data.extend_from_slice(b"jxlc");
        assert_eq!(data.len(), CONTAINER_PREFIX_SIZE);
        data.extend_from_slice(&codestream);
        assert_eq!(skip_container_prefix(&data), &codestream[..]);
        assert_eq!(skip_container_prefix(&codestream), &codestream[..]);
    }
}

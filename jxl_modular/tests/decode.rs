// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use jxl_modular::{DecodeOptions, Error, decode_codestream, skip_container_prefix};

fn read_resource(name: &str) -> Option<Vec<u8>> {
    let path: PathBuf = [env!("CARGO_MANIFEST_DIR"), "resources", "test", name]
        .iter()
        .collect();
    match std::fs::read(&path) {
        Ok(data) => Some(data),
        Err(_) => {
            eprintln!("skipping: {} not found", path.display());
            None
        }
    }
}

#[test]
fn unittest_image_header() {
    let Some(data) = read_resource("unittest.jxl") else {
        return;
    };
    let options = DecodeOptions {
        parse_only: true,
        ..DecodeOptions::new()
    };
    let image = decode_codestream(skip_container_prefix(&data), &options).unwrap();
    assert_eq!(image.size, (3264, 2448));
    let bit_depth = &image.image_metadata.bit_depth;
    assert_eq!(bit_depth.bits_per_sample(), 8);
    assert_eq!(bit_depth.exponent_bits_per_sample(), 0);
    assert!(!image.image_metadata.xyb_encoded);
    assert!(!image.frames.is_empty());
}

#[test]
fn unittest_image_decode() {
    let Some(data) = read_resource("unittest.jxl") else {
        return;
    };
    let serial = decode_codestream(
        skip_container_prefix(&data),
        &DecodeOptions {
            num_threads: 1,
            ..DecodeOptions::new()
        },
    )
    .unwrap();
    let pooled = decode_codestream(skip_container_prefix(&data), &DecodeOptions::new()).unwrap();
    for image in [&serial, &pooled] {
        let frame = &image.frames[0];
        assert!(!frame.channels.is_empty());
        for channel in &frame.channels {
            assert_eq!(channel.size(), (3264, 2448));
        }
    }
    for (a, b) in serial.frames[0]
        .channels
        .iter()
        .zip(pooled.frames[0].channels.iter())
    {
        for y in 0..2448 {
            assert_eq!(a.row(y), b.row(y));
        }
    }
}

#[test]
fn rejects_other_formats() {
    let inputs: [&[u8]; 3] = [b"\x89PNG\r\n\x1a\n", &[0xff, 0xd8, 0xff, 0xe0], &[0xff, 0x0b]];
    for data in inputs {
        assert!(matches!(
            decode_codestream(data, &DecodeOptions::new()),
            Err(Error::InvalidSignature(..))
        ));
    }
}

#[test]
fn empty_input() {
    assert!(decode_codestream(&[], &DecodeOptions::new()).is_err());
    assert!(decode_codestream(&[0xff, 0x0a], &DecodeOptions::new()).is_err());
}

#[test]
fn bare_codestream_is_not_a_container() {
    let data = [0xffu8, 0x0a, 0, 0, 0, 0];
    assert_eq!(skip_container_prefix(&data), &data[..]);
    let short_box = [0, 0, 0, 0xc, b'J', b'X', b'L', b' ', 0xd, 0xa, 0x87, 0xa];
    assert_eq!(skip_container_prefix(&short_box), &short_box[..]);
}

#[test]
fn default_options() {
    let options = DecodeOptions::default();
    assert_eq!(options.num_threads, 0);
    assert!(!options.parse_only);
}

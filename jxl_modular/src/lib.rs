// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Decoder for JPEG XL codestreams made of Modular frames.
//!
//! [`decode_codestream`] reads the file header, the optional ICC profile and every displayed
//! frame, returning floating point channels. Groups are decoded on a bounded thread pool when
//! the `parallel` feature is enabled.

#![deny(unsafe_code)]
pub mod bit_reader;
pub mod decode;
pub mod entropy_coding;
pub mod error;
pub mod frame;
pub mod headers;
pub mod icc;
pub mod image;
pub mod util;

pub use decode::{
    DecodeOptions, DecodedFrame, DecodedImage, decode_codestream, skip_container_prefix,
};
pub use error::{Error, Result};

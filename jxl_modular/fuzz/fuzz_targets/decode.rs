// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.
#![no_main]

use jxl_modular::{DecodeOptions, decode_codestream, skip_container_prefix};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let options = DecodeOptions {
        num_threads: 1,
        ..DecodeOptions::new()
    };
    let _ = decode_codestream(skip_container_prefix(data), &options);
});

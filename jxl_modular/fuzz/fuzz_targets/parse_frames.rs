// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.
#![no_main]

use jxl_modular::{DecodeOptions, decode_codestream};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let options = DecodeOptions {
        num_threads: 1,
        parse_only: true,
    };
    let _ = decode_codestream(data, &options);
});

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::Path;
use std::time::{Duration, Instant};

use color_eyre::eyre::{Result, WrapErr};
use jxl_modular::{DecodeOptions, DecodedImage, decode_codestream, skip_container_prefix};

/// Reads `path`, which may hold a bare codestream or a container with a single codestream box.
pub fn read_codestream(path: &Path) -> Result<Vec<u8>> {
    let data =
        std::fs::read(path).wrap_err_with(|| format!("Cannot read {}", path.display()))?;
    Ok(skip_container_prefix(&data).to_vec())
}

/// Decodes `codestream` `num_reps` times, returning the last result and the time of the
/// fastest run.
pub fn decode_timed(
    codestream: &[u8],
    options: &DecodeOptions,
    num_reps: usize,
) -> Result<(DecodedImage, Duration)> {
    let mut best = Duration::MAX;
    let mut image = None;
    for _ in 0..num_reps.max(1) {
        let start = Instant::now();
        let decoded = decode_codestream(codestream, options)?;
        best = best.min(start.elapsed());
        image = Some(decoded);
    }
    // At least one repetition ran.
    let image = image.ok_or_else(|| color_eyre::eyre::eyre!("No decode was run"))?;
    Ok((image, best))
}

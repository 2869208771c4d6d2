// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use jxl_modular::{DecodeOptions, DecodedImage};
use jxl_modular_cli::{dec, enc};

#[derive(Parser)]
struct Opt {
    /// Input JXL file
    input: PathBuf,

    /// Output image file, should end in .ppm, .pgm or .npy
    output: Option<PathBuf>,

    /// If specified, writes the encoded ICC profile of the image
    #[clap(long)]
    icc_out: Option<PathBuf>,

    /// Number of threads used to decode groups; 0 uses one per core
    #[clap(long, default_value_t = 0)]
    num_threads: usize,

    /// Decodes the image this many times and reports the fastest run
    #[clap(long, default_value_t = 1)]
    num_reps: usize,
}

fn save_image(image: &DecodedImage, output: PathBuf) -> Result<()> {
    let extension = output
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let channels = &image
        .frames
        .first()
        .ok_or_else(|| eyre!("No frames"))?
        .channels;
    let bytes = match extension {
        "ppm" => enc::pnm::to_ppm_as_8bit(&channels[..channels.len().min(3)])?,
        "pgm" => enc::pnm::to_pgm_as_8bit(
            channels
                .first()
                .ok_or_else(|| eyre!("PGM needs one channel"))?,
        ),
        "npy" => enc::numpy::to_numpy(image)?,
        _ => return Err(eyre!("Output format not supported: {}", output.display())),
    };
    std::fs::write(&output, bytes).wrap_err_with(|| format!("Cannot write {}", output.display()))
}

fn main() -> Result<()> {
    color_eyre::install()?;

    #[cfg(feature = "tracing-subscriber")]
    {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(EnvFilter::from_default_env())
            .init();
    }

    let opt = Opt::parse();
    let codestream = dec::read_codestream(&opt.input)?;
    let options = DecodeOptions {
        num_threads: opt.num_threads,
        ..DecodeOptions::new()
    };
    let (image, duration) = dec::decode_timed(&codestream, &options, opt.num_reps)?;

    let (xsize, ysize) = image.size;
    println!("Image size: {xsize} x {ysize}, {} frame(s)", image.frames.len());
    if opt.num_reps > 1 {
        let mpix = (xsize * ysize * image.frames.len()) as f64 * 1e-6;
        println!(
            "Decoded in {:.3} ms, {:.2} MP/s",
            duration.as_secs_f64() * 1e3,
            mpix / duration.as_secs_f64()
        );
    }

    if let Some(output) = opt.output {
        save_image(&image, output)?;
    }
    if let Some(icc_out) = opt.icc_out {
        let icc = image
            .icc
            .as_ref()
            .ok_or_else(|| eyre!("The image has no ICC profile"))?;
        std::fs::write(&icc_out, icc)
            .wrap_err_with(|| format!("Cannot write {}", icc_out.display()))?;
    }
    Ok(())
}

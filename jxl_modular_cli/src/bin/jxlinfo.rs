// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;
use jxl_modular::{DecodeOptions, DecodedImage, decode_codestream};
use jxl_modular_cli::dec::read_codestream;

#[derive(Parser)]
#[command(about = "Provides info about a JXL file")]
struct Opt {
    /// The JXL file to analyze
    filename: PathBuf,

    /// Provides more verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn print_summary(image: &DecodedImage) {
    let metadata = &image.image_metadata;
    let how_lossy = if metadata.xyb_encoded {
        "lossy"
    } else {
        "(possibly) lossless"
    };
    let alpha_info = if metadata
        .extra_channel_info
        .iter()
        .any(|info| info.alpha_associated())
    {
        "+Alpha"
    } else {
        ""
    };
    print!(
        "{}x{}, {}, {}-bit {}{}",
        image.size.0,
        image.size.1,
        how_lossy,
        metadata.bit_depth.bits_per_sample(),
        metadata.color_encoding,
        alpha_info,
    );
    if metadata.bit_depth.exponent_bits_per_sample() != 0 {
        print!(
            " float ({} exponent bits)",
            metadata.bit_depth.exponent_bits_per_sample()
        );
    }
    println!();
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let opt = Opt::parse();
    if opt.verbose {
        println!("Processing file: {}", opt.filename.display());
    }
    let codestream = read_codestream(&opt.filename)?;
    let options = DecodeOptions {
        parse_only: true,
        ..DecodeOptions::new()
    };
    let image = decode_codestream(&codestream, &options)?;

    print_summary(&image);
    if let Some(icc) = &image.icc {
        println!("ICC profile length: {} bytes", icc.len());
    }
    for (i, frame) in image.frames.iter().enumerate() {
        let header = &frame.header;
        println!(
            "frame {i}: {:?} {:?}, {} group(s), {} pass(es)",
            header.frame_type,
            header.encoding,
            header.num_groups(),
            header.num_passes()
        );
        if opt.verbose {
            println!("{header:#?}");
        }
    }
    if opt.verbose {
        println!("{:#?}", image.image_metadata);
    }
    Ok(())
}

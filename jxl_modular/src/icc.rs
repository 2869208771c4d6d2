// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Reading of the entropy-coded ICC profile that follows the image header. The profile is
//! returned in its encoded form; undoing the ICC-specific byte predictions is left to color
//! management.

use crate::bit_reader::*;
use crate::entropy_coding::decode::{Histograms, Reader};
use crate::error::{Error, Result};
use crate::headers::encodings::*;
use crate::util::tracing_wrappers::*;

const ICC_CONTEXTS: usize = 41;
const ICC_HEADER_SIZE: u64 = 128;
const MAX_ICC_SIZE: u64 = 1 << 28;

struct IccStream<'br, 'buf, 'hist> {
    br: &'br mut BitReader<'buf>,
    reader: Reader<'hist>,
    len: u64,
    bytes_read: u64,
    // [prev, prev_prev]
    prev_bytes: [u8; 2],
}

impl<'br, 'buf, 'hist> IccStream<'br, 'buf, 'hist> {
    fn new(br: &'br mut BitReader<'buf>, histograms: &'hist Histograms, len: u64) -> Result<Self> {
        let reader = histograms.make_reader(br)?;
        Ok(Self {
            br,
            reader,
            len,
            bytes_read: 0,
            prev_bytes: [0, 0],
        })
    }

    fn get_icc_ctx(&self) -> usize {
        if self.bytes_read <= ICC_HEADER_SIZE {
            return 0;
        }

        let [b1, b2] = self.prev_bytes;

        let p1 = match b1 {
            b'a'..=b'z' | b'A'..=b'Z' => 0,
            b'0'..=b'9' | b'.' | b',' => 1,
            0..=1 => 2 + b1 as usize,
            2..=15 => 4,
            241..=254 => 5,
            255 => 6,
            _ => 7,
        };
        let p2 = match b2 {
            b'a'..=b'z' | b'A'..=b'Z' => 0,
            b'0'..=b'9' | b'.' | b',' => 1,
            0..=15 => 2,
            241..=255 => 3,
            _ => 4,
        };

        1 + p1 + 8 * p2
    }

    fn read_one(&mut self) -> Result<u8> {
        if self.bytes_read >= self.len {
            return Err(Error::IccEndOfStream);
        }
        let ctx = self.get_icc_ctx();
        let sym = self.reader.read(&mut *self.br, ctx)?;
        if sym >= 256 {
            warn!(sym, "Invalid symbol in ICC stream");
            return Err(Error::InvalidIccStream);
        }
        let b = sym as u8;
        self.bytes_read += 1;
        self.prev_bytes = [b, self.prev_bytes[0]];
        Ok(b)
    }

    fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(self.len as usize)?;
        while self.bytes_read < self.len {
            out.push(self.read_one()?);
        }
        Ok(out)
    }

    #[instrument(skip_all, err)]
    fn finalize(self) -> Result<()> {
        self.reader.check_final_state()
    }
}

/// Reads the encoded ICC profile, checking the final state of its entropy decoder.
#[instrument(level = "debug", skip_all, err)]
pub fn read_icc(br: &mut BitReader) -> Result<Vec<u8>> {
    let len = u64::read_unconditional(&(), br, &Empty {})?;
    if len > MAX_ICC_SIZE {
        return Err(Error::ICCTooLarge);
    }
    debug!(len, "encoded ICC");

    let histograms = Histograms::decode(ICC_CONTEXTS, br, /*allow_lz77=*/ true)?;
    let mut stream = IccStream::new(br, &histograms, len)?;
    let encoded = stream.read_to_end()?;
    stream.finalize()?;
    Ok(encoded)
}

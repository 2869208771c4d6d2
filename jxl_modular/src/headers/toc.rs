// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use jxl_macros::UnconditionalCoder;

use crate::headers::encodings::*;

use super::permutation::{Permutation, PermutationNonserialized};

pub struct TocNonserialized {
    pub num_entries: u32,
}

/// Table of contents of a frame: the byte size of every section, in bitstream order.
#[derive(UnconditionalCoder, Debug, PartialEq)]
#[nonserialized(TocNonserialized)]
pub struct Toc {
    #[default(false)]
    pub permuted: bool,

    // Not `condition(permuted)`: the byte alignment after the permutation is unconditional.
    #[nonserialized(num_entries: nonserialized.num_entries, permuted: permuted)]
    pub permutation: Permutation,

    #[coder(u2S(Bits(10), Bits(14) + 1024, Bits(22) + 17408, Bits(30) + 4211712))]
    #[size_coder(explicit(nonserialized.num_entries))]
    pub entries: Vec<u32>,
}

impl Toc {
    pub fn total_size(&self) -> usize {
        self.entries
            .iter()
            .fold(0usize, |acc, &s| acc.saturating_add(s as usize))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bit_reader::BitReader;
    use crate::error::Error;
    use crate::util::test::BitWriter;
    use test_log::test;

    const TOC_DIST: [(u32, usize); 4] = [(0, 10), (1024, 14), (17408, 22), (4211712, 30)];

    fn read_toc(data: &[u8], num_entries: u32) -> crate::error::Result<Toc> {
        let mut br = BitReader::new(data);
        let toc = Toc::read_unconditional(&(), &mut br, &TocNonserialized { num_entries })?;
        br.jump_to_byte_boundary()?;
        Ok(toc)
    }

    #[test]
    fn unpermuted() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.zero_pad_to_byte();
        for size in [10, 2000, 20000] {
            w.write_u32(TOC_DIST, size);
        }
        let toc = read_toc(&w.finish(), 3).unwrap();
        assert_eq!(toc.entries, vec![10, 2000, 20000]);
        assert_eq!(toc.total_size(), 22010);
    }

    #[test]
    fn permuted() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write_histograms(8);
        // end = 1, then Lehmer code 2: logical section 0 is stored last.
        w.write_symbol(1);
        w.write_symbol(2);
        w.zero_pad_to_byte();
        for size in [30, 10, 20] {
            w.write_u32(TOC_DIST, size);
        }
        let toc = read_toc(&w.finish(), 3).unwrap();
        assert!(toc.permuted);
        assert_eq!(&*toc.permutation, &[2, 0, 1]);
        assert_eq!(toc.entries, vec![30, 10, 20]);
    }

    #[test]
    fn invalid_lehmer_code() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write_histograms(8);
        w.write_symbol(1);
        w.write_symbol(3);
        w.zero_pad_to_byte();
        w.write_u32(TOC_DIST, 0);
        let result = read_toc(&w.finish(), 3);
        assert!(matches!(
            result,
            Err(Error::InvalidPermutationLehmerCode { .. })
        ));
    }

    #[test]
    fn nonzero_padding_is_rejected() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(1, 1);
        assert!(matches!(read_toc(&w.finish(), 1), Err(Error::NonZeroPadding)));
    }
}

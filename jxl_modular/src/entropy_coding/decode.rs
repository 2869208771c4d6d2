// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::{
    bit_reader::BitReader,
    error::{Error, Result},
    util::{tracing_wrappers::*, unpack_signed},
};

use super::{
    ans::{AnsCodes, AnsReader},
    context_map::decode_context_map,
    huffman::{HUFFMAN_MAX_BITS, HuffmanCodes},
    hybrid_uint::HybridUintConfig,
    lz77::{Lz77Config, Lz77State},
};

/// Reads a 16 bit value coded as a presence bit, a 4 bit exponent and the bits below the
/// leading one.
pub fn decode_varint16(br: &mut BitReader) -> Result<u16> {
    if br.read(1)? == 0 {
        return Ok(0);
    }
    let nbits = br.read(4)? as usize;
    Ok((1 << nbits) + br.read(nbits)? as u16)
}

#[derive(Debug)]
enum Codes {
    Prefix(HuffmanCodes),
    Ans(AnsCodes),
}

/// Everything needed to decode a stream of entropy coded values: the context map, one
/// token code and one [`HybridUintConfig`] per cluster, and the optional LZ77 parameters.
#[derive(Debug)]
pub struct Histograms {
    lz77: Option<Lz77Config>,
    context_map: Vec<u8>,
    uint_configs: Vec<HybridUintConfig>,
    codes: Codes,
}

#[derive(Debug)]
enum TokenReader<'a> {
    Prefix(&'a HuffmanCodes),
    Ans(&'a AnsCodes, AnsReader),
}

/// Token and value decoding for one cluster at a time, without LZ77.
#[derive(Debug)]
struct ClusterReader<'a> {
    tokens: TokenReader<'a>,
    uint_configs: &'a [HybridUintConfig],
}

impl ClusterReader<'_> {
    fn token(&mut self, br: &mut BitReader, cluster: usize) -> Result<u32> {
        match &mut self.tokens {
            TokenReader::Prefix(codes) => codes.read(br, cluster),
            TokenReader::Ans(codes, state) => state.read(codes, br, cluster),
        }
    }

    fn value(&mut self, br: &mut BitReader, cluster: usize) -> Result<u32> {
        let token = self.token(br, cluster)?;
        self.uint_configs[cluster].value(token, br)
    }
}

/// Reads values of a single stream. Streams that share [`Histograms`] each need their own
/// reader.
#[derive(Debug)]
pub struct Reader<'a> {
    context_map: &'a [u8],
    clusters: ClusterReader<'a>,
    lz77: Option<Lz77State>,
}

impl Reader<'_> {
    pub fn read(&mut self, br: &mut BitReader, context: usize) -> Result<u32> {
        let cluster = self.context_map[context] as usize;
        let Some(lz77) = &mut self.lz77 else {
            return self.clusters.value(br, cluster);
        };
        let value = match lz77.next_copied() {
            Some(value) => value,
            None => {
                let token = self.clusters.token(br, cluster)?;
                match lz77.copy_length(token, br)? {
                    None => self.clusters.uint_configs[cluster].value(token, br)?,
                    Some(length) => {
                        let distance = self.clusters.value(br, lz77.distance_cluster())?;
                        lz77.start_copy(length, distance);
                        lz77.next_copied().ok_or(Error::UnexpectedLz77Repeat)?
                    }
                }
            }
        };
        lz77.push(value);
        Ok(value)
    }

    pub fn read_signed(&mut self, br: &mut BitReader, context: usize) -> Result<i32> {
        Ok(unpack_signed(self.read(br, context)?))
    }

    /// ANS streams must end in the initial state.
    pub fn check_final_state(self) -> Result<()> {
        match self.clusters.tokens {
            TokenReader::Ans(_, state) => state.check_final_state(),
            TokenReader::Prefix(_) => Ok(()),
        }
    }
}

impl Histograms {
    /// Reads the entropy code for `num_contexts` contexts: the optional LZ77 parameters, the
    /// context map, the hybrid integer configurations and the prefix or ANS codes.
    #[instrument(level = "debug", skip(br), err)]
    pub fn decode(num_contexts: usize, br: &mut BitReader, allow_lz77: bool) -> Result<Histograms> {
        let lz77 = Lz77Config::read(br, allow_lz77)?;
        // LZ77 distances have a context of their own.
        let num_contexts = num_contexts + lz77.is_some() as usize;

        let context_map = if num_contexts > 1 {
            decode_context_map(num_contexts, br)?
        } else {
            vec![0]
        };
        let num_histograms = context_map.iter().copied().max().unwrap_or(0) as usize + 1;

        let use_prefix_code = br.read(1)? != 0;
        let log_alpha_size = if use_prefix_code {
            HUFFMAN_MAX_BITS
        } else {
            br.read(2)? as usize + 5
        };
        debug!(
            num_contexts,
            num_histograms, use_prefix_code, log_alpha_size, "reading histograms"
        );
        let uint_configs = (0..num_histograms)
            .map(|_| HybridUintConfig::read(log_alpha_size, br))
            .collect::<Result<_>>()?;
        let codes = if use_prefix_code {
            Codes::Prefix(HuffmanCodes::decode(num_histograms, br)?)
        } else {
            Codes::Ans(AnsCodes::decode(num_histograms, log_alpha_size, br)?)
        };

        Ok(Histograms {
            lz77,
            context_map,
            uint_configs,
            codes,
        })
    }

    pub fn num_histograms(&self) -> usize {
        self.uint_configs.len()
    }

    /// Creates a reader for a stream that starts at `br`. `image_width` enables the LZ77
    /// distance codes relative to image rows.
    fn reader(&self, br: &mut BitReader, image_width: Option<usize>) -> Result<Reader<'_>> {
        let tokens = match &self.codes {
            Codes::Ans(codes) => TokenReader::Ans(codes, AnsReader::init(br)?),
            Codes::Prefix(codes) => TokenReader::Prefix(codes),
        };
        let lz77 = self.lz77.map(|config| {
            let distance_cluster = self.context_map.last().copied().unwrap_or(0) as usize;
            Lz77State::new(config, distance_cluster, image_width.unwrap_or(0) as u32)
        });
        Ok(Reader {
            context_map: &self.context_map,
            clusters: ClusterReader {
                tokens,
                uint_configs: &self.uint_configs,
            },
            lz77,
        })
    }

    pub fn make_reader(&self, br: &mut BitReader) -> Result<Reader<'_>> {
        self.reader(br, None)
    }

    /// Creates a reader whose LZ77 distances are relative to rows of `image_width` symbols.
    pub fn make_reader_with_width(
        &self,
        br: &mut BitReader,
        image_width: usize,
    ) -> Result<Reader<'_>> {
        self.reader(br, Some(image_width))
    }
}

#[cfg(test)]
impl Histograms {
    /// A prefix code that reads one octet per value and returns it bit-reversed.
    pub fn raw_bytes(num_contexts: usize) -> Self {
        Histograms {
            lz77: None,
            context_map: vec![0; num_contexts],
            uint_configs: vec![HybridUintConfig::new(8, 0, 0).unwrap()],
            codes: Codes::Prefix(HuffmanCodes::byte_histogram()),
        }
    }

    /// Same as [`Histograms::raw_bytes`], with LZ77 enabled.
    pub fn raw_bytes_with_lz77(num_contexts: usize, lz77: Lz77Config) -> Self {
        Histograms {
            lz77: Some(lz77),
            ..Self::raw_bytes(num_contexts + 1)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use test_log::test;

    #[test]
    fn varint16() {
        let mut w = BitWriter::new();
        w.write(1, 0);
        w.write(1, 1);
        w.write(4, 0);
        w.write(1, 1);
        w.write(4, 5);
        w.write(5, 7);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let values: Vec<_> = (0..3).map(|_| decode_varint16(&mut br).unwrap()).collect();
        assert_eq!(values, [0, 1, 39]);
    }

    #[test]
    fn lz77_disallowed() {
        let mut w = BitWriter::new();
        w.write(1, 1);
        w.write(2, 0);
        w.write(2, 0);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert!(matches!(
            Histograms::decode(1, &mut br, false),
            Err(Error::Lz77Disallowed)
        ));
    }

    #[test]
    fn single_context_without_context_map() {
        let mut w = BitWriter::new();
        w.write_histograms(1);
        w.write_symbol(42);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let histograms = Histograms::decode(1, &mut br, false).unwrap();
        assert_eq!(histograms.num_histograms(), 1);
        let mut reader = histograms.make_reader(&mut br).unwrap();
        assert_eq!(reader.read(&mut br, 0).unwrap(), 42);
        reader.check_final_state().unwrap();
    }

    #[test]
    fn signed_values() {
        let histograms = Histograms::raw_bytes(2);
        let data = [3u8, 4, 0].map(u8::reverse_bits);
        let mut br = BitReader::new(&data);
        let mut reader = histograms.make_reader(&mut br).unwrap();
        assert_eq!(reader.read_signed(&mut br, 1).unwrap(), -2);
        assert_eq!(reader.read_signed(&mut br, 0).unwrap(), 2);
        assert_eq!(reader.read_signed(&mut br, 1).unwrap(), 0);
    }
}

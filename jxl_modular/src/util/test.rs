// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::util::FloorLog2;

/// Asserts that two floats differ by at most the given error.
macro_rules! assert_almost_eq {
    ($left:expr, $right:expr, $max_error:expr $(,)?) => {{
        let (left, right, max_error) = ($left, $right, $max_error);
        assert!(
            (left - right).abs() <= max_error,
            "{left} and {right} differ by more than {max_error}"
        );
    }};
}
pub(crate) use assert_almost_eq;

/// Writes bits in the order `BitReader` consumes them. Used to build small bitstreams by hand.
#[derive(Debug, Default)]
pub struct BitWriter {
    data: Vec<u8>,
    num_bits: usize,
}

impl BitWriter {
    pub fn new() -> BitWriter {
        BitWriter::default()
    }

    /// Writes the low `nbits` bits of `value`, least significant bit first.
    pub fn write(&mut self, nbits: usize, value: u64) {
        assert!(nbits <= 64);
        assert!(nbits == 64 || value >> nbits == 0, "{value} does not fit in {nbits} bits");
        for i in 0..nbits {
            self.push_bit((value >> i) & 1 != 0);
        }
    }

    pub fn write_bool(&mut self, value: bool) {
        self.push_bit(value);
    }

    /// Writes a prefix code, most significant bit first.
    pub fn write_code(&mut self, nbits: usize, code: u64) {
        for i in (0..nbits).rev() {
            self.push_bit((code >> i) & 1 != 0);
        }
    }

    pub fn zero_pad_to_byte(&mut self) {
        while self.num_bits % 8 != 0 {
            self.push_bit(false);
        }
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        assert_eq!(self.num_bits % 8, 0);
        self.data.extend_from_slice(bytes);
        self.num_bits += bytes.len() * 8;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.zero_pad_to_byte();
        self.data
    }

    fn push_bit(&mut self, bit: bool) {
        if self.num_bits % 8 == 0 {
            self.data.push(0);
        }
        if bit {
            let last = self.data.len() - 1;
            self.data[last] |= 1 << (self.num_bits % 8);
        }
        self.num_bits += 1;
    }

    /// Writes a value with the 2-bit selector integer coding. `dist` lists, for each selector,
    /// the offset and number of extra bits.
    pub fn write_u32(&mut self, dist: [(u32, usize); 4], value: u32) {
        for (selector, (offset, nbits)) in dist.iter().enumerate() {
            let fits = if *nbits == 0 {
                value == *offset
            } else {
                value >= *offset && ((value - offset) as u64) < (1u64 << nbits)
            };
            if fits {
                self.write(2, selector as u64);
                self.write(*nbits, (value - offset) as u64);
                return;
            }
        }
        panic!("{value} cannot be written with {dist:?}");
    }

    pub fn write_u64(&mut self, value: u64) {
        match value {
            0 => self.write(2, 0),
            1..=16 => {
                self.write(2, 1);
                self.write(4, value - 1);
            }
            17..=272 => {
                self.write(2, 2);
                self.write(8, value - 17);
            }
            _ => {
                self.write(2, 3);
                self.write(12, value & 0xfff);
                let mut rest = value >> 12;
                let mut shift = 12;
                while rest != 0 {
                    self.write(1, 1);
                    if shift == 60 {
                        self.write(4, rest);
                        return;
                    }
                    self.write(8, rest & 0xff);
                    rest >>= 8;
                    shift += 8;
                }
                self.write(1, 0);
            }
        }
    }

    pub fn write_enum(&mut self, value: u32) {
        self.write_u32([(0, 0), (1, 0), (2, 4), (18, 6)], value);
    }

    /// Writes entropy code parameters for `num_contexts` contexts that all share a single
    /// prefix code of 256 symbols with 8 bits each, without LZ77. Values are then written with
    /// `write_symbol`.
    pub fn write_histograms(&mut self, num_contexts: usize) {
        // No LZ77.
        self.write(1, 0);
        if num_contexts > 1 {
            // Simple context map, all contexts map to histogram 0.
            self.write(1, 1);
            self.write(2, 0);
        }
        // Prefix codes.
        self.write(1, 1);
        // Hybrid uint config: split_exponent 4, no msb or lsb in token.
        self.write(4, 4);
        self.write(3, 0);
        self.write(3, 0);
        // Alphabet size 256.
        self.write(1, 1);
        self.write(4, 7);
        self.write(7, 127);
        // Complex code with no skipped code length codes.
        self.write(2, 0);
        for i in 0..18 {
            if i == 10 {
                // Code length 8 is the only code length symbol, with a 1-bit code.
                self.write(4, 0b0111);
            } else {
                self.write(2, 0);
            }
        }
    }

    /// Writes a value coded with the histograms of `write_histograms`.
    pub fn write_symbol(&mut self, value: u32) {
        if value < 16 {
            self.write_code(8, value as u64);
        } else {
            let nbits = value.floor_log2() as usize;
            self.write_code(8, 12 + nbits as u64);
            self.write(nbits, (value - (1 << nbits)) as u64);
        }
    }

    pub fn write_signed_symbol(&mut self, value: i32) {
        let packed = if value >= 0 {
            (value as u32) << 1
        } else {
            ((-(value as i64)) as u32 * 2) - 1
        };
        self.write_symbol(packed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bit_reader::BitReader;
    use crate::entropy_coding::decode::Histograms;
    use test_log::test;

    #[test]
    fn writer_matches_reader() {
        let mut w = BitWriter::new();
        w.write(3, 5);
        w.write(17, 0x1abcd);
        w.write_code(3, 0b100);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(3).unwrap(), 5);
        assert_eq!(br.read(17).unwrap(), 0x1abcd);
        assert_eq!(br.read(3).unwrap(), 0b001);
    }

    #[test]
    fn written_symbols_decode() {
        let values = [0u32, 1, 15, 16, 17, 255, 256, 1000, 65535, 1 << 30];
        let mut w = BitWriter::new();
        w.write_histograms(3);
        for v in values {
            w.write_symbol(v);
        }
        for v in [-5, 0, 7, i32::MIN + 1] {
            w.write_signed_symbol(v);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        let histograms = Histograms::decode(3, &mut br, true).unwrap();
        let mut reader = histograms.make_reader(&mut br).unwrap();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reader.read(&mut br, i % 3).unwrap(), *v);
        }
        for v in [-5, 0, 7, i32::MIN + 1] {
            assert_eq!(reader.read_signed(&mut br, 1).unwrap(), v);
        }
        reader.check_final_state().unwrap();
    }
}

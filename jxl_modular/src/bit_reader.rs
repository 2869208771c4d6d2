// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use std::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};

use crate::{error::Error, util::tracing_wrappers::*};

/// Largest number of bits that can be peeked or read at once.
pub const MAX_BITS_PER_CALL: usize = 56;

/// Reads bits from a byte slice, least significant bit of each byte first.
#[derive(Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// Index of the first byte of `data` that is not in `buf` yet.
    next_byte: usize,
    buf: u64,
    buf_bits: usize,
    bits_read: usize,
}

impl Debug for BitReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitReader")
            .field("bytes_left", &(self.data.len() - self.next_byte))
            .field("buf_bits", &self.buf_bits)
            .field("bits_read", &self.bits_read)
            .finish()
    }
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> BitReader<'a> {
        BitReader {
            data,
            next_byte: 0,
            buf: 0,
            buf_bits: 0,
            bits_read: 0,
        }
    }

    /// Loads as many whole bytes as fit in the buffer.
    fn refill(&mut self) {
        let rest = &self.data[self.next_byte..];
        if rest.len() >= 8 {
            let num_bytes = (63 - self.buf_bits) / 8;
            let mask = (1u64 << (num_bytes * 8)) - 1;
            self.buf |= (LittleEndian::read_u64(rest) & mask) << self.buf_bits;
            self.buf_bits += num_bytes * 8;
            self.next_byte += num_bytes;
            return;
        }
        for &byte in rest {
            if self.buf_bits >= MAX_BITS_PER_CALL {
                break;
            }
            self.buf |= (byte as u64) << self.buf_bits;
            self.buf_bits += 8;
            self.next_byte += 1;
        }
    }

    /// Returns the next `num` bits without consuming them. Bits past the end of the data
    /// read as zeros.
    pub fn peek(&mut self, num: usize) -> Result<u64, Error> {
        if num > MAX_BITS_PER_CALL {
            return Err(Error::PeekTooLarge(num));
        }
        if self.buf_bits < num {
            self.refill();
        }
        Ok(self.buf & ((1u64 << num) - 1))
    }

    /// Drops `num` bits that must already have been peeked.
    pub fn consume(&mut self, num: usize) -> Result<(), Error> {
        if num > self.buf_bits {
            return Err(Error::OutOfBounds);
        }
        self.buf >>= num;
        self.buf_bits -= num;
        self.bits_read += num;
        Ok(())
    }

    /// Reads `num` bits, the first one read ending up in the least significant bit.
    /// ```
    /// # use jxl_modular::bit_reader::BitReader;
    /// let mut br = BitReader::new(&[0b1010_0011, 0x0f]);
    /// assert_eq!(br.read(2)?, 0b11);
    /// assert_eq!(br.read(10)?, 0b1111_101000);
    /// assert_eq!(br.total_bits_read(), 12);
    /// assert!(br.read(5).is_err());
    /// # Ok::<(), jxl_modular::error::Error>(())
    /// ```
    pub fn read(&mut self, num: usize) -> Result<u64, Error> {
        let bits = self.peek(num)?;
        self.consume(num)?;
        Ok(bits)
    }

    pub fn total_bits_read(&self) -> usize {
        self.bits_read
    }

    /// Number of bits that can still be read or skipped.
    pub fn total_bits_available(&self) -> usize {
        (self.data.len() - self.next_byte) * 8 + self.buf_bits
    }

    pub fn is_empty(&self) -> bool {
        self.total_bits_available() == 0
    }

    /// Skips `num` bits, failing without moving if fewer are left.
    /// ```
    /// # use jxl_modular::bit_reader::BitReader;
    /// let mut br = BitReader::new(&[0; 20]);
    /// br.skip_bits(3)?;
    /// br.skip_bits(150)?;
    /// assert_eq!(br.total_bits_read(), 153);
    /// assert!(br.skip_bits(8).is_err());
    /// # Ok::<(), jxl_modular::error::Error>(())
    /// ```
    pub fn skip_bits(&mut self, num: usize) -> Result<(), Error> {
        if num <= self.buf_bits {
            return self.consume(num);
        }
        if num > self.total_bits_available() {
            return Err(Error::OutOfBounds);
        }
        let after_buf = num - self.buf_bits;
        self.bits_read += self.buf_bits + after_buf / 8 * 8;
        self.buf = 0;
        self.buf_bits = 0;
        self.next_byte += after_buf / 8;
        self.refill();
        self.consume(after_buf % 8)
    }

    /// Skips to the next byte boundary; the skipped bits must be zero.
    pub fn jump_to_byte_boundary(&mut self) -> Result<(), Error> {
        let padding = self.bits_read.next_multiple_of(8) - self.bits_read;
        if self.read(padding)? != 0 {
            return Err(Error::NonZeroPadding);
        }
        Ok(())
    }

    /// Returns a reader for the next `n` bytes after the byte boundary, and moves `self` past
    /// them.
    pub fn split_at(&mut self, n: usize) -> Result<BitReader<'a>, Error> {
        self.jump_to_byte_boundary()?;
        let available = self.total_bits_available() / 8;
        if n > available {
            return Err(Error::SectionTooShort(self.bits_read / 8, n, available));
        }
        // At a byte boundary the buffer holds whole bytes, right before `next_byte`.
        let start = self.next_byte - self.buf_bits / 8;
        let section = BitReader::new(&self.data[start..start + n]);
        self.skip_bits(n * 8)?;
        trace!(n, ?section, "split section");
        Ok(section)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use rand::{Rng, SeedableRng};
    use rand_xorshift::XorShiftRng;
    use test_log::test;

    #[test]
    fn random_widths() {
        let mut rng = XorShiftRng::seed_from_u64(0);
        let fields: Vec<(usize, u64)> = (0..1000)
            .map(|_| {
                let nbits = rng.random_range(0..=MAX_BITS_PER_CALL);
                let value = rng.random::<u64>() & ((1u64 << nbits) - 1);
                (nbits, value)
            })
            .collect();
        let mut w = BitWriter::new();
        for &(nbits, value) in &fields {
            w.write(nbits, value);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        for &(nbits, value) in &fields {
            assert_eq!(br.read(nbits).unwrap(), value);
        }
        assert!(br.total_bits_available() < 8);
    }

    #[test]
    fn peek_past_end_is_zero_padded() {
        let mut br = BitReader::new(&[0xff]);
        assert_eq!(br.peek(16).unwrap(), 0xff);
        assert_eq!(br.read(4).unwrap(), 0xf);
        assert_eq!(br.peek(8).unwrap(), 0xf);
        assert!(br.read(8).is_err());
    }

    #[test]
    fn peek_too_large() {
        let mut br = BitReader::new(&[0; 16]);
        assert!(matches!(br.peek(57), Err(Error::PeekTooLarge(57))));
        assert_eq!(br.peek(56).unwrap(), 0);
    }

    #[test]
    fn long_reads_cross_refills() {
        let data: Vec<u8> = (0..64).collect();
        let mut br = BitReader::new(&data);
        for i in 0..64 {
            assert_eq!(br.read(8).unwrap(), i);
        }
        assert!(br.is_empty());

        let mut br = BitReader::new(&data);
        assert_eq!(br.read(4).unwrap(), 0);
        assert_eq!(br.read(56).unwrap(), 0x0706_0504_0302_0100 >> 4 & ((1 << 56) - 1));
        assert_eq!(br.read(12).unwrap(), 0x080);
    }

    #[test]
    fn nonzero_padding() {
        let mut br = BitReader::new(&[0b1000_0001, 0]);
        assert_eq!(br.read(1).unwrap(), 1);
        assert!(matches!(
            br.jump_to_byte_boundary(),
            Err(Error::NonZeroPadding)
        ));
    }

    #[test]
    fn skip_within_and_past_buffer() {
        let data: Vec<u8> = (0..40).collect();
        let mut br = BitReader::new(&data);
        br.skip_bits(8).unwrap();
        assert_eq!(br.read(8).unwrap(), 1);
        br.skip_bits(8 * 20 + 4).unwrap();
        assert_eq!(br.read(4).unwrap(), 22 >> 4);
        assert_eq!(br.read(8).unwrap(), 23);
        assert_eq!(br.total_bits_available(), 16 * 8);
        assert!(matches!(br.skip_bits(16 * 8 + 1), Err(Error::OutOfBounds)));
        br.skip_bits(16 * 8).unwrap();
        assert!(br.is_empty());
    }

    #[test]
    fn split_sections() {
        let data: Vec<u8> = (0..20).collect();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(3).unwrap(), 0);
        let mut first = br.split_at(3).unwrap();
        let mut second = br.split_at(12).unwrap();
        assert_eq!(first.read(8).unwrap(), 1);
        assert_eq!(first.read(16).unwrap(), 0x0302);
        assert!(first.read(1).is_err());
        assert_eq!(second.read(8).unwrap(), 4);
        second.skip_bits(8 * 10).unwrap();
        assert_eq!(second.read(8).unwrap(), 15);
        assert!(second.is_empty());
        assert_eq!(br.read(8).unwrap(), 16);
        assert!(matches!(br.split_at(4), Err(Error::SectionTooShort(..))));
    }
}

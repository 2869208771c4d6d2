// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::bit_reader::BitReader;
use crate::entropy_coding::decode::decode_varint16;
use crate::error::{Error, Result};
use crate::util::{FloorLog2, tracing_wrappers::*};

pub const HUFFMAN_MAX_BITS: usize = 15;
const TABLE_BITS: usize = 8;
const CODE_LENGTH_CODES: usize = 18;
const CODE_LENGTH_CODE_ORDER: [usize; CODE_LENGTH_CODES] =
    [1, 2, 3, 4, 0, 5, 17, 6, 16, 7, 8, 9, 10, 11, 12, 13, 14, 15];
const DEFAULT_CODE_LENGTH: u8 = 8;
const CODE_LENGTH_REPEAT_CODE: u8 = 16;

#[derive(Debug, Clone, Copy, Default)]
struct TableEntry {
    bits: u8,
    value: u16,
}

/// A canonical prefix code. Codes are stored in the bitstream starting from their most
/// significant bit.
#[derive(Debug)]
struct Table {
    // Indexed by the next TABLE_BITS bits of the stream. `bits == 0` marks codes that are longer
    // than TABLE_BITS, except when the code has a single symbol.
    fast: Vec<TableEntry>,
    single_symbol: Option<u16>,
    // Canonical decoding data for codes longer than TABLE_BITS.
    first_code: [u32; HUFFMAN_MAX_BITS + 1],
    count: [u32; HUFFMAN_MAX_BITS + 1],
    first_index: [u32; HUFFMAN_MAX_BITS + 1],
    sorted_symbols: Vec<u16>,
}

impl Table {
    /// Builds the decoding table for the given code lengths. The code must be complete, unless it
    /// has exactly one symbol, which is then decoded without reading any bits.
    fn build(code_lengths: &[u8]) -> Result<Table> {
        let mut count = [0u32; HUFFMAN_MAX_BITS + 1];
        for &len in code_lengths {
            if len as usize > HUFFMAN_MAX_BITS {
                return Err(Error::InvalidHuffman);
            }
            count[len as usize] += 1;
        }
        count[0] = 0;
        let num_symbols: u32 = count.iter().sum();
        if num_symbols == 0 {
            return Err(Error::InvalidHuffman);
        }

        let mut sorted_symbols = Vec::with_capacity(num_symbols as usize);
        for len in 1..=HUFFMAN_MAX_BITS {
            for (sym, &l) in code_lengths.iter().enumerate() {
                if l as usize == len {
                    sorted_symbols.push(sym as u16);
                }
            }
        }

        if num_symbols == 1 {
            return Ok(Table {
                fast: vec![],
                single_symbol: Some(sorted_symbols[0]),
                first_code: [0; HUFFMAN_MAX_BITS + 1],
                count,
                first_index: [0; HUFFMAN_MAX_BITS + 1],
                sorted_symbols,
            });
        }

        let mut first_code = [0u32; HUFFMAN_MAX_BITS + 1];
        let mut first_index = [0u32; HUFFMAN_MAX_BITS + 1];
        let mut code = 0u32;
        let mut index = 0u32;
        let mut space = 1u32 << HUFFMAN_MAX_BITS;
        for len in 1..=HUFFMAN_MAX_BITS {
            code <<= 1;
            first_code[len] = code;
            first_index[len] = index;
            code += count[len];
            index += count[len];
            let used = count[len] << (HUFFMAN_MAX_BITS - len);
            space = space.checked_sub(used).ok_or(Error::InvalidHuffman)?;
        }
        if space != 0 {
            return Err(Error::InvalidHuffman);
        }

        let mut fast = vec![TableEntry::default(); 1 << TABLE_BITS];
        for len in 1..=TABLE_BITS {
            for k in 0..count[len] {
                let code = first_code[len] + k;
                let value = sorted_symbols[(first_index[len] + k) as usize];
                let reversed = code.reverse_bits() >> (32 - len);
                let mut idx = reversed as usize;
                while idx < fast.len() {
                    fast[idx] = TableEntry {
                        bits: len as u8,
                        value,
                    };
                    idx += 1 << len;
                }
            }
        }

        Ok(Table {
            fast,
            single_symbol: None,
            first_code,
            count,
            first_index,
            sorted_symbols,
        })
    }

    fn read(&self, br: &mut BitReader) -> Result<u32> {
        if let Some(sym) = self.single_symbol {
            return Ok(sym as u32);
        }
        let entry = self.fast[br.peek(TABLE_BITS)? as usize];
        if entry.bits != 0 {
            br.consume(entry.bits as usize)?;
            return Ok(entry.value as u32);
        }
        self.read_slow(br)
    }

    #[inline(never)]
    fn read_slow(&self, br: &mut BitReader) -> Result<u32> {
        let mut code = 0u32;
        for len in 1..=HUFFMAN_MAX_BITS {
            code = (code << 1) | br.read(1)? as u32;
            let offset = code.wrapping_sub(self.first_code[len]);
            if offset < self.count[len] {
                return Ok(self.sorted_symbols[(self.first_index[len] + offset) as usize] as u32);
            }
        }
        Err(Error::InvalidHuffman)
    }
}

fn read_simple_code(alphabet_size: usize, br: &mut BitReader) -> Result<Table> {
    let max_bits = (alphabet_size - 1).floor_log2() + 1;
    let num_symbols = br.read(2)? as usize + 1;
    let mut symbols = [0u16; 4];
    for i in 0..num_symbols {
        let sym = br.read(max_bits)? as usize;
        if sym >= alphabet_size {
            return Err(Error::InvalidHuffman);
        }
        if symbols[..i].contains(&(sym as u16)) {
            return Err(Error::InvalidHuffman);
        }
        symbols[i] = sym as u16;
    }
    let lengths: &[u8] = match num_symbols {
        1 => &[0],
        2 => {
            symbols[..2].sort_unstable();
            &[1, 1]
        }
        3 => {
            symbols[1..3].sort_unstable();
            &[1, 2, 2]
        }
        _ => {
            if br.read(1)? == 1 {
                symbols[2..4].sort_unstable();
                &[1, 2, 3, 3]
            } else {
                symbols.sort_unstable();
                &[2, 2, 2, 2]
            }
        }
    };
    if num_symbols == 1 {
        return Table::build(&single_symbol_lengths(symbols[0] as usize, alphabet_size));
    }
    let mut code_lengths = vec![0u8; alphabet_size];
    for (sym, len) in symbols.iter().zip(lengths) {
        code_lengths[*sym as usize] = *len;
    }
    Table::build(&code_lengths)
}

fn single_symbol_lengths(symbol: usize, alphabet_size: usize) -> Vec<u8> {
    let mut lengths = vec![0u8; alphabet_size];
    lengths[symbol] = 1;
    lengths
}

fn read_code_lengths(
    code_length_code_lengths: &[u8; CODE_LENGTH_CODES],
    alphabet_size: usize,
    br: &mut BitReader,
) -> Result<Vec<u8>> {
    let table = Table::build(code_length_code_lengths)?;
    let mut code_lengths = vec![0u8; alphabet_size];
    let mut symbol = 0;
    let mut prev_code_len = DEFAULT_CODE_LENGTH;
    let mut repeat = 0usize;
    let mut repeat_code_len = 0u8;
    let mut space = 1i64 << HUFFMAN_MAX_BITS;

    while symbol < alphabet_size && space > 0 {
        let code_len = table.read(br)? as u8;
        if code_len < CODE_LENGTH_REPEAT_CODE {
            repeat = 0;
            code_lengths[symbol] = code_len;
            symbol += 1;
            if code_len != 0 {
                prev_code_len = code_len;
                space -= (1 << HUFFMAN_MAX_BITS) >> code_len;
            }
        } else {
            let extra_bits = code_len as usize - 14;
            let new_len = if code_len == CODE_LENGTH_REPEAT_CODE {
                prev_code_len
            } else {
                0
            };
            if repeat_code_len != new_len {
                repeat = 0;
                repeat_code_len = new_len;
            }
            let old_repeat = repeat;
            if repeat > 0 {
                repeat = (repeat - 2) << extra_bits;
            }
            repeat += br.read(extra_bits)? as usize + 3;
            let repeat_delta = repeat - old_repeat;
            if symbol + repeat_delta > alphabet_size {
                return Err(Error::InvalidHuffman);
            }
            code_lengths[symbol..symbol + repeat_delta].fill(repeat_code_len);
            symbol += repeat_delta;
            if repeat_code_len != 0 {
                space -= (repeat_delta as i64) << (HUFFMAN_MAX_BITS - repeat_code_len as usize);
            }
        }
    }
    if space != 0 {
        return Err(Error::InvalidHuffman);
    }
    Ok(code_lengths)
}

fn read_complex_code(alphabet_size: usize, skip: usize, br: &mut BitReader) -> Result<Table> {
    // Static prefix code for the code length code lengths, indexed by the next 4 bits.
    const STATIC_BITS: [u8; 16] = [2, 2, 2, 3, 2, 2, 2, 4, 2, 2, 2, 3, 2, 2, 2, 4];
    const STATIC_VALUES: [u8; 16] = [0, 4, 3, 2, 0, 4, 3, 1, 0, 4, 3, 2, 0, 4, 3, 5];

    let mut code_length_code_lengths = [0u8; CODE_LENGTH_CODES];
    let mut space = 32i32;
    let mut num_codes = 0;
    for &idx in CODE_LENGTH_CODE_ORDER.iter().skip(skip) {
        if space <= 0 {
            break;
        }
        let peeked = br.peek(4)? as usize;
        br.consume(STATIC_BITS[peeked] as usize)?;
        let v = STATIC_VALUES[peeked];
        code_length_code_lengths[idx] = v;
        if v != 0 {
            space -= 32 >> v;
            num_codes += 1;
        }
    }
    if num_codes != 1 && space != 0 {
        return Err(Error::InvalidHuffman);
    }
    let code_lengths = read_code_lengths(&code_length_code_lengths, alphabet_size, br)?;
    Table::build(&code_lengths)
}

#[derive(Debug)]
pub struct HuffmanCodes {
    tables: Vec<Table>,
}

impl HuffmanCodes {
    pub fn decode(num: usize, br: &mut BitReader) -> Result<HuffmanCodes> {
        let alphabet_sizes: Vec<usize> = (0..num)
            .map(|_| Ok(decode_varint16(br)? as usize + 1))
            .collect::<Result<_>>()?;
        let max = alphabet_sizes.iter().max().copied().unwrap_or(1);
        if max > (1 << HUFFMAN_MAX_BITS) {
            return Err(Error::AlphabetTooLargeHuff(max));
        }
        let tables = alphabet_sizes
            .iter()
            .map(|&alphabet_size| {
                if alphabet_size == 1 {
                    return Table::build(&[1]);
                }
                let hskip = br.read(2)? as usize;
                trace!(alphabet_size, hskip, "reading prefix code");
                if hskip == 1 {
                    read_simple_code(alphabet_size, br)
                } else {
                    read_complex_code(alphabet_size, hskip, br)
                }
            })
            .collect::<Result<_>>()?;
        Ok(HuffmanCodes { tables })
    }

    pub fn read(&self, br: &mut BitReader, cluster: usize) -> Result<u32> {
        self.tables[cluster].read(br)
    }

    /// Builds a code with 256 symbols, each coded with 8 bits.
    #[cfg(test)]
    pub fn byte_histogram() -> Self {
        Self {
            tables: vec![Table::build(&[8; 256]).expect("complete code")],
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::test::BitWriter;
    use test_log::test;

    #[test]
    fn simple_codes() {
        let mut w = BitWriter::new();
        // Alphabet of 5 symbols, 3 symbols: 4 (length 1), 1 and 3 (length 2).
        w.write(2, 1);
        w.write(2, 2);
        w.write(3, 4);
        w.write(3, 3);
        w.write(3, 1);
        // Codes: 4 -> 0, 1 -> 10, 3 -> 11, written starting from the first bit.
        w.write_code(2, 0b10);
        w.write_code(1, 0b0);
        w.write_code(2, 0b11);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(2).unwrap(), 1);
        let table = read_simple_code(5, &mut br).unwrap();
        assert_eq!(table.read(&mut br).unwrap(), 1);
        assert_eq!(table.read(&mut br).unwrap(), 4);
        assert_eq!(table.read(&mut br).unwrap(), 3);
    }

    #[test]
    fn single_symbol_reads_no_bits() {
        let mut w = BitWriter::new();
        w.write(2, 1);
        w.write(2, 0);
        w.write(4, 9);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(2).unwrap(), 1);
        let table = read_simple_code(10, &mut br).unwrap();
        let before = br.total_bits_read();
        for _ in 0..10 {
            assert_eq!(table.read(&mut br).unwrap(), 9);
        }
        assert_eq!(br.total_bits_read(), before);
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let mut w = BitWriter::new();
        w.write(2, 1);
        w.write(2, 1);
        w.write(2, 2);
        w.write(2, 2);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(2).unwrap(), 1);
        assert!(read_simple_code(4, &mut br).is_err());
    }

    #[test]
    fn long_codes_use_slow_path() {
        // Lengths 1, 2, ..., 11, 11 form a complete code.
        let mut lengths: Vec<u8> = (1..=11).collect();
        lengths.push(11);
        let table = Table::build(&lengths).unwrap();
        let mut w = BitWriter::new();
        // Symbol 11 is the all-ones code of length 11, symbol 10 is 11111111110.
        w.write_code(11, 0b11111111111);
        w.write_code(11, 0b11111111110);
        w.write_code(3, 0b110);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(table.read(&mut br).unwrap(), 11);
        assert_eq!(table.read(&mut br).unwrap(), 10);
        assert_eq!(table.read(&mut br).unwrap(), 2);
    }

    #[test]
    fn incomplete_code_is_rejected() {
        assert!(Table::build(&[1, 2]).is_err());
        assert!(Table::build(&[1, 1, 1]).is_err());
    }

    #[test]
    fn complex_code_all_length_two() {
        let mut w = BitWriter::new();
        // Code length code: only symbol 2 has nonzero length. Its length is 1, coded by the
        // static code as 0111 (value 1). All the earlier entries in the order are zero
        // (static code 00). Order is 1, 2, so we write 0 for symbol 1, then 1 for symbol 2.
        w.write(2, 0);
        w.write(2, 0b00);
        w.write(4, 0b0111);
        // Space is now 16, keep writing zeros until all 18 entries are read.
        for _ in 0..16 {
            w.write(2, 0b00);
        }
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(br.read(2).unwrap(), 0);
        // A single code length symbol is read with 0 bits: all 4 symbols get length 2.
        let table = read_complex_code(4, 0, &mut br).unwrap();
        let mut w = BitWriter::new();
        w.write_code(2, 0b10);
        w.write_code(2, 0b01);
        let data = w.finish();
        let mut br = BitReader::new(&data);
        assert_eq!(table.read(&mut br).unwrap(), 2);
        assert_eq!(table.read(&mut br).unwrap(), 1);
    }
}

// Copyright (c) the JPEG XL Project Authors. All rights reserved.
//
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

use crate::bit_reader::BitReader;
use crate::error::{Error, Result};
use crate::util::{FloorLog2, tracing_wrappers::*};

pub const ANS_LOG_TAB_SIZE: usize = 12;
const ANS_TAB_SIZE: u32 = 1 << ANS_LOG_TAB_SIZE;
const ANS_SIGNATURE: u32 = 0x13 << 16;
const RLE_LOGCOUNT: usize = ANS_LOG_TAB_SIZE + 1;

fn decode_varlen_uint8(br: &mut BitReader) -> Result<u32> {
    if br.read(1)? == 0 {
        return Ok(0);
    }
    let nbits = br.read(3)? as usize;
    if nbits == 0 {
        Ok(1)
    } else {
        Ok(br.read(nbits)? as u32 + (1 << nbits))
    }
}

// Reads a log-count: a prefix code over 0..=13 where 13 marks a run of repeated counts.
fn read_logcount(br: &mut BitReader) -> Result<usize> {
    const LENGTHS: [u8; 14] = [5, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3, 6, 7, 7];
    const CODES: [u8; 14] = [17, 11, 15, 3, 9, 7, 4, 2, 5, 6, 0, 33, 1, 65];
    let bits = br.peek(7)? as u8;
    for (value, (&len, &code)) in LENGTHS.iter().zip(CODES.iter()).enumerate() {
        if bits & ((1 << len) - 1) == code {
            br.consume(len as usize)?;
            return Ok(value);
        }
    }
    Err(Error::InvalidAnsHistogram)
}

fn read_histogram(br: &mut BitReader) -> Result<Vec<u32>> {
    if br.read(1)? == 1 {
        // Simple code: one or two symbols.
        let num_symbols = br.read(1)? as usize + 1;
        let mut symbols = [0usize; 2];
        for sym in symbols.iter_mut().take(num_symbols) {
            *sym = decode_varlen_uint8(br)? as usize;
        }
        let max_symbol = symbols[..num_symbols].iter().copied().max().unwrap_or(0);
        let mut counts = vec![0; max_symbol + 1];
        if num_symbols == 1 {
            counts[symbols[0]] = ANS_TAB_SIZE;
        } else {
            if symbols[0] == symbols[1] {
                return Err(Error::InvalidAnsHistogram);
            }
            counts[symbols[0]] = br.read(ANS_LOG_TAB_SIZE)? as u32;
            counts[symbols[1]] = ANS_TAB_SIZE - counts[symbols[0]];
        }
        return Ok(counts);
    }

    if br.read(1)? == 1 {
        // Flat histogram.
        let alphabet_size = decode_varlen_uint8(br)? as usize + 1;
        let base = ANS_TAB_SIZE / alphabet_size as u32;
        let remainder = ANS_TAB_SIZE as usize % alphabet_size;
        return Ok((0..alphabet_size)
            .map(|i| base + (i < remainder) as u32)
            .collect());
    }

    let upper_bound_log = (ANS_LOG_TAB_SIZE + 1).floor_log2();
    let mut log = 0;
    while log < upper_bound_log {
        if br.read(1)? == 0 {
            break;
        }
        log += 1;
    }
    let shift = ((br.read(log)? as usize) | (1 << log)) - 1;
    if shift > ANS_LOG_TAB_SIZE + 1 {
        return Err(Error::InvalidAnsHistogram);
    }

    let length = decode_varlen_uint8(br)? as usize + 3;
    let mut logcounts = vec![0usize; length];
    let mut same = vec![0usize; length];
    let mut omit: Option<(usize, usize)> = None;
    let mut i = 0;
    while i < length {
        logcounts[i] = read_logcount(br)?;
        if logcounts[i] == RLE_LOGCOUNT {
            let rle_length = decode_varlen_uint8(br)? as usize;
            same[i] = rle_length + 5;
            i += rle_length + 4;
            continue;
        }
        if omit.is_none_or(|(log, _)| logcounts[i] > log) {
            omit = Some((logcounts[i], i));
        }
        i += 1;
    }
    let Some((_, omit_pos)) = omit else {
        return Err(Error::InvalidAnsHistogram);
    };
    if omit_pos + 1 < length && logcounts[omit_pos + 1] == RLE_LOGCOUNT {
        return Err(Error::InvalidAnsHistogram);
    }

    let mut counts = vec![0u32; length];
    let mut total_count = 0u32;
    let mut prev = 0;
    let mut num_same = 0;
    for i in 0..length {
        if same[i] != 0 {
            num_same = same[i] - 1;
            prev = if i > 0 { counts[i - 1] } else { 0 };
        }
        if num_same > 0 {
            counts[i] = prev;
            num_same -= 1;
        } else {
            let code = logcounts[i];
            if i == omit_pos || code == 0 {
                continue;
            } else if code == 1 {
                counts[i] = 1;
            } else {
                let log = code - 1;
                let bitcount = (shift as isize - ((ANS_LOG_TAB_SIZE - log) >> 1) as isize)
                    .clamp(0, log as isize) as usize;
                counts[i] = (1 << log) + ((br.read(bitcount)? as u32) << (log - bitcount));
            }
        }
        total_count += counts[i];
    }
    if total_count >= ANS_TAB_SIZE {
        return Err(Error::InvalidAnsHistogram);
    }
    counts[omit_pos] = ANS_TAB_SIZE - total_count;
    Ok(counts)
}

#[derive(Debug, Clone, Copy, Default)]
struct AliasEntry {
    cutoff: u32,
    right_value: u32,
    offsets1: u32,
    freq0: u32,
    freq1: u32,
}

#[derive(Debug)]
struct AliasTable {
    log_entry_size: usize,
    entries: Vec<AliasEntry>,
}

impl AliasTable {
    fn new(mut counts: Vec<u32>, log_alpha_size: usize) -> Result<AliasTable> {
        while counts.last() == Some(&0) {
            counts.pop();
        }
        if counts.is_empty() {
            counts.push(ANS_TAB_SIZE);
        }
        let table_size = 1usize << log_alpha_size;
        if counts.len() > table_size {
            return Err(Error::AlphabetTooLargeAns(counts.len(), table_size));
        }
        let entry_size = ANS_TAB_SIZE >> log_alpha_size;
        let log_entry_size = ANS_LOG_TAB_SIZE - log_alpha_size;

        if let Some(sym) = counts.iter().position(|&c| c == ANS_TAB_SIZE) {
            let entries = (0..table_size)
                .map(|i| AliasEntry {
                    cutoff: 0,
                    right_value: sym as u32,
                    offsets1: entry_size * i as u32,
                    freq0: 0,
                    freq1: ANS_TAB_SIZE,
                })
                .collect();
            return Ok(AliasTable {
                log_entry_size,
                entries,
            });
        }

        let mut entries = vec![AliasEntry::default(); table_size];
        let mut cutoffs = vec![0u32; table_size];
        let mut underfull = vec![];
        let mut overfull = vec![];
        for (i, &count) in counts.iter().enumerate() {
            cutoffs[i] = count;
            if count > entry_size {
                overfull.push(i);
            } else if count < entry_size {
                underfull.push(i);
            }
        }
        underfull.extend(counts.len()..table_size);

        while let Some(o) = overfull.pop() {
            let u = underfull.pop().ok_or(Error::InvalidAnsHistogram)?;
            let underfull_by = entry_size - cutoffs[u];
            cutoffs[o] -= underfull_by;
            entries[u].right_value = o as u32;
            entries[u].offsets1 = cutoffs[o];
            if cutoffs[o] < entry_size {
                underfull.push(o);
            } else if cutoffs[o] > entry_size {
                overfull.push(o);
            }
        }

        let count_of = |i: usize| counts.get(i).copied().unwrap_or(0);
        for (i, entry) in entries.iter_mut().enumerate() {
            if cutoffs[i] == entry_size {
                entry.right_value = i as u32;
                entry.offsets1 = 0;
                entry.cutoff = 0;
            } else {
                entry.offsets1 -= cutoffs[i];
                entry.cutoff = cutoffs[i];
            }
            entry.freq0 = count_of(i);
            entry.freq1 = count_of(entry.right_value as usize);
        }

        Ok(AliasTable {
            log_entry_size,
            entries,
        })
    }

    #[inline]
    fn lookup(&self, value: u32) -> (u32, u32, u32) {
        let i = value >> self.log_entry_size;
        let pos = value & ((1 << self.log_entry_size) - 1);
        let entry = &self.entries[i as usize];
        if pos >= entry.cutoff {
            (entry.right_value, entry.offsets1 + pos, entry.freq1)
        } else {
            (i, pos, entry.freq0)
        }
    }
}

#[derive(Debug)]
pub struct AnsCodes {
    tables: Vec<AliasTable>,
}

impl AnsCodes {
    pub fn decode(num: usize, log_alpha_size: usize, br: &mut BitReader) -> Result<AnsCodes> {
        let tables = (0..num)
            .map(|_| {
                let counts = read_histogram(br)?;
                trace!(?counts, "read ANS histogram");
                AliasTable::new(counts, log_alpha_size)
            })
            .collect::<Result<_>>()?;
        Ok(AnsCodes { tables })
    }
}

#[derive(Debug)]
pub struct AnsReader(u32);

impl AnsReader {
    pub fn init(br: &mut BitReader) -> Result<AnsReader> {
        Ok(AnsReader(br.read(32)? as u32))
    }

    pub fn read(&mut self, codes: &AnsCodes, br: &mut BitReader, cluster: usize) -> Result<u32> {
        let state = self.0;
        let (symbol, offset, freq) = codes.tables[cluster].lookup(state & (ANS_TAB_SIZE - 1));
        let mut state = freq * (state >> ANS_LOG_TAB_SIZE) + offset;
        if state < (1 << 16) {
            state = (state << 16) | br.read(16)? as u32;
        }
        self.0 = state;
        Ok(symbol)
    }

    pub fn check_final_state(&self) -> Result<()> {
        if self.0 == ANS_SIGNATURE {
            Ok(())
        } else {
            Err(Error::InvalidEntropyFinalState)
        }
    }
}
